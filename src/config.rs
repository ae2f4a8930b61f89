use std::sync::OnceLock;

/// Process-wide tool configuration, loaded once from the environment and
/// never mutated afterward (spec Design Notes §9: "Global tool paths").
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub poisson_exe: String,
    pub poisson_trimmer_exe: String,
    pub legacy_arg_schema: bool,
}

impl ToolConfig {
    fn from_env() -> Self {
        Self {
            poisson_exe: std::env::var("LANDFORM_POISSON_EXE")
                .unwrap_or_else(|_| "PoissonRecon".to_string()),
            poisson_trimmer_exe: std::env::var("LANDFORM_POISSON_TRIMMER_EXE")
                .unwrap_or_else(|_| "SurfaceTrimmer".to_string()),
            legacy_arg_schema: std::env::var("LANDFORM_POISSON_EXE_LEGACY").is_ok(),
        }
    }
}

static TOOL_CONFIG: OnceLock<ToolConfig> = OnceLock::new();

/// Returns the process-wide tool configuration, reading the environment on
/// first call only.
pub fn tool_config() -> &'static ToolConfig {
    TOOL_CONFIG.get_or_init(ToolConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env_vars() {
        let cfg = ToolConfig::from_env();
        assert!(!cfg.poisson_exe.is_empty());
        assert!(!cfg.poisson_trimmer_exe.is_empty());
    }
}

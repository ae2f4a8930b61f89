use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the decimation, tiling, texturing and parent-tile
/// components. Numeric degeneracies are handled locally wherever possible
/// (see the Design Notes in `DESIGN.md`) and never reach this enum; what
/// remains are invariant violations, external-tool failures and malformed
/// inputs, per the error taxonomy this crate implements.
#[derive(Debug, Error)]
pub enum Error {
    #[error("mesh invariant violated: {0}")]
    InvariantViolation(String),

    #[error("malformed mesh input: {0}")]
    MalformedInput(String),

    #[error("external tool `{tool}` exited with status {status:?}: {stderr_tail}")]
    ExternalToolFailed {
        tool: String,
        status: Option<i32>,
        stderr_tail: String,
    },

    #[error("external tool `{tool}` timed out after {elapsed_secs:.1}s")]
    ExternalToolTimedOut { tool: String, elapsed_secs: f64 },

    #[error("external tool produced no output file at {0}")]
    ExternalToolNoOutput(PathBuf),

    #[error("spatial index is empty, cannot cast ray")]
    EmptySpatialIndex,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

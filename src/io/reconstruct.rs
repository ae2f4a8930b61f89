//! Reconstruction interface (spec §6, Design Notes §9): the Poisson and
//! floating-scale surface reconstructors are invoked as subprocesses. This
//! module replaces the source's exceptions-for-control-flow around that
//! invocation with a `Result`-returning trait, and isolates the subprocess
//! timeout instead of aborting a worker thread (Design Notes §9).

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::{
    config::tool_config,
    error::{Error, Result},
    mesh::Mesh,
};

use super::point_cloud::{write_point_cloud, PointSample};

/// Options for the Poisson surface reconstructor, matching its documented
/// argument vector (spec §6).
#[derive(Debug, Clone)]
pub struct PoissonOptions {
    pub b_type: u8,
    pub samples_per_node: f64,
    pub degree: u32,
    /// Exactly one of `width` or `depth` is sent, `width` taking priority.
    pub width: Option<f64>,
    pub depth: Option<u32>,
    pub confidence: bool,
    pub density: bool,
    pub envelope: Option<PathBuf>,
    pub threads: usize,
    pub temp_dir: Option<PathBuf>,
    pub colors: bool,
    /// `--normals 2`: emit normals at degree-2 accuracy.
    pub normals: bool,
    pub timeout: Duration,
}

impl Default for PoissonOptions {
    fn default() -> Self {
        Self {
            b_type: 1,
            samples_per_node: 1.5,
            degree: 2,
            width: None,
            depth: Some(8),
            confidence: false,
            density: false,
            envelope: None,
            threads: 1,
            temp_dir: None,
            colors: false,
            normals: false,
            timeout: Duration::from_secs(600),
        }
    }
}

/// Options for the floating-scale surface reconstructor.
#[derive(Debug, Clone)]
pub struct FssrOptions {
    /// Minimum vertex count passed to the `-c` cleanup pass.
    pub min_cleanup_verts: u32,
    pub timeout: Duration,
}

impl Default for FssrOptions {
    fn default() -> Self {
        Self { min_cleanup_verts: 4, timeout: Duration::from_secs(600) }
    }
}

/// A reconstruction backend that turns a sampled point cloud into an
/// untrimmed mesh (spec §4.D step 3). The bottom-up parent-tile algorithm
/// is generic over this trait so it can be exercised in tests without the
/// external binaries.
pub trait SurfaceReconstructor: Send + Sync {
    fn reconstruct(&self, points: &[PointSample], work_dir: &Path) -> Result<Mesh>;
}

pub struct PoissonReconstructor {
    pub options: PoissonOptions,
}

impl SurfaceReconstructor for PoissonReconstructor {
    fn reconstruct(&self, points: &[PointSample], work_dir: &Path) -> Result<Mesh> {
        let cfg = tool_config();
        let in_file = work_dir.join("poisson_in.xyz");
        let out_file = work_dir.join("poisson_out.ply");
        write_point_cloud(&in_file, points)?;

        let mut cmd = Command::new(&cfg.poisson_exe);
        cmd.arg("--in").arg(&in_file).arg("--out").arg(&out_file);

        if !cfg.legacy_arg_schema {
            cmd.arg("--bType").arg(self.options.b_type.to_string());
            cmd.arg("--samplesPerNode").arg(self.options.samples_per_node.to_string());
            cmd.arg("--degree").arg(self.options.degree.to_string());

            if let Some(width) = self.options.width {
                cmd.arg("--width").arg(width.to_string());
            } else if let Some(depth) = self.options.depth {
                cmd.arg("--depth").arg(depth.to_string());
            }
            if self.options.confidence {
                cmd.arg("--confidence").arg("1");
            }
            if self.options.density {
                cmd.arg("--density");
            }
            if let Some(envelope) = &self.options.envelope {
                cmd.arg("--envelope").arg(envelope);
            }
            cmd.arg("--threads").arg(self.options.threads.to_string());
            if let Some(temp_dir) = &self.options.temp_dir {
                cmd.arg("--tempDir").arg(temp_dir);
            }
            if self.options.colors {
                cmd.arg("--colors");
            }
            if self.options.normals {
                cmd.arg("--normals").arg("2");
            }
        } else {
            // Legacy schema drops the long-option spellings that newer
            // Poisson builds dropped support for.
            cmd.arg("--depth").arg(self.options.depth.unwrap_or(8).to_string());
        }

        run_with_timeout(&mut cmd, "PoissonRecon", self.options.timeout)?;
        read_output_mesh(&out_file, "PoissonRecon")
    }
}

pub struct FssrReconstructor {
    pub options: FssrOptions,
}

impl SurfaceReconstructor for FssrReconstructor {
    fn reconstruct(&self, points: &[PointSample], work_dir: &Path) -> Result<Mesh> {
        let in_file = work_dir.join("fssr_in.xyz");
        let raw_out = work_dir.join("fssr_raw.ply");
        let clean_out = work_dir.join("fssr_clean.ply");
        write_point_cloud(&in_file, points)?;

        let mut reconstruct = Command::new("fssrecon");
        reconstruct.arg(&in_file).arg(&raw_out);
        run_with_timeout(&mut reconstruct, "fssrecon", self.options.timeout)?;

        let mut cleanup = Command::new("meshclean");
        cleanup.arg("-c").arg(self.options.min_cleanup_verts.to_string()).arg(&raw_out).arg(&clean_out);
        run_with_timeout(&mut cleanup, "meshclean", self.options.timeout)?;

        read_output_mesh(&clean_out, "fssrecon")
    }
}

/// Test double that skips external reconstruction entirely, returning a
/// watertight box over the sample bounds. Lets the bottom-up parent-tile
/// algorithm be exercised without either external binary present.
pub struct NullReconstructor;

impl SurfaceReconstructor for NullReconstructor {
    fn reconstruct(&self, points: &[PointSample], _work_dir: &Path) -> Result<Mesh> {
        if points.is_empty() {
            return Err(Error::MalformedInput("cannot reconstruct from zero points".into()));
        }

        let mut min = points[0].position;
        let mut max = points[0].position;
        for p in &points[1..] {
            min = crate::helpers::aliases::Vec3::new(min.x.min(p.position.x), min.y.min(p.position.y), min.z.min(p.position.z));
            max = crate::helpers::aliases::Vec3::new(max.x.max(p.position.x), max.y.max(p.position.y), max.z.max(p.position.z));
        }

        Ok(box_mesh(min, max))
    }
}

fn box_mesh(min: crate::helpers::aliases::Vec3, max: crate::helpers::aliases::Vec3) -> Mesh {
    use crate::geometry::primitives::box3::Box3;
    let bbox = Box3::new(min, max);
    let p: Vec<_> = (0..8u8).map(|i| bbox.vertex(i)).collect();
    let faces = vec![
        [0, 2, 1], [0, 3, 2], // z = min
        [4, 5, 6], [4, 6, 7], // z = max
        [0, 1, 5], [0, 5, 4],
        [1, 3, 7], [1, 7, 5],
        [3, 2, 6], [3, 6, 7],
        [2, 0, 4], [2, 4, 6],
    ];
    Mesh::new(p, faces)
}

/// Spawns `cmd` and polls for completion, killing it if `timeout` elapses
/// (Design Notes §9: subprocess isolation rather than a thread-abort based
/// timeout). Returns a structured error on non-zero exit, not a panic.
fn run_with_timeout(cmd: &mut Command, name: &str, timeout: Duration) -> Result<Output> {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("invoking external reconstructor `{name}`: {cmd:?}");
    let child = cmd.spawn().map_err(|e| {
        Error::ExternalToolFailed { tool: name.to_string(), status: None, stderr_tail: e.to_string() }
    })?;

    let output = wait_with_timeout(child, timeout, name)?;

    if !output.status.success() {
        let stderr_tail = tail(&output.stderr, 4096);
        warn!("external tool `{name}` exited with {:?}", output.status.code());
        return Err(Error::ExternalToolFailed { tool: name.to_string(), status: output.status.code(), stderr_tail });
    }

    Ok(output)
}

fn wait_with_timeout(mut child: Child, timeout: Duration, name: &str) -> Result<Output> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stdout = read_all(child.stdout.take());
                let stderr = read_all(child.stderr.take());
                return Ok(Output { status, stdout, stderr });
            }
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::ExternalToolTimedOut { tool: name.to_string(), elapsed_secs: start.elapsed().as_secs_f64() });
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

fn read_all(stream: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut s) = stream {
        let _ = s.read_to_end(&mut buf);
    }
    buf
}

fn tail(bytes: &[u8], max_len: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= max_len {
        text.into_owned()
    } else {
        text[text.len() - max_len..].to_string()
    }
}

fn read_output_mesh(path: &Path, tool: &str) -> Result<Mesh> {
    if !path.exists() {
        return Err(Error::ExternalToolNoOutput(path.to_path_buf()));
    }

    let metadata = std::fs::metadata(path)?;
    if metadata.len() == 0 {
        return Err(Error::ExternalToolFailed { tool: tool.to_string(), status: None, stderr_tail: "empty output file".into() });
    }

    super::ply::read_ply_mesh(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::aliases::Vec3;

    #[test]
    fn null_reconstructor_covers_the_sample_bounds() {
        let points = vec![
            PointSample { position: Vec3::new(0.0, 0.0, 0.0), normal: None },
            PointSample { position: Vec3::new(2.0, 3.0, 1.0), normal: None },
        ];
        let dir = tempfile::tempdir().unwrap();
        let mesh = NullReconstructor.reconstruct(&points, dir.path()).unwrap();
        assert_eq!(mesh.face_count(), 12);

        let bounds = mesh.bounds();
        assert_eq!(*bounds.get_min(), Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(*bounds.get_max(), Vec3::new(2.0, 3.0, 1.0));
    }

    #[test]
    fn null_reconstructor_rejects_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NullReconstructor.reconstruct(&[], dir.path()).is_err());
    }
}

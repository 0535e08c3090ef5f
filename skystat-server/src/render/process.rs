///! External renderer process driver.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use super::{RenderDiagnostic, RenderParams, SkyRender};
use crate::config::RendererConfig;

/// Spawns the external sky renderer and collects its output file.
///
/// The renderer is invoked with the image size, optional cardinal-marker and
/// debug flags, the render epoch time, site coordinates, target coordinates,
/// and the destination path as the final positional argument. Exit status 0
/// plus a readable output file is success; everything else becomes a
/// [`RenderDiagnostic`].
pub struct ProcessRenderer {
    command: PathBuf,
    scratch_dir: PathBuf,
    debug: bool,
}

impl ProcessRenderer {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            command: PathBuf::from(&config.command),
            scratch_dir: PathBuf::from(&config.scratch_dir),
            debug: config.debug,
        }
    }

    fn build_args(&self, params: &RenderParams, output: &Path) -> Vec<String> {
        let mut args = vec!["-s".to_string(), params.size_px.to_string()];
        if params.cardinal_markers {
            args.push("-C".to_string());
        }
        if self.debug {
            args.push("-d".to_string());
        }
        args.extend([
            "-t".to_string(),
            params.epoch_seconds.to_string(),
            "-l".to_string(),
            params.site_latitude_deg.to_string(),
            "-L".to_string(),
            params.site_longitude_deg.to_string(),
            "-R".to_string(),
            params.right_ascension_deg.to_string(),
            "-D".to_string(),
            params.declination_deg.to_string(),
            output.display().to_string(),
        ]);
        args
    }
}

/// Scratch output file for a single render call. The scratch directory is
/// shared, so the name must be collision-free; the file is removed when the
/// guard drops, which covers success, process failure, unreadable output,
/// an exceeded budget, and a cancelled request alike.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("sky-{}.png", Uuid::now_v7())),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "failed to remove scratch file {}: {}",
                    self.path.display(),
                    err
                );
            }
        }
    }
}

#[async_trait]
impl SkyRender for ProcessRenderer {
    async fn render(&self, params: &RenderParams) -> Result<Vec<u8>, RenderDiagnostic> {
        let scratch = ScratchFile::new(&self.scratch_dir);
        let args = self.build_args(params, scratch.path());
        let invocation = format!("{} {}", self.command.display(), args.join(" "));
        tracing::debug!("invoking renderer: {}", invocation);

        let fail = |output: String| RenderDiagnostic {
            invocation: invocation.clone(),
            output,
        };

        let mut command = Command::new(&self.command);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(params.budget, command.output()).await {
            Err(_) => {
                return Err(fail(format!(
                    "renderer exceeded its {}s budget and was killed",
                    params.budget.as_secs()
                )));
            }
            Ok(Err(err)) => return Err(fail(format!("failed to spawn renderer: {err}"))),
            Ok(Ok(output)) => output,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(fail(format!("{}:\n{combined}", output.status)));
        }

        match tokio::fs::read(scratch.path()).await {
            Ok(bytes) => {
                tracing::debug!("renderer produced {} bytes", bytes.len());
                Ok(bytes)
            }
            Err(err) => Err(fail(format!(
                "renderer exited cleanly but its output file could not be read: {err}\n{combined}"
            ))),
        }
        // scratch drops here; the output file never outlives the call
    }
}

/// Sweep scratch files that survived a hard crash. Normal operation removes
/// per-call files via [`ScratchFile`]; this only catches leftovers.
pub fn start_scratch_sweeper(scratch_dir: PathBuf) {
    const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
    const MAX_AGE: Duration = Duration::from_secs(60 * 60);

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(SWEEP_INTERVAL).await;
            if let Err(err) = sweep_scratch(&scratch_dir, MAX_AGE) {
                tracing::warn!("scratch sweep failed: {}", err);
            }
        }
    });
}

fn sweep_scratch(dir: &Path, max_age: Duration) -> std::io::Result<()> {
    let now = std::time::SystemTime::now();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !(name.starts_with("sky-") && name.ends_with(".png")) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if now.duration_since(modified).unwrap_or_default() >= max_age {
            std::fs::remove_file(&path)?;
            tracing::info!("removed stale scratch file {}", path.display());
        }
    }
    Ok(())
}

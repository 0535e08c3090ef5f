///! Sky-visibility image rendering.
///!
///! Rendering is a capability: the production implementation spawns the
///! external renderer process, tests substitute a stub. Either way the
///! caller gets image bytes or a diagnostic it can hand to an operator.

// ============ Process Driver ============
mod process;
pub use process::{ProcessRenderer, start_scratch_sweeper};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// Parameters for one render call, derived 1:1 from a snapshot.
#[derive(Debug, Clone)]
pub struct RenderParams {
    /// Render epoch time in integer seconds.
    pub epoch_seconds: i64,
    pub right_ascension_deg: f64,
    pub declination_deg: f64,
    pub site_latitude_deg: f64,
    pub site_longitude_deg: f64,
    /// Output image edge length in pixels.
    pub size_px: u32,
    pub cardinal_markers: bool,
    /// Wall-clock budget for the external process, derived from the clamped
    /// exposure time.
    pub budget: Duration,
}

/// Everything an operator needs to reproduce a failed render by hand: the
/// literal invocation and the captured process output.
#[derive(Debug, Clone)]
pub struct RenderDiagnostic {
    pub invocation: String,
    pub output: String,
}

impl fmt::Display for RenderDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sky render failed")?;
        writeln!(f, "invocation: {}", self.invocation)?;
        write!(f, "output:\n{}", self.output)
    }
}

/// Render capability.
#[async_trait]
pub trait SkyRender: Send + Sync {
    async fn render(&self, params: &RenderParams) -> Result<Vec<u8>, RenderDiagnostic>;
}

//! The media-graph boundary.
//!
//! Everything below `GraphBuilder` is out of scope here: probing sources,
//! building decode/encode/mux graphs, and running them is real pipeline
//! internals that belongs to a media framework, not this control-plane
//! exercise. `StubGraphBuilder` stands in for that framework: it simulates
//! probe/build/run timing with `tokio::time::sleep` but still does the real
//! bookkeeping around it — writing a real `HandoffDescriptor`, touching a
//! real rendezvous marker, reporting real progress ticks to the watchdog.

use std::path::PathBuf;
use std::time::Duration;

use streamcore::model::{HandoffDescriptor, HandoffExtended};

use crate::playlist::{options_from_spec, RollingPlaylist};
use crate::role::Role;

/// Everything a `GraphBuilder` needs to know about the stage it is
/// building, gathered from CLI args and the upstream handoff (if any).
#[derive(Debug, Clone)]
pub struct RoleContext {
    pub channel: String,
    pub role: Role,
    pub source_index: usize,
    pub log_dir: PathBuf,
    pub upstream: Option<HandoffDescriptor>,
    /// The declared output's `OutputSpec::options`; empty for non-output
    /// roles. Drives `segmented-http` playlist knobs (playlist-length,
    /// target-duration, max-files).
    pub output_options: std::collections::BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("failed to probe source: {0}")]
    Probe(String),
    #[error("failed to build graph: {0}")]
    Build(String),
    #[error("graph faulted while running: {0}")]
    Fault(String),
}

/// Outcome of a single watchdog-visible progress check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Advanced,
    Stalled,
}

/// The media-framework seam. Probing, construction, steady-state running,
/// and teardown of the actual decode/transcode/mux/output graph all happen
/// behind this trait.
#[async_trait::async_trait]
pub trait GraphBuilder: Send {
    /// Probes the source/upstream and builds the graph. Returns this role's
    /// own handoff descriptor for downstream stages to consume, or `None`
    /// for roles (outputs) that have no downstream within this process
    /// group.
    async fn construct(&mut self, ctx: &RoleContext) -> Result<Option<HandoffDescriptor>, GraphError>;

    /// Called on a steady cadence while `Running`. Returns whether the
    /// graph produced forward progress (a new frame, a new segment, ...)
    /// since the last call.
    async fn poll_progress(&mut self) -> Progress;

    /// Tears the graph down, releasing any resources, before a
    /// reconstruction attempt or final exit.
    async fn teardown(&mut self);
}

/// Default stand-in `GraphBuilder`: simulates timing with sleeps, performs
/// the real filesystem side effects (handoff descriptor, progress ticks, and
/// for `segmented-http` outputs, rolling playlist segments) a real graph
/// would drive.
#[derive(Default)]
pub struct StubGraphBuilder {
    playlist: Option<RollingPlaylist>,
}

#[async_trait::async_trait]
impl GraphBuilder for StubGraphBuilder {
    async fn construct(&mut self, ctx: &RoleContext) -> Result<Option<HandoffDescriptor>, GraphError> {
        tokio::time::sleep(Duration::from_millis(200)).await;

        if let Role::Output(index) = ctx.role {
            let segment_dir = ctx.log_dir.join(format!("output-{index}-hls"));
            self.playlist = Some(RollingPlaylist::new(segment_dir, options_from_spec(&ctx.output_options)));
        }

        match ctx.role {
            Role::Input => Ok(Some(HandoffDescriptor {
                codec: "passthrough".to_string(),
                program_number: 1,
                video_stream_id: Some("0x0100".to_string()),
                audio_stream_id: Some("0x0101".to_string()),
                extended: HandoffExtended::default(),
            })),
            Role::Transcoder => {
                let upstream = ctx.upstream.clone().ok_or_else(|| GraphError::Build("transcoder has no upstream descriptor".to_string()))?;
                Ok(Some(upstream))
            }
            Role::Output(_) => Ok(None),
        }
    }

    async fn poll_progress(&mut self) -> Progress {
        tokio::time::sleep(Duration::from_millis(50)).await;

        if let Some(playlist) = self.playlist.as_mut() {
            match playlist.roll() {
                Ok(path) => {
                    if let Err(e) = std::fs::write(&path, []) {
                        tracing::warn!(error = %e, path = %path.display(), "failed to write playlist segment file");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to roll playlist segment"),
            }
        }

        Progress::Advanced
    }

    async fn teardown(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

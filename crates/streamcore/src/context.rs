//! Filesystem and network layout shared across the daemon's services.
//!
//! Bundles the directories and bind address every component needs to agree
//! on: where run-state files live, where pipeline processes exchange
//! handoff descriptors, and where debug dumps land.

use std::path::{Path, PathBuf};

/// Resolved directory/address layout for one daemon instance.
///
/// Built once at startup from [`crate::config::DaemonSettings`] and handed
/// to every service that needs to find these paths, so there is a single
/// point of truth instead of each component re-deriving them from config.
#[derive(Debug, Clone)]
pub struct ControlPlaneContext {
    state_dir: PathBuf,
    handoff_dir: PathBuf,
    debug_dump_dir: PathBuf,
    bind_addr: String,
}

impl ControlPlaneContext {
    #[must_use]
    pub fn new(
        state_dir: impl Into<PathBuf>,
        handoff_dir: impl Into<PathBuf>,
        debug_dump_dir: impl Into<PathBuf>,
        bind_addr: impl Into<String>,
    ) -> Self {
        Self {
            state_dir: state_dir.into(),
            handoff_dir: handoff_dir.into(),
            debug_dump_dir: debug_dump_dir.into(),
            bind_addr: bind_addr.into(),
        }
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    #[must_use]
    pub fn handoff_dir(&self) -> &Path {
        &self.handoff_dir
    }

    #[must_use]
    pub fn debug_dump_dir(&self) -> &Path {
        &self.debug_dump_dir
    }

    #[must_use]
    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    /// Directory holding handoff descriptors and rendezvous markers for one
    /// channel's pipeline hops (`<handoff-dir>/<channel>/`).
    #[must_use]
    pub fn channel_handoff_dir(&self, channel: &str) -> PathBuf {
        self.handoff_dir.join(channel)
    }

    /// Ensures the directories this context names exist, creating them if
    /// necessary. Called once during bootstrap.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        std::fs::create_dir_all(&self.handoff_dir)?;
        std::fs::create_dir_all(&self.debug_dump_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_handoff_dir_nests_under_handoff_dir() {
        let ctx = ControlPlaneContext::new("/var/lib/state", "/var/lib/handoff", "/var/lib/dumps", "0.0.0.0:8080");
        assert_eq!(ctx.channel_handoff_dir("news"), PathBuf::from("/var/lib/handoff/news"));
    }

    #[test]
    fn ensure_directories_creates_all_three() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ControlPlaneContext::new(
            dir.path().join("state"),
            dir.path().join("handoff"),
            dir.path().join("dumps"),
            "0.0.0.0:8080",
        );
        ctx.ensure_directories().unwrap();
        assert!(ctx.state_dir().is_dir());
        assert!(ctx.handoff_dir().is_dir());
        assert!(ctx.debug_dump_dir().is_dir());
    }
}

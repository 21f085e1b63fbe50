//! Handoff descriptor + rendezvous marker I/O, the role-process side of the
//! protocol `streamcore::lifecycle::LifecycleManager::wait_for_handoff`
//! polls from the manager side.
//!
//! Each hop directory is `<handoff-dir>/<role>/`, holding a
//! `descriptor.json` (the upstream stream's parameters) and an empty
//! `rendezvous` file whose mere existence is the readiness signal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use streamcore::model::HandoffDescriptor;
use streamcore::protocol_constants::{HANDOFF_DESCRIPTOR_FILE, HANDOFF_POLL_INTERVAL_SECS, HANDOFF_RENDEZVOUS_FILE, HANDOFF_WAIT_BOUND_MINUTES};

use crate::role::Role;

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("failed to write handoff descriptor at {path}: {source}")]
    Write { path: String, #[source] source: std::io::Error },
    #[error("failed to read handoff descriptor at {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("handoff descriptor at {path} is not valid JSON: {source}")]
    Parse { path: String, #[source] source: serde_json::Error },
    #[error("timed out waiting for upstream handoff at {path}")]
    Timeout { path: String },
}

fn hop_dir(handoff_dir: &Path, role: Role) -> PathBuf {
    handoff_dir.join(role.to_string())
}

/// Publishes this role's descriptor and touches the rendezvous marker,
/// signalling downstream stages that this role has reached steady state.
pub fn publish(handoff_dir: &Path, role: Role, descriptor: &HandoffDescriptor) -> Result<(), HandoffError> {
    let dir = hop_dir(handoff_dir, role);
    std::fs::create_dir_all(&dir).map_err(|source| HandoffError::Write {
        path: dir.display().to_string(),
        source,
    })?;

    let descriptor_path = dir.join(HANDOFF_DESCRIPTOR_FILE);
    let body = serde_json::to_vec_pretty(descriptor).expect("HandoffDescriptor always serializes");
    std::fs::write(&descriptor_path, body).map_err(|source| HandoffError::Write {
        path: descriptor_path.display().to_string(),
        source,
    })?;

    let rendezvous_path = dir.join(HANDOFF_RENDEZVOUS_FILE);
    std::fs::write(&rendezvous_path, []).map_err(|source| HandoffError::Write {
        path: rendezvous_path.display().to_string(),
        source,
    })?;

    Ok(())
}

/// Removes this role's hop directory, e.g. before republishing a fresh
/// descriptor after a `Stalled -> Constructing` reconstruction.
pub fn retract(handoff_dir: &Path, role: Role) {
    let dir = hop_dir(handoff_dir, role);
    let _ = std::fs::remove_file(dir.join(HANDOFF_RENDEZVOUS_FILE));
    let _ = std::fs::remove_file(dir.join(HANDOFF_DESCRIPTOR_FILE));
}

/// True if `role`'s rendezvous marker is present, i.e. it has reached
/// steady state at least once since its hop directory was last cleared.
#[must_use]
pub fn is_ready(handoff_dir: &Path, role: Role) -> bool {
    hop_dir(handoff_dir, role).join(HANDOFF_RENDEZVOUS_FILE).exists()
}

/// Determines an output stage's upstream: the transcoder if the channel
/// launched one (its rendezvous will already exist, since the manager waits
/// for it before launching any output), otherwise the input directly.
#[must_use]
pub fn output_upstream(handoff_dir: &Path) -> Role {
    if is_ready(handoff_dir, Role::Transcoder) {
        Role::Transcoder
    } else {
        Role::Input
    }
}

/// Blocks (async) until `upstream`'s descriptor is published, bounded by
/// `HANDOFF_WAIT_BOUND_MINUTES`, then reads and returns it.
pub async fn await_upstream(handoff_dir: &Path, upstream: Role) -> Result<HandoffDescriptor, HandoffError> {
    let dir = hop_dir(handoff_dir, upstream);
    let rendezvous = dir.join(HANDOFF_RENDEZVOUS_FILE);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(HANDOFF_WAIT_BOUND_MINUTES * 60);

    loop {
        if rendezvous.exists() {
            return read(handoff_dir, upstream);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(HandoffError::Timeout {
                path: rendezvous.display().to_string(),
            });
        }
        tokio::time::sleep(Duration::from_secs(HANDOFF_POLL_INTERVAL_SECS)).await;
    }
}

fn read(handoff_dir: &Path, role: Role) -> Result<HandoffDescriptor, HandoffError> {
    let path = hop_dir(handoff_dir, role).join(HANDOFF_DESCRIPTOR_FILE);
    let body = std::fs::read_to_string(&path).map_err(|source| HandoffError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| HandoffError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamcore::model::HandoffExtended;

    fn descriptor() -> HandoffDescriptor {
        HandoffDescriptor {
            codec: "passthrough".into(),
            program_number: 1,
            video_stream_id: Some("0x100".into()),
            audio_stream_id: Some("0x101".into()),
            extended: HandoffExtended::default(),
        }
    }

    #[test]
    fn publish_then_retract_clears_readiness() {
        let dir = tempfile::tempdir().unwrap();
        publish(dir.path(), Role::Input, &descriptor()).unwrap();
        assert!(is_ready(dir.path(), Role::Input));

        retract(dir.path(), Role::Input);
        assert!(!is_ready(dir.path(), Role::Input));
    }

    #[test]
    fn output_upstream_prefers_transcoder_when_present() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(output_upstream(dir.path()), Role::Input);

        publish(dir.path(), Role::Transcoder, &descriptor()).unwrap();
        assert_eq!(output_upstream(dir.path()), Role::Transcoder);
    }

    #[tokio::test]
    async fn await_upstream_returns_once_published() {
        let dir = tempfile::tempdir().unwrap();
        publish(dir.path(), Role::Input, &descriptor()).unwrap();

        let found = await_upstream(dir.path(), Role::Input).await.unwrap();
        assert_eq!(found, descriptor());
    }
}

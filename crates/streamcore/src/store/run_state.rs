//! Per-channel run-state file store.
//!
//! One JSON file per running channel at `<state-dir>/<channel>.json`. Its
//! existence is the ground truth for "is this channel supposed to be
//! running" (spec invariant): the lifecycle manager writes it on start and
//! every restart, removes it on stop, and the health supervisor treats a
//! missing file as "not running" rather than an error.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::ChannelRunState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read run-state for '{channel}': {source}")]
    Read {
        channel: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write run-state for '{channel}': {source}")]
    Write {
        channel: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove run-state for '{channel}': {source}")]
    Remove {
        channel: String,
        #[source]
        source: std::io::Error,
    },
    #[error("run-state for '{channel}' is corrupt: {source}")]
    Corrupt {
        channel: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads, writes, and removes `ChannelRunState` files under a single
/// directory, one per channel.
#[derive(Debug, Clone)]
pub struct RunStateStore {
    state_dir: PathBuf,
}

impl RunStateStore {
    #[must_use]
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn path_for(&self, channel: &str) -> PathBuf {
        self.state_dir.join(format!("{channel}.json"))
    }

    fn tmp_path_for(&self, channel: &str) -> PathBuf {
        self.state_dir.join(format!("{channel}.json.tmp"))
    }

    /// Returns `None` when the channel has no run-state file, i.e. is not
    /// currently running. Any other I/O failure is surfaced as an error.
    pub fn load(&self, channel: &str) -> Result<Option<ChannelRunState>, StoreError> {
        let path = self.path_for(channel);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let state = serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
                    channel: channel.to_string(),
                    source,
                })?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                channel: channel.to_string(),
                source,
            }),
        }
    }

    /// Lists channels that currently have a run-state file, derived from the
    /// `*.json` files present in the state directory (not from the config
    /// catalog, since a channel can be running that was later removed from
    /// the catalog).
    pub fn running_channels(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.state_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    channel: "<state-dir>".to_string(),
                    source,
                })
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Read {
                channel: "<state-dir>".to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Writes the run-state for `channel`, replacing any existing file
    /// atomically (write to `.tmp`, then rename over the target path).
    pub fn save(&self, channel: &str, state: &ChannelRunState) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.state_dir).map_err(|source| StoreError::Write {
            channel: channel.to_string(),
            source,
        })?;

        let tmp_path = self.tmp_path_for(channel);
        let path = self.path_for(channel);
        let contents = serde_json::to_string_pretty(state).map_err(|source| StoreError::Corrupt {
            channel: channel.to_string(),
            source,
        })?;

        std::fs::write(&tmp_path, contents).map_err(|source| StoreError::Write {
            channel: channel.to_string(),
            source,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|source| StoreError::Write {
            channel: channel.to_string(),
            source,
        })
    }

    /// Removes the run-state file. Idempotent: a missing file is success,
    /// matching the "stop an already-stopped channel" case in the lifecycle
    /// manager.
    pub fn remove(&self, channel: &str) -> Result<(), StoreError> {
        let path = self.path_for(channel);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Remove {
                channel: channel.to_string(),
                source,
            }),
        }
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_state() -> ChannelRunState {
        ChannelRunState {
            source_index: 0,
            input_pid: 111,
            transcoder_pid: Some(222),
            output_pids: BTreeMap::from([(0, 333)]),
            started_at: 1_000,
            last_restart: 1_000,
            failure_count: 0,
        }
    }

    #[test]
    fn load_missing_channel_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStateStore::new(dir.path());
        assert!(store.load("news").unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStateStore::new(dir.path());
        let state = sample_state();
        store.save("news", &state).unwrap();
        let loaded = store.load("news").unwrap().expect("state exists");
        assert_eq!(loaded, state);
    }

    #[test]
    fn save_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStateStore::new(dir.path());
        store.save("news", &sample_state()).unwrap();
        assert!(!store.tmp_path_for("news").exists());
        assert!(store.path_for("news").exists());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStateStore::new(dir.path());
        store.save("news", &sample_state()).unwrap();
        store.remove("news").unwrap();
        assert!(store.load("news").unwrap().is_none());
        // second removal of an already-gone file must still succeed
        store.remove("news").unwrap();
    }

    #[test]
    fn running_channels_lists_json_stems_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStateStore::new(dir.path());
        store.save("news", &sample_state()).unwrap();
        store.save("sports", &sample_state()).unwrap();
        std::fs::write(dir.path().join("scratch.txt"), b"ignored").unwrap();

        let mut channels = store.running_channels().unwrap();
        channels.sort();
        assert_eq!(channels, vec!["news".to_string(), "sports".to_string()]);
    }
}

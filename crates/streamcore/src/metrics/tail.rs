//! Tails per-channel NDJSON metric files written by `pipeline-role`
//! processes into the daemon's in-memory metrics store.
//!
//! There is no IPC between the single-process daemon and its role
//! subprocesses beyond the filesystem, so each role process appends
//! newline-delimited `MetricSample` JSON to
//! `<state-dir>/metrics/<channel>.ndjson` and this task tails the file,
//! remembering a byte offset per channel so it never re-reads a line twice.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use crate::model::MetricSample;
use crate::store::{MetricsStore, RunStateStore};

const POLL_INTERVAL_SECS: u64 = 2;

/// Background task that polls `<state-dir>/metrics/*.ndjson` for new lines
/// and folds them into the metrics store.
pub struct MetricsTail {
    metrics_dir: PathBuf,
    store: Arc<MetricsStore>,
    run_state: Arc<RunStateStore>,
    offsets: Mutex<HashMap<String, u64>>,
}

impl MetricsTail {
    #[must_use]
    pub fn new(metrics_dir: impl Into<PathBuf>, store: Arc<MetricsStore>, run_state: Arc<RunStateStore>) -> Self {
        Self {
            metrics_dir: metrics_dir.into(),
            store,
            run_state,
            offsets: Mutex::new(HashMap::new()),
        }
    }

    /// Runs forever, polling every `POLL_INTERVAL_SECS`.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.poll_once();
        }
    }

    fn poll_once(&self) {
        let Ok(channels) = self.run_state.running_channels() else {
            return;
        };
        for channel in channels {
            if let Err(e) = self.tail_channel(&channel) {
                warn!(channel, error = %e, "failed to tail channel metrics file");
            }
        }
    }

    fn tail_channel(&self, channel: &str) -> std::io::Result<()> {
        let path = self.path_for(channel);
        let Ok(mut file) = std::fs::File::open(&path) else {
            return Ok(());
        };

        let mut offsets = self.offsets.lock();
        let offset = *offsets.get(channel).unwrap_or(&0);
        let len = file.metadata()?.len();
        if len < offset {
            // File was truncated/rotated; start over from the top.
            offsets.insert(channel.to_string(), 0);
            drop(offsets);
            return self.tail_channel(channel);
        }
        if len == offset {
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        offsets.insert(channel.to_string(), len);
        drop(offsets);

        for line in buf.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MetricSample>(line) {
                Ok(sample) => self.store.insert(sample),
                Err(e) => warn!(channel, error = %e, "skipping malformed metric sample line"),
            }
        }
        Ok(())
    }

    fn path_for(&self, channel: &str) -> PathBuf {
        self.metrics_dir.join(format!("{channel}.ndjson"))
    }
}

/// Directory pipeline-role processes append their NDJSON metrics files to,
/// given the daemon's state directory.
#[must_use]
pub fn metrics_dir_under(state_dir: &Path) -> PathBuf {
    state_dir.join("metrics")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricValue;
    use std::collections::BTreeMap;
    use std::io::Write;

    fn sample_line(ts: u64, value: f64) -> String {
        let sample = MetricSample {
            timestamp: ts,
            stat_type: "input".to_string(),
            channel: "news".to_string(),
            payload: BTreeMap::from([("bitrate".to_string(), MetricValue::Number(value))]),
        };
        format!("{}\n", serde_json::to_string(&sample).unwrap())
    }

    #[test]
    fn tails_new_lines_only() {
        let dir = tempfile::tempdir().unwrap();
        let metrics_dir = dir.path().join("metrics");
        std::fs::create_dir_all(&metrics_dir).unwrap();
        let state_dir = dir.path().join("state");
        let run_state = Arc::new(RunStateStore::new(&state_dir));
        run_state
            .save(
                "news",
                &crate::model::ChannelRunState {
                    source_index: 0,
                    input_pid: 1,
                    transcoder_pid: None,
                    output_pids: BTreeMap::new(),
                    started_at: 0,
                    last_restart: 0,
                    failure_count: 0,
                },
            )
            .unwrap();

        let store = Arc::new(MetricsStore::new());
        let tail = MetricsTail::new(&metrics_dir, store.clone(), run_state);

        let path = metrics_dir.join("news.ndjson");
        std::fs::write(&path, sample_line(0, 1.0)).unwrap();
        tail.poll_once();
        assert_eq!(store.live("news", "input").len(), 1);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(sample_line(1, 2.0).as_bytes()).unwrap();
        tail.poll_once();
        assert_eq!(store.live("news", "input").len(), 2);
    }
}

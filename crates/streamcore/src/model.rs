//! Shared data model: run-state, handoff descriptors, and metric samples.
//!
//! These are the records that cross the lifecycle/health/metrics component
//! boundaries and get persisted to disk, so they stay free of any
//! component-specific behavior.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type ChannelId = String;

/// Persisted once per running channel at `<state-dir>/<channel>.json`.
///
/// Existence of this file is the ground truth for "is this channel running".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRunState {
    pub source_index: usize,
    pub input_pid: u32,
    pub transcoder_pid: Option<u32>,
    pub output_pids: BTreeMap<usize, u32>,
    /// Unix seconds of the current run's first start. Distinct from
    /// `last_restart`, which moves on every in-place restart.
    pub started_at: u64,
    pub last_restart: u64,
    pub failure_count: u32,
}

impl ChannelRunState {
    #[must_use]
    pub fn uptime_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.started_at)
    }
}

/// One descriptor per stream component at each pipeline hop, written by the
/// upstream role process once it reaches steady state and read-only
/// afterwards by the downstream role process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffDescriptor {
    pub codec: String,
    pub program_number: u32,
    pub video_stream_id: Option<String>,
    pub audio_stream_id: Option<String>,
    pub extended: HandoffExtended,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandoffExtended {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub framerate: Option<f64>,
    pub color_primaries: Option<String>,
    pub pts_offset: Option<i64>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A single observation at a point in time, tagged by the kind of stat it
/// carries (`"system"`, `"input"`, `"transcoder"`, `"output"`, ...) and the
/// channel it belongs to (`"_host"` for host-wide system metrics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: u64,
    pub stat_type: String,
    pub channel: String,
    pub payload: BTreeMap<String, MetricValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_relative_to_started_at_not_last_restart() {
        let state = ChannelRunState {
            source_index: 0,
            input_pid: 100,
            transcoder_pid: None,
            output_pids: BTreeMap::new(),
            started_at: 1000,
            last_restart: 1500,
            failure_count: 2,
        };
        assert_eq!(state.uptime_secs(1600), 600);
    }
}

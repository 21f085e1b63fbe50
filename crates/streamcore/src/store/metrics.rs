//! Two-tier in-memory metrics time-series store.
//!
//! One `SeriesState` per `(channel, stat_type)` key, guarded independently so
//! concurrent inserts for different channels never contend with each other.

use std::collections::{BTreeMap, VecDeque};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::model::{MetricSample, MetricValue};

const LIVE_WINDOW_SECS: u64 = 300;
const AGGREGATE_PERIOD_SECS: u64 = 300;
const DEFAULT_RETENTION_SECS: u64 = 3 * 3600;
const SYSTEM_RETENTION_SECS: u64 = 24 * 3600;
const SYSTEM_STAT_TYPE: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    channel: String,
    stat_type: String,
}

#[derive(Debug, Default)]
struct SeriesState {
    live: VecDeque<MetricSample>,
    historic: VecDeque<MetricSample>,
    last_aggregated_at: Option<u64>,
}

/// Live (5-minute window) + historic (bucketed-average) metrics store,
/// keyed by `(channel, stat_type)`.
#[derive(Debug, Default)]
pub struct MetricsStore {
    series: DashMap<SeriesKey, Mutex<SeriesState>>,
}

impl MetricsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn retention_for(stat_type: &str) -> u64 {
        if stat_type == SYSTEM_STAT_TYPE {
            SYSTEM_RETENTION_SECS
        } else {
            DEFAULT_RETENTION_SECS
        }
    }

    /// Inserts a fresh sample into the live window, trims entries older than
    /// 300s, and, if an aggregation boundary has passed, appends a
    /// time-bucketed average to the historic tier.
    pub fn insert(&self, sample: MetricSample) {
        let key = SeriesKey {
            channel: sample.channel.clone(),
            stat_type: sample.stat_type.clone(),
        };
        let entry = self.series.entry(key).or_default();
        let mut state = entry.lock();

        let now = sample.timestamp;
        state.live.push_back(sample);
        trim_older_than(&mut state.live, now, LIVE_WINDOW_SECS);

        let due = match state.last_aggregated_at {
            None => {
                // First sample for this series starts the aggregation clock
                // but doesn't itself trigger an aggregate — we wait for a
                // full period to elapse before the first bucket average.
                state.last_aggregated_at = Some(now);
                false
            }
            Some(last) => now.saturating_sub(last) >= AGGREGATE_PERIOD_SECS,
        };
        if due && !state.live.is_empty() {
            let stat_type = state.live.back().unwrap().stat_type.clone();
            let channel = state.live.back().unwrap().channel.clone();
            let aggregate = aggregate_samples(&state.live, now, &stat_type, &channel);
            state.historic.push_back(aggregate);
            let retention = Self::retention_for(&stat_type);
            trim_older_than(&mut state.historic, now, retention);
            state.last_aggregated_at = Some(now);
        }
    }

    /// Returns a snapshot of the live window for `(channel, stat_type)`.
    #[must_use]
    pub fn live(&self, channel: &str, stat_type: &str) -> Vec<MetricSample> {
        let key = SeriesKey {
            channel: channel.to_string(),
            stat_type: stat_type.to_string(),
        };
        self.series
            .get(&key)
            .map(|entry| entry.lock().live.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns a snapshot of the historic (aggregated) tier for
    /// `(channel, stat_type)`.
    #[must_use]
    pub fn historic(&self, channel: &str, stat_type: &str) -> Vec<MetricSample> {
        let key = SeriesKey {
            channel: channel.to_string(),
            stat_type: stat_type.to_string(),
        };
        self.series
            .get(&key)
            .map(|entry| entry.lock().historic.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every stat type currently tracked for `channel`, in no particular
    /// order. Backs the `<name>`-only metrics endpoints, which aggregate
    /// across whatever stat types that channel's roles have reported.
    #[must_use]
    pub fn stat_types_for(&self, channel: &str) -> Vec<String> {
        self.series
            .iter()
            .filter(|entry| entry.key().channel == channel)
            .map(|entry| entry.key().stat_type.clone())
            .collect()
    }

    /// Live-tier samples across every stat type reported for `channel`.
    #[must_use]
    pub fn live_all(&self, channel: &str) -> Vec<MetricSample> {
        self.stat_types_for(channel).iter().flat_map(|stat_type| self.live(channel, stat_type)).collect()
    }

    /// Historic-tier samples across every stat type reported for `channel`.
    #[must_use]
    pub fn historic_all(&self, channel: &str) -> Vec<MetricSample> {
        self.stat_types_for(channel).iter().flat_map(|stat_type| self.historic(channel, stat_type)).collect()
    }
}

fn trim_older_than(series: &mut VecDeque<MetricSample>, now: u64, max_age_secs: u64) {
    while let Some(front) = series.front() {
        if now.saturating_sub(front.timestamp) > max_age_secs {
            series.pop_front();
        } else {
            break;
        }
    }
}

/// Arithmetic mean of each numeric field across `samples`. Non-numeric
/// fields are dropped, matching the documented aggregation rule.
fn aggregate_samples(samples: &VecDeque<MetricSample>, timestamp: u64, stat_type: &str, channel: &str) -> MetricSample {
    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for sample in samples {
        for (field, value) in &sample.payload {
            if let Some(n) = value.as_f64() {
                *sums.entry(field.clone()).or_insert(0.0) += n;
                *counts.entry(field.clone()).or_insert(0) += 1;
            }
        }
    }

    let payload = sums
        .into_iter()
        .map(|(field, sum)| {
            let count = counts[&field] as f64;
            (field, MetricValue::Number(sum / count))
        })
        .collect();

    MetricSample {
        timestamp,
        stat_type: stat_type.to_string(),
        channel: channel.to_string(),
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(channel: &str, stat_type: &str, ts: u64, value: f64) -> MetricSample {
        MetricSample {
            timestamp: ts,
            stat_type: stat_type.to_string(),
            channel: channel.to_string(),
            payload: BTreeMap::from([("bitrate".to_string(), MetricValue::Number(value))]),
        }
    }

    #[test]
    fn live_window_drops_entries_older_than_300s() {
        let store = MetricsStore::new();
        store.insert(sample("news", "input", 0, 1.0));
        store.insert(sample("news", "input", 301, 2.0));
        let live = store.live("news", "input");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].timestamp, 301);
    }

    #[test]
    fn aggregation_fires_every_300s_and_averages_numeric_fields() {
        let store = MetricsStore::new();
        store.insert(sample("news", "input", 0, 10.0));
        store.insert(sample("news", "input", 100, 20.0));
        assert!(store.historic("news", "input").is_empty(), "no aggregation before 300s");

        store.insert(sample("news", "input", 300, 30.0));
        let historic = store.historic("news", "input");
        assert_eq!(historic.len(), 1);
        let avg = historic[0].payload["bitrate"].as_f64().unwrap();
        assert!((avg - 20.0).abs() < 1e-9, "expected mean of 10/20/30 = 20, got {avg}");
    }

    #[test]
    fn non_numeric_fields_are_dropped_from_aggregate() {
        let store = MetricsStore::new();
        let mut s = sample("news", "input", 0, 10.0);
        s.payload.insert("state".to_string(), MetricValue::Text("ok".to_string()));
        store.insert(s);
        store.insert(sample("news", "input", 300, 20.0));

        let historic = store.historic("news", "input");
        assert_eq!(historic.len(), 1);
        assert!(!historic[0].payload.contains_key("state"));
    }

    #[test]
    fn system_stat_type_gets_extended_retention() {
        let store = MetricsStore::new();
        store.insert(sample("_host", "system", 0, 1.0));
        store.insert(sample("_host", "system", 300, 2.0)); // first aggregate, timestamp 300
        // elapsed since the first aggregate exceeds the default 3h retention
        // but is still within the system 24h retention.
        store.insert(sample("_host", "system", 300 + 11_000, 3.0));
        let historic = store.historic("_host", "system");
        assert_eq!(historic.len(), 2, "first aggregate must survive under system retention");
        assert_eq!(historic[0].timestamp, 300);
    }

    #[test]
    fn channels_are_independent() {
        let store = MetricsStore::new();
        store.insert(sample("news", "input", 0, 1.0));
        store.insert(sample("sports", "input", 0, 2.0));
        assert_eq!(store.live("news", "input").len(), 1);
        assert_eq!(store.live("sports", "input").len(), 1);
    }

    #[test]
    fn live_all_spans_every_stat_type_for_a_channel() {
        let store = MetricsStore::new();
        store.insert(sample("news", "input", 0, 1.0));
        store.insert(sample("news", "output", 0, 2.0));
        store.insert(sample("sports", "input", 0, 3.0));
        assert_eq!(store.live_all("news").len(), 2);
        assert_eq!(store.live_all("sports").len(), 1);
    }
}

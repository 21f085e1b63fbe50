//! Host metrics sampling: CPU/memory/disk/NIC, inserted into the metrics
//! store every `HOST_METRICS_SAMPLE_INTERVAL_SECS` tagged as
//! `stat_type = "system"`, `channel = "_host"`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Disks, Networks, System};
use tracing::debug;

use crate::lifecycle::LifecycleManager;
use crate::model::{MetricSample, MetricValue};
use crate::protocol_constants::{HOST_METRICS_SAMPLE_INTERVAL_SECS, SYSTEM_CHANNEL, SYSTEM_STAT_TYPE};
use crate::store::MetricsStore;
use crate::utils::now_secs;

/// Periodically samples host-wide resource usage into the metrics store.
pub struct MetricsCollector {
    store: Arc<MetricsStore>,
    lifecycle: Arc<LifecycleManager>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new(store: Arc<MetricsStore>, lifecycle: Arc<LifecycleManager>) -> Self {
        Self { store, lifecycle }
    }

    /// Runs forever, sampling every `HOST_METRICS_SAMPLE_INTERVAL_SECS`.
    /// Intended to be spawned as a background task.
    pub async fn run(&self) {
        let mut system = System::new_all();
        let mut networks = Networks::new_with_refreshed_list();
        let mut interval = tokio::time::interval(Duration::from_secs(HOST_METRICS_SAMPLE_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            system.refresh_cpu_usage();
            system.refresh_memory();
            networks.refresh(true);
            let disks = Disks::new_with_refreshed_list();

            let sample = Self::build_sample(&system, &networks, &disks, self.declared_and_running_counts());
            self.store.insert(sample);
        }
    }

    fn declared_and_running_counts(&self) -> (usize, usize) {
        match self.lifecycle.list() {
            Ok(listing) => {
                let declared = listing.len();
                let running = listing.values().filter(|c| c.running).count();
                (declared, running)
            }
            Err(_) => (0, 0),
        }
    }

    fn build_sample(system: &System, networks: &Networks, disks: &Disks, (declared, running): (usize, usize)) -> MetricSample {
        let mut payload = BTreeMap::new();

        let cpu_pct = system.global_cpu_usage() as f64;
        payload.insert("cpu_pct".to_string(), MetricValue::Number(cpu_pct));

        let total_mem = system.total_memory().max(1) as f64;
        let used_mem = system.used_memory() as f64;
        payload.insert("mem_pct".to_string(), MetricValue::Number(100.0 * used_mem / total_mem));
        payload.insert("mem_used_bytes".to_string(), MetricValue::Number(used_mem));

        let (disk_total, disk_avail) = disks.list().iter().fold((0u64, 0u64), |(t, a), d| (t + d.total_space(), a + d.available_space()));
        if disk_total > 0 {
            let used_pct = 100.0 * (1.0 - disk_avail as f64 / disk_total as f64);
            payload.insert("disk_pct".to_string(), MetricValue::Number(used_pct));
        }

        let (rx, tx) = networks.iter().fold((0u64, 0u64), |(rx, tx), (_, data)| (rx + data.received(), tx + data.transmitted()));
        payload.insert("net_rx_bytes".to_string(), MetricValue::Number(rx as f64));
        payload.insert("net_tx_bytes".to_string(), MetricValue::Number(tx as f64));

        payload.insert("channels_declared".to_string(), MetricValue::Number(declared as f64));
        payload.insert("channels_running".to_string(), MetricValue::Number(running as f64));

        debug!(cpu_pct, "sampled host metrics");

        MetricSample {
            timestamp: now_secs(),
            stat_type: SYSTEM_STAT_TYPE.to_string(),
            channel: SYSTEM_CHANNEL.to_string(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_sample_carries_channel_counts() {
        let system = System::new_all();
        let networks = Networks::new_with_refreshed_list();
        let disks = Disks::new_with_refreshed_list();
        let sample = MetricsCollector::build_sample(&system, &networks, &disks, (3, 2));
        assert_eq!(sample.channel, SYSTEM_CHANNEL);
        assert_eq!(sample.stat_type, SYSTEM_STAT_TYPE);
        assert_eq!(sample.payload["channels_declared"].as_f64(), Some(3.0));
        assert_eq!(sample.payload["channels_running"].as_f64(), Some(2.0));
    }
}

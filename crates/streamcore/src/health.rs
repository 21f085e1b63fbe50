//! Health & Failover Supervisor: polls run-state, classifies failures, and
//! drives bounded-retry restarts with exponential backoff and priority-based
//! input failover (spec.md §4.4).
//!
//! Runs as two background tasks of the same process as the Lifecycle
//! Manager's HTTP API: the tick loop below (authoritative restart driver)
//! and [`reachability_sweep`], a lower-frequency task that may promote a
//! channel back to a higher-priority input once it becomes reachable again.
//! Folding the original's second scheduler into this same authoritative
//! loop is a deliberate decision — see `DESIGN.md`.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::config::ConfigCatalog;
use crate::lifecycle::LifecycleManager;
use crate::protocol_constants::{
    BACKOFF_MAX_SECS, BACKOFF_MIN_SECS, HEALTH_CHECK_INTERVAL_SECS, MAX_FAILURE_COUNT, PROCESS_START_WAIT_SECS,
    REACHABILITY_SWEEP_INTERVAL_SECS,
};
use crate::store::RunStateStore;
use crate::utils::now_secs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Healthy,
    PartialFailure,
    CompleteFailure,
}

/// Background tick loop that owns restart decisions for every channel.
pub struct HealthSupervisor {
    catalog: Arc<ConfigCatalog>,
    run_state: Arc<RunStateStore>,
    lifecycle: Arc<LifecycleManager>,
    check_interval: Duration,
}

impl HealthSupervisor {
    #[must_use]
    pub fn new(catalog: Arc<ConfigCatalog>, run_state: Arc<RunStateStore>, lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            catalog,
            run_state,
            lifecycle,
            check_interval: Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS),
        }
    }

    /// Runs forever. Intended to be spawned as a background task via
    /// [`crate::runtime::TaskSpawner`].
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        let running = match self.run_state.running_channels() {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "failed to rescan run-state directory");
                return;
            }
        };

        for channel in running {
            self.check_channel(&channel).await;
        }
    }

    async fn check_channel(&self, channel: &str) {
        let Ok(Some(mut state)) = self.run_state.load(channel) else {
            return;
        };

        let classification = classify(&state);
        match classification {
            Classification::Healthy => {
                if state.failure_count > 0 {
                    state.failure_count = 0;
                    let _ = self.run_state.save(channel, &state);
                }
            }
            Classification::CompleteFailure => self.handle_complete_failure(channel, &mut state).await,
            Classification::PartialFailure => self.handle_partial_failure(channel, &state).await,
        }
    }

    async fn handle_complete_failure(&self, channel: &str, state: &mut crate::model::ChannelRunState) {
        state.failure_count = if state.failure_count + 1 >= MAX_FAILURE_COUNT { 0 } else { state.failure_count + 1 };
        let _ = self.run_state.save(channel, state);

        let backoff = draw_backoff(state.failure_count);
        info!(channel, failure_count = state.failure_count, backoff_secs = backoff.as_secs(), "complete failure, backing off before restart");
        tokio::time::sleep(backoff).await;

        let chosen_index = self.best_input_index(channel).unwrap_or(state.source_index);
        let before_pids = (state.input_pid, state.transcoder_pid, state.output_pids.clone());

        if let Err(e) = self.lifecycle.restart(channel, chosen_index).await {
            warn!(channel, error = %e, "restart after complete failure did not complete");
            return;
        }

        tokio::time::sleep(Duration::from_secs(PROCESS_START_WAIT_SECS)).await;
        match self.run_state.load(channel) {
            Ok(Some(after)) => {
                let changed = (after.input_pid, after.transcoder_pid, after.output_pids.clone()) != before_pids;
                info!(channel, changed, "restart quality check after complete failure");
            }
            _ => warn!(channel, "no run-state present after restart; channel may still be starting"),
        }
    }

    async fn handle_partial_failure(&self, channel: &str, state: &crate::model::ChannelRunState) {
        info!(channel, "partial failure (output missing), restarting whole channel");
        if let Err(e) = self.lifecycle.restart(channel, state.source_index).await {
            warn!(channel, error = %e, "restart after partial failure did not complete");
        }
    }

    /// Highest-priority input, ties broken by lowest index.
    fn best_input_index(&self, channel: &str) -> Option<usize> {
        let spec = self.catalog.channel(channel).ok()?;
        spec.inputs
            .iter()
            .enumerate()
            .max_by_key(|(index, input)| (input.priority, std::cmp::Reverse(*index)))
            .map(|(index, _)| index)
    }
}

fn classify(state: &crate::model::ChannelRunState) -> Classification {
    let input_alive = pid_alive(state.input_pid);
    let transcoder_alive = state.transcoder_pid.is_none_or(pid_alive);

    if !input_alive || !transcoder_alive {
        return Classification::CompleteFailure;
    }
    if state.output_pids.values().any(|pid| !pid_alive(*pid)) {
        return Classification::PartialFailure;
    }
    Classification::Healthy
}

/// Uniform draw from `[MIN_BACKOFF, min(MAX_BACKOFF, MIN_BACKOFF * 2^n)]`.
/// Jitter is mandatory to avoid synchronized restart storms across channels.
fn draw_backoff(failure_count: u32) -> Duration {
    let ceiling = BACKOFF_MIN_SECS.saturating_mul(1u64 << failure_count.min(6)).min(BACKOFF_MAX_SECS);
    let ceiling = ceiling.max(BACKOFF_MIN_SECS);
    let secs = rand::thread_rng().gen_range(BACKOFF_MIN_SECS..=ceiling);
    Duration::from_secs(secs)
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // `kill` treats negative/zero pids as group/broadcast targets, not a
    // single-process probe, so anything that doesn't fit a real pid_t is
    // reported dead rather than handed to libc.
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs no action beyond existence/permission check.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    false
}

/// Lower-frequency background task: probes candidate input URIs and may
/// promote a running channel to a higher-priority input that has come back.
/// Optional per spec.md §4.4; gated by `DaemonSettings::reachability_sweep_enabled`.
pub async fn reachability_sweep(catalog: Arc<ConfigCatalog>, run_state: Arc<RunStateStore>, lifecycle: Arc<LifecycleManager>) {
    let mut interval = tokio::time::interval(Duration::from_secs(REACHABILITY_SWEEP_INTERVAL_SECS));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Ok(channels) = run_state.running_channels() else {
            continue;
        };
        for channel in channels {
            sweep_channel(&catalog, &run_state, &lifecycle, &channel).await;
        }
    }
}

async fn sweep_channel(catalog: &ConfigCatalog, run_state: &RunStateStore, lifecycle: &LifecycleManager, channel: &str) {
    let Ok(spec) = catalog.channel(channel) else {
        return;
    };
    let Ok(Some(state)) = run_state.load(channel) else {
        return;
    };

    let best = spec
        .inputs
        .iter()
        .enumerate()
        .max_by_key(|(index, input)| (input.priority, std::cmp::Reverse(*index)))
        .map(|(index, _)| index);

    if let Some(best_index) = best {
        if best_index != state.source_index && probe_reachable(&spec.inputs[best_index].uri).await {
            info!(channel, from = state.source_index, to = best_index, "promoting to higher-priority input");
            if let Err(e) = lifecycle.restart(channel, best_index).await {
                warn!(channel, error = %e, "promotion restart failed");
            }
        }
    }
}

/// Out-of-band reachability probe for a candidate input URI. Actual stream
/// probing is outside this crate's scope (media-framework boundary); this
/// stands in for `POST /probe`'s underlying check.
async fn probe_reachable(_uri: &str) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn state(input_pid: u32, transcoder_pid: Option<u32>, output_pids: BTreeMap<usize, u32>) -> crate::model::ChannelRunState {
        crate::model::ChannelRunState {
            source_index: 0,
            input_pid,
            transcoder_pid,
            output_pids,
            started_at: 0,
            last_restart: 0,
            failure_count: 0,
        }
    }

    /// Stays in pid_t's positive range (unlike `u32::MAX`, which casts to
    /// -1 and makes `kill` broadcast to the caller's whole process group
    /// instead of probing a single pid), while sitting far above any real
    /// pid_max.
    const DEAD_PID: u32 = i32::MAX as u32;

    #[test]
    fn missing_input_is_complete_failure() {
        let s = state(DEAD_PID, None, BTreeMap::new());
        assert_eq!(classify(&s), Classification::CompleteFailure);
    }

    #[test]
    fn missing_output_with_healthy_input_is_partial_failure() {
        let s = state(std::process::id(), None, BTreeMap::from([(0, DEAD_PID)]));
        assert_eq!(classify(&s), Classification::PartialFailure);
    }

    #[test]
    fn all_alive_is_healthy() {
        let s = state(std::process::id(), None, BTreeMap::new());
        assert_eq!(classify(&s), Classification::Healthy);
    }

    #[test]
    fn backoff_respects_bounds_and_grows_with_failure_count() {
        for n in 0..10 {
            let d = draw_backoff(n);
            assert!(d.as_secs() >= BACKOFF_MIN_SECS);
            assert!(d.as_secs() <= BACKOFF_MAX_SECS);
        }
    }
}

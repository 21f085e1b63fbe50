//! Fixed constants for the control-plane protocol.
//!
//! These are the numbers pinned down explicitly — tick intervals, backoff
//! bounds, watchdog windows, retention — collected here so there is one
//! place to look when auditing timing behavior.

// ─────────────────────────────────────────────────────────────────────────────
// Health & Failover Supervisor
// ─────────────────────────────────────────────────────────────────────────────

/// Default interval between health-check ticks (seconds).
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 5;

/// Default interval between source-reachability sweeps (seconds).
pub const REACHABILITY_SWEEP_INTERVAL_SECS: u64 = 30;

/// Lower bound of the exponential backoff schedule (seconds).
pub const BACKOFF_MIN_SECS: u64 = 5;

/// Upper bound of the exponential backoff schedule (seconds).
pub const BACKOFF_MAX_SECS: u64 = 30;

/// Failure count at which the backoff schedule wraps back to the start
/// (the cycle is "retry forever with a backoff ceiling", not give up).
pub const MAX_FAILURE_COUNT: u32 = 5;

/// Bounded wait after issuing a failover restart before verifying the new
/// PIDs took hold (seconds).
pub const PROCESS_START_WAIT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline Process Watchdog
// ─────────────────────────────────────────────────────────────────────────────

/// Grace period after construction before the steady-state watchdog timeout
/// applies (seconds). Gives the pipeline room to reach first-frame without
/// tripping the tighter steady-state window.
pub const WATCHDOG_SETTLING_DELAY_SECS: u64 = 10;

/// Initial (pre-settling) no-progress timeout (seconds).
pub const WATCHDOG_INITIAL_TIMEOUT_SECS: u64 = 30;

/// Steady-state no-progress timeout once past the settling delay (seconds).
pub const WATCHDOG_STEADY_STATE_TIMEOUT_SECS: u64 = 8;

/// Per-role bound on in-process reconstruction attempts before surfacing a
/// fatal condition to the outer supervisor by exiting.
pub const MAX_RECONSTRUCT_ATTEMPTS_INPUT: u32 = 30;
pub const MAX_RECONSTRUCT_ATTEMPTS_TRANSCODER: u32 = 20;
pub const MAX_RECONSTRUCT_ATTEMPTS_OUTPUT: u32 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Process Supervision (start/stop escalation)
// ─────────────────────────────────────────────────────────────────────────────

/// Time to wait after a graceful-stop signal before escalating (seconds).
pub const GRACEFUL_STOP_TIMEOUT_SECS: u64 = 10;

/// Time to wait after SIGTERM before escalating to SIGKILL (seconds).
pub const TERMINATE_TIMEOUT_SECS: u64 = 5;

/// Default polling interval while waiting for a handoff descriptor and
/// rendezvous marker to appear (seconds).
pub const HANDOFF_POLL_INTERVAL_SECS: u64 = 5;

/// Upper bound on how long to wait for a handoff to appear before treating
/// the launch as failed (minutes, converted to seconds at point of use).
pub const HANDOFF_WAIT_BOUND_MINUTES: u64 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Metrics Store
// ─────────────────────────────────────────────────────────────────────────────

/// Live-tier retention window (seconds).
pub const METRICS_LIVE_WINDOW_SECS: u64 = 300;

/// Aggregation cadence: how often the live window is bucketed into the
/// historic tier (seconds).
pub const METRICS_AGGREGATE_PERIOD_SECS: u64 = 300;

/// Default historic-tier retention (hours, converted to seconds).
pub const METRICS_DEFAULT_RETENTION_SECS: u64 = 3 * 3600;

/// Historic-tier retention for host-wide `"system"` metrics (seconds).
pub const METRICS_SYSTEM_RETENTION_SECS: u64 = 24 * 3600;

/// Interval between host (CPU/mem/disk/NIC) metric samples (seconds).
pub const HOST_METRICS_SAMPLE_INTERVAL_SECS: u64 = 5;

/// Stat-type tag used for host-wide (non-channel) metric samples.
pub const SYSTEM_STAT_TYPE: &str = "system";

/// Pseudo-channel name under which host-wide metrics are stored.
pub const SYSTEM_CHANNEL: &str = "_host";

// ─────────────────────────────────────────────────────────────────────────────
// Filesystem Layout
// ─────────────────────────────────────────────────────────────────────────────

/// Extension used for run-state files: `<state-dir>/<channel>.json`.
pub const RUN_STATE_EXTENSION: &str = "json";

/// Name of the handoff descriptor file within a pipeline hop's directory.
pub const HANDOFF_DESCRIPTOR_FILE: &str = "descriptor.json";

/// Name of the shared-memory rendezvous marker file within a pipeline hop's
/// directory. Its presence (not its contents) is the readiness signal.
pub const HANDOFF_RENDEZVOUS_FILE: &str = "rendezvous";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier surfaced by `GET /healthz`.
pub const SERVICE_ID: &str = "streamcore";

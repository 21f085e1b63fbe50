//! Persisted and in-memory state: run-state files and the metrics
//! time-series store.

mod metrics;
mod run_state;

pub use metrics::MetricsStore;
pub use run_state::{RunStateStore, StoreError};

//! Stats & State Store metrics plumbing: host sampling plus tailing of
//! per-channel samples written by `pipeline-role` processes.

mod collector;
mod tail;

pub use collector::MetricsCollector;
pub use tail::{metrics_dir_under, MetricsTail};

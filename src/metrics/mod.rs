//! Generation metrics collection

mod collector;
mod types;

pub use collector::MetricsCollector;
pub use types::MetricsSnapshot;

// Bound on the latency history kept for percentiles
pub(crate) const MAX_METRICS_HISTORY: usize = 1000;

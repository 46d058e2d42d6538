use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::RwLock;

use super::{MetricsSnapshot, MAX_METRICS_HISTORY};

/// Collects per-request generation metrics for one engine
#[derive(Debug, Default)]
pub struct MetricsCollector {
    state: RwLock<MetricsState>,
}

#[derive(Debug, Default)]
struct MetricsState {
    total_requests: usize,
    failed_requests: usize,
    total_tokens: usize,
    total_generation_time: Duration,
    latencies: VecDeque<Duration>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed request
    pub fn record_success(&self, elapsed: Duration, tokens: usize) {
        let mut state = self.state.write();
        state.total_requests += 1;
        state.total_tokens += tokens;
        state.total_generation_time += elapsed;

        state.latencies.push_back(elapsed);
        // Keep history bounded
        if state.latencies.len() > MAX_METRICS_HISTORY {
            state.latencies.pop_front();
        }
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        let mut state = self.state.write();
        state.total_requests += 1;
        state.failed_requests += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.read();
        let latencies: Vec<Duration> = state.latencies.iter().copied().collect();

        MetricsSnapshot::from_measurements(
            state.total_requests,
            state.failed_requests,
            state.total_tokens,
            state.total_generation_time,
            &latencies,
        )
    }
}

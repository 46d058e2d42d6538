use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Point-in-time view of an engine's generation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Requests attempted, failed ones included
    pub total_requests: usize,

    pub failed_requests: usize,

    /// Tokens generated by successful requests
    pub total_tokens: usize,

    /// Time spent inside generation loops
    pub total_generation_time: Duration,

    pub last_generation_time: Option<Duration>,

    pub average_latency: Duration,

    /// 95th percentile over the retained latency history
    pub p95_latency: Duration,

    pub tokens_per_second: f32,

    pub error_rate: f32,
}

impl MetricsSnapshot {
    /// Derive summary statistics from raw measurements
    pub fn from_measurements(
        requests: usize,
        failures: usize,
        tokens: usize,
        total_time: Duration,
        latencies: &[Duration],
    ) -> Self {
        let mut sorted = latencies.to_vec();
        sorted.sort();
        let p95_idx = ((sorted.len() as f32 * 0.95) as usize).min(sorted.len().saturating_sub(1));

        Self {
            total_requests: requests,
            failed_requests: failures,
            total_tokens: tokens,
            total_generation_time: total_time,
            last_generation_time: latencies.last().copied(),
            average_latency: if !latencies.is_empty() {
                let total: Duration = latencies.iter().sum();
                total / latencies.len() as u32
            } else {
                Duration::default()
            },
            p95_latency: sorted.get(p95_idx).copied().unwrap_or_default(),
            tokens_per_second: if !total_time.is_zero() {
                tokens as f32 / total_time.as_secs_f32()
            } else {
                0.0
            },
            error_rate: if requests > 0 {
                failures as f32 / requests as f32
            } else {
                0.0
            },
        }
    }
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self::from_measurements(0, 0, 0, Duration::default(), &[])
    }
}

//! Async admission layer in front of a generation engine

mod queue;

pub use queue::{GenerationQueue, QueueStatsSnapshot, DEFAULT_QUEUE_CAPACITY};

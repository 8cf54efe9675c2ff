//! Logging setup and per-worker counters.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::app::processor::{AckStatus, Processed};
use crate::domain::EntryOutcome;

/// Counters a worker returns when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub delivered: u64,
    /// Exhausted retries (terminal failure handed to the failure handler).
    pub failed: u64,
    pub poisoned: u64,
    pub abandoned: u64,
    pub deferred: u64,
    /// Entries another consumer claimed while this one still held them.
    pub superseded: u64,
    /// Read and ack errors.
    pub store_errors: u64,
}

impl WorkerStats {
    pub fn record(&mut self, processed: &Processed) {
        match processed.outcome {
            EntryOutcome::Delivered { .. } => self.delivered += 1,
            EntryOutcome::Exhausted { .. } => self.failed += 1,
            EntryOutcome::Poisoned { .. } => self.poisoned += 1,
            EntryOutcome::Abandoned { .. } => self.abandoned += 1,
            EntryOutcome::Deferred { .. } => self.deferred += 1,
            EntryOutcome::Superseded { .. } => self.superseded += 1,
        }
        if matches!(processed.ack, AckStatus::Failed(_)) {
            self.store_errors += 1;
        }
    }

    pub fn processed(&self) -> u64 {
        self.delivered + self.failed + self.poisoned
    }

    pub fn merge(&mut self, other: &WorkerStats) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.poisoned += other.poisoned;
        self.abandoned += other.abandoned;
        self.deferred += other.deferred;
        self.superseded += other.superseded;
        self.store_errors += other.store_errors;
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_level` when set. Calling this twice is harmless
/// (the second install is ignored).
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

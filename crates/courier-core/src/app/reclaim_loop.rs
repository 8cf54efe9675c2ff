//! ReclaimLoop - 放置された pending エントリの回収
//!
//! # フロー
//! 1. `interval` ごとに StreamStore::claim_stale() で `min_idle` 以上放置されたエントリを取得
//! 2. reclaimer の identity で所有権を移し、EntryProcessor で処理（decode → retry → ack）
//!
//! ワーカーが停止時に放棄したエントリや、クラッシュしたプロセスが持っていたエントリが対象です。
//! `min_idle` は処理中のエントリを横取りしない長さにします（builder が検証する）。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::processor::EntryProcessor;
use crate::domain::ConsumerId;
use crate::observability::WorkerStats;
use crate::ports::StreamStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimSettings {
    pub interval: Duration,
    pub min_idle: Duration,
    pub batch_size: usize,
}

pub struct ReclaimLoop {
    consumer: ConsumerId,
    store: Arc<dyn StreamStore>,
    processor: Arc<EntryProcessor>,
    settings: ReclaimSettings,
}

impl ReclaimLoop {
    pub fn new(
        consumer: ConsumerId,
        store: Arc<dyn StreamStore>,
        processor: Arc<EntryProcessor>,
        settings: ReclaimSettings,
    ) -> Self {
        Self {
            consumer,
            store,
            processor,
            settings,
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> WorkerStats {
        let mut stats = WorkerStats::default();
        info!(
            consumer = %self.consumer,
            interval_ms = self.settings.interval.as_millis() as u64,
            min_idle_ms = self.settings.min_idle.as_millis() as u64,
            "Reclaim loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
            self.pass(&cancel, &mut stats).await;
        }

        info!(
            consumer = %self.consumer,
            reclaimed = stats.processed(),
            "Reclaim loop stopped"
        );
        stats
    }

    /// 1 回分の回収
    pub async fn pass(&self, cancel: &CancellationToken, stats: &mut WorkerStats) {
        let claimed = match self
            .store
            .claim_stale(
                self.processor.stream(),
                self.processor.group(),
                &self.consumer,
                self.settings.min_idle,
                self.settings.batch_size,
            )
            .await
        {
            Ok(claimed) => claimed,
            Err(err) => {
                stats.store_errors += 1;
                warn!(consumer = %self.consumer, error = %err, "Failed to claim stale entries");
                return;
            }
        };

        if claimed.is_empty() {
            debug!(consumer = %self.consumer, "No stale entries");
            return;
        }
        info!(consumer = %self.consumer, count = claimed.len(), "Reclaimed stale entries");

        for entry in &claimed {
            let processed = self.processor.process(&self.consumer, entry, cancel).await;
            stats.record(&processed);
        }
    }
}

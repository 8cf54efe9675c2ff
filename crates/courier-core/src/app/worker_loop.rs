//! Worker - コンシューマーグループの 1 メンバー
//!
//! # フロー
//! 1. StreamStore::read_group() で新着を待つ（キャンセルと競合させる）
//! 2. バッチ内のエントリを順番に EntryProcessor に渡す
//! 3. ストアエラーはログに出して `store_backoff` 待ってから再試行
//!
//! キャンセルされたら新しい read を始めずに抜け、統計を返します。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::processor::EntryProcessor;
use crate::domain::{ConsumerId, StoreError};
use crate::observability::WorkerStats;
use crate::ports::StreamStore;

/// read ループの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSettings {
    /// 1 回の read で受け取る上限
    pub batch_size: usize,
    /// 新着を待つ上限
    pub block: Duration,
    /// ストアエラー後の待機
    pub store_backoff: Duration,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            batch_size: 1,
            block: Duration::from_secs(5),
            store_backoff: Duration::from_secs(1),
        }
    }
}

pub struct Worker {
    consumer: ConsumerId,
    store: Arc<dyn StreamStore>,
    processor: Arc<EntryProcessor>,
    settings: ReadSettings,
}

impl Worker {
    pub fn new(
        consumer: ConsumerId,
        store: Arc<dyn StreamStore>,
        processor: Arc<EntryProcessor>,
        settings: ReadSettings,
    ) -> Self {
        Self {
            consumer,
            store,
            processor,
            settings,
        }
    }

    pub fn consumer(&self) -> &ConsumerId {
        &self.consumer
    }

    pub async fn run(self, cancel: CancellationToken) -> WorkerStats {
        let mut stats = WorkerStats::default();
        info!(consumer = %self.consumer, "Worker started");

        while !cancel.is_cancelled() {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                read = self.store.read_group(
                    self.processor.stream(),
                    self.processor.group(),
                    &self.consumer,
                    self.settings.batch_size,
                    self.settings.block,
                ) => read,
            };

            let batch = match read {
                Ok(batch) => batch,
                Err(err) => {
                    stats.store_errors += 1;
                    self.log_read_error(&err);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.settings.store_backoff) => continue,
                    }
                }
            };

            if batch.is_empty() {
                continue;
            }
            debug!(consumer = %self.consumer, count = batch.len(), "Received entries");

            for entry in &batch {
                let processed = self.processor.process(&self.consumer, entry, &cancel).await;
                stats.record(&processed);
            }
        }

        info!(
            consumer = %self.consumer,
            delivered = stats.delivered,
            failed = stats.failed,
            poisoned = stats.poisoned,
            abandoned = stats.abandoned,
            deferred = stats.deferred,
            superseded = stats.superseded,
            store_errors = stats.store_errors,
            "Worker stopped"
        );
        stats
    }

    fn log_read_error(&self, err: &StoreError) {
        match err {
            StoreError::GroupMissing { .. } => error!(
                consumer = %self.consumer,
                error = %err,
                "Consumer group disappeared"
            ),
            _ => warn!(
                consumer = %self.consumer,
                kind = ?err.kind(),
                error = %err,
                backoff_ms = self.settings.store_backoff.as_millis() as u64,
                "Failed to read from stream"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::retry::RetryPolicy;
    use crate::app::testing::{RecordingFailureHandler, ScriptedSender, event_payload};
    use crate::domain::{Entry, EntryId, PendingEntry};
    use crate::impls::InMemoryStreamStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const STREAM: &str = "orders";
    const GROUP: &str = "sms";

    fn worker(store: Arc<dyn StreamStore>, sender: Arc<ScriptedSender>) -> Worker {
        let processor = EntryProcessor::new(
            store.clone(),
            sender,
            Arc::new(RecordingFailureHandler::default()),
            RetryPolicy::new(3, Duration::from_millis(10)),
            STREAM,
            GROUP,
        );
        Worker::new(
            ConsumerId::new("w-0"),
            store,
            Arc::new(processor),
            ReadSettings {
                batch_size: 2,
                block: Duration::from_millis(50),
                store_backoff: Duration::from_millis(100),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn processes_entries_until_cancelled() {
        let store = Arc::new(InMemoryStreamStore::new());
        store.ensure_group(STREAM, GROUP).await.unwrap();
        for id in ["A", "B", "C"] {
            store.append(STREAM, &event_payload(id)).await.unwrap();
        }
        let sender = Arc::new(ScriptedSender::always_ok());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker(store.clone(), sender.clone()).run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.delivered, 3);
        assert_eq!(sender.calls(), 3);
        assert!(store.pending(STREAM, GROUP).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_blocked_read() {
        let store = Arc::new(InMemoryStreamStore::new());
        store.ensure_group(STREAM, GROUP).await.unwrap();
        let mut w = worker(store.clone(), Arc::new(ScriptedSender::always_ok()));
        w.settings.block = Duration::from_secs(3600);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(w.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let start = tokio::time::Instant::now();
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(stats, WorkerStats::default());
    }

    /// read_group だけ失敗し続けるストア
    struct FailingStore {
        reads: AtomicU32,
    }

    #[async_trait]
    impl StreamStore for FailingStore {
        async fn ensure_group(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn append(&self, _: &str, _: &[u8]) -> Result<EntryId, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn read_group(
            &self,
            _: &str,
            _: &str,
            _: &ConsumerId,
            _: usize,
            _: Duration,
        ) -> Result<Vec<Entry>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("down".into()))
        }
        async fn ack(&self, _: &str, _: &str, _: EntryId) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn pending(&self, _: &str, _: &str) -> Result<Vec<PendingEntry>, StoreError> {
            Ok(Vec::new())
        }
        async fn claim_stale(
            &self,
            _: &str,
            _: &str,
            _: &ConsumerId,
            _: Duration,
            _: usize,
        ) -> Result<Vec<Entry>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn store_errors_back_off_between_reads() {
        let store = Arc::new(FailingStore {
            reads: AtomicU32::new(0),
        });
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            worker(store.clone(), Arc::new(ScriptedSender::always_ok())).run(cancel.clone()),
        );

        // backoff 100ms → 0, 100, 200 の 3 回
        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
        assert_eq!(stats.store_errors, 3);
    }
}

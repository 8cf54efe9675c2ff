//! WorkerPool - ワーカー群の起動と停止
//!
//! # 停止の流れ
//! 1. `request_shutdown()` で共有の CancellationToken をキャンセル
//! 2. `shutdown()` は全タスクの終了を `shutdown_timeout` まで待つ
//! 3. 期限までに終わらなかったタスクは abort し、`ShutdownOutcome::Forced` を返す
//!
//! abort されたタスクが処理中だったエントリは ack されずに pending に残ります。

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::ConsumerId;
use crate::observability::WorkerStats;

/// 停止の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// 全タスクが期限内に止まった
    Clean { stats: WorkerStats },
    /// 期限切れで abort したタスクがあった
    Forced {
        stopped: Vec<ConsumerId>,
        outstanding: Vec<ConsumerId>,
    },
}

impl ShutdownOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ShutdownOutcome::Clean { .. })
    }
}

/// Worker pool handle.
/// - `request_shutdown()` で全タスクに停止を伝える
/// - `shutdown()` で期限付きで終了を待つ
pub struct WorkerPool {
    cancel: CancellationToken,
    tasks: Vec<(ConsumerId, JoinHandle<WorkerStats>)>,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    pub(crate) fn new(cancel: CancellationToken, shutdown_timeout: Duration) -> Self {
        Self {
            cancel,
            tasks: Vec::new(),
            shutdown_timeout,
        }
    }

    pub(crate) fn push(&mut self, consumer: ConsumerId, task: JoinHandle<WorkerStats>) {
        self.tasks.push((consumer, task));
    }

    pub fn consumers(&self) -> impl Iterator<Item = &ConsumerId> {
        self.tasks.iter().map(|(c, _)| c)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Broadcast cancellation. In-flight sends are not interrupted.
    pub fn request_shutdown(&self) {
        self.cancel.cancel();
    }

    pub async fn shutdown(self) -> ShutdownOutcome {
        self.request_shutdown();
        let deadline = Instant::now() + self.shutdown_timeout;
        info!(
            tasks = self.tasks.len(),
            timeout_ms = self.shutdown_timeout.as_millis() as u64,
            "Shutting down worker pool"
        );

        let mut stats = WorkerStats::default();
        let mut stopped = Vec::with_capacity(self.tasks.len());
        let mut outstanding = Vec::new();

        for (consumer, mut task) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(task_stats)) => {
                    stats.merge(&task_stats);
                    stopped.push(consumer);
                }
                Ok(Err(join_err)) => {
                    warn!(consumer = %consumer, error = %join_err, "Worker task failed");
                    stopped.push(consumer);
                }
                Err(_) => {
                    task.abort();
                    outstanding.push(consumer);
                }
            }
        }

        if outstanding.is_empty() {
            info!(
                delivered = stats.delivered,
                failed = stats.failed,
                poisoned = stats.poisoned,
                abandoned = stats.abandoned,
                "Worker pool stopped cleanly"
            );
            ShutdownOutcome::Clean { stats }
        } else {
            warn!(
                outstanding = ?outstanding.iter().map(ConsumerId::as_str).collect::<Vec<_>>(),
                "Shutdown timed out, aborted outstanding workers"
            );
            ShutdownOutcome::Forced {
                stopped,
                outstanding,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(
        timeout: Duration,
        tasks: Vec<(&str, JoinHandle<WorkerStats>)>,
        cancel: CancellationToken,
    ) -> WorkerPool {
        let mut pool = WorkerPool::new(cancel, timeout);
        for (name, task) in tasks {
            pool.push(ConsumerId::new(name), task);
        }
        pool
    }

    fn cooperative(cancel: &CancellationToken, delivered: u64) -> JoinHandle<WorkerStats> {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            WorkerStats {
                delivered,
                ..Default::default()
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn cooperative_workers_stop_cleanly_and_merge_stats() {
        let cancel = CancellationToken::new();
        let pool = pool_with(
            Duration::from_secs(10),
            vec![("w-0", cooperative(&cancel, 2)), ("w-1", cooperative(&cancel, 3))],
            cancel.clone(),
        );

        let start = Instant::now();
        let outcome = pool.shutdown().await;

        assert!(start.elapsed() < Duration::from_secs(1));
        match outcome {
            ShutdownOutcome::Clean { stats } => assert_eq!(stats.delivered, 5),
            other => panic!("expected clean shutdown, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_worker_forces_shutdown_at_the_deadline() {
        let cancel = CancellationToken::new();
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            WorkerStats::default()
        });
        let pool = pool_with(
            Duration::from_secs(10),
            vec![("w-0", cooperative(&cancel, 1)), ("w-1", stuck)],
            cancel.clone(),
        );

        let start = Instant::now();
        let outcome = pool.shutdown().await;

        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(
            outcome,
            ShutdownOutcome::Forced {
                stopped: vec![ConsumerId::new("w-0")],
                outstanding: vec![ConsumerId::new("w-1")],
            }
        );
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn request_shutdown_cancels_the_shared_token() {
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(cancel.clone(), Duration::from_secs(1));
        let token = pool.cancel_token();
        pool.request_shutdown();
        assert!(token.is_cancelled());
        assert!(pool.shutdown().await.is_clean());
    }
}

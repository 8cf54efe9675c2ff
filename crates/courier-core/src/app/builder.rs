//! AppBuilder - ワーカープールの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::pool::WorkerPool;
use super::processor::EntryProcessor;
use super::reclaim_loop::{ReclaimLoop, ReclaimSettings};
use super::retry::RetryPolicy;
use super::worker_loop::{ReadSettings, Worker};
use crate::domain::{ConsumerId, CourierError};
use crate::impls::LogAndDrop;
use crate::ports::{FailureHandler, NotificationSender, StreamStore};

/// プールの設定（config から組み立てる）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub stream: String,
    pub group: String,
    /// ワーカー名は `<prefix>-<index>`、reclaimer は `<prefix>-reclaimer`
    pub consumer_prefix: String,
    pub workers: usize,
    pub read: ReadSettings,
    pub retry: RetryPolicy,
    pub shutdown_timeout: Duration,
    pub reclaim: Option<ReclaimSettings>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            stream: "order_events".to_string(),
            group: "sms_notification_cg".to_string(),
            consumer_prefix: "sms_sender".to_string(),
            workers: 2,
            read: ReadSettings::default(),
            retry: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(10),
            reclaim: None,
        }
    }
}

/// AppBuilder はワーカープールを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(settings)
///     .store(store)
///     .sender(sender)
///     .failure_handler(dlq)
///     .build()?;
/// let pool = app.start().await?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に依存と設定を検証
/// - start() 時に consumer group を作成し、失敗したらワーカーを起動しない
pub struct AppBuilder {
    settings: PoolSettings,
    store: Option<Arc<dyn StreamStore>>,
    sender: Option<Arc<dyn NotificationSender>>,
    failure_handler: Arc<dyn FailureHandler>,
}

/// BuildError はプール構築時のエラー
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("no stream store configured")]
    MissingStore,

    #[error("no notification sender configured")]
    MissingSender,

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("read batch size must be at least 1")]
    ZeroBatch,

    #[error("retry max_attempts must be at least 1")]
    ZeroAttempts,

    /// 1 回の read で受け取ったバッチは順番に処理されるので、最後のエントリは
    /// `batch_size × total_delay` の間 pending に置かれる
    #[error(
        "reclaim min_idle ({min_idle:?}) must exceed read batch size times the total retry delay \
         ({batch_window:?}), otherwise entries a worker still holds would be claimed"
    )]
    ReclaimTooEager {
        min_idle: Duration,
        batch_window: Duration,
    },
}

impl AppBuilder {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            store: None,
            sender: None,
            failure_handler: Arc::new(LogAndDrop),
        }
    }

    pub fn store(mut self, store: Arc<dyn StreamStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// 既定は LogAndDrop
    pub fn failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.failure_handler = handler;
        self
    }

    /// 依存と設定を検証して App を生成
    pub fn build(self) -> Result<App, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let sender = self.sender.ok_or(BuildError::MissingSender)?;
        let settings = self.settings;

        if settings.workers == 0 {
            return Err(BuildError::NoWorkers);
        }
        if settings.read.batch_size == 0 {
            return Err(BuildError::ZeroBatch);
        }
        if settings.retry.max_attempts == 0 {
            return Err(BuildError::ZeroAttempts);
        }
        if let Some(reclaim) = &settings.reclaim {
            let batch_window = settings
                .retry
                .total_delay()
                .saturating_mul(u32::try_from(settings.read.batch_size).unwrap_or(u32::MAX));
            if reclaim.min_idle <= batch_window {
                return Err(BuildError::ReclaimTooEager {
                    min_idle: reclaim.min_idle,
                    batch_window,
                });
            }
        }

        let processor = Arc::new(EntryProcessor::new(
            store.clone(),
            sender,
            self.failure_handler,
            settings.retry.clone(),
            settings.stream.clone(),
            settings.group.clone(),
        ));
        Ok(App {
            settings,
            store,
            processor,
        })
    }
}

/// App は検証済みのプール構成
pub struct App {
    settings: PoolSettings,
    store: Arc<dyn StreamStore>,
    processor: Arc<EntryProcessor>,
}

impl App {
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// consumer group を用意してからワーカーを起動
    pub async fn start(self) -> Result<WorkerPool, CourierError> {
        let settings = self.settings;
        self.store
            .ensure_group(&settings.stream, &settings.group)
            .await
            .map_err(CourierError::Startup)?;

        let cancel = CancellationToken::new();
        let mut pool = WorkerPool::new(cancel.clone(), settings.shutdown_timeout);

        for index in 0..settings.workers {
            let consumer = ConsumerId::for_worker(&settings.consumer_prefix, index);
            let worker = Worker::new(
                consumer.clone(),
                self.store.clone(),
                self.processor.clone(),
                settings.read.clone(),
            );
            pool.push(consumer, tokio::spawn(worker.run(cancel.clone())));
        }

        if let Some(reclaim) = settings.reclaim.clone() {
            let consumer = ConsumerId::reclaimer(&settings.consumer_prefix);
            let reclaimer = ReclaimLoop::new(
                consumer.clone(),
                self.store.clone(),
                self.processor.clone(),
                reclaim,
            );
            pool.push(consumer, tokio::spawn(reclaimer.run(cancel.clone())));
        }

        info!(
            stream = %settings.stream,
            group = %settings.group,
            workers = settings.workers,
            reclaim = settings.reclaim.is_some(),
            "Worker pool started"
        );
        Ok(pool)
    }
}

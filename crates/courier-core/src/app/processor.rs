//! EntryProcessor - 1 エントリを終端まで運ぶ
//!
//! # フロー
//! 1. キャンセル済みなら何もしない（Abandoned, pending のまま）
//! 2. decode。失敗したら FailureHandler::on_poison → ack（リトライしない）
//! 3. NotificationSender::send を RetryPolicy に従って試行
//!    - 各試行の前に、エントリがまだ自分の pending にあるか確認する
//!    - 別の consumer に付け替えられていたら Superseded（ack しない）
//!    - 成功 → ack
//!    - 上限到達 → FailureHandler::on_exhausted → ack
//!    - backoff 中にキャンセル → Abandoned（ack しない）
//! 4. FailureHandler が失敗したら Deferred（ack しない）
//!
//! ワーカーと reclaim ループの両方がこの処理を使います。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::retry::{RetryPolicy, RetryState};
use crate::codec;
use crate::domain::{ConsumerId, Entry, EntryOutcome, NotificationEvent, StoreError};
use crate::ports::{FailureHandler, NotificationSender, StreamStore};

/// ack の結果
#[derive(Debug)]
pub enum AckStatus {
    Acked,
    /// 既に pending に無かった
    AlreadyAcked,
    /// outcome が ack を求めなかった
    Skipped,
    Failed(StoreError),
}

/// 1 エントリの処理結果
#[derive(Debug)]
pub struct Processed {
    pub outcome: EntryOutcome,
    pub ack: AckStatus,
}

/// send の試行結果
enum Delivery {
    Delivered,
    Exhausted,
    Cancelled,
    Superseded,
}

pub struct EntryProcessor {
    store: Arc<dyn StreamStore>,
    sender: Arc<dyn NotificationSender>,
    failure_handler: Arc<dyn FailureHandler>,
    retry: RetryPolicy,
    stream: String,
    group: String,
}

impl EntryProcessor {
    pub fn new(
        store: Arc<dyn StreamStore>,
        sender: Arc<dyn NotificationSender>,
        failure_handler: Arc<dyn FailureHandler>,
        retry: RetryPolicy,
        stream: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sender,
            failure_handler,
            retry,
            stream: stream.into(),
            group: group.into(),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub async fn process(
        &self,
        consumer: &ConsumerId,
        entry: &Entry,
        cancel: &CancellationToken,
    ) -> Processed {
        let outcome = self.run_to_outcome(consumer, entry, cancel).await;
        let ack = if outcome.should_ack() {
            self.ack(entry).await
        } else {
            AckStatus::Skipped
        };

        match &outcome {
            EntryOutcome::Delivered { attempts } => info!(
                consumer = %consumer,
                entry_id = %entry.id(),
                attempts,
                "Notification delivered"
            ),
            EntryOutcome::Abandoned { attempts } => info!(
                consumer = %consumer,
                entry_id = %entry.id(),
                attempts,
                "Entry abandoned on shutdown, left pending"
            ),
            EntryOutcome::Deferred { error } => error!(
                consumer = %consumer,
                entry_id = %entry.id(),
                error = %error,
                "Could not record terminal failure, left pending"
            ),
            EntryOutcome::Superseded { attempts } => warn!(
                consumer = %consumer,
                entry_id = %entry.id(),
                attempts,
                "Entry was claimed by another consumer, leaving it to the new owner"
            ),
            _ => debug!(
                consumer = %consumer,
                entry_id = %entry.id(),
                outcome = outcome.label(),
                "Entry finished"
            ),
        }
        Processed { outcome, ack }
    }

    async fn run_to_outcome(
        &self,
        consumer: &ConsumerId,
        entry: &Entry,
        cancel: &CancellationToken,
    ) -> EntryOutcome {
        if cancel.is_cancelled() {
            return EntryOutcome::Abandoned { attempts: 0 };
        }

        let event = match codec::decode(entry.payload()) {
            Ok(event) => event,
            Err(err) => {
                return match self.failure_handler.on_poison(entry, &err).await {
                    Ok(()) => EntryOutcome::Poisoned {
                        error: err.to_string(),
                    },
                    Err(e) => EntryOutcome::Deferred {
                        error: e.to_string(),
                    },
                };
            }
        };

        let (delivery, retry) = self
            .deliver_with_retry(consumer, entry, &event, cancel)
            .await;
        match delivery {
            Delivery::Delivered => EntryOutcome::Delivered {
                attempts: retry.attempt(),
            },
            Delivery::Cancelled => EntryOutcome::Abandoned {
                attempts: retry.attempt(),
            },
            Delivery::Superseded => EntryOutcome::Superseded {
                attempts: retry.attempt(),
            },
            Delivery::Exhausted => {
                match self.failure_handler.on_exhausted(entry, &event, &retry).await {
                    Ok(()) => EntryOutcome::Exhausted {
                        attempts: retry.attempt(),
                        last_error: retry
                            .last_error()
                            .map(ToString::to_string)
                            .unwrap_or_default(),
                    },
                    Err(e) => EntryOutcome::Deferred {
                        error: e.to_string(),
                    },
                }
            }
        }
    }

    /// 送信を最大 `max_attempts` 回試す
    ///
    /// 試行中の send 自体は中断しない。キャンセルは backoff の待機中に観測し、
    /// 観測後に新しい試行は始めない。
    async fn deliver_with_retry(
        &self,
        consumer: &ConsumerId,
        entry: &Entry,
        event: &NotificationEvent,
        cancel: &CancellationToken,
    ) -> (Delivery, RetryState) {
        let mut state = RetryState::new();
        loop {
            if !self.still_owned(consumer, entry).await {
                return (Delivery::Superseded, state);
            }
            state.start_attempt();
            match self.sender.send(event).await {
                Ok(()) => return (Delivery::Delivered, state),
                Err(err) => {
                    warn!(
                        entry_id = %entry.id(),
                        order_id = %event.order_id,
                        attempt = state.attempt(),
                        max_attempts = self.retry.max_attempts,
                        kind = ?err.kind(),
                        error = %err,
                        "Notification send failed"
                    );
                    state.record_failure(err);
                }
            }

            if state.is_exhausted(&self.retry) {
                return (Delivery::Exhausted, state);
            }

            let delay = self.retry.next_delay(state.attempt());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return (Delivery::Cancelled, state),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// reclaim で付け替えられていないか
    ///
    /// 確認自体に失敗した場合は試行を続ける（at-least-once）。
    async fn still_owned(&self, consumer: &ConsumerId, entry: &Entry) -> bool {
        match self
            .store
            .pending_owner(&self.stream, &self.group, entry.id())
            .await
        {
            Ok(Some(owner)) => owner == *consumer,
            Ok(None) => false,
            Err(e) => {
                warn!(
                    consumer = %consumer,
                    entry_id = %entry.id(),
                    error = %e,
                    "Failed to check entry ownership, attempting anyway"
                );
                true
            }
        }
    }

    async fn ack(&self, entry: &Entry) -> AckStatus {
        match self.store.ack(&self.stream, &self.group, entry.id()).await {
            Ok(true) => AckStatus::Acked,
            Ok(false) => {
                debug!(entry_id = %entry.id(), "Entry was already acknowledged");
                AckStatus::AlreadyAcked
            }
            Err(e) => {
                warn!(entry_id = %entry.id(), error = %e, "Failed to acknowledge entry");
                AckStatus::Failed(e)
            }
        }
    }
}

//! 終端失敗ハンドラの実装
//!
//! - **LogAndDrop**: ログに残して捨てる（デフォルト）
//! - **DeadLetterStream**: dead-letter 用のストリームに JSON レコードを追記する

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::app::retry::RetryState;
use crate::domain::{CREATED_AT_FORMAT, CodecError, Entry, EntryId, NotificationEvent, StoreError};
use crate::ports::{Clock, FailureHandler, StreamStore};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogAndDrop;

#[async_trait]
impl FailureHandler for LogAndDrop {
    async fn on_poison(&self, entry: &Entry, err: &CodecError) -> Result<(), StoreError> {
        warn!(
            entry_id = %entry.id(),
            payload_len = entry.payload().len(),
            error = %err,
            "Dropping undecodable entry"
        );
        Ok(())
    }

    async fn on_exhausted(
        &self,
        entry: &Entry,
        event: &NotificationEvent,
        retry: &RetryState,
    ) -> Result<(), StoreError> {
        error!(
            entry_id = %entry.id(),
            order_id = %event.order_id,
            attempts = retry.attempt(),
            last_error = ?retry.last_error(),
            "Dropping notification after exhausting retries"
        );
        Ok(())
    }
}

/// dead-letter ストリームに追記するレコード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub entry_id: EntryId,
    pub reason: DeadLetterReason,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// 元の payload（UTF-8 でなければ lossy 変換）
    pub payload: String,
    pub failed_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    Poison,
    Exhausted,
}

pub struct DeadLetterStream {
    store: Arc<dyn StreamStore>,
    stream: String,
    clock: Arc<dyn Clock>,
}

impl DeadLetterStream {
    pub fn new(store: Arc<dyn StreamStore>, stream: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            stream: stream.into(),
            clock,
        }
    }

    async fn record(&self, letter: DeadLetter) -> Result<(), StoreError> {
        let payload = serde_json::to_vec(&letter)
            .map_err(|e| StoreError::Command(format!("dead letter serialization: {e}")))?;
        let id = self.store.append(&self.stream, &payload).await?;
        info!(
            dlq_id = %id,
            original_id = %letter.entry_id,
            reason = ?letter.reason,
            attempts = letter.attempts,
            "Entry moved to dead-letter stream"
        );
        Ok(())
    }

    fn failed_at(&self) -> String {
        self.clock.now().format(CREATED_AT_FORMAT).to_string()
    }
}

#[async_trait]
impl FailureHandler for DeadLetterStream {
    async fn on_poison(&self, entry: &Entry, err: &CodecError) -> Result<(), StoreError> {
        self.record(DeadLetter {
            entry_id: entry.id(),
            reason: DeadLetterReason::Poison,
            attempts: 0,
            last_error: Some(err.to_string()),
            payload: String::from_utf8_lossy(entry.payload()).into_owned(),
            failed_at: self.failed_at(),
        })
        .await
    }

    async fn on_exhausted(
        &self,
        entry: &Entry,
        _event: &NotificationEvent,
        retry: &RetryState,
    ) -> Result<(), StoreError> {
        self.record(DeadLetter {
            entry_id: entry.id(),
            reason: DeadLetterReason::Exhausted,
            attempts: retry.attempt(),
            last_error: retry.last_error().map(ToString::to_string),
            payload: String::from_utf8_lossy(entry.payload()).into_owned(),
            failed_at: self.failed_at(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::domain::SendError;
    use crate::impls::InMemoryStreamStore;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    fn event() -> NotificationEvent {
        NotificationEvent {
            kind: "marketing_sms".into(),
            order_id: "ORDER_009".into(),
            recipient_phone: "13800138000".into(),
            message: "hi".into(),
            created_at: "2024-01-01 00:00:00".into(),
        }
    }

    fn handler(store: Arc<InMemoryStreamStore>) -> DeadLetterStream {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap());
        DeadLetterStream::new(store, "orders:dlq", Arc::new(clock))
    }

    #[tokio::test]
    async fn exhausted_entries_are_recorded_with_retry_state() {
        let store = Arc::new(InMemoryStreamStore::new());
        let dlq = handler(store.clone());
        let payload = codec::encode(&event()).unwrap();
        let entry = Entry::new(EntryId::new(10, 0), payload.clone());

        let mut retry = RetryState::new();
        for _ in 0..2 {
            retry.start_attempt();
            retry.record_failure(SendError::Transient("gateway timeout".into()));
        }
        dlq.on_exhausted(&entry, &event(), &retry).await.unwrap();

        let letters = store.entries("orders:dlq").await;
        assert_eq!(letters.len(), 1);
        let letter: DeadLetter = serde_json::from_slice(letters[0].payload()).unwrap();
        assert_eq!(letter.entry_id, EntryId::new(10, 0));
        assert_eq!(letter.reason, DeadLetterReason::Exhausted);
        assert_eq!(letter.attempts, 2);
        assert!(letter.last_error.unwrap().contains("gateway timeout"));
        assert_eq!(letter.payload.as_bytes(), payload.as_slice());
        assert_eq!(letter.failed_at, "2024-05-01 08:30:00");
    }

    #[tokio::test]
    async fn poison_entries_keep_their_raw_payload() {
        let store = Arc::new(InMemoryStreamStore::new());
        let dlq = handler(store.clone());
        let entry = Entry::new(EntryId::new(11, 0), b"{not json".to_vec());
        let err = codec::decode(entry.payload()).unwrap_err();

        dlq.on_poison(&entry, &err).await.unwrap();

        let letters = store.entries("orders:dlq").await;
        let letter: DeadLetter = serde_json::from_slice(letters[0].payload()).unwrap();
        assert_eq!(letter.reason, DeadLetterReason::Poison);
        assert_eq!(letter.attempts, 0);
        assert_eq!(letter.payload, "{not json");
    }

    #[tokio::test]
    async fn log_and_drop_always_succeeds() {
        let entry = Entry::new(EntryId::new(1, 0), b"x".to_vec());
        let err = codec::decode(b"x").unwrap_err();
        assert!(LogAndDrop.on_poison(&entry, &err).await.is_ok());
        assert!(
            LogAndDrop
                .on_exhausted(&entry, &event(), &RetryState::new())
                .await
                .is_ok()
        );
    }
}

//! テスト用の sender / failure handler

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::app::retry::RetryState;
use crate::codec;
use crate::domain::{
    CodecError, Entry, EntryId, MARKETING_SMS, NotificationEvent, SendError, StoreError,
};
use crate::ports::{FailureHandler, NotificationSender};

pub fn event(order_id: &str) -> NotificationEvent {
    NotificationEvent {
        kind: MARKETING_SMS.to_string(),
        order_id: order_id.to_string(),
        recipient_phone: "13800138001".to_string(),
        message: format!("order {order_id}"),
        created_at: "2024-01-01 12:00:00".to_string(),
    }
}

pub fn event_payload(order_id: &str) -> Vec<u8> {
    codec::encode(&event(order_id)).unwrap()
}

/// 最初の `failures` 回だけ失敗する sender
pub struct ScriptedSender {
    failures: u32,
    calls: AtomicU32,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedSender {
    pub fn failing_first(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn always_ok() -> Self {
        Self::failing_first(0)
    }

    pub fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// 連続する呼び出しの間隔
    pub fn gaps(&self) -> Vec<Duration> {
        let times = self.call_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl NotificationSender for ScriptedSender {
    async fn send(&self, event: &NotificationEvent) -> Result<(), SendError> {
        self.call_times.lock().unwrap().push(Instant::now());
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err(SendError::Transient(format!("{} attempt {n}", event.order_id)))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct RecordingFailureHandler {
    poisoned: Mutex<Vec<EntryId>>,
    exhausted: Mutex<Vec<EntryId>>,
    error: Mutex<Option<StoreError>>,
}

impl RecordingFailureHandler {
    pub fn fail_with(&self, err: StoreError) {
        *self.error.lock().unwrap() = Some(err);
    }

    pub fn poisoned(&self) -> Vec<EntryId> {
        self.poisoned.lock().unwrap().clone()
    }

    pub fn exhausted(&self) -> Vec<EntryId> {
        self.exhausted.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        match self.error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FailureHandler for RecordingFailureHandler {
    async fn on_poison(&self, entry: &Entry, _error: &CodecError) -> Result<(), StoreError> {
        self.check()?;
        self.poisoned.lock().unwrap().push(entry.id());
        Ok(())
    }

    async fn on_exhausted(
        &self,
        entry: &Entry,
        _event: &NotificationEvent,
        _retry: &RetryState,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.exhausted.lock().unwrap().push(entry.id());
        Ok(())
    }
}

//! LogSender - 送信内容をログに出すだけの NotificationSender
//!
//! SMS プロバイダの API 呼び出しの代わりに使います。

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::domain::{NotificationEvent, SendError};
use crate::ports::NotificationSender;

pub struct LogSender {
    /// 送信にかかる時間の模擬
    latency: Duration,
}

impl LogSender {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(100),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for LogSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, event: &NotificationEvent) -> Result<(), SendError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        info!(
            order_id = %event.order_id,
            recipient = %event.recipient_phone,
            kind = %event.kind,
            created_at = %event.created_at,
            message = %event.message,
            "SMS sent"
        );
        Ok(())
    }
}

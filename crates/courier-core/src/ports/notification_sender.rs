//! NotificationSender port - 通知の送信先（SMS プロバイダなど）
//!
//! 信頼できない外部依存として扱います。冪等性は仮定しません。

use async_trait::async_trait;

use crate::domain::{NotificationEvent, SendError};

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> Result<(), SendError>;
}

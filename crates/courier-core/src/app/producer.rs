//! Producer - 注文確定時に通知イベントをストリームへ追記

use std::sync::Arc;

use tracing::info;

use crate::codec;
use crate::domain::{
    CREATED_AT_FORMAT, EntryId, MARKETING_SMS, NotificationEvent, Order, ProducerError,
};
use crate::ports::{Clock, PhoneDirectory, StreamStore};

pub struct Producer {
    store: Arc<dyn StreamStore>,
    directory: Arc<dyn PhoneDirectory>,
    clock: Arc<dyn Clock>,
    stream: String,
}

impl Producer {
    pub fn new(
        store: Arc<dyn StreamStore>,
        directory: Arc<dyn PhoneDirectory>,
        clock: Arc<dyn Clock>,
        stream: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            stream: stream.into(),
        }
    }

    /// 注文からイベントを組み立ててストリームに追記する
    ///
    /// リトライはしない。encode / append の失敗はそのまま返す。
    pub async fn place_and_notify(&self, order: &Order) -> Result<EntryId, ProducerError> {
        let event = self.build_event(order).await;
        let payload = codec::encode(&event)?;
        let id = self.store.append(&self.stream, &payload).await?;
        info!(
            entry_id = %id,
            order_id = %order.id,
            stream = %self.stream,
            "Notification event appended"
        );
        Ok(id)
    }

    pub async fn build_event(&self, order: &Order) -> NotificationEvent {
        NotificationEvent {
            kind: MARKETING_SMS.to_string(),
            order_id: order.id.clone(),
            recipient_phone: self.directory.lookup(&order.user_id).await,
            message: compose_message(order),
            created_at: self.clock.now().format(CREATED_AT_FORMAT).to_string(),
        }
    }
}

pub fn compose_message(order: &Order) -> String {
    format!(
        "Dear {}, thank you for your purchase! Your order for {} has been placed, amount {:.2}. \
         More offers are waiting for you, welcome back!",
        order.user_name, order.product, order.total_amount
    )
}

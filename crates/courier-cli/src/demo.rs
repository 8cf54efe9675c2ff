//! デモ用の注文フローと、確率的に失敗する sender

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tracing::{error, info};
use ulid::Ulid;

use courier_core::app::Producer;
use courier_core::domain::{CREATED_AT_FORMAT, NotificationEvent, Order, SendError};
use courier_core::ports::NotificationSender;

/// 内側の sender の前に、`failure_rate` の確率で一時エラーを返す
pub struct FlakySender<S> {
    inner: S,
    failure_rate: f64,
}

impl<S> FlakySender<S> {
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self {
            inner,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl<S: NotificationSender> NotificationSender for FlakySender<S> {
    async fn send(&self, event: &NotificationEvent) -> Result<(), SendError> {
        let fail = rand::thread_rng().gen_bool(self.failure_rate);
        if fail {
            return Err(SendError::Transient(format!(
                "simulated gateway timeout for {}",
                event.order_id
            )));
        }
        self.inner.send(event).await
    }
}

fn sample_orders() -> Vec<Order> {
    let created_at = Utc::now().format(CREATED_AT_FORMAT).to_string();
    [
        ("user001", "Zhang San", 299.99, "iPhone 15"),
        ("user002", "Li Si", 199.50, "iPad Air"),
        ("user003", "Wang Wu", 89.00, "AirPods Pro"),
    ]
    .into_iter()
    .map(|(user_id, user_name, total_amount, product)| Order {
        id: format!("ORDER_{}", Ulid::new()),
        user_id: user_id.to_string(),
        user_name: user_name.to_string(),
        total_amount,
        product: product.to_string(),
        created_at: created_at.clone(),
    })
    .collect()
}

/// サンプル注文を 1 秒間隔で投入する
///
/// シャットダウン時は呼び出し側が abort する。
pub async fn run_order_flow(producer: Arc<Producer>) {
    for order in sample_orders() {
        info!(order_id = %order.id, user_id = %order.user_id, "Placing demo order");
        if let Err(e) = producer.place_and_notify(&order).await {
            error!(order_id = %order.id, error = %e, "Failed to publish notification event");
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

//! Order - 注文確定のドメインイベント

use serde::{Deserialize, Serialize};

/// 確定済みの注文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub total_amount: f64,
    pub product: String,
    pub created_at: String,
}

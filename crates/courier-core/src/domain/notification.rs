//! NotificationEvent - ストリームに流す通知イベント
//!
//! Producer が Order から決定的に組み立て、Codec で payload に変換されます。
//! フィールドはすべて文字列で、wire 上でそのまま往復します。

use serde::{Deserialize, Serialize};

/// 注文由来のマーケティング SMS
pub const MARKETING_SMS: &str = "marketing_sms";

/// `created_at` の書式（UTC）
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub order_id: String,
    pub recipient_phone: String,
    pub message: String,
    pub created_at: String,
}

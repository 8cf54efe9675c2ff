//! PayloadCodec - NotificationEvent とエントリ payload の相互変換
//!
//! payload は JSON（UTF-8）。Redis 実装ではこのバイト列がそのまま `data` フィールドに入ります。
//!
//! decode は純粋関数です。失敗したエントリは poison として扱われ、リトライされません
//! （壊れたデータはリトライしても直らない）。

use crate::domain::{CodecError, NotificationEvent};

/// NotificationEvent を payload に変換
pub fn encode(event: &NotificationEvent) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(event).map_err(CodecError::Encode)
}

/// payload を NotificationEvent に復元
///
/// 未知のフィールドは無視し、欠けたフィールドはエラーにします。
pub fn decode(payload: &[u8]) -> Result<NotificationEvent, CodecError> {
    serde_json::from_slice(payload).map_err(CodecError::Decode)
}

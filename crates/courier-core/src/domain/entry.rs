//! Entry - ストリームに追記された不変レコード
//!
//! Entry は append でのみ生成され、変更も削除もされません。
//! ストアが列を所有し、consumer には clone を貸し出します。

use std::time::Duration;

use super::ids::{ConsumerId, EntryId};

/// ストリーム上の 1 レコード（id + 不透明な payload）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    id: EntryId,
    payload: Vec<u8>,
}

impl Entry {
    pub fn new(id: EntryId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// pending set の読み取りモデル
///
/// 配送済みだが未 ack のエントリについて、誰が持っているか・どれだけ放置されているかを表します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: EntryId,
    pub consumer: ConsumerId,
    /// 最後の配送からの経過時間
    pub idle: Duration,
    /// 配送回数（reclaim されるたびに増える）
    pub delivery_count: u64,
}

//! StreamStore port - 追記専用ログ + consumer group
//!
//! # 実装
//! - **InMemoryStreamStore**: 開発・テスト用
//! - **RedisStreamStore**: 本番用（Redis Streams）
//!
//! # 設計原則
//! - append は consumer を待たない
//! - read_group は未配送のエントリだけを返し、呼び出した consumer の pending に入れる
//! - 同じ group の別 consumer が同じエントリを受け取ることはない
//! - ack は冪等（未知の id でもエラーにしない）
//! - I/O エラーは握りつぶさずに返す。バックオフは呼び出し側の責任

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ConsumerId, Entry, EntryId, PendingEntry, StoreError};

#[async_trait]
pub trait StreamStore: Send + Sync {
    /// group を「これから追記されるエントリのみ」の位置で作成する（ストリームがなければ作る）
    ///
    /// 既に存在する場合は何もしない。
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StoreError>;

    /// payload を追記して新しい id を返す
    async fn append(&self, stream: &str, payload: &[u8]) -> Result<EntryId, StoreError>;

    /// 未配送のエントリを最大 `max_count` 件、id 順に受け取る
    ///
    /// 受け取ったエントリは `consumer` の pending になる。
    /// 何もなければ最大 `block` だけ待ち、空の Vec を返す（エラーではない）。
    /// `block` が `Duration::ZERO` なら待たない。
    ///
    /// 待機中に future を drop してもエントリは失われない。
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &ConsumerId,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<Entry>, StoreError>;

    /// pending から取り除く。実際に取り除いた場合は true
    async fn ack(&self, stream: &str, group: &str, id: EntryId) -> Result<bool, StoreError>;

    /// group の pending set を id 順に返す
    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>, StoreError>;

    /// pending に入っているエントリの現在の所有者。pending に無ければ None
    ///
    /// 既定実装は `pending()` を走査する。
    async fn pending_owner(
        &self,
        stream: &str,
        group: &str,
        id: EntryId,
    ) -> Result<Option<ConsumerId>, StoreError> {
        let pending = self.pending(stream, group).await?;
        Ok(pending.into_iter().find(|p| p.id == id).map(|p| p.consumer))
    }

    /// `min_idle` 以上放置された pending を `consumer` に付け替えて返す
    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &ConsumerId,
        min_idle: Duration,
        max_count: usize,
    ) -> Result<Vec<Entry>, StoreError>;
}

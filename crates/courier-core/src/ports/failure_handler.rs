//! FailureHandler port - 終端失敗の扱い
//!
//! decode 不能（poison）と試行上限到達（exhausted）のエントリをどう記録するかを差し替え可能にします。
//! ワーカーは handler が `Ok` を返したあとでのみ ack します。
//!
//! # 実装
//! - **LogAndDrop**: ログだけ出して捨てる（デフォルト）
//! - **DeadLetterStream**: 別ストリームに追記する

use async_trait::async_trait;

use crate::app::retry::RetryState;
use crate::domain::{CodecError, Entry, NotificationEvent, StoreError};

#[async_trait]
pub trait FailureHandler: Send + Sync {
    async fn on_poison(&self, entry: &Entry, error: &CodecError) -> Result<(), StoreError>;

    async fn on_exhausted(
        &self,
        entry: &Entry,
        event: &NotificationEvent,
        retry: &RetryState,
    ) -> Result<(), StoreError>;
}

//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: ワーカープールの構築とワイヤリング
//! - **Producer**: 注文 → 通知イベントの追記
//! - **EntryProcessor**: 1 エントリの decode → retry → ack
//! - **Worker**: read_group ループ
//! - **ReclaimLoop**: 放置された pending の回収
//! - **WorkerPool**: 起動と期限付き停止

pub mod builder;
pub mod os_signals;
pub mod pool;
pub mod processor;
pub mod producer;
pub mod reclaim_loop;
pub mod retry;
pub mod worker_loop;

#[cfg(test)]
pub(crate) mod testing;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError, PoolSettings};
pub use self::os_signals::wait_for_shutdown_signal;
pub use self::pool::{ShutdownOutcome, WorkerPool};
pub use self::processor::{AckStatus, EntryProcessor, Processed};
pub use self::producer::{Producer, compose_message};
pub use self::reclaim_loop::{ReclaimLoop, ReclaimSettings};
pub use self::retry::{RetryPolicy, RetryState};
pub use self::worker_loop::{ReadSettings, Worker};

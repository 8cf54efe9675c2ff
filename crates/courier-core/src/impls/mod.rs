//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryStreamStore**: 開発・テスト用のストリームストア
//! - **RedisStreamStore**: 本番用のストリームストア（Redis Streams）
//! - **StaticPhoneDirectory**: 固定テーブルの電話番号解決
//! - **LogSender**: ログに出すだけの通知送信
//! - **LogAndDrop / DeadLetterStream**: 終端失敗ハンドラ

pub mod failure;
pub mod inmem_stream;
pub mod log_sender;
pub mod phone_directory;
pub mod redis_stream;

// 主要な型を再エクスポート
pub use self::failure::{DeadLetter, DeadLetterReason, DeadLetterStream, LogAndDrop};
pub use self::inmem_stream::InMemoryStreamStore;
pub use self::log_sender::LogSender;
pub use self::phone_directory::{DEFAULT_PHONE, StaticPhoneDirectory};
pub use self::redis_stream::RedisStreamStore;

//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（Redis、SMS プロバイダ、ユーザー DB）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod failure_handler;
pub mod notification_sender;
pub mod phone_directory;
pub mod stream_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::failure_handler::FailureHandler;
pub use self::notification_sender::NotificationSender;
pub use self::phone_directory::PhoneDirectory;
pub use self::stream_store::StreamStore;

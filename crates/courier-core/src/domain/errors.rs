//! Errors - エラー型と分類
//!
//! 各エラーは [`ErrorKind`] で運用上の分類を返します。
//! ワーカーループはこの分類をログに出すだけで、リトライ判断には使いません
//! （送信失敗は種類を問わず上限回数までリトライする）。

use thiserror::Error;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: インフラエラー（ストリームストアの障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// ストリームストアのエラー
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// 接続断・I/O エラー・タイムアウト
    #[error("stream store unavailable: {0}")]
    Unavailable(String),

    #[error("consumer group {group:?} does not exist on stream {stream:?}")]
    GroupMissing { stream: String, group: String },

    /// サーバーがコマンドを拒否した
    #[error("stream store command failed: {0}")]
    Command(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unavailable(_) => ErrorKind::Infrastructure,
            StoreError::GroupMissing { .. } => ErrorKind::Permanent,
            StoreError::Command(_) => ErrorKind::Infrastructure,
        }
    }
}

/// エントリ payload の encode / decode エラー
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode notification event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode notification event: {0}")]
    Decode(#[source] serde_json::Error),
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Permanent
    }
}

/// 通知送信のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("notification send failed: {0}")]
    Transient(String),

    #[error("notification rejected by provider: {0}")]
    Rejected(String),
}

impl SendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SendError::Transient(_) => ErrorKind::Transient,
            SendError::Rejected(_) => ErrorKind::Permanent,
        }
    }
}

/// 注文確定 → 通知イベント投入のエラー
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error(transparent)]
    Encode(#[from] CodecError),

    #[error("failed to append notification event: {0}")]
    Store(#[from] StoreError),
}

/// 設定ファイルのエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// CLI まで伝播するトップレベルのエラー
#[derive(Debug, Error)]
pub enum CourierError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] crate::app::BuildError),

    /// consumer group を作れないなど、プールを起動できない
    #[error("failed to start worker pool: {0}")]
    Startup(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_classified() {
        assert_eq!(
            StoreError::Unavailable("connection refused".into()).kind(),
            ErrorKind::Infrastructure
        );
        let missing = StoreError::GroupMissing {
            stream: "s".into(),
            group: "g".into(),
        };
        assert_eq!(missing.kind(), ErrorKind::Permanent);
        assert!(missing.to_string().contains("\"g\""));
    }

    #[test]
    fn send_errors_are_classified() {
        assert_eq!(SendError::Transient("503".into()).kind(), ErrorKind::Transient);
        assert_eq!(SendError::Rejected("bad number".into()).kind(), ErrorKind::Permanent);
    }

    #[test]
    fn producer_error_wraps_store_error() {
        let err: ProducerError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(err, ProducerError::Store(StoreError::Unavailable(_))));
        assert!(err.to_string().contains("down"));
    }
}

//! Domain identifiers.
//!
//! # EntryId
//! ストリーム内のエントリ ID。Redis Streams と同じ `"<ms>-<seq>"` 形式で表現します。
//!
//! - `(ms, seq)` の辞書順で全順序
//! - 同一ストリーム内では append ごとに厳密に増加
//! - `FromStr` / `Display` は相互に往復可能
//!
//! # ConsumerId
//! consumer group 内でワーカーを識別する静的なラベル。
//! 起動時に `"<prefix>-<index>"` として割り当てます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ストリームエントリの ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntryId {
    ms: u64,
    seq: u64,
}

impl EntryId {
    /// 最小の ID（"0-0"）。group の初期 cursor に使う
    pub const ZERO: EntryId = EntryId { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    pub fn ms(&self) -> u64 {
        self.ms
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// `last` より厳密に大きい ID を `now_ms` から作る
    ///
    /// 時刻が進んでいなければ（時計の巻き戻りを含む）、`last.ms` のまま seq を進めます。
    pub fn next_after(last: EntryId, now_ms: u64) -> EntryId {
        if now_ms > last.ms {
            EntryId::new(now_ms, 0)
        } else {
            EntryId::new(last.ms, last.seq + 1)
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entry id: {0:?}")]
pub struct ParseEntryIdError(String);

impl FromStr for EntryId {
    type Err = ParseEntryIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseEntryIdError(s.to_string());
        let (ms, seq) = s.split_once('-').ok_or_else(err)?;
        let ms = ms.parse::<u64>().map_err(|_| err())?;
        let seq = seq.parse::<u64>().map_err(|_| err())?;
        Ok(EntryId::new(ms, seq))
    }
}

impl Serialize for EntryId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// consumer group 内のワーカー識別子
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerId(String);

impl ConsumerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// プール内 `index` 番目のワーカー用の ID
    pub fn for_worker(prefix: &str, index: usize) -> Self {
        Self(format!("{prefix}-{index}"))
    }

    /// reclaim ループ用の ID
    pub fn reclaimer(prefix: &str) -> Self {
        Self(format!("{prefix}-reclaimer"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

//! Outcome - 1 エントリの処理結果
//!
//! ワーカーは各エントリについて必ずいずれかの終端に到達します。
//!
//! | outcome     | ack するか | 備考                                   |
//! |-------------|-----------|----------------------------------------|
//! | Delivered   | する      | 何回目の試行で成功したか               |
//! | Poisoned    | する      | decode 不能。リトライしない            |
//! | Exhausted   | する      | 試行上限に到達。failure handler に渡す |
//! | Abandoned   | しない    | キャンセル観測。pending のまま残す     |
//! | Deferred    | しない    | 終端失敗を記録できなかった             |
//! | Superseded  | しない    | 別の consumer に付け替えられていた     |

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    Delivered { attempts: u32 },
    Poisoned { error: String },
    Exhausted { attempts: u32, last_error: String },
    Abandoned { attempts: u32 },
    Deferred { error: String },
    Superseded { attempts: u32 },
}

impl EntryOutcome {
    /// この結果のあとにエントリを ack すべきか
    pub fn should_ack(&self) -> bool {
        !matches!(
            self,
            EntryOutcome::Abandoned { .. }
                | EntryOutcome::Deferred { .. }
                | EntryOutcome::Superseded { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntryOutcome::Delivered { .. } => "delivered",
            EntryOutcome::Poisoned { .. } => "poisoned",
            EntryOutcome::Exhausted { .. } => "exhausted",
            EntryOutcome::Abandoned { .. } => "abandoned",
            EntryOutcome::Deferred { .. } => "deferred",
            EntryOutcome::Superseded { .. } => "superseded",
        }
    }
}

//! StaticPhoneDirectory - 固定テーブルによる電話番号の解決
//!
//! 本番ではユーザー DB やキャッシュに置き換える想定です。

use std::collections::HashMap;

use async_trait::async_trait;

use crate::ports::PhoneDirectory;

/// 未登録ユーザーに使う番号
pub const DEFAULT_PHONE: &str = "13800138000";

pub struct StaticPhoneDirectory {
    phones: HashMap<String, String>,
    fallback: String,
}

impl StaticPhoneDirectory {
    pub fn new(phones: HashMap<String, String>) -> Self {
        Self {
            phones,
            fallback: DEFAULT_PHONE.to_string(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// デモ用のユーザー 3 件
    pub fn demo() -> Self {
        let phones = [
            ("user001", "13800138001"),
            ("user002", "13800138002"),
            ("user003", "13800138003"),
        ]
        .into_iter()
        .map(|(u, p)| (u.to_string(), p.to_string()))
        .collect();
        Self::new(phones)
    }
}

#[async_trait]
impl PhoneDirectory for StaticPhoneDirectory {
    async fn lookup(&self, user_id: &str) -> String {
        self.phones
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_users_resolve_to_their_phone() {
        let dir = StaticPhoneDirectory::demo();
        assert_eq!(dir.lookup("user002").await, "13800138002");
    }

    #[tokio::test]
    async fn unknown_users_fall_back_to_placeholder() {
        let dir = StaticPhoneDirectory::demo();
        assert_eq!(dir.lookup("ghost").await, DEFAULT_PHONE);

        let dir = StaticPhoneDirectory::new(HashMap::new()).with_fallback("000");
        assert_eq!(dir.lookup("ghost").await, "000");
    }
}

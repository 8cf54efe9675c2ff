//! PhoneDirectory port - user_id から電話番号を引く
//!
//! 見つからない場合は実装側で既定のプレースホルダを返します。

use async_trait::async_trait;

#[async_trait]
pub trait PhoneDirectory: Send + Sync {
    async fn lookup(&self, user_id: &str) -> String;
}

use serde::{Deserialize, Serialize};

/// 連携口座（銀行口座連携の管理単位）
///
/// プラン上限の対象リソース。作成には銀行口座連携機能が有効な
/// プランが必要です。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// 金融機関名
    pub institution: String,
    pub created_at: String,
    pub updated_at: String,
}

/// 連携口座作成DTO
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountDto {
    pub name: String,
    pub institution: String,
}

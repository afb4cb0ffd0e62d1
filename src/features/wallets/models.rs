use serde::{Deserialize, Serialize};

/// ウォレット（家計の管理単位）
///
/// プラン上限の対象リソース。作成はクォータゲートを経由します。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// 通貨コード（ISO 4217、既定は "JPY"）
    pub currency: String,
    pub created_at: String,
    pub updated_at: String,
}

/// ウォレット作成DTO
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWalletDto {
    pub name: String,
    pub currency: Option<String>,
}

/// ウォレット更新DTO
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateWalletDto {
    pub name: Option<String>,
    pub currency: Option<String>,
}

use crate::features::plans::{BillingPeriod, PlanTier};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// サブスクリプションの状態
///
/// 状態機械の全状態。`Canceled` と `Expired` は終端状態で、
/// そこからの遷移は新規契約（create）のみです。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// トライアル中
    Trialing,
    /// 有効
    Active,
    /// 期間末解約の予約済み（期間末までは利用可能）
    PendingCancellation,
    /// 解約済み（終端）
    Canceled,
    /// 期限切れ（終端、更新なしで期間満了）
    Expired,
}

impl SubscriptionStatus {
    /// データベース保存用の文字列表現を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PendingCancellation => "pending_cancellation",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// 文字列から状態を解析する
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "pending_cancellation" => Some(SubscriptionStatus::PendingCancellation),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }

    /// 終端状態かどうかを判定
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Canceled | SubscriptionStatus::Expired
        )
    }
}

impl ToSql for SubscriptionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SubscriptionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        SubscriptionStatus::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("不正なステータス: {text}").into()))
    }
}

/// ライフサイクル遷移の種別（履歴記録用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Create,
    Upgrade,
    Downgrade,
    Cancel,
    Reactivate,
    Renew,
}

impl HistoryAction {
    /// データベース保存用の文字列表現を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Create => "create",
            HistoryAction::Upgrade => "upgrade",
            HistoryAction::Downgrade => "downgrade",
            HistoryAction::Cancel => "cancel",
            HistoryAction::Reactivate => "reactivate",
            HistoryAction::Renew => "renew",
        }
    }

    /// 文字列から遷移種別を解析する
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(HistoryAction::Create),
            "upgrade" => Some(HistoryAction::Upgrade),
            "downgrade" => Some(HistoryAction::Downgrade),
            "cancel" => Some(HistoryAction::Cancel),
            "reactivate" => Some(HistoryAction::Reactivate),
            "renew" => Some(HistoryAction::Renew),
            _ => None,
        }
    }
}

impl ToSql for HistoryAction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for HistoryAction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        HistoryAction::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("不正な遷移種別: {text}").into()))
    }
}

/// サブスクリプションデータモデル
///
/// 物理削除はせず、終端状態への遷移で履歴を保全します。
/// `version` は楽観的排他制御のカウンターで、更新のたびに+1されます。
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub plan_tier: PlanTier,
    pub billing_period: BillingPeriod,
    pub status: SubscriptionStatus,
    pub current_period_start: String, // RFC3339形式（JST）
    pub current_period_end: String,   // RFC3339形式（JST）
    pub cancel_at_period_end: bool,
    /// 期間末に適用されるダウングレード先（予約済みの場合のみ）
    pub pending_tier: Option<PlanTier>,
    pub trial_end: Option<String>, // RFC3339形式（JST）
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Subscription {
    /// 終端状態かどうかを判定
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// サブスクリプション新規作成用の内部レコード
///
/// リポジトリのINSERTにのみ使用します（idと監査列はストアが採番）。
#[derive(Debug)]
pub struct NewSubscription {
    pub user_id: i64,
    pub plan_tier: PlanTier,
    pub billing_period: BillingPeriod,
    pub status: SubscriptionStatus,
    pub current_period_start: String,
    pub current_period_end: String,
    pub trial_end: Option<String>,
}

/// サブスクリプション履歴エントリ（追記専用）
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubscriptionHistoryEntry {
    pub id: i64,
    pub subscription_id: i64,
    pub user_id: i64,
    /// 新規契約時はNone
    pub from_tier: Option<PlanTier>,
    pub to_tier: PlanTier,
    pub action: HistoryAction,
    pub occurred_at: String, // RFC3339形式（JST）
}

/// サブスクリプション作成用DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSubscriptionDto {
    pub plan_tier: String,      // "free" / "pro" / "ultimate"
    pub billing_period: String, // "monthly" / "yearly"
    pub payment_method_token: Option<String>,
}

/// サブスクリプション更新用DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateSubscriptionDto {
    pub plan_tier: Option<String>,
    pub billing_period: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        let statuses = [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PendingCancellation,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Expired,
        ];
        for status in statuses {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SubscriptionStatus::parse("paused"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        // 終端は Canceled と Expired のみ
        assert!(SubscriptionStatus::Canceled.is_terminal());
        assert!(SubscriptionStatus::Expired.is_terminal());
        assert!(!SubscriptionStatus::Trialing.is_terminal());
        assert!(!SubscriptionStatus::Active.is_terminal());
        assert!(!SubscriptionStatus::PendingCancellation.is_terminal());
    }

    #[test]
    fn test_history_action_round_trip() {
        let actions = [
            HistoryAction::Create,
            HistoryAction::Upgrade,
            HistoryAction::Downgrade,
            HistoryAction::Cancel,
            HistoryAction::Reactivate,
            HistoryAction::Renew,
        ];
        for action in actions {
            assert_eq!(HistoryAction::parse(action.as_str()), Some(action));
        }
    }

    #[test]
    fn test_status_serde_uses_snake_case() {
        let json =
            serde_json::to_string(&SubscriptionStatus::PendingCancellation).unwrap();
        assert_eq!(json, "\"pending_cancellation\"");
    }
}

use crate::features::plans::{BillingPeriod, PlanTier};
use serde::{Deserialize, Serialize};

/// 課金の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    /// 新規契約の初回課金
    Initial,
    /// プラン変更に伴う差額課金（日割り計算は決済側の責務）
    PlanChange { from_tier: PlanTier },
    /// 期間更新時の課金
    Renewal,
}

/// 決済コラボレーターへの課金要求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub user_id: i64,
    pub tier: PlanTier,
    pub billing_period: BillingPeriod,
    /// 支払い方法トークン（外部決済プロバイダーが発行）
    pub payment_method_token: Option<String>,
    pub kind: ChargeKind,
}

/// 課金結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// 決済リファレンスID
    pub reference: String,
    /// 課金額（円）
    pub amount: f64,
}

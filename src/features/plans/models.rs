use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::shared::errors::{AppError, AppResult};

/// プラン階層
///
/// 順序は Free < Pro < Ultimate で固定です（`Ord` 導出が宣言順に従う）。
/// データベースにはTEXT（"free" / "pro" / "ultimate"）で保存されます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
    Ultimate,
}

impl PlanTier {
    /// 全階層（昇順）
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Pro, PlanTier::Ultimate];

    /// データベース保存用の文字列表現を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Ultimate => "ultimate",
        }
    }

    /// 文字列からプラン階層を解析する
    ///
    /// # 引数
    /// * `value` - "free" / "pro" / "ultimate" のいずれか
    ///
    /// # 戻り値
    /// プラン階層、または不正な値の場合はバリデーションエラー
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "ultimate" => Ok(PlanTier::Ultimate),
            _ => Err(AppError::validation(format!(
                "不正なプラン階層です: '{value}'（'free'、'pro'、'ultimate' のいずれかを指定してください）"
            ))),
        }
    }
}

impl ToSql for PlanTier {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PlanTier {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        PlanTier::parse(text)
            .map_err(|_| FromSqlError::Other(format!("不正なプラン階層: {text}").into()))
    }
}

/// 請求周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

impl BillingPeriod {
    /// データベース保存用の文字列表現を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Yearly => "yearly",
        }
    }

    /// 文字列から請求周期を解析する
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "monthly" => Ok(BillingPeriod::Monthly),
            "yearly" => Ok(BillingPeriod::Yearly),
            _ => Err(AppError::validation(format!(
                "不正な請求周期です: '{value}'（'monthly' または 'yearly' を指定してください）"
            ))),
        }
    }

    /// 1周期の月数を取得
    pub fn months(&self) -> u32 {
        match self {
            BillingPeriod::Monthly => 1,
            BillingPeriod::Yearly => 12,
        }
    }
}

impl ToSql for BillingPeriod {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for BillingPeriod {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        BillingPeriod::parse(text)
            .map_err(|_| FromSqlError::Other(format!("不正な請求周期: {text}").into()))
    }
}

/// 上限値
///
/// 「-1 = 無制限」のような番兵値を使わず、無制限を明示的な列挙子で表します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LimitValue {
    /// 無制限
    Unlimited,
    /// 上限あり（非負の件数）
    Capped(i64),
}

impl LimitValue {
    /// 無制限かどうかを判定
    pub fn is_unlimited(&self) -> bool {
        matches!(self, LimitValue::Unlimited)
    }

    /// 現在の件数でもう1件作成できるかを判定する
    ///
    /// # 引数
    /// * `current_count` - 現在の件数
    ///
    /// # 戻り値
    /// 作成可能な場合はtrue（件数が上限未満、または無制限）
    pub fn allows(&self, current_count: i64) -> bool {
        match self {
            LimitValue::Unlimited => true,
            LimitValue::Capped(limit) => current_count < *limit,
        }
    }

    /// 残り作成可能数を計算する
    ///
    /// 上限超過状態でも負数にはならず、Capped(0) を返します。
    /// 極端な件数でも桁あふれしないよう飽和減算で計算します。
    pub fn remaining(&self, current_count: i64) -> LimitValue {
        match self {
            LimitValue::Unlimited => LimitValue::Unlimited,
            LimitValue::Capped(limit) => {
                LimitValue::Capped(limit.saturating_sub(current_count).max(0))
            }
        }
    }
}

/// 上限対象のリソース種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Wallet,
    Account,
}

impl ResourceKind {
    /// エラー詳細やログに使用する文字列表現を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Wallet => "wallet",
            ResourceKind::Account => "account",
        }
    }

    /// 文字列からリソース種別を解析する
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "wallet" => Ok(ResourceKind::Wallet),
            "account" => Ok(ResourceKind::Account),
            _ => Err(AppError::validation(format!(
                "不正なリソース種別です: '{value}'（'wallet' または 'account' を指定してください）"
            ))),
        }
    }
}

/// プランの機能フラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// 銀行口座連携
    BankSync,
    /// CSVエクスポート
    CsvExport,
    /// 優先サポート
    PrioritySupport,
}

/// プラン定義（階層ごとに1つ、不変）
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub tier: PlanTier,
    pub display_name: &'static str,
    /// 月額料金（円）
    pub monthly_price: f64,
    /// 年額料金（円）
    pub yearly_price: f64,
    /// 年払い割引率（%）
    pub yearly_discount_percent: f64,
    /// 無料トライアル日数（0はトライアルなし）
    pub trial_days: i64,
    pub max_wallets: LimitValue,
    pub max_accounts: LimitValue,
    pub bank_sync: bool,
    pub csv_export: bool,
    pub priority_support: bool,
}

impl Plan {
    /// リソース種別ごとの上限値を取得
    pub fn limit_for(&self, kind: ResourceKind) -> LimitValue {
        match kind {
            ResourceKind::Wallet => self.max_wallets,
            ResourceKind::Account => self.max_accounts,
        }
    }

    /// 機能が有効かどうかを判定
    pub fn capability_enabled(&self, capability: Capability) -> bool {
        match capability {
            Capability::BankSync => self.bank_sync,
            Capability::CsvExport => self.csv_export,
            Capability::PrioritySupport => self.priority_support,
        }
    }

    /// 無料プランかどうかを判定
    pub fn is_free(&self) -> bool {
        self.monthly_price <= 0.0
    }

    /// トライアルの有無を判定
    pub fn has_trial(&self) -> bool {
        self.trial_days > 0
    }

    /// 請求周期に応じた料金を取得
    pub fn price_for(&self, period: BillingPeriod) -> f64 {
        match period {
            BillingPeriod::Monthly => self.monthly_price,
            BillingPeriod::Yearly => self.yearly_price,
        }
    }

    /// 年払いによる節約額（月額×12 − 年額）を計算
    pub fn yearly_savings(&self) -> f64 {
        self.monthly_price * 12.0 - self.yearly_price
    }
}

/// プラン比較表
///
/// 全階層を横並びにした機能マトリクス。公開APIの比較表示に使用します。
#[derive(Debug, Clone, Serialize)]
pub struct PlanComparison {
    /// 列の並び（昇順の階層）
    pub tiers: Vec<PlanTier>,
    /// 行（機能ごとの値）
    pub rows: Vec<ComparisonRow>,
}

/// プラン比較表の1行
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRow {
    pub feature: String,
    /// `PlanComparison::tiers` と同じ並びの表示値
    pub values: Vec<String>,
}

/// 2つの階層を比較する
///
/// # 戻り値
/// `a` が `b` より下位なら `Less`、同一なら `Equal`、上位なら `Greater`
pub fn compare_tiers(a: PlanTier, b: PlanTier) -> Ordering {
    a.cmp(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    impl Arbitrary for PlanTier {
        fn arbitrary(g: &mut Gen) -> Self {
            *g.choose(&PlanTier::ALL).unwrap()
        }
    }

    #[test]
    fn test_tier_ordering_is_total_and_fixed() {
        // 階層の順序が Free < Pro < Ultimate であることを確認
        assert!(PlanTier::Free < PlanTier::Pro);
        assert!(PlanTier::Pro < PlanTier::Ultimate);
        assert!(PlanTier::Free < PlanTier::Ultimate);

        assert_eq!(
            compare_tiers(PlanTier::Free, PlanTier::Pro),
            Ordering::Less
        );
        assert_eq!(
            compare_tiers(PlanTier::Pro, PlanTier::Pro),
            Ordering::Equal
        );
        assert_eq!(
            compare_tiers(PlanTier::Ultimate, PlanTier::Pro),
            Ordering::Greater
        );
    }

    #[quickcheck]
    fn prop_tier_comparison_antisymmetric(a: PlanTier, b: PlanTier) -> bool {
        // compare_tiers(a, b) と compare_tiers(b, a) は常に逆向き
        compare_tiers(a, b) == compare_tiers(b, a).reverse()
    }

    #[test]
    fn test_tier_parse_round_trip() {
        for tier in PlanTier::ALL {
            assert_eq!(PlanTier::parse(tier.as_str()).unwrap(), tier);
        }

        // 不正な値はバリデーションエラー
        let err = PlanTier::parse("platinum").unwrap_err();
        assert!(matches!(err, crate::shared::errors::AppError::Validation(_)));
    }

    #[test]
    fn test_billing_period_parse_and_months() {
        assert_eq!(
            BillingPeriod::parse("monthly").unwrap(),
            BillingPeriod::Monthly
        );
        assert_eq!(
            BillingPeriod::parse("yearly").unwrap(),
            BillingPeriod::Yearly
        );
        assert!(BillingPeriod::parse("weekly").is_err());

        assert_eq!(BillingPeriod::Monthly.months(), 1);
        assert_eq!(BillingPeriod::Yearly.months(), 12);
    }

    #[test]
    fn test_limit_value_boundary() {
        let limit = LimitValue::Capped(5);

        // 上限未満は許可、上限到達で拒否
        assert!(limit.allows(4));
        assert!(!limit.allows(5));
        assert!(!limit.allows(6));

        assert_eq!(limit.remaining(3), LimitValue::Capped(2));
        assert_eq!(limit.remaining(5), LimitValue::Capped(0));
        // 超過状態でも負数にならない
        assert_eq!(limit.remaining(7), LimitValue::Capped(0));
    }

    #[test]
    fn test_unlimited_always_allows() {
        assert!(LimitValue::Unlimited.allows(0));
        assert!(LimitValue::Unlimited.allows(1_000_000));
        assert_eq!(LimitValue::Unlimited.remaining(1_000_000), LimitValue::Unlimited);
        assert!(LimitValue::Unlimited.is_unlimited());
        assert!(!LimitValue::Capped(1).is_unlimited());
    }

    #[quickcheck]
    fn prop_capped_allows_iff_below_limit(limit: i64, count: i64) -> bool {
        LimitValue::Capped(limit).allows(count) == (count < limit)
    }

    #[test]
    fn test_remaining_saturates_at_extreme_counts() {
        // i64の端の値でも桁あふれせずCapped(0)以上に収まる
        assert_eq!(
            LimitValue::Capped(i64::MAX).remaining(i64::MIN),
            LimitValue::Capped(i64::MAX)
        );
        assert_eq!(
            LimitValue::Capped(i64::MIN).remaining(i64::MAX),
            LimitValue::Capped(0)
        );
        assert_eq!(
            LimitValue::Capped(0).remaining(i64::MIN),
            LimitValue::Capped(i64::MAX)
        );
    }

    #[quickcheck]
    fn prop_remaining_never_negative(limit: i64, count: i64) -> bool {
        match LimitValue::Capped(limit).remaining(count) {
            LimitValue::Capped(remaining) => remaining >= 0,
            LimitValue::Unlimited => false,
        }
    }

    #[test]
    fn test_resource_kind_parse() {
        assert_eq!(ResourceKind::parse("wallet").unwrap(), ResourceKind::Wallet);
        assert_eq!(
            ResourceKind::parse("account").unwrap(),
            ResourceKind::Account
        );
        assert!(ResourceKind::parse("category").is_err());
    }

    #[test]
    fn test_limit_value_serde_round_trip() {
        // タグ付き表現でシリアライズされることを確認（番兵値を使わない）
        let json = serde_json::to_string(&LimitValue::Unlimited).unwrap();
        assert!(json.contains("unlimited"));

        let json = serde_json::to_string(&LimitValue::Capped(5)).unwrap();
        let back: LimitValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LimitValue::Capped(5));
    }
}

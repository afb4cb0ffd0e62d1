use super::models::{
    BillingPeriod, Capability, ComparisonRow, LimitValue, Plan, PlanComparison, PlanTier,
    ResourceKind,
};
use std::cmp::Ordering;

/// Freeプラン定義
static FREE: Plan = Plan {
    tier: PlanTier::Free,
    display_name: "フリー",
    monthly_price: 0.0,
    yearly_price: 0.0,
    yearly_discount_percent: 0.0,
    trial_days: 0,
    max_wallets: LimitValue::Capped(1),
    max_accounts: LimitValue::Capped(2),
    bank_sync: false,
    csv_export: false,
    priority_support: false,
};

/// Proプラン定義（年払いは2ヶ月分無料）
static PRO: Plan = Plan {
    tier: PlanTier::Pro,
    display_name: "プロ",
    monthly_price: 980.0,
    yearly_price: 9800.0,
    yearly_discount_percent: 16.7,
    trial_days: 14,
    max_wallets: LimitValue::Capped(5),
    max_accounts: LimitValue::Capped(10),
    bank_sync: true,
    csv_export: true,
    priority_support: false,
};

/// Ultimateプラン定義
static ULTIMATE: Plan = Plan {
    tier: PlanTier::Ultimate,
    display_name: "アルティメット",
    monthly_price: 2980.0,
    yearly_price: 29800.0,
    yearly_discount_percent: 16.7,
    trial_days: 14,
    max_wallets: LimitValue::Unlimited,
    max_accounts: LimitValue::Unlimited,
    bank_sync: true,
    csv_export: true,
    priority_support: true,
};

/// 階層に対応するプラン定義を取得する
///
/// 階層は閉じた列挙型なので未知の階層は表現できず、失敗しません。
pub fn get(tier: PlanTier) -> &'static Plan {
    match tier {
        PlanTier::Free => &FREE,
        PlanTier::Pro => &PRO,
        PlanTier::Ultimate => &ULTIMATE,
    }
}

/// 階層のリソース上限を取得する
pub fn limit_for(tier: PlanTier, kind: ResourceKind) -> LimitValue {
    get(tier).limit_for(kind)
}

/// 階層で機能が有効かどうかを判定する
pub fn capability_enabled(tier: PlanTier, capability: Capability) -> bool {
    get(tier).capability_enabled(capability)
}

/// 2つの階層を比較する
pub fn compare_tiers(a: PlanTier, b: PlanTier) -> Ordering {
    super::models::compare_tiers(a, b)
}

/// 1つ上の階層のプランを取得する（最上位の場合はNone）
pub fn next_tier(tier: PlanTier) -> Option<&'static Plan> {
    match tier {
        PlanTier::Free => Some(&PRO),
        PlanTier::Pro => Some(&ULTIMATE),
        PlanTier::Ultimate => None,
    }
}

/// 1つ下の階層のプランを取得する（最下位の場合はNone）
pub fn previous_tier(tier: PlanTier) -> Option<&'static Plan> {
    match tier {
        PlanTier::Free => None,
        PlanTier::Pro => Some(&FREE),
        PlanTier::Ultimate => Some(&PRO),
    }
}

/// 年払いによる節約額を計算する
pub fn yearly_savings(tier: PlanTier) -> f64 {
    get(tier).yearly_savings()
}

/// 全プランを階層の昇順で取得する
pub fn all_plans() -> Vec<&'static Plan> {
    PlanTier::ALL.iter().map(|tier| get(*tier)).collect()
}

/// 上限値の表示文字列を組み立てる
fn format_limit(limit: LimitValue) -> String {
    match limit {
        LimitValue::Unlimited => "無制限".to_string(),
        LimitValue::Capped(count) => format!("{count}"),
    }
}

/// 機能フラグの表示文字列を組み立てる
fn format_flag(enabled: bool) -> String {
    if enabled { "○" } else { "−" }.to_string()
}

/// 全プランを横並びにした機能比較表を組み立てる
///
/// # 戻り値
/// 階層の昇順を列、機能を行とする比較表
pub fn plan_comparison() -> PlanComparison {
    let plans = all_plans();

    let rows = vec![
        ComparisonRow {
            feature: "月額料金".to_string(),
            values: plans
                .iter()
                .map(|p| format!("¥{:.0}", p.monthly_price))
                .collect(),
        },
        ComparisonRow {
            feature: "年額料金".to_string(),
            values: plans
                .iter()
                .map(|p| format!("¥{:.0}", p.yearly_price))
                .collect(),
        },
        ComparisonRow {
            feature: "無料トライアル".to_string(),
            values: plans
                .iter()
                .map(|p| {
                    if p.has_trial() {
                        format!("{}日間", p.trial_days)
                    } else {
                        "−".to_string()
                    }
                })
                .collect(),
        },
        ComparisonRow {
            feature: "ウォレット数".to_string(),
            values: plans.iter().map(|p| format_limit(p.max_wallets)).collect(),
        },
        ComparisonRow {
            feature: "連携口座数".to_string(),
            values: plans.iter().map(|p| format_limit(p.max_accounts)).collect(),
        },
        ComparisonRow {
            feature: "銀行口座連携".to_string(),
            values: plans.iter().map(|p| format_flag(p.bank_sync)).collect(),
        },
        ComparisonRow {
            feature: "CSVエクスポート".to_string(),
            values: plans.iter().map(|p| format_flag(p.csv_export)).collect(),
        },
        ComparisonRow {
            feature: "優先サポート".to_string(),
            values: plans
                .iter()
                .map(|p| format_flag(p.priority_support))
                .collect(),
        },
    ];

    PlanComparison {
        tiers: PlanTier::ALL.to_vec(),
        rows,
    }
}

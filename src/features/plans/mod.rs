/// プランカタログ機能モジュール
///
/// このモジュールは、プラン階層の静的カタログに関連する機能を提供します：
/// - 階層ごとのプラン定義（料金、上限、機能フラグ）
/// - 階層の順序比較と隣接階層の取得
/// - プラン一覧・機能比較表の公開操作
pub mod catalog;
pub mod commands;
pub mod models;

// 公開インターフェース
pub use commands::{get_available_plans, get_plan_comparison};

pub use models::{
    compare_tiers, BillingPeriod, Capability, ComparisonRow, LimitValue, Plan, PlanComparison,
    PlanTier, ResourceKind,
};

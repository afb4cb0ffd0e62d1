use super::catalog;
use super::models::{Plan, PlanComparison};
use crate::shared::errors::ErrorResponse;

/// 提供中の全プランを取得する（認証不要の公開操作）
///
/// # 戻り値
/// 階層の昇順に並んだプラン一覧
pub fn get_available_plans() -> Result<Vec<Plan>, ErrorResponse> {
    Ok(catalog::all_plans().into_iter().cloned().collect())
}

/// プラン機能比較表を取得する（認証不要の公開操作）
///
/// # 戻り値
/// 全階層を横並びにした機能マトリクス
pub fn get_plan_comparison() -> Result<PlanComparison, ErrorResponse> {
    Ok(catalog::plan_comparison())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::plans::models::PlanTier;

    #[test]
    fn test_get_available_plans() {
        let plans = get_available_plans().unwrap();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].tier, PlanTier::Free);
    }

    #[test]
    fn test_get_plan_comparison() {
        let comparison = get_plan_comparison().unwrap();
        assert_eq!(comparison.tiers.len(), 3);
    }
}

use super::models::LimitCheckResult;
use super::usage;
use crate::features::plans::{catalog, LimitValue, PlanTier, ResourceKind};
use crate::features::subscriptions::repository as subscription_repository;
use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;

/// ユーザーの有効なプラン階層を解決する
///
/// 有効なサブスクリプションが存在しない（または終端状態の行しかない）
/// ユーザーはFREE階層として扱います（明示的なポリシー）。
pub fn resolve_tier(conn: &Connection, user_id: i64) -> AppResult<PlanTier> {
    let tier = subscription_repository::find_current_for_user(conn, user_id)?
        .map(|subscription| subscription.plan_tier)
        .unwrap_or(PlanTier::Free);
    Ok(tier)
}

/// リソース作成の可否を判定する
///
/// 上限到達は正常な判定結果であり、エラーにはなりません。
/// `&Connection` を受け取るため、呼び出し側が開始したトランザクションの
/// 中でも実行できます（チェックと挿入を同一トランザクションに収めるため）。
///
/// # 引数
/// * `conn` - データベース接続（トランザクション可）
/// * `user_id` - ユーザーID
/// * `kind` - リソース種別
///
/// # 戻り値
/// 上限チェックの結果、または失敗時はエラー
pub fn check(conn: &Connection, user_id: i64, kind: ResourceKind) -> AppResult<LimitCheckResult> {
    let tier = resolve_tier(conn, user_id)?;
    let limit = catalog::limit_for(tier, kind);

    // 無制限は使用数を読まずに常に許可（不要な読み取りを省く）
    if limit.is_unlimited() {
        return Ok(LimitCheckResult {
            allowed: true,
            resource_kind: kind,
            current_count: None,
            limit: LimitValue::Unlimited,
            remaining: LimitValue::Unlimited,
        });
    }

    let current_count = usage::count_for(conn, user_id, kind)?;

    Ok(LimitCheckResult {
        allowed: limit.allows(current_count),
        resource_kind: kind,
        current_count: Some(current_count),
        limit,
        remaining: limit.remaining(current_count),
    })
}

/// リソース作成の上限を強制する
///
/// `check` をラップし、拒否時は構造化された `LimitExceeded` で失敗します
/// （リソース種別・上限・現在数を保持し、境界層が案内文を組み立てられる）。
pub fn enforce(conn: &Connection, user_id: i64, kind: ResourceKind) -> AppResult<()> {
    let result = check(conn, user_id, kind)?;

    if !result.allowed {
        // 無制限は常に許可されるため、拒否時の上限は必ず有限値
        let limit = match result.limit {
            LimitValue::Capped(limit) => limit,
            LimitValue::Unlimited => {
                return Err(AppError::internal("無制限の上限で拒否が発生しました"))
            }
        };
        return Err(AppError::limit_exceeded(
            kind.as_str(),
            limit,
            result.current_count.unwrap_or(0),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::payments::DevelopmentPaymentGateway;
    use crate::features::plans::BillingPeriod;
    use crate::features::subscriptions::SubscriptionService;
    use crate::shared::database::connection::create_in_memory_connection;
    use rusqlite::params;
    use std::sync::{Arc, Mutex};

    fn insert_wallets(conn: &Connection, user_id: i64, count: i64) {
        for i in 0..count {
            conn.execute(
                "INSERT INTO wallets (user_id, name, currency, created_at, updated_at)
                 VALUES (?1, ?2, 'JPY', 't', 't')",
                params![user_id, format!("ウォレット{i}")],
            )
            .unwrap();
        }
    }

    /// 指定階層のActiveサブスクリプションを直接作成する
    fn insert_active_subscription(conn: &Connection, user_id: i64, tier: &str) {
        conn.execute(
            "INSERT INTO subscriptions
             (user_id, plan_tier, billing_period, status, current_period_start,
              current_period_end, cancel_at_period_end, version, created_at, updated_at)
             VALUES (?1, ?2, 'monthly', 'active', 't', 't', 0, 1, 't', 't')",
            params![user_id, tier],
        )
        .unwrap();
    }

    #[test]
    fn test_no_subscription_treated_as_free_tier() {
        let conn = create_in_memory_connection().unwrap();

        // サブスクリプション未契約はFREE階層（ウォレット1件）として扱う
        let result = check(&conn, 1, ResourceKind::Wallet).unwrap();
        assert!(result.allowed);
        assert_eq!(result.limit, LimitValue::Capped(1));

        insert_wallets(&conn, 1, 1);
        let result = check(&conn, 1, ResourceKind::Wallet).unwrap();
        assert!(!result.allowed);
        assert_eq!(result.remaining, LimitValue::Capped(0));
    }

    #[test]
    fn test_terminal_subscription_falls_back_to_free() {
        let conn = create_in_memory_connection().unwrap();
        let db = Arc::new(Mutex::new(conn));
        let service = SubscriptionService::new(
            db.clone(),
            Arc::new(DevelopmentPaymentGateway::new()),
        );

        // Pro契約を即時解約すると上限はFREEに戻る
        let sub = service
            .create(1, crate::features::plans::PlanTier::Pro, BillingPeriod::Monthly, Some("pm_test12345678"))
            .unwrap();
        service.cancel(sub.id, true).unwrap();

        let conn = db.lock().unwrap();
        let result = check(&conn, 1, ResourceKind::Wallet).unwrap();
        assert_eq!(result.limit, LimitValue::Capped(1));
    }

    #[test]
    fn test_enforce_boundary_at_limit() {
        let conn = create_in_memory_connection().unwrap();
        insert_active_subscription(&conn, 1, "pro");

        // 上限未満（4/5）は成功
        insert_wallets(&conn, 1, 4);
        assert!(enforce(&conn, 1, ResourceKind::Wallet).is_ok());

        // 上限到達（5/5）で構造化された拒否
        insert_wallets(&conn, 1, 1);
        let err = enforce(&conn, 1, ResourceKind::Wallet).unwrap_err();
        match err {
            AppError::LimitExceeded {
                resource_kind,
                limit,
                current_count,
            } => {
                assert_eq!(resource_kind, "wallet");
                assert_eq!(limit, 5);
                assert_eq!(current_count, 5);
            }
            other => panic!("LimitExceededを期待したが {other:?} が返った"),
        }
    }

    #[test]
    fn test_check_over_limit_is_not_an_error() {
        let conn = create_in_memory_connection().unwrap();
        insert_active_subscription(&conn, 1, "pro");
        insert_wallets(&conn, 1, 5);

        // checkは上限到達でもOkで判定結果を返す
        let result = check(&conn, 1, ResourceKind::Wallet).unwrap();
        assert!(!result.allowed);
        assert_eq!(result.current_count, Some(5));
        assert_eq!(result.limit, LimitValue::Capped(5));
    }

    #[test]
    fn test_unlimited_short_circuits_regardless_of_count() {
        let conn = create_in_memory_connection().unwrap();
        insert_active_subscription(&conn, 1, "ultimate");
        insert_wallets(&conn, 1, 1000);

        // 1000件所有していても無制限プランは常に許可（使用数も読まない）
        let result = check(&conn, 1, ResourceKind::Wallet).unwrap();
        assert!(result.allowed);
        assert_eq!(result.current_count, None);
        assert_eq!(result.remaining, LimitValue::Unlimited);

        assert!(enforce(&conn, 1, ResourceKind::Wallet).is_ok());
    }

    #[test]
    fn test_account_limit_independent_from_wallets() {
        let conn = create_in_memory_connection().unwrap();
        insert_active_subscription(&conn, 1, "free");
        insert_wallets(&conn, 1, 1);

        // ウォレットが上限でも口座（FREEは2件）は許可される
        let result = check(&conn, 1, ResourceKind::Account).unwrap();
        assert!(result.allowed);
        assert_eq!(result.limit, LimitValue::Capped(2));
    }

    #[test]
    fn test_check_inside_caller_transaction() {
        let conn = create_in_memory_connection().unwrap();
        insert_active_subscription(&conn, 1, "free");

        // 呼び出し側トランザクションの未コミット挿入を含めて判定できる
        let tx = conn.unchecked_transaction().unwrap();
        insert_wallets(&tx, 1, 1);
        let result = check(&tx, 1, ResourceKind::Wallet).unwrap();
        assert!(!result.allowed);
        drop(tx);
    }
}

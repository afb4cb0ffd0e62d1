use super::models::LimitCheckResult;
use super::service;
use crate::features::limits::guard::require_user;
use crate::features::plans::ResourceKind;
use crate::shared::errors::ErrorResponse;
use crate::AppContext;

/// 指定リソースの上限チェック結果を取得する
///
/// 読み取り専用の判定であり、要求を遮断しません。フロントエンドが
/// 残数表示やアップグレード導線の描画に使用します。
///
/// # 引数
/// * `user_id` - 上流から渡されたユーザーID
/// * `resource_kind` - リソース種別（"wallet" または "account"）
pub fn check_limit(
    ctx: &AppContext,
    user_id: Option<i64>,
    resource_kind: String,
) -> Result<LimitCheckResult, ErrorResponse> {
    let kind = ResourceKind::parse(&resource_kind)?;
    ctx.gate.check_limits(user_id, kind)
}

/// 指定リソースの上限を強制する（上限到達時はエラー）
///
/// 作成操作を伴わない単独の強制チェック。作成と同時に強制する場合は
/// `QuotaGate::enforce_then` を使用してください（競合対策のため）。
pub fn enforce_limit(
    ctx: &AppContext,
    user_id: Option<i64>,
    resource_kind: String,
) -> Result<(), ErrorResponse> {
    let kind = ResourceKind::parse(&resource_kind)?;
    let user_id = require_user(user_id)?;
    let conn = ctx.lock_db()?;
    Ok(service::enforce(&conn, user_id, kind)?)
}

/// 全リソース種別の上限チェック結果をまとめて取得する
pub fn check_all_limits(
    ctx: &AppContext,
    user_id: Option<i64>,
) -> Result<Vec<LimitCheckResult>, ErrorResponse> {
    let mut results = Vec::with_capacity(2);
    for kind in [ResourceKind::Wallet, ResourceKind::Account] {
        results.push(ctx.gate.check_limits(user_id, kind)?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_limit_parses_kind() {
        let ctx = AppContext::in_memory().unwrap();

        let result = check_limit(&ctx, Some(1), "wallet".to_string()).unwrap();
        assert!(result.allowed);

        let err = check_limit(&ctx, Some(1), "category".to_string()).unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_check_all_limits_covers_both_kinds() {
        let ctx = AppContext::in_memory().unwrap();

        let results = check_all_limits(&ctx, Some(1)).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].resource_kind, ResourceKind::Wallet);
        assert_eq!(results[1].resource_kind, ResourceKind::Account);
    }

    #[test]
    fn test_enforce_limit_denies_at_cap() {
        let ctx = AppContext::in_memory().unwrap();

        // FREE階層のウォレット上限は1件
        enforce_limit(&ctx, Some(1), "wallet".to_string()).unwrap();
        {
            let conn = ctx.lock_db().unwrap();
            conn.execute(
                "INSERT INTO wallets (user_id, name, currency, created_at, updated_at)
                 VALUES (1, 'テスト', 'JPY', 't', 't')",
                [],
            )
            .unwrap();
        }
        let err = enforce_limit(&ctx, Some(1), "wallet".to_string()).unwrap_err();
        assert_eq!(err.code, "LIMIT_EXCEEDED");
    }

    #[test]
    fn test_check_limit_requires_identity() {
        let ctx = AppContext::in_memory().unwrap();

        let err = check_limit(&ctx, None, "wallet".to_string()).unwrap_err();
        assert_eq!(err.code, "UNAUTHENTICATED");
    }
}

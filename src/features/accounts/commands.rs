use super::models::{Account, CreateAccountDto};
use super::repository;
use crate::features::limits::guard::require_user;
use crate::features::limits::service::resolve_tier;
use crate::features::plans::{catalog, Capability, ResourceKind};
use crate::shared::errors::{AppError, AppResult, ErrorResponse};
use crate::AppContext;
use rusqlite::Connection;

/// 連携口座作成DTOのバリデーション
fn validate_create_account_dto(dto: &CreateAccountDto) -> AppResult<()> {
    if dto.name.trim().is_empty() {
        return Err(AppError::validation("口座名を入力してください"));
    }
    if dto.name.chars().count() > 100 {
        return Err(AppError::validation(
            "口座名は100文字以内で入力してください",
        ));
    }
    if dto.institution.trim().is_empty() {
        return Err(AppError::validation("金融機関名を入力してください"));
    }
    Ok(())
}

/// 現在のプランで銀行口座連携が有効であることを検証する
fn ensure_bank_sync_enabled(conn: &Connection, user_id: i64) -> AppResult<()> {
    let tier = resolve_tier(conn, user_id)?;
    if !catalog::capability_enabled(tier, Capability::BankSync) {
        return Err(AppError::validation(
            "現在のプランでは銀行口座連携を利用できません。プランをアップグレードしてください",
        ));
    }
    Ok(())
}

/// 連携口座を作成する（プラン上限と機能チェック付き）
///
/// 件数上限とは別に、現在のプランで銀行口座連携機能が有効である
/// 必要があります。両方の検証と挿入は同一トランザクションで行われます。
///
/// # 引数
/// * `ctx` - アプリケーションコンテキスト
/// * `user_id` - 認証済みユーザーID（未認証の場合はNone）
/// * `dto` - 連携口座作成用DTO
///
/// # 戻り値
/// 作成された連携口座、または失敗時はエラー封筒
pub fn create_account(
    ctx: &AppContext,
    user_id: Option<i64>,
    dto: CreateAccountDto,
) -> Result<Account, ErrorResponse> {
    validate_create_account_dto(&dto)?;

    ctx.gate
        .enforce_then(user_id, ResourceKind::Account, |conn, user_id| {
            ensure_bank_sync_enabled(conn, user_id)?;
            repository::create(conn, user_id, &dto)
        })
}

/// ユーザーの連携口座一覧を取得する
pub fn get_accounts(ctx: &AppContext, user_id: Option<i64>) -> Result<Vec<Account>, ErrorResponse> {
    let user_id = require_user(user_id)?;
    let conn = ctx.lock_db()?;
    Ok(repository::find_all_for_user(&conn, user_id)?)
}

/// 連携口座を削除する
pub fn delete_account(
    ctx: &AppContext,
    user_id: Option<i64>,
    account_id: i64,
) -> Result<(), ErrorResponse> {
    let user_id = require_user(user_id)?;

    let conn = ctx.lock_db()?;
    let account = repository::find_by_id(&conn, account_id)?;
    if account.user_id != user_id {
        // 他ユーザーの口座は存在を漏らさない
        return Err(AppError::not_found(format!("ID {account_id} の連携口座")).into());
    }

    Ok(repository::delete(&conn, account_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::models::CreateSubscriptionDto;

    fn create_dto(name: &str) -> CreateAccountDto {
        CreateAccountDto {
            name: name.to_string(),
            institution: "テスト銀行".to_string(),
        }
    }

    fn subscribe(ctx: &AppContext, user_id: i64, tier: &str) {
        let dto = CreateSubscriptionDto {
            plan_tier: tier.to_string(),
            billing_period: "monthly".to_string(),
            payment_method_token: Some("pm_test12345678".to_string()),
        };
        crate::features::subscriptions::commands::create_subscription(ctx, Some(user_id), dto)
            .unwrap();
    }

    #[test]
    fn test_free_tier_cannot_link_accounts() {
        let ctx = AppContext::in_memory().unwrap();

        // FREE階層は銀行口座連携が無効
        let err = create_account(&ctx, Some(1), create_dto("普通預金")).unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
        assert!(get_accounts(&ctx, Some(1)).unwrap().is_empty());
    }

    #[test]
    fn test_pro_tier_links_up_to_limit() {
        let ctx = AppContext::in_memory().unwrap();
        subscribe(&ctx, 1, "pro");

        // PRO階層は10件まで
        for i in 0..10 {
            create_account(&ctx, Some(1), create_dto(&format!("口座{i}"))).unwrap();
        }
        let err = create_account(&ctx, Some(1), create_dto("11件目")).unwrap_err();
        assert_eq!(err.code, "LIMIT_EXCEEDED");

        let details = err.details.unwrap();
        assert_eq!(details["resource_kind"], "account");
        assert_eq!(details["limit"], 10);
        assert_eq!(details["current_count"], 10);
    }

    #[test]
    fn test_validation_rejects_blank_fields() {
        let ctx = AppContext::in_memory().unwrap();
        subscribe(&ctx, 1, "pro");

        let err = create_account(&ctx, Some(1), create_dto("  ")).unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");

        let dto = CreateAccountDto {
            name: "普通預金".to_string(),
            institution: "".to_string(),
        };
        let err = create_account(&ctx, Some(1), dto).unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_other_users_account_is_not_found() {
        let ctx = AppContext::in_memory().unwrap();
        subscribe(&ctx, 1, "pro");

        let account = create_account(&ctx, Some(1), create_dto("普通預金")).unwrap();
        let err = delete_account(&ctx, Some(2), account.id).unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");
    }
}

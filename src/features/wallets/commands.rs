use super::models::{CreateWalletDto, UpdateWalletDto, Wallet};
use super::repository;
use crate::features::limits::guard::require_user;
use crate::features::plans::ResourceKind;
use crate::shared::errors::{AppError, AppResult, ErrorResponse};
use crate::AppContext;

/// ウォレット作成DTOのバリデーション
fn validate_create_wallet_dto(dto: &CreateWalletDto) -> AppResult<()> {
    if dto.name.trim().is_empty() {
        return Err(AppError::validation("ウォレット名を入力してください"));
    }
    if dto.name.chars().count() > 100 {
        return Err(AppError::validation(
            "ウォレット名は100文字以内で入力してください",
        ));
    }
    if let Some(ref currency) = dto.currency {
        validate_currency_code(currency)?;
    }
    Ok(())
}

/// ウォレット更新DTOのバリデーション
fn validate_update_wallet_dto(dto: &UpdateWalletDto) -> AppResult<()> {
    if dto.name.is_none() && dto.currency.is_none() {
        return Err(AppError::validation("更新する項目を指定してください"));
    }
    if let Some(ref name) = dto.name {
        if name.trim().is_empty() {
            return Err(AppError::validation("ウォレット名を入力してください"));
        }
        if name.chars().count() > 100 {
            return Err(AppError::validation(
                "ウォレット名は100文字以内で入力してください",
            ));
        }
    }
    if let Some(ref currency) = dto.currency {
        validate_currency_code(currency)?;
    }
    Ok(())
}

/// 通貨コードの形式検証（ISO 4217の3文字大文字）
fn validate_currency_code(currency: &str) -> AppResult<()> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(AppError::validation(format!(
            "不正な通貨コードです: '{currency}'（3文字の大文字で指定してください）"
        )));
    }
    Ok(())
}

/// ウォレットが認証ユーザーの所有物であることを検証する
///
/// 他ユーザーのIDを指定された場合は存在を漏らさず `NotFound` を返します。
fn ensure_owned_by(wallet: &Wallet, user_id: i64) -> AppResult<()> {
    if wallet.user_id != user_id {
        return Err(AppError::not_found(format!("ID {} のウォレット", wallet.id)));
    }
    Ok(())
}

/// ウォレットを作成する（プラン上限の強制付き）
///
/// 上限チェックと挿入は同一トランザクションで行われ、並行する作成
/// 要求があってもコミット済み件数が上限を超えることはありません。
///
/// # 引数
/// * `ctx` - アプリケーションコンテキスト
/// * `user_id` - 認証済みユーザーID（未認証の場合はNone）
/// * `dto` - ウォレット作成用DTO
///
/// # 戻り値
/// 作成されたウォレット、または失敗時はエラー封筒
pub fn create_wallet(
    ctx: &AppContext,
    user_id: Option<i64>,
    dto: CreateWalletDto,
) -> Result<Wallet, ErrorResponse> {
    validate_create_wallet_dto(&dto)?;

    ctx.gate
        .enforce_then(user_id, ResourceKind::Wallet, |conn, user_id| {
            repository::create(conn, user_id, &dto)
        })
}

/// ユーザーのウォレット一覧を取得する
pub fn get_wallets(ctx: &AppContext, user_id: Option<i64>) -> Result<Vec<Wallet>, ErrorResponse> {
    let user_id = require_user(user_id)?;
    let conn = ctx.lock_db()?;
    Ok(repository::find_all_for_user(&conn, user_id)?)
}

/// ウォレットを更新する（上限の対象外）
pub fn update_wallet(
    ctx: &AppContext,
    user_id: Option<i64>,
    wallet_id: i64,
    dto: UpdateWalletDto,
) -> Result<Wallet, ErrorResponse> {
    let user_id = require_user(user_id)?;
    validate_update_wallet_dto(&dto)?;

    let conn = ctx.lock_db()?;
    let wallet = repository::find_by_id(&conn, wallet_id)?;
    ensure_owned_by(&wallet, user_id)?;

    Ok(repository::update(&conn, wallet_id, &dto)?)
}

/// ウォレットを削除する
///
/// 削除により使用数が減り、上限到達後でも次の作成が可能になります。
pub fn delete_wallet(
    ctx: &AppContext,
    user_id: Option<i64>,
    wallet_id: i64,
) -> Result<(), ErrorResponse> {
    let user_id = require_user(user_id)?;

    let conn = ctx.lock_db()?;
    let wallet = repository::find_by_id(&conn, wallet_id)?;
    ensure_owned_by(&wallet, user_id)?;

    Ok(repository::delete(&conn, wallet_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_dto(name: &str) -> CreateWalletDto {
        CreateWalletDto {
            name: name.to_string(),
            currency: None,
        }
    }

    #[test]
    fn test_create_wallet_validates_name() {
        let ctx = AppContext::in_memory().unwrap();

        let err = create_wallet(&ctx, Some(1), create_dto("  ")).unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");

        let err = create_wallet(&ctx, Some(1), create_dto(&"あ".repeat(101))).unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_create_wallet_validates_currency() {
        let ctx = AppContext::in_memory().unwrap();

        let dto = CreateWalletDto {
            name: "海外口座".to_string(),
            currency: Some("yen".to_string()),
        };
        let err = create_wallet(&ctx, Some(1), dto).unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_free_tier_limit_enforced() {
        let ctx = AppContext::in_memory().unwrap();

        // FREE階層は1件まで
        create_wallet(&ctx, Some(1), create_dto("生活費")).unwrap();
        let err = create_wallet(&ctx, Some(1), create_dto("貯金")).unwrap_err();
        assert_eq!(err.code, "LIMIT_EXCEEDED");

        // 削除すれば再び作成できる
        let wallets = get_wallets(&ctx, Some(1)).unwrap();
        delete_wallet(&ctx, Some(1), wallets[0].id).unwrap();
        create_wallet(&ctx, Some(1), create_dto("貯金")).unwrap();
    }

    #[test]
    fn test_other_users_wallet_is_not_found() {
        let ctx = AppContext::in_memory().unwrap();

        let wallet = create_wallet(&ctx, Some(1), create_dto("生活費")).unwrap();

        // 他ユーザーからは存在自体が見えない
        let err = delete_wallet(&ctx, Some(2), wallet.id).unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");

        let dto = UpdateWalletDto {
            name: Some("乗っ取り".to_string()),
            currency: None,
        };
        let err = update_wallet(&ctx, Some(2), wallet.id, dto).unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");
    }

    #[test]
    fn test_get_wallets_requires_identity() {
        let ctx = AppContext::in_memory().unwrap();

        let err = get_wallets(&ctx, None).unwrap_err();
        assert_eq!(err.code, "UNAUTHENTICATED");
    }
}

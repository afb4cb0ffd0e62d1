use super::models::{
    CreateSubscriptionDto, Subscription, SubscriptionHistoryEntry, UpdateSubscriptionDto,
};
use crate::features::limits::guard::require_user;
use crate::features::payments::validate_payment_method_token;
use crate::features::plans::{BillingPeriod, PlanTier};
use crate::shared::errors::{AppError, AppResult, ErrorResponse};
use crate::AppContext;

/// サブスクリプションが認証ユーザーの所有物であることを検証する
///
/// 他ユーザーのIDを指定された場合は存在を漏らさず `NotFound` を返します。
fn ensure_owned_by(ctx: &AppContext, subscription_id: i64, user_id: i64) -> AppResult<()> {
    let subscription = ctx.subscriptions.get(subscription_id)?;
    if subscription.user_id != user_id {
        return Err(AppError::not_found(format!(
            "ID {subscription_id} のサブスクリプション"
        )));
    }
    Ok(())
}

/// サブスクリプション作成DTOのバリデーション
///
/// # 戻り値
/// 解析済みの（階層、請求周期）、または失敗時はバリデーションエラー
fn validate_create_subscription_dto(
    dto: &CreateSubscriptionDto,
) -> AppResult<(PlanTier, BillingPeriod)> {
    let tier = PlanTier::parse(&dto.plan_tier)?;
    let period = BillingPeriod::parse(&dto.billing_period)?;

    // トークンが指定されている場合は形式を検証
    if let Some(ref token) = dto.payment_method_token {
        validate_payment_method_token(token)?;
    }

    Ok((tier, period))
}

/// サブスクリプション更新DTOのバリデーション
fn validate_update_subscription_dto(
    dto: &UpdateSubscriptionDto,
) -> AppResult<(Option<PlanTier>, Option<BillingPeriod>)> {
    let tier = match dto.plan_tier {
        Some(ref value) => Some(PlanTier::parse(value)?),
        None => None,
    };
    let period = match dto.billing_period {
        Some(ref value) => Some(BillingPeriod::parse(value)?),
        None => None,
    };
    Ok((tier, period))
}

/// ユーザーの有効なサブスクリプションを取得する
///
/// # 引数
/// * `ctx` - アプリケーションコンテキスト
/// * `user_id` - 認証済みユーザーID（未認証の場合はNone）
///
/// # 戻り値
/// 有効なサブスクリプション、または失敗時はエラー封筒
pub fn get_current_subscription(
    ctx: &AppContext,
    user_id: Option<i64>,
) -> Result<Subscription, ErrorResponse> {
    let user_id = require_user(user_id)?;
    Ok(ctx.subscriptions.current_for_user(user_id)?)
}

/// サブスクリプションを新規契約する
///
/// # 引数
/// * `ctx` - アプリケーションコンテキスト
/// * `user_id` - 認証済みユーザーID
/// * `dto` - 契約内容（階層、請求周期、支払い方法トークン）
pub fn create_subscription(
    ctx: &AppContext,
    user_id: Option<i64>,
    dto: CreateSubscriptionDto,
) -> Result<Subscription, ErrorResponse> {
    let user_id = require_user(user_id)?;
    let (tier, period) = validate_create_subscription_dto(&dto)?;

    Ok(ctx
        .subscriptions
        .create(user_id, tier, period, dto.payment_method_token.as_deref())?)
}

/// サブスクリプションを変更する（階層・請求周期）
pub fn update_subscription(
    ctx: &AppContext,
    user_id: Option<i64>,
    subscription_id: i64,
    dto: UpdateSubscriptionDto,
) -> Result<Subscription, ErrorResponse> {
    let user_id = require_user(user_id)?;
    let (tier, period) = validate_update_subscription_dto(&dto)?;
    ensure_owned_by(ctx, subscription_id, user_id)?;

    Ok(ctx.subscriptions.update(subscription_id, tier, period)?)
}

/// プランをアップグレードする（即時適用）
pub fn upgrade_subscription(
    ctx: &AppContext,
    user_id: Option<i64>,
    subscription_id: i64,
    target_tier: String,
    new_billing_period: Option<String>,
) -> Result<Subscription, ErrorResponse> {
    let user_id = require_user(user_id)?;
    let tier = PlanTier::parse(&target_tier)?;
    let period = match new_billing_period {
        Some(ref value) => Some(BillingPeriod::parse(value)?),
        None => None,
    };
    ensure_owned_by(ctx, subscription_id, user_id)?;

    Ok(ctx.subscriptions.upgrade(subscription_id, tier, period)?)
}

/// プランのダウングレードを予約する（期間末に適用）
pub fn downgrade_subscription(
    ctx: &AppContext,
    user_id: Option<i64>,
    subscription_id: i64,
    target_tier: String,
) -> Result<Subscription, ErrorResponse> {
    let user_id = require_user(user_id)?;
    let tier = PlanTier::parse(&target_tier)?;
    ensure_owned_by(ctx, subscription_id, user_id)?;

    Ok(ctx.subscriptions.downgrade(subscription_id, tier)?)
}

/// サブスクリプションを解約する
///
/// # 引数
/// * `immediately` - trueなら即時解約、falseなら期間末解約の予約
pub fn cancel_subscription(
    ctx: &AppContext,
    user_id: Option<i64>,
    subscription_id: i64,
    immediately: bool,
) -> Result<Subscription, ErrorResponse> {
    let user_id = require_user(user_id)?;
    ensure_owned_by(ctx, subscription_id, user_id)?;

    Ok(ctx.subscriptions.cancel(subscription_id, immediately)?)
}

/// 期間末解約の予約を取り消して再開する
pub fn reactivate_subscription(
    ctx: &AppContext,
    user_id: Option<i64>,
    subscription_id: i64,
) -> Result<Subscription, ErrorResponse> {
    let user_id = require_user(user_id)?;
    ensure_owned_by(ctx, subscription_id, user_id)?;

    Ok(ctx.subscriptions.reactivate(subscription_id)?)
}

/// ユーザーのサブスクリプション履歴を古い順に取得する
pub fn get_subscription_history(
    ctx: &AppContext,
    user_id: Option<i64>,
) -> Result<Vec<SubscriptionHistoryEntry>, ErrorResponse> {
    let user_id = require_user(user_id)?;
    Ok(ctx.subscriptions.history(user_id)?)
}

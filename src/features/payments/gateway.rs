use super::models::{ChargeKind, ChargeRequest, PaymentReceipt};
use crate::features::plans::catalog;
use crate::shared::errors::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

/// 支払い方法トークンの形式（外部決済プロバイダーの発行形式）
static PAYMENT_TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pm_[A-Za-z0-9]{8,64}$").expect("トークン形式の正規表現が不正"));

/// 支払い方法トークンの形式を検証する
///
/// # 引数
/// * `token` - 検証するトークン
///
/// # 戻り値
/// 形式が正しい場合はOk(())、不正な場合はバリデーションエラー
pub fn validate_payment_method_token(token: &str) -> AppResult<()> {
    if PAYMENT_TOKEN_PATTERN.is_match(token) {
        Ok(())
    } else {
        Err(AppError::validation(
            "支払い方法トークンの形式が不正です".to_string(),
        ))
    }
}

/// 決済コラボレーターのポート
///
/// 課金・返金・プラン変更差額の実処理は外部の決済プロバイダーが担い、
/// このコアは成否のみを受け取ります。ライフサイクル遷移はこの呼び出しと
/// ストア書き込みを同一トランザクションに収め、失敗時は全体を巻き戻します。
pub trait PaymentGateway: Send + Sync {
    /// 課金を実行する
    ///
    /// # 引数
    /// * `request` - 課金要求（ユーザー、階層、周期、トークン、種別）
    ///
    /// # 戻り値
    /// 課金結果、または拒否時は `PaymentFailed`
    fn charge(&self, request: &ChargeRequest) -> AppResult<PaymentReceipt>;

    /// 返金を実行する（即時解約時）
    ///
    /// # 引数
    /// * `user_id` - ユーザーID
    /// * `subscription_id` - 対象サブスクリプションID
    fn refund(&self, user_id: i64, subscription_id: i64) -> AppResult<()>;
}

/// 課金要求から課金額を計算する
///
/// プラン変更時は単純な定価差額のみを計算し、日割り調整は
/// 決済プロバイダー側の責務とします。
fn charge_amount(request: &ChargeRequest) -> f64 {
    let price = catalog::get(request.tier).price_for(request.billing_period);
    match request.kind {
        ChargeKind::Initial | ChargeKind::Renewal => price,
        ChargeKind::PlanChange { from_tier } => {
            let previous = catalog::get(from_tier).price_for(request.billing_period);
            (price - previous).max(0.0)
        }
    }
}

/// 開発用の決済ゲートウェイ
///
/// 実際の決済プロバイダーを呼ばず、トークンの形式検証とログ出力のみを
/// 行います。リファレンスIDはUUIDで採番します。
#[derive(Debug, Default, Clone)]
pub struct DevelopmentPaymentGateway;

impl DevelopmentPaymentGateway {
    pub fn new() -> Self {
        Self
    }
}

impl PaymentGateway for DevelopmentPaymentGateway {
    fn charge(&self, request: &ChargeRequest) -> AppResult<PaymentReceipt> {
        // 初回課金はトークン必須。プラン変更・更新はプロバイダー側に
        // 登録済みの支払い方法へ課金するため、トークンは省略可能。
        match request.payment_method_token.as_deref() {
            Some(token) => {
                validate_payment_method_token(token).map_err(|_| {
                    AppError::payment("支払い方法トークンの形式が不正です".to_string())
                })?;
            }
            None => {
                if matches!(request.kind, ChargeKind::Initial) {
                    return Err(AppError::payment(
                        "支払い方法トークンが指定されていません".to_string(),
                    ));
                }
            }
        }

        let amount = charge_amount(request);
        let reference = Uuid::new_v4().to_string();

        log::info!(
            "開発用決済: user_id={}, tier={}, period={}, amount=¥{:.0}, reference={}",
            request.user_id,
            request.tier.as_str(),
            request.billing_period.as_str(),
            amount,
            reference
        );

        Ok(PaymentReceipt { reference, amount })
    }

    fn refund(&self, user_id: i64, subscription_id: i64) -> AppResult<()> {
        log::info!("開発用返金: user_id={user_id}, subscription_id={subscription_id}");
        Ok(())
    }
}

use super::models::{
    HistoryAction, NewSubscription, Subscription, SubscriptionHistoryEntry, SubscriptionStatus,
};
use super::repository;
use crate::features::payments::{ChargeKind, ChargeRequest, PaymentGateway};
use crate::features::plans::{catalog, compare_tiers, BillingPeriod, PlanTier};
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Days, Months, Utc};
use chrono_tz::Asia::Tokyo;
use chrono_tz::Tz;
use rusqlite::Connection;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

/// サブスクリプションライフサイクルサービス
///
/// 状態機械の全遷移（契約・変更・アップグレード・ダウングレード・解約・
/// 再開・更新・期限切れ）を所有します。ストア書き込みと決済呼び出しを
/// 同一トランザクションに収め、決済失敗時は遷移全体を巻き戻します。
#[derive(Clone)]
pub struct SubscriptionService {
    db: Arc<Mutex<Connection>>,
    payments: Arc<dyn PaymentGateway>,
}

/// JSTで現在時刻を取得する
fn now_jst() -> DateTime<Tz> {
    Utc::now().with_timezone(&Tokyo)
}

/// 保存されたRFC3339日時文字列を解析する
///
/// ストア上の値はこのコア自身が書き込んだものなので、解析失敗は
/// データ破損とみなし内部エラーを返します。
fn parse_timestamp(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| AppError::internal(format!("日時の解析に失敗: {value} ({e})")))
}

/// 請求期間の終了日時を計算する
fn period_end_from(start: DateTime<Tz>, period: BillingPeriod) -> AppResult<DateTime<Tz>> {
    start
        .checked_add_months(Months::new(period.months()))
        .ok_or_else(|| AppError::internal("期間終了日時の計算に失敗"))
}

impl SubscriptionService {
    /// 新しいサブスクリプションサービスを作成する
    ///
    /// # 引数
    /// * `db` - 共有データベース接続
    /// * `payments` - 決済ゲートウェイ
    pub fn new(db: Arc<Mutex<Connection>>, payments: Arc<dyn PaymentGateway>) -> Self {
        Self { db, payments }
    }

    /// 共有接続のロックを取得する
    fn lock_db(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| AppError::internal("データベースロックの取得に失敗"))
    }

    /// サブスクリプションを新規契約する
    ///
    /// # 引数
    /// * `user_id` - ユーザーID
    /// * `tier` - 契約するプラン階層
    /// * `period` - 請求周期
    /// * `payment_method_token` - 支払い方法トークン（無料プランでは不要）
    ///
    /// # 戻り値
    /// 作成されたサブスクリプション、または失敗時はエラー
    ///
    /// # 状態規則
    /// - 有効なサブスクリプションが既に存在する場合は競合エラー
    /// - トライアル付きプランかつ初回利用の場合は `Trialing`、それ以外は `Active`
    /// - 有料プランはトライアルが初回期間全体を覆わない限りトークン必須
    /// - トライアル中でなければ初回課金を実行し、失敗時は契約全体を巻き戻す
    pub fn create(
        &self,
        user_id: i64,
        tier: PlanTier,
        period: BillingPeriod,
        payment_method_token: Option<&str>,
    ) -> AppResult<Subscription> {
        let conn = self.lock_db()?;
        let tx = conn.unchecked_transaction()?;

        // 1ユーザーにつき有効なサブスクリプションは1件まで
        if repository::find_current_for_user(&tx, user_id)?.is_some() {
            return Err(AppError::conflict(
                "有効なサブスクリプションが既に存在します",
            ));
        }

        let plan = catalog::get(tier);
        let now = now_jst();
        let period_end = period_end_from(now, period)?;

        // トライアルは初回契約のみ
        let trialing = plan.has_trial() && !repository::has_ever_trialed(&tx, user_id)?;
        let trial_end = if trialing {
            Some(
                now.checked_add_days(Days::new(plan.trial_days as u64))
                    .ok_or_else(|| AppError::internal("トライアル終了日時の計算に失敗"))?,
            )
        } else {
            None
        };

        // トライアルが初回期間全体を覆う場合のみトークン省略可
        let trial_covers_period = trial_end.map(|end| end >= period_end).unwrap_or(false);
        if !plan.is_free() && !trial_covers_period && payment_method_token.is_none() {
            return Err(AppError::validation(
                "有料プランの契約には支払い方法が必要です",
            ));
        }

        let record = NewSubscription {
            user_id,
            plan_tier: tier,
            billing_period: period,
            status: if trialing {
                SubscriptionStatus::Trialing
            } else {
                SubscriptionStatus::Active
            },
            current_period_start: now.to_rfc3339(),
            current_period_end: period_end.to_rfc3339(),
            trial_end: trial_end.map(|end| end.to_rfc3339()),
        };

        let subscription = repository::insert(&tx, &record)?;
        repository::insert_history(
            &tx,
            subscription.id,
            user_id,
            None,
            tier,
            HistoryAction::Create,
            &now.to_rfc3339(),
        )?;

        // 初回課金（トライアル中は期間更新時まで課金しない）
        if !plan.is_free() && !trialing {
            self.payments.charge(&ChargeRequest {
                user_id,
                tier,
                billing_period: period,
                payment_method_token: payment_method_token.map(str::to_string),
                kind: ChargeKind::Initial,
            })?;
        }

        tx.commit()?;

        log::info!(
            "サブスクリプションを契約: user_id={user_id}, tier={}, status={}",
            tier.as_str(),
            subscription.status.as_str()
        );

        Ok(subscription)
    }

    /// サブスクリプションを汎用的に変更する
    ///
    /// 階層の変更はアップグレード／ダウングレードの規則に委譲し、
    /// 請求周期のみの変更は即時適用します（履歴は記録しない。次回更新から
    /// 新しい周期で請求される）。
    ///
    /// # 引数
    /// * `subscription_id` - サブスクリプションID
    /// * `new_tier` - 変更後の階層（変更しない場合はNone）
    /// * `new_period` - 変更後の請求周期（変更しない場合はNone）
    pub fn update(
        &self,
        subscription_id: i64,
        new_tier: Option<PlanTier>,
        new_period: Option<BillingPeriod>,
    ) -> AppResult<Subscription> {
        let conn = self.lock_db()?;
        let tx = conn.unchecked_transaction()?;

        let subscription = repository::find_by_id(&tx, subscription_id)?;
        ensure_mutable(&subscription)?;

        let updated = match new_tier {
            Some(target) if target != subscription.plan_tier => {
                // 階層差分に応じてアップグレード／ダウングレードへ委譲
                match compare_tiers(target, subscription.plan_tier) {
                    Ordering::Greater => {
                        self.upgrade_in_tx(&tx, subscription, target, new_period)?
                    }
                    Ordering::Less => {
                        let mut changed = subscription;
                        if let Some(period) = new_period {
                            changed.billing_period = period;
                        }
                        changed.pending_tier = Some(target);
                        self.downgrade_in_tx(&tx, changed)?
                    }
                    Ordering::Equal => unreachable!("同一階層は上の分岐で除外済み"),
                }
            }
            _ => {
                // 周期のみの変更
                let Some(period) = new_period else {
                    return Err(AppError::validation("変更内容が指定されていません"));
                };
                let mut changed = subscription;
                changed.billing_period = period;
                repository::update_versioned(&tx, &changed)?
            }
        };

        tx.commit()?;
        Ok(updated)
    }

    /// プランをアップグレードする（即時適用）
    ///
    /// # 引数
    /// * `subscription_id` - サブスクリプションID
    /// * `target_tier` - アップグレード先の階層（現在より上位であること）
    /// * `new_period` - 同時に変更する請求周期（省略可）
    ///
    /// # 状態規則
    /// - `Active` / `Trialing` のみ許可
    /// - 同一階層・下位階層の指定は `InvalidTransition`
    /// - 期間境界は変更しない（日割り計算は決済コラボレーターの責務）
    /// - 予約済みダウングレードは取り消される
    pub fn upgrade(
        &self,
        subscription_id: i64,
        target_tier: PlanTier,
        new_period: Option<BillingPeriod>,
    ) -> AppResult<Subscription> {
        let conn = self.lock_db()?;
        let tx = conn.unchecked_transaction()?;

        let subscription = repository::find_by_id(&tx, subscription_id)?;
        let updated = self.upgrade_in_tx(&tx, subscription, target_tier, new_period)?;

        tx.commit()?;
        Ok(updated)
    }

    /// トランザクション内でアップグレードを適用する
    fn upgrade_in_tx(
        &self,
        conn: &Connection,
        mut subscription: Subscription,
        target_tier: PlanTier,
        new_period: Option<BillingPeriod>,
    ) -> AppResult<Subscription> {
        ensure_mutable(&subscription)?;

        if compare_tiers(target_tier, subscription.plan_tier) != Ordering::Greater {
            return Err(AppError::invalid_transition(format!(
                "アップグレード先は現在の階層（{}）より上位である必要があります（請求周期のみの変更はupdateを使用してください）",
                subscription.plan_tier.as_str()
            )));
        }

        let from_tier = subscription.plan_tier;
        let was_trialing = subscription.status == SubscriptionStatus::Trialing;

        subscription.plan_tier = target_tier;
        if let Some(period) = new_period {
            subscription.billing_period = period;
        }
        // 予約済みダウングレードは上位への変更で無効になる
        subscription.pending_tier = None;

        let updated = repository::update_versioned(conn, &subscription)?;
        repository::insert_history(
            conn,
            subscription.id,
            subscription.user_id,
            Some(from_tier),
            target_tier,
            HistoryAction::Upgrade,
            &now_jst().to_rfc3339(),
        )?;

        // 差額課金（トライアル中は課金前なので対象外）。失敗時は巻き戻し。
        if !was_trialing {
            self.payments.charge(&ChargeRequest {
                user_id: subscription.user_id,
                tier: target_tier,
                billing_period: updated.billing_period,
                payment_method_token: None,
                kind: ChargeKind::PlanChange { from_tier },
            })?;
        }

        log::info!(
            "プランをアップグレード: subscription_id={}, {} -> {}",
            subscription.id,
            from_tier.as_str(),
            target_tier.as_str()
        );

        Ok(updated)
    }

    /// プランのダウングレードを予約する（期間末に適用）
    ///
    /// # 引数
    /// * `subscription_id` - サブスクリプションID
    /// * `target_tier` - ダウングレード先の階層（現在より下位であること）
    ///
    /// # 状態規則
    /// - `Active` / `Trialing` のみ許可
    /// - 同一階層・上位階層の指定は `InvalidTransition`
    /// - `plan_tier` は変更せず `pending_tier` に予約を記録する
    ///   （期間途中の上限回避を防ぐ。適用は期間更新処理が行う）
    /// - 履歴は予約時点で記録する。決済呼び出しは行わない
    pub fn downgrade(&self, subscription_id: i64, target_tier: PlanTier) -> AppResult<Subscription> {
        let conn = self.lock_db()?;
        let tx = conn.unchecked_transaction()?;

        let mut subscription = repository::find_by_id(&tx, subscription_id)?;
        ensure_mutable(&subscription)?;

        if compare_tiers(target_tier, subscription.plan_tier) != Ordering::Less {
            return Err(AppError::invalid_transition(format!(
                "ダウングレード先は現在の階層（{}）より下位である必要があります（請求周期のみの変更はupdateを使用してください）",
                subscription.plan_tier.as_str()
            )));
        }

        subscription.pending_tier = Some(target_tier);
        let updated = self.downgrade_in_tx(&tx, subscription)?;

        tx.commit()?;
        Ok(updated)
    }

    /// トランザクション内でダウングレード予約を適用する
    ///
    /// 呼び出し側で `pending_tier` を設定済みであること。
    fn downgrade_in_tx(&self, conn: &Connection, subscription: Subscription) -> AppResult<Subscription> {
        let target_tier = match subscription.pending_tier {
            Some(tier) => tier,
            None => {
                return Err(AppError::internal(
                    "ダウングレード先が設定されていません",
                ))
            }
        };

        let updated = repository::update_versioned(conn, &subscription)?;
        repository::insert_history(
            conn,
            subscription.id,
            subscription.user_id,
            Some(subscription.plan_tier),
            target_tier,
            HistoryAction::Downgrade,
            &now_jst().to_rfc3339(),
        )?;

        log::info!(
            "ダウングレードを予約: subscription_id={}, {} -> {}（期間末に適用）",
            subscription.id,
            subscription.plan_tier.as_str(),
            target_tier.as_str()
        );

        Ok(updated)
    }

    /// サブスクリプションを解約する
    ///
    /// # 引数
    /// * `subscription_id` - サブスクリプションID
    /// * `immediately` - trueなら即時解約（期間を今終了し、有料プランは返金を依頼）、
    ///   falseなら期間末解約の予約（期間末までは利用可能）
    ///
    /// # 状態規則
    /// - 終端状態（`Canceled` / `Expired`）からの解約は `InvalidState`
    /// - 期間末解約の予約は冪等（予約済みなら履歴を重複させず現状を返す）
    /// - 予約済み状態からの即時解約は解約を確定させる
    pub fn cancel(&self, subscription_id: i64, immediately: bool) -> AppResult<Subscription> {
        let conn = self.lock_db()?;
        let tx = conn.unchecked_transaction()?;

        let mut subscription = repository::find_by_id(&tx, subscription_id)?;
        if subscription.is_terminal() {
            return Err(AppError::invalid_state(format!(
                "{} 状態のサブスクリプションは解約できません",
                subscription.status.as_str()
            )));
        }

        let now = now_jst();

        let updated = if immediately {
            let was_trialing = subscription.status == SubscriptionStatus::Trialing;
            let paid_plan = !catalog::get(subscription.plan_tier).is_free();

            subscription.status = SubscriptionStatus::Canceled;
            subscription.current_period_end = now.to_rfc3339();
            subscription.cancel_at_period_end = false;
            subscription.pending_tier = None;

            let updated = repository::update_versioned(&tx, &subscription)?;
            repository::insert_history(
                &tx,
                subscription.id,
                subscription.user_id,
                Some(subscription.plan_tier),
                subscription.plan_tier,
                HistoryAction::Cancel,
                &now.to_rfc3339(),
            )?;

            // 有料プランの即時解約は返金を依頼（トライアル中は課金前なので対象外）
            if paid_plan && !was_trialing {
                self.payments.refund(subscription.user_id, subscription.id)?;
            }

            log::info!("サブスクリプションを即時解約: subscription_id={subscription_id}");
            updated
        } else {
            // 予約済みなら何もしない（履歴を重複させない）
            if subscription.status == SubscriptionStatus::PendingCancellation {
                tx.commit()?;
                return Ok(subscription);
            }

            subscription.status = SubscriptionStatus::PendingCancellation;
            subscription.cancel_at_period_end = true;

            let updated = repository::update_versioned(&tx, &subscription)?;
            repository::insert_history(
                &tx,
                subscription.id,
                subscription.user_id,
                Some(subscription.plan_tier),
                subscription.plan_tier,
                HistoryAction::Cancel,
                &now.to_rfc3339(),
            )?;

            log::info!("期間末解約を予約: subscription_id={subscription_id}");
            updated
        };

        tx.commit()?;
        Ok(updated)
    }

    /// 期間末解約の予約を取り消して再開する
    ///
    /// # 状態規則
    /// - `PendingCancellation` かつ期間内のみ許可
    /// - 完全に解約・期限切れしたサブスクリプションの再開は不可（新規契約が必要）
    /// - 連続して呼ぶと2回目は `InvalidState`（二重適用なし）
    pub fn reactivate(&self, subscription_id: i64) -> AppResult<Subscription> {
        let conn = self.lock_db()?;
        let tx = conn.unchecked_transaction()?;

        let mut subscription = repository::find_by_id(&tx, subscription_id)?;
        if subscription.status != SubscriptionStatus::PendingCancellation {
            return Err(AppError::invalid_state(format!(
                "解約予約中のサブスクリプションのみ再開できます（現在: {}）",
                subscription.status.as_str()
            )));
        }

        let now = now_jst().with_timezone(&Utc);
        let period_end = parse_timestamp(&subscription.current_period_end)?;
        if now >= period_end {
            return Err(AppError::invalid_state(
                "請求期間が終了しているため再開できません。新規契約してください",
            ));
        }

        subscription.status = SubscriptionStatus::Active;
        subscription.cancel_at_period_end = false;

        let updated = repository::update_versioned(&tx, &subscription)?;
        repository::insert_history(
            &tx,
            subscription.id,
            subscription.user_id,
            Some(subscription.plan_tier),
            subscription.plan_tier,
            HistoryAction::Reactivate,
            &now_jst().to_rfc3339(),
        )?;

        tx.commit()?;

        log::info!("サブスクリプションを再開: subscription_id={subscription_id}");
        Ok(updated)
    }

    /// 請求期間を更新する（外部の更新スケジューラーが期間満了時に呼ぶ）
    ///
    /// # 状態規則
    /// - 期間が満了していない場合は `InvalidState`
    /// - `PendingCancellation` は解約を確定する（履歴は予約時に記録済み）
    /// - 予約済みダウングレードをここで適用し、次の期間を開始する
    /// - 有料プランは更新課金を実行し、失敗時は更新全体を巻き戻す
    pub fn renew(&self, subscription_id: i64) -> AppResult<Subscription> {
        let conn = self.lock_db()?;
        let tx = conn.unchecked_transaction()?;

        let mut subscription = repository::find_by_id(&tx, subscription_id)?;
        if subscription.is_terminal() {
            return Err(AppError::invalid_state(format!(
                "{} 状態のサブスクリプションは更新できません",
                subscription.status.as_str()
            )));
        }

        let now = now_jst().with_timezone(&Utc);
        let period_end = parse_timestamp(&subscription.current_period_end)?;
        if now < period_end {
            return Err(AppError::invalid_state(
                "請求期間がまだ終了していません",
            ));
        }

        // 期間末解約の確定
        if subscription.status == SubscriptionStatus::PendingCancellation {
            subscription.status = SubscriptionStatus::Canceled;
            subscription.cancel_at_period_end = false;
            subscription.pending_tier = None;

            let updated = repository::update_versioned(&tx, &subscription)?;
            tx.commit()?;

            log::info!("期間末解約を確定: subscription_id={subscription_id}");
            return Ok(updated);
        }

        let from_tier = subscription.plan_tier;

        // 予約済みダウングレードを期間境界で適用
        if let Some(target) = subscription.pending_tier.take() {
            subscription.plan_tier = target;
        }
        subscription.status = SubscriptionStatus::Active;

        // 次の期間は前の期間の終了時点から開始（請求の連続性を保つ）
        let next_start = period_end.with_timezone(&Tokyo);
        let next_end = period_end_from(next_start, subscription.billing_period)?;
        subscription.current_period_start = next_start.to_rfc3339();
        subscription.current_period_end = next_end.to_rfc3339();

        let updated = repository::update_versioned(&tx, &subscription)?;
        repository::insert_history(
            &tx,
            subscription.id,
            subscription.user_id,
            Some(from_tier),
            subscription.plan_tier,
            HistoryAction::Renew,
            &now_jst().to_rfc3339(),
        )?;

        // 更新課金。失敗時は巻き戻し。
        if !catalog::get(subscription.plan_tier).is_free() {
            self.payments.charge(&ChargeRequest {
                user_id: subscription.user_id,
                tier: subscription.plan_tier,
                billing_period: subscription.billing_period,
                payment_method_token: None,
                kind: ChargeKind::Renewal,
            })?;
        }

        tx.commit()?;

        log::info!(
            "請求期間を更新: subscription_id={subscription_id}, tier={}",
            updated.plan_tier.as_str()
        );
        Ok(updated)
    }

    /// 更新されなかったサブスクリプションを期限切れにする
    ///
    /// 決済呼び出しは行いません。
    pub fn expire(&self, subscription_id: i64) -> AppResult<Subscription> {
        let conn = self.lock_db()?;
        let tx = conn.unchecked_transaction()?;

        let mut subscription = repository::find_by_id(&tx, subscription_id)?;
        if subscription.is_terminal() {
            return Err(AppError::invalid_state(format!(
                "{} 状態のサブスクリプションは期限切れにできません",
                subscription.status.as_str()
            )));
        }

        let now = now_jst().with_timezone(&Utc);
        let period_end = parse_timestamp(&subscription.current_period_end)?;
        if now < period_end {
            return Err(AppError::invalid_state(
                "請求期間がまだ終了していません",
            ));
        }

        subscription.status = SubscriptionStatus::Expired;
        subscription.cancel_at_period_end = false;
        subscription.pending_tier = None;

        let updated = repository::update_versioned(&tx, &subscription)?;
        tx.commit()?;

        log::info!("サブスクリプションが期限切れ: subscription_id={subscription_id}");
        Ok(updated)
    }

    /// IDでサブスクリプションを取得する（状態を問わない）
    pub fn get(&self, subscription_id: i64) -> AppResult<Subscription> {
        let conn = self.lock_db()?;
        repository::find_by_id(&conn, subscription_id)
    }

    /// ユーザーの有効なサブスクリプションを取得する
    ///
    /// # 戻り値
    /// 有効なサブスクリプション、存在しない場合は `NotFound`
    pub fn current_for_user(&self, user_id: i64) -> AppResult<Subscription> {
        let conn = self.lock_db()?;
        repository::find_current_for_user(&conn, user_id)?
            .ok_or_else(|| AppError::not_found("有効なサブスクリプション"))
    }

    /// ユーザーの履歴を古い順に取得する
    pub fn history(&self, user_id: i64) -> AppResult<Vec<SubscriptionHistoryEntry>> {
        let conn = self.lock_db()?;
        repository::history_for_user(&conn, user_id)
    }
}

/// 変更系遷移（update / upgrade / downgrade）が許可される状態かを検証する
///
/// 終端状態は変更不可。解約予約中はまず再開が必要。
fn ensure_mutable(subscription: &Subscription) -> AppResult<()> {
    match subscription.status {
        SubscriptionStatus::Active | SubscriptionStatus::Trialing => Ok(()),
        SubscriptionStatus::PendingCancellation => Err(AppError::invalid_state(
            "解約予約中は変更できません。先に再開してください",
        )),
        SubscriptionStatus::Canceled | SubscriptionStatus::Expired => {
            Err(AppError::invalid_state(format!(
                "{} 状態のサブスクリプションは変更できません",
                subscription.status.as_str()
            )))
        }
    }
}

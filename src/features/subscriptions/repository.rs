use super::models::{
    HistoryAction, NewSubscription, Subscription, SubscriptionHistoryEntry,
};
use crate::features::plans::PlanTier;
use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use chrono_tz::Asia::Tokyo;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// SELECT句のカラム並び（行マッパーと対で維持する）
const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_tier, billing_period, status, \
     current_period_start, current_period_end, cancel_at_period_end, pending_tier, \
     trial_end, version, created_at, updated_at";

/// サブスクリプション行をモデルに変換する
fn map_subscription_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        plan_tier: row.get(2)?,
        billing_period: row.get(3)?,
        status: row.get(4)?,
        current_period_start: row.get(5)?,
        current_period_end: row.get(6)?,
        cancel_at_period_end: row.get::<_, i64>(7)? != 0,
        pending_tier: row.get(8)?,
        trial_end: row.get(9)?,
        version: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// サブスクリプションを新規作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `record` - 新規作成レコード
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
pub fn insert(conn: &Connection, record: &NewSubscription) -> AppResult<Subscription> {
    // JSTで現在時刻を取得
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();

    conn.execute(
        "INSERT INTO subscriptions
         (user_id, plan_tier, billing_period, status, current_period_start, current_period_end,
          cancel_at_period_end, pending_tier, trial_end, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, 1, ?8, ?9)",
        params![
            record.user_id,
            record.plan_tier,
            record.billing_period,
            record.status,
            record.current_period_start,
            record.current_period_end,
            record.trial_end,
            now,
            now
        ],
    )
    .map_err(|e| match e {
        // 部分一意インデックス違反 = 有効なサブスクリプションが既に存在する
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::conflict("有効なサブスクリプションが既に存在します")
        }
        _ => AppError::Database(e.to_string()),
    })?;

    let id = conn.last_insert_rowid();
    find_by_id(conn, id)
}

/// IDでサブスクリプションを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// サブスクリプション、または失敗時はエラー
pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Subscription> {
    conn.query_row(
        &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1"),
        params![id],
        map_subscription_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::not_found(format!("ID {id} のサブスクリプション"))
        }
        _ => AppError::Database(e.to_string()),
    })
}

/// ユーザーの有効な（非終端の）サブスクリプションを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `user_id` - ユーザーID
///
/// # 戻り値
/// 有効なサブスクリプション（存在しない場合はNone）、または失敗時はエラー
pub fn find_current_for_user(
    conn: &Connection,
    user_id: i64,
) -> AppResult<Option<Subscription>> {
    conn.query_row(
        &format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE user_id = ?1 AND status IN ('trialing', 'active', 'pending_cancellation')"
        ),
        params![user_id],
        map_subscription_row,
    )
    .optional()
    .map_err(|e| AppError::Database(e.to_string()))
}

/// ユーザーが過去にトライアルを利用したことがあるかを判定する
///
/// 過去のサブスクリプション行（終端状態を含む）にトライアル終了日時が
/// 記録されていれば利用済みとみなします。
pub fn has_ever_trialed(conn: &Connection, user_id: i64) -> AppResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subscriptions WHERE user_id = ?1 AND trial_end IS NOT NULL",
        params![user_id],
        |row| row.get(0),
    )?;

    Ok(count > 0)
}

/// サブスクリプションを楽観的排他制御付きで更新する
///
/// `WHERE id AND version` で読み取り時点のバージョンを検証し、
/// 他の操作が先に更新していた場合は競合エラーを返します
/// （後勝ちで解約やダウングレードが黙って巻き戻るのを防ぐ）。
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - 読み取り時点のバージョンを保持した更新後の状態
///
/// # 戻り値
/// 更新後のサブスクリプション、または競合・失敗時はエラー
pub fn update_versioned(
    conn: &Connection,
    subscription: &Subscription,
) -> AppResult<Subscription> {
    // JSTで現在時刻を取得
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();

    let rows_affected = conn.execute(
        "UPDATE subscriptions
         SET plan_tier = ?1, billing_period = ?2, status = ?3,
             current_period_start = ?4, current_period_end = ?5,
             cancel_at_period_end = ?6, pending_tier = ?7, trial_end = ?8,
             version = version + 1, updated_at = ?9
         WHERE id = ?10 AND version = ?11",
        params![
            subscription.plan_tier,
            subscription.billing_period,
            subscription.status,
            subscription.current_period_start,
            subscription.current_period_end,
            subscription.cancel_at_period_end as i64,
            subscription.pending_tier,
            subscription.trial_end,
            now,
            subscription.id,
            subscription.version
        ],
    )?;

    if rows_affected == 0 {
        return Err(AppError::conflict(
            "サブスクリプションが他の操作によって更新されました。再度取得してやり直してください",
        ));
    }

    find_by_id(conn, subscription.id)
}

/// 履歴エントリを追記する
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription_id` - サブスクリプションID
/// * `user_id` - ユーザーID
/// * `from_tier` - 遷移前の階層（新規契約時はNone）
/// * `to_tier` - 遷移後の階層
/// * `action` - 遷移種別
/// * `occurred_at` - 発生日時（RFC3339形式）
pub fn insert_history(
    conn: &Connection,
    subscription_id: i64,
    user_id: i64,
    from_tier: Option<PlanTier>,
    to_tier: PlanTier,
    action: HistoryAction,
    occurred_at: &str,
) -> AppResult<()> {
    conn.execute(
        "INSERT INTO subscription_history
         (subscription_id, user_id, from_tier, to_tier, action, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![subscription_id, user_id, from_tier, to_tier, action, occurred_at],
    )?;

    Ok(())
}

/// ユーザーの履歴を古い順に取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `user_id` - ユーザーID
///
/// # 戻り値
/// 履歴エントリのリスト（古い順）、または失敗時はエラー
pub fn history_for_user(
    conn: &Connection,
    user_id: i64,
) -> AppResult<Vec<SubscriptionHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, subscription_id, user_id, from_tier, to_tier, action, occurred_at
         FROM subscription_history
         WHERE user_id = ?1
         ORDER BY occurred_at ASC, id ASC",
    )?;

    let entries = stmt.query_map([user_id], |row| {
        Ok(SubscriptionHistoryEntry {
            id: row.get(0)?,
            subscription_id: row.get(1)?,
            user_id: row.get(2)?,
            from_tier: row.get(3)?,
            to_tier: row.get(4)?,
            action: row.get(5)?,
            occurred_at: row.get(6)?,
        })
    })?;

    entries
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}

use crate::shared::config::environment::{get_database_filename, get_environment};
use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use std::path::PathBuf;

/// データベース接続を初期化し、スキーマを作成する
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. アプリケーションデータディレクトリの確保
/// 2. 環境に応じたデータベースファイルパスの決定
/// 3. データベース接続の開設
/// 4. テーブル・インデックスの作成
pub fn initialize_database() -> AppResult<Connection> {
    let database_path = get_database_path()?;

    let conn = Connection::open(&database_path)?;

    create_tables(&conn)?;

    log::info!("データベースを初期化しました: {database_path:?}");

    Ok(conn)
}

/// アプリデータディレクトリ内のデータベースファイルパスを取得する
///
/// # 戻り値
/// データベースファイルのパス、または失敗時はエラー
pub fn get_database_path() -> AppResult<PathBuf> {
    // アプリケーションデータディレクトリを取得
    let base_dir = dirs::data_local_dir().ok_or_else(|| {
        AppError::Configuration("アプリデータディレクトリの取得に失敗".to_string())
    })?;
    let app_data_dir = base_dir.join("subscription-core");

    // ディレクトリが存在しない場合は作成
    if !app_data_dir.exists() {
        std::fs::create_dir_all(&app_data_dir).map_err(|e| {
            AppError::Configuration(format!("アプリデータディレクトリの作成に失敗: {e}"))
        })?;
        log::info!("アプリケーションデータディレクトリを作成: {app_data_dir:?}");
    }

    // 環境に応じたデータベースファイル名を決定
    let db_filename = get_database_filename(get_environment());

    Ok(app_data_dir.join(db_filename))
}

/// テスト用のインメモリデータベース接続を作成する
///
/// # 戻り値
/// スキーマ作成済みのインメモリ接続、または失敗時はエラー
pub fn create_in_memory_connection() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    create_tables(&conn)?;
    Ok(conn)
}

/// データベーステーブルを作成する
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    create_subscriptions_table(conn)?;
    create_subscription_history_table(conn)?;
    create_wallets_table(conn)?;
    create_accounts_table(conn)?;

    Ok(())
}

/// サブスクリプションテーブルを作成する
fn create_subscriptions_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            plan_tier TEXT NOT NULL CHECK(plan_tier IN ('free', 'pro', 'ultimate')),
            billing_period TEXT NOT NULL CHECK(billing_period IN ('monthly', 'yearly')),
            status TEXT NOT NULL CHECK(status IN ('trialing', 'active', 'pending_cancellation', 'canceled', 'expired')),
            current_period_start TEXT NOT NULL,
            current_period_end TEXT NOT NULL,
            cancel_at_period_end INTEGER NOT NULL DEFAULT 0,
            pending_tier TEXT CHECK(pending_tier IS NULL OR pending_tier IN ('free', 'pro', 'ultimate')),
            trial_end TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ユーザーごとに非終端状態のサブスクリプションは1件のみ（部分一意インデックス）
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_subscriptions_user_active
         ON subscriptions(user_id)
         WHERE status IN ('trialing', 'active', 'pending_cancellation')",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id)",
        [],
    )?;

    Ok(())
}

/// サブスクリプション履歴テーブルを作成する（追記専用）
fn create_subscription_history_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscription_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subscription_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            from_tier TEXT CHECK(from_tier IS NULL OR from_tier IN ('free', 'pro', 'ultimate')),
            to_tier TEXT NOT NULL CHECK(to_tier IN ('free', 'pro', 'ultimate')),
            action TEXT NOT NULL CHECK(action IN ('create', 'upgrade', 'downgrade', 'cancel', 'reactivate', 'renew')),
            occurred_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscription_history_user
         ON subscription_history(user_id, occurred_at)",
        [],
    )?;

    Ok(())
}

/// ウォレットテーブルを作成する
fn create_wallets_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS wallets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            currency TEXT NOT NULL DEFAULT 'JPY',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_wallets_user ON wallets(user_id)",
        [],
    )?;

    Ok(())
}

/// 連携口座テーブルを作成する
fn create_accounts_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            institution TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id)",
        [],
    )?;

    Ok(())
}

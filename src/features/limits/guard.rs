use super::models::LimitCheckResult;
use super::service;
use crate::features::plans::ResourceKind;
use crate::shared::errors::{AppError, AppResult, ErrorResponse};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};

/// 認証済みユーザーIDの存在を検証する
///
/// このコアは認証自体を行わず、上流が検証済みの識別子を信頼します。
///
/// # 引数
/// * `user_id` - 上流から渡されたユーザーID（未認証の場合はNone）
///
/// # 戻り値
/// ユーザーID、または未認証エラー
pub fn require_user(user_id: Option<i64>) -> AppResult<i64> {
    match user_id {
        Some(id) if id > 0 => Ok(id),
        _ => Err(AppError::Unauthenticated),
    }
}

/// クォータゲート
///
/// 保護対象の作成操作の前段に合成する境界アダプター。上限の強制と
/// 保護対象の挿入を同一トランザクションに収めることで、並行する作成
/// 要求がチェックをすり抜けてもコミット時点で上限を超えないことを
/// 保証します（チェック後挿入前の競合への対策）。
#[derive(Clone)]
pub struct QuotaGate {
    db: Arc<Mutex<Connection>>,
}

impl QuotaGate {
    /// 新しいクォータゲートを作成する
    ///
    /// # 引数
    /// * `db` - 共有データベース接続
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// 共有接続のロックを取得する
    fn lock_db(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| AppError::internal("データベースロックの取得に失敗"))
    }

    /// 上限を強制してから保護対象の操作を同一トランザクションで実行する
    ///
    /// # 引数
    /// * `user_id` - 上流から渡されたユーザーID
    /// * `kind` - 上限対象のリソース種別
    /// * `action` - 保護対象の操作（トランザクション接続と検証済みユーザーIDを受け取る）
    ///
    /// # 戻り値
    /// 操作の結果、または拒否・失敗時はエラー封筒
    ///
    /// # トランザクション
    /// 強制チェックと操作は1つのトランザクションでコミットされます。
    /// どちらかが失敗した場合は全体が巻き戻り、コミット済みの件数が
    /// プラン上限を超えることはありません。
    pub fn enforce_then<T, F>(
        &self,
        user_id: Option<i64>,
        kind: ResourceKind,
        action: F,
    ) -> Result<T, ErrorResponse>
    where
        F: FnOnce(&Connection, i64) -> AppResult<T>,
    {
        let user_id = require_user(user_id)?;
        let conn = self.lock_db()?;

        let result: AppResult<T> = (|| {
            let tx = conn.unchecked_transaction()?;
            service::enforce(&tx, user_id, kind)?;
            let value = action(&tx, user_id)?;
            tx.commit()?;
            Ok(value)
        })();

        // ログはエラー封筒への変換時に重要度別で一度だけ出力される
        result.map_err(ErrorResponse::from)
    }

    /// 上限チェックの結果のみを取得する（読み取り専用、要求を遮断しない）
    ///
    /// 残数表示などのために判定結果を添付したい呼び出し側が使用します。
    pub fn check_limits(
        &self,
        user_id: Option<i64>,
        kind: ResourceKind,
    ) -> Result<LimitCheckResult, ErrorResponse> {
        let user_id = require_user(user_id)?;
        let conn = self.lock_db()?;

        Ok(service::check(&conn, user_id, kind)?)
    }
}

use crate::features::plans::ResourceKind;
use crate::shared::errors::AppResult;
use rusqlite::{params, Connection};

/// リソース種別が所有テーブルのどれに対応するかを返す
fn table_for(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Wallet => "wallets",
        ResourceKind::Account => "accounts",
    }
}

/// ユーザーの現在のリソース件数を取得する
///
/// 所有テーブルへのCOUNTをその場で実行する読み取り透過の射影で、
/// キャッシュはしません（上限チェックとの不整合を避けるため）。
/// 呼び出し側のトランザクション内でも実行できます。
///
/// # 引数
/// * `conn` - データベース接続（トランザクション可）
/// * `user_id` - ユーザーID
/// * `kind` - リソース種別
///
/// # 戻り値
/// 現在の件数、または失敗時はエラー
pub fn count_for(conn: &Connection, user_id: i64, kind: ResourceKind) -> AppResult<i64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE user_id = ?1", table_for(kind)),
        params![user_id],
        |row| row.get(0),
    )?;

    Ok(count)
}

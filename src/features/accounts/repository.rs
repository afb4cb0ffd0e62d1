use super::models::{Account, CreateAccountDto};
use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use chrono_tz::Asia::Tokyo;
use rusqlite::{params, Connection};

const ACCOUNT_COLUMNS: &str = "id, user_id, name, institution, created_at, updated_at";

fn map_account_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        institution: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// 連携口座を作成する
///
/// 上限の強制と機能チェックは呼び出し側が同一トランザクション内で
/// 行うため、ここでは確認しません。
pub fn create(conn: &Connection, user_id: i64, dto: &CreateAccountDto) -> AppResult<Account> {
    // JSTで現在時刻を取得
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();

    conn.execute(
        "INSERT INTO accounts (user_id, name, institution, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, dto.name, dto.institution, now, now],
    )?;

    let id = conn.last_insert_rowid();
    find_by_id(conn, id)
}

/// IDで連携口座を取得する
pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Account> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
        params![id],
        map_account_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::not_found("連携口座"),
        _ => e.into(),
    })
}

/// ユーザーの連携口座一覧を取得する（作成順）
pub fn find_all_for_user(conn: &Connection, user_id: i64) -> AppResult<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 ORDER BY created_at ASC, id ASC"
    ))?;

    let accounts = stmt
        .query_map(params![user_id], map_account_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(accounts)
}

/// 連携口座を削除する
pub fn delete(conn: &Connection, id: i64) -> AppResult<()> {
    let affected = conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
    if affected == 0 {
        return Err(AppError::not_found("連携口座"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::database::connection::create_in_memory_connection;

    fn create_dto(name: &str) -> CreateAccountDto {
        CreateAccountDto {
            name: name.to_string(),
            institution: "テスト銀行".to_string(),
        }
    }

    #[test]
    fn test_create_and_find() {
        let conn = create_in_memory_connection().unwrap();

        let account = create(&conn, 1, &create_dto("普通預金")).unwrap();
        assert_eq!(account.user_id, 1);
        assert_eq!(account.institution, "テスト銀行");

        let found = find_by_id(&conn, account.id).unwrap();
        assert_eq!(found.name, "普通預金");
    }

    #[test]
    fn test_find_all_scoped_to_user() {
        let conn = create_in_memory_connection().unwrap();

        create(&conn, 1, &create_dto("普通預金")).unwrap();
        create(&conn, 2, &create_dto("他人の口座")).unwrap();

        let accounts = find_all_for_user(&conn, 1).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].user_id, 1);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let conn = create_in_memory_connection().unwrap();

        assert!(matches!(
            delete(&conn, 999).unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}

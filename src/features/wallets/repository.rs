use super::models::{CreateWalletDto, UpdateWalletDto, Wallet};
use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use chrono_tz::Asia::Tokyo;
use rusqlite::{params, Connection};

const WALLET_COLUMNS: &str = "id, user_id, name, currency, created_at, updated_at";

fn map_wallet_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Wallet> {
    Ok(Wallet {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        currency: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// ウォレットを作成する
///
/// 上限の強制は呼び出し側（クォータゲート）が同一トランザクション内で
/// 行うため、ここでは件数を確認しません。
///
/// # 引数
/// * `conn` - データベース接続
/// * `user_id` - 所有ユーザーID
/// * `dto` - ウォレット作成用DTO
///
/// # 戻り値
/// 作成されたウォレット、または失敗時はエラー
pub fn create(conn: &Connection, user_id: i64, dto: &CreateWalletDto) -> AppResult<Wallet> {
    // JSTで現在時刻を取得
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();
    let currency = dto.currency.as_deref().unwrap_or("JPY");

    conn.execute(
        "INSERT INTO wallets (user_id, name, currency, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, dto.name, currency, now, now],
    )?;

    let id = conn.last_insert_rowid();
    find_by_id(conn, id)
}

/// IDでウォレットを取得する
pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Wallet> {
    conn.query_row(
        &format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = ?1"),
        params![id],
        map_wallet_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::not_found("ウォレット"),
        _ => e.into(),
    })
}

/// ユーザーのウォレット一覧を取得する（作成順）
pub fn find_all_for_user(conn: &Connection, user_id: i64) -> AppResult<Vec<Wallet>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = ?1 ORDER BY created_at ASC, id ASC"
    ))?;

    let wallets = stmt
        .query_map(params![user_id], map_wallet_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(wallets)
}

/// ウォレットを更新する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - ウォレットID
/// * `dto` - 更新内容（指定されたフィールドのみ反映）
pub fn update(conn: &Connection, id: i64, dto: &UpdateWalletDto) -> AppResult<Wallet> {
    let existing = find_by_id(conn, id)?;
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();

    let name = dto.name.as_deref().unwrap_or(&existing.name);
    let currency = dto.currency.as_deref().unwrap_or(&existing.currency);

    conn.execute(
        "UPDATE wallets SET name = ?1, currency = ?2, updated_at = ?3 WHERE id = ?4",
        params![name, currency, now, id],
    )?;

    find_by_id(conn, id)
}

/// ウォレットを削除する
///
/// 削除により使用数が減るため、上限到達後でも次の作成が可能になります。
pub fn delete(conn: &Connection, id: i64) -> AppResult<()> {
    let affected = conn.execute("DELETE FROM wallets WHERE id = ?1", params![id])?;
    if affected == 0 {
        return Err(AppError::not_found("ウォレット"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::database::connection::create_in_memory_connection;

    fn setup() -> Connection {
        create_in_memory_connection().unwrap()
    }

    fn create_dto(name: &str) -> CreateWalletDto {
        CreateWalletDto {
            name: name.to_string(),
            currency: None,
        }
    }

    #[test]
    fn test_create_and_find() {
        let conn = setup();

        let wallet = create(&conn, 1, &create_dto("生活費")).unwrap();
        assert_eq!(wallet.user_id, 1);
        assert_eq!(wallet.name, "生活費");
        assert_eq!(wallet.currency, "JPY");

        let found = find_by_id(&conn, wallet.id).unwrap();
        assert_eq!(found.name, "生活費");
    }

    #[test]
    fn test_create_with_explicit_currency() {
        let conn = setup();

        let dto = CreateWalletDto {
            name: "海外口座".to_string(),
            currency: Some("USD".to_string()),
        };
        let wallet = create(&conn, 1, &dto).unwrap();
        assert_eq!(wallet.currency, "USD");
    }

    #[test]
    fn test_find_all_scoped_to_user() {
        let conn = setup();

        create(&conn, 1, &create_dto("生活費")).unwrap();
        create(&conn, 1, &create_dto("貯金")).unwrap();
        create(&conn, 2, &create_dto("他人のウォレット")).unwrap();

        let wallets = find_all_for_user(&conn, 1).unwrap();
        assert_eq!(wallets.len(), 2);
        assert!(wallets.iter().all(|w| w.user_id == 1));
    }

    #[test]
    fn test_update_partial_fields() {
        let conn = setup();
        let wallet = create(&conn, 1, &create_dto("生活費")).unwrap();

        let dto = UpdateWalletDto {
            name: Some("食費".to_string()),
            currency: None,
        };
        let updated = update(&conn, wallet.id, &dto).unwrap();
        assert_eq!(updated.name, "食費");
        assert_eq!(updated.currency, "JPY");
    }

    #[test]
    fn test_delete_removes_row() {
        let conn = setup();
        let wallet = create(&conn, 1, &create_dto("生活費")).unwrap();

        delete(&conn, wallet.id).unwrap();
        assert!(matches!(
            find_by_id(&conn, wallet.id).unwrap_err(),
            AppError::NotFound(_)
        ));

        // 存在しないIDの削除はNotFound
        assert!(matches!(
            delete(&conn, wallet.id).unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}

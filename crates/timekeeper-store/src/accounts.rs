use rusqlite::{params, Connection};

use crate::db::{row_to_account, ACCOUNT_SELECT_SQL};
use crate::error::{Result, StoreError};
use crate::types::{Account, AccountRole};

pub fn create_account(conn: &Connection, email: &str, role: AccountRole) -> Result<Account> {
    match conn.execute(
        "INSERT INTO accounts (email, role) VALUES (?1, ?2)",
        params![email, role.to_string()],
    ) {
        Ok(_) => Ok(Account {
            id: conn.last_insert_rowid(),
            email: email.to_string(),
            role,
        }),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::AlreadyExists {
                kind: "account",
                name: email.to_string(),
            })
        }
        Err(e) => Err(StoreError::Database(e)),
    }
}

/// Case-insensitive lookup — token email claims vary in casing between
/// issuers, and the column collates NOCASE.
pub fn find_account_by_email(conn: &Connection, email: &str) -> Result<Option<Account>> {
    let sql = format!("{ACCOUNT_SELECT_SQL} WHERE email = ?1 COLLATE NOCASE");
    let mut stmt = conn.prepare(&sql)?;
    match stmt.query_row(params![email], row_to_account) {
        Ok(a) => Ok(Some(a)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Database(e)),
    }
}

pub fn list_accounts(conn: &Connection) -> Result<Vec<Account>> {
    let sql = format!("{ACCOUNT_SELECT_SQL} ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_account)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn delete_account(conn: &Connection, id: i64) -> Result<()> {
    let n = conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(StoreError::NotFound {
            kind: "account",
            id: id.to_string(),
        });
    }
    Ok(())
}

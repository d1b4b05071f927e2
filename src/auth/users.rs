use rusqlite::params;

use crate::db::models::User;
use crate::error::AppResult;

/// Insert a user record. Account management proper lives in the hosting
/// application; this exists for seeding and tests.
pub fn create_user(
    conn: &rusqlite::Connection,
    username: &str,
    is_staff: bool,
    is_superuser: bool,
) -> AppResult<User> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, username, is_staff, is_superuser) VALUES (?1, ?2, ?3, ?4)",
        params![id, username, is_staff, is_superuser],
    )?;

    let user = conn.query_row(
        "SELECT id, username, is_staff, is_superuser, created_at FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                is_staff: row.get(2)?,
                is_superuser: row.get(3)?,
                created_at: row.get(4)?,
            })
        },
    )?;
    Ok(user)
}

use rand::Rng;
use rusqlite::params;

use crate::extractors::CurrentUser;
use crate::state::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Create a new session for a user. Returns the session token.
pub fn create_session(pool: &DbPool, user_id: i64, hours: u64) -> Result<String, SessionError> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at)
         VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Resolve a live session token to its active user.
pub fn lookup_session(pool: &DbPool, token: &str) -> Result<Option<CurrentUser>, SessionError> {
    let conn = pool.get()?;
    let result = conn.query_row(
        "SELECT u.id, u.email, u.role FROM sessions s \
         JOIN users u ON u.id = s.user_id \
         WHERE s.token = ?1 AND s.expires_at > datetime('now') AND u.is_active = 1",
        params![token],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
    );

    match result {
        Ok((id, email, role)) => Ok(Some(CurrentUser {
            id,
            email,
            role: role.parse().unwrap_or_default(),
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> Result<(), SessionError> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Drop every session of a user, e.g. after a password change.
pub fn delete_user_sessions(pool: &DbPool, user_id: i64) -> Result<usize, SessionError> {
    let conn = pool.get()?;
    Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

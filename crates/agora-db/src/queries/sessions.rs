//! Login session operations.

use agora_core::{Error, Result, SessionId, UserId};
use rusqlite::Connection;

use crate::models::Session;

/// Store a new session token.
pub fn create_session(
    conn: &Connection,
    user_id: UserId,
    token: &str,
    expires_at: &str,
) -> Result<Session> {
    let id = SessionId::new();
    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id.to_string(), user_id.to_string(), token, expires_at],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Session {
        id,
        user_id,
        token: token.to_string(),
        expires_at: expires_at.to_string(),
    })
}

/// Look up a session that has not expired as of `now`.
pub fn get_valid_session(conn: &Connection, token: &str, now: &str) -> Result<Option<Session>> {
    let result = conn.query_row(
        "SELECT id, user_id, token, expires_at FROM sessions
         WHERE token = ?1 AND expires_at > ?2",
        rusqlite::params![token, now],
        Session::from_row,
    );
    match result {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Delete a session by token. Returns true if a row was deleted.
pub fn delete_session(conn: &Connection, token: &str) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM sessions WHERE token = ?1", [token])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete every session that expired at or before `now`.
pub fn delete_expired_sessions(conn: &Connection, now: &str) -> Result<usize> {
    conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])
        .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::users::tests::make_user;

    #[test]
    fn create_get_delete() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = make_user(&conn, "tok_user", true);

        create_session(&conn, user.id, "abc123", "2099-01-01T00:00:00.000000Z").unwrap();
        let found = get_valid_session(&conn, "abc123", "2025-01-01T00:00:00.000000Z")
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, user.id);

        assert!(delete_session(&conn, "abc123").unwrap());
        assert!(!delete_session(&conn, "abc123").unwrap());
    }

    #[test]
    fn expired_session_is_invisible() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = make_user(&conn, "exp_user", true);

        create_session(&conn, user.id, "old", "2000-01-01T00:00:00.000000Z").unwrap();
        create_session(&conn, user.id, "new", "2099-01-01T00:00:00.000000Z").unwrap();

        let now = "2025-06-01T00:00:00.000000Z";
        assert!(get_valid_session(&conn, "old", now).unwrap().is_none());
        assert_eq!(delete_expired_sessions(&conn, now).unwrap(), 1);
        assert!(get_valid_session(&conn, "new", now).unwrap().is_some());
    }
}

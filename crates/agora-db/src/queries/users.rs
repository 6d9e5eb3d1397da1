//! User account operations.

use agora_core::{Error, Result, UserId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::User;
use crate::queries::follows::{self, AcceptedRequest};
use crate::queries::conflict_or_db;
use crate::time;

const COLS: &str = "id, email, password_hash, first_name, last_name, date_of_birth, \
                    nickname, about_me, avatar, is_public, created_at";

/// Fields supplied at registration time. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub date_of_birth: &'a str,
    pub nickname: Option<&'a str>,
    pub about_me: Option<&'a str>,
    pub avatar: Option<&'a str>,
    pub is_public: bool,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// `Some(None)` clears the nickname.
    pub nickname: Option<Option<String>>,
    pub about_me: Option<String>,
    pub avatar: Option<String>,
    pub is_public: Option<bool>,
}

/// Create a new user and return it.
pub fn create_user(conn: &Connection, new: &NewUser<'_>) -> Result<User> {
    let id = UserId::new();
    let created_at = time::now();

    conn.execute(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, date_of_birth,
                            nickname, about_me, avatar, is_public, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            id.to_string(),
            new.email,
            new.password_hash,
            new.first_name,
            new.last_name,
            new.date_of_birth,
            new.nickname,
            new.about_me,
            new.avatar,
            new.is_public,
            created_at,
        ],
    )
    .map_err(|e| {
        conflict_or_db(e, || {
            "A user with this email or nickname already exists".to_string()
        })
    })?;

    Ok(User {
        id,
        email: new.email.to_string(),
        password_hash: new.password_hash.to_string(),
        first_name: new.first_name.to_string(),
        last_name: new.last_name.to_string(),
        date_of_birth: new.date_of_birth.to_string(),
        nickname: new.nickname.map(str::to_string),
        about_me: new.about_me.map(str::to_string),
        avatar: new.avatar.map(str::to_string),
        is_public: new.is_public,
        created_at,
    })
}

/// Get a user by primary key.
pub fn get_user_by_id(conn: &Connection, id: UserId) -> Result<Option<User>> {
    let result = conn.query_row(
        &format!("SELECT {COLS} FROM users WHERE id = ?1"),
        [id.to_string()],
        User::from_row,
    );
    match result {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Find a user by email or nickname, both compared case-insensitively.
pub fn get_user_by_login(conn: &Connection, identifier: &str) -> Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {COLS} FROM users WHERE email = ?1 OR nickname = ?1 LIMIT 1"),
        [identifier],
        User::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// List users, optionally filtered by a substring of name, nickname or email.
pub fn search_users(
    conn: &Connection,
    query: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<User>> {
    let pattern = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", escape_like(q)));

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLS} FROM users
             WHERE ?1 IS NULL
                OR first_name LIKE ?1 ESCAPE '\\'
                OR last_name LIKE ?1 ESCAPE '\\'
                OR nickname LIKE ?1 ESCAPE '\\'
                OR email LIKE ?1 ESCAPE '\\'
             ORDER BY first_name COLLATE NOCASE, last_name COLLATE NOCASE
             LIMIT ?2 OFFSET ?3"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![pattern, limit, offset], User::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Apply a profile update and return the refreshed user together with any
/// follow requests that were auto-accepted because the profile became public.
pub fn update_profile(
    conn: &Connection,
    id: UserId,
    update: &ProfileUpdate,
) -> Result<(User, Vec<AcceptedRequest>)> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let current = get_user_by_id(&tx, id)?.ok_or_else(|| Error::not_found("user", id))?;

    tx.execute(
        "UPDATE users SET
            first_name = COALESCE(?1, first_name),
            last_name  = COALESCE(?2, last_name),
            nickname   = CASE WHEN ?8 THEN ?3 ELSE nickname END,
            about_me   = COALESCE(?4, about_me),
            avatar     = COALESCE(?5, avatar),
            is_public  = COALESCE(?6, is_public)
         WHERE id = ?7",
        rusqlite::params![
            update.first_name,
            update.last_name,
            update.nickname.clone().flatten(),
            update.about_me,
            update.avatar,
            update.is_public,
            id.to_string(),
            update.nickname.is_some(),
        ],
    )
    .map_err(|e| conflict_or_db(e, || "Nickname is already taken".to_string()))?;

    let accepted = if !current.is_public && update.is_public == Some(true) {
        follows::accept_all_pending(&tx, id)?
    } else {
        Vec::new()
    };

    let user = get_user_by_id(&tx, id)?.ok_or_else(|| Error::not_found("user", id))?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok((user, accepted))
}

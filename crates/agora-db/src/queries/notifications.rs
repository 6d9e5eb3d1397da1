//! Notification storage and the merged inbox view.
//!
//! Pending follow requests live in their own table and are never copied into
//! `notifications`. The inbox projects them into synthetic `follow_request`
//! entries and merges them with stored rows by creation time, so accepting or
//! declining a request removes its notification without any extra write.

use agora_core::{Error, NotificationId, Result, UserId};
use rusqlite::Connection;

use crate::models::{Notification, NotificationKind};
use crate::time;

const COLS: &str = "id, user_id, actor_id, kind, entity_id, is_read, created_at";

/// Store a notification for `user_id`.
pub fn create_notification(
    conn: &Connection,
    user_id: UserId,
    actor_id: Option<UserId>,
    kind: NotificationKind,
    entity_id: Option<&str>,
) -> Result<Notification> {
    if kind == NotificationKind::FollowRequest {
        return Err(Error::Internal(
            "follow_request notifications are derived, not stored".into(),
        ));
    }

    let id = NotificationId::new();
    let created_at = time::now();
    conn.execute(
        "INSERT INTO notifications (id, user_id, actor_id, kind, entity_id, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        rusqlite::params![
            id.to_string(),
            user_id.to_string(),
            actor_id.map(|a| a.to_string()),
            kind.as_str(),
            entity_id,
            created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Notification {
        id: Some(id),
        user_id,
        actor_id,
        kind,
        entity_id: entity_id.map(str::to_string),
        is_read: false,
        created_at,
    })
}

/// Get a stored notification by ID.
pub fn get_notification(conn: &Connection, id: NotificationId) -> Result<Option<Notification>> {
    let result = conn.query_row(
        &format!("SELECT {COLS} FROM notifications WHERE id = ?1"),
        [id.to_string()],
        Notification::from_row,
    );
    match result {
        Ok(n) => Ok(Some(n)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// The user's inbox: stored notifications merged with pending follow
/// requests, newest first, at most `limit` entries.
pub fn list_notifications(conn: &Connection, user_id: UserId, limit: i64) -> Result<Vec<Notification>> {
    let mut stored = {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLS} FROM notifications WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
            ))
            .map_err(|e| Error::database(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![user_id.to_string(), limit], Notification::from_row)
            .map_err(|e| Error::database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::database(e.to_string()))?;
        rows
    };

    let requests = {
        let mut stmt = conn
            .prepare(
                "SELECT id, requester_id, created_at FROM follow_requests WHERE target_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )
            .map_err(|e| Error::database(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![user_id.to_string(), limit], |row| {
                Ok(Notification {
                    id: None,
                    user_id,
                    actor_id: Some(crate::models::parse_id(row, 1)?),
                    kind: NotificationKind::FollowRequest,
                    entity_id: Some(row.get(0)?),
                    is_read: false,
                    created_at: row.get(2)?,
                })
            })
            .map_err(|e| Error::database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::database(e.to_string()))?;
        rows
    };

    stored.extend(requests);
    // Stable sort: on equal timestamps stored rows stay ahead of synthetic ones.
    stored.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    stored.truncate(usize::try_from(limit).unwrap_or(0));
    Ok(stored)
}

/// Unread stored notifications plus pending follow requests.
pub fn unread_count(conn: &Connection, user_id: UserId) -> Result<i64> {
    conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0)
          + (SELECT COUNT(*) FROM follow_requests WHERE target_id = ?1)",
        [user_id.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Mark one of `user_id`'s notifications as read. Returns false when no such
/// notification belongs to the user.
pub fn mark_read(conn: &Connection, id: NotificationId, user_id: UserId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![id.to_string(), user_id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark every stored notification of `user_id` as read.
pub fn mark_all_read(conn: &Connection, user_id: UserId) -> Result<usize> {
    conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
        [user_id.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))
}

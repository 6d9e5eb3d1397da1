//! Follow graph and follow-request state.
//!
//! A follow against a public profile takes effect immediately. A follow
//! against a private profile creates a pending request that the target
//! accepts or declines; accepting turns it into a follow and notifies the
//! requester.

use agora_core::{Error, FollowRequestId, Result, UserId};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::models::{FollowRequest, Notification, NotificationKind, User};
use crate::queries::{notifications, users};
use crate::time;

const REQUEST_COLS: &str = "id, requester_id, target_id, created_at";

/// Relationship of a viewer to another user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    None,
    Requested,
    Following,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::None => "none",
            Relationship::Requested => "requested",
            Relationship::Following => "following",
        }
    }
}

/// Result of [`follow`].
#[derive(Debug, Clone)]
pub enum FollowOutcome {
    /// The follower already followed the target.
    AlreadyFollowing,
    /// A new follow was recorded and the target notified.
    Followed { notification: Notification },
    /// The target is private; `created` is false when the request existed.
    Requested { request: FollowRequest, created: bool },
}

impl FollowOutcome {
    pub fn relationship(&self) -> Relationship {
        match self {
            FollowOutcome::AlreadyFollowing | FollowOutcome::Followed { .. } => {
                Relationship::Following
            }
            FollowOutcome::Requested { .. } => Relationship::Requested,
        }
    }
}

/// A follow request that was turned into a follow.
#[derive(Debug, Clone)]
pub struct AcceptedRequest {
    pub request: FollowRequest,
    pub notification: Notification,
}

/// Whether `follower` follows `followee`.
pub fn is_following(conn: &Connection, follower: UserId, followee: UserId) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followee_id = ?2)",
        rusqlite::params![follower.to_string(), followee.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Relationship of `viewer` towards `target`.
pub fn relationship(conn: &Connection, viewer: UserId, target: UserId) -> Result<Relationship> {
    if is_following(conn, viewer, target)? {
        return Ok(Relationship::Following);
    }
    if get_request_between(conn, viewer, target)?.is_some() {
        return Ok(Relationship::Requested);
    }
    Ok(Relationship::None)
}

/// Follow `target`, or ask to when the target's profile is private.
pub fn follow(conn: &Connection, follower: UserId, target: UserId) -> Result<FollowOutcome> {
    if follower == target {
        return Err(Error::validation("You cannot follow yourself"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let target_user = users::get_user_by_id(&tx, target)?.ok_or_else(|| Error::not_found("user", target))?;

    let outcome = if is_following(&tx, follower, target)? {
        FollowOutcome::AlreadyFollowing
    } else if target_user.is_public {
        insert_follow(&tx, follower, target)?;
        let notification =
            notifications::create_notification(&tx, target, Some(follower), NotificationKind::Follow, None)?;
        FollowOutcome::Followed { notification }
    } else if let Some(request) = get_request_between(&tx, follower, target)? {
        FollowOutcome::Requested {
            request,
            created: false,
        }
    } else {
        let request = insert_request(&tx, follower, target)?;
        FollowOutcome::Requested {
            request,
            created: true,
        }
    };

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(outcome)
}

fn insert_follow(conn: &Connection, follower: UserId, followee: UserId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO follows (follower_id, followee_id, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![follower.to_string(), followee.to_string(), time::now()],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

fn insert_request(conn: &Connection, requester: UserId, target: UserId) -> Result<FollowRequest> {
    let id = FollowRequestId::new();
    let created_at = time::now();
    conn.execute(
        "INSERT INTO follow_requests (id, requester_id, target_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id.to_string(), requester.to_string(), target.to_string(), created_at],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(FollowRequest {
        id,
        requester_id: requester,
        target_id: target,
        created_at,
    })
}

/// Stop following `target` and withdraw any pending request. Returns true if
/// anything was removed.
pub fn unfollow(conn: &Connection, follower: UserId, target: UserId) -> Result<bool> {
    let removed_follow = conn
        .execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
            rusqlite::params![follower.to_string(), target.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let removed_request = conn
        .execute(
            "DELETE FROM follow_requests WHERE requester_id = ?1 AND target_id = ?2",
            rusqlite::params![follower.to_string(), target.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(removed_follow + removed_request > 0)
}

/// Get a follow request by ID.
pub fn get_follow_request(conn: &Connection, id: FollowRequestId) -> Result<Option<FollowRequest>> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLS} FROM follow_requests WHERE id = ?1"),
        [id.to_string()],
        FollowRequest::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// The pending request from `requester` to `target`, if any.
pub fn get_request_between(
    conn: &Connection,
    requester: UserId,
    target: UserId,
) -> Result<Option<FollowRequest>> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLS} FROM follow_requests WHERE requester_id = ?1 AND target_id = ?2"),
        rusqlite::params![requester.to_string(), target.to_string()],
        FollowRequest::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Pending requests addressed to `target`, newest first.
pub fn list_incoming_requests(conn: &Connection, target: UserId) -> Result<Vec<FollowRequest>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {REQUEST_COLS} FROM follow_requests WHERE target_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([target.to_string()], FollowRequest::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Accept a pending request: record the follow, drop the request and notify
/// the requester.
pub fn accept_follow_request(conn: &Connection, id: FollowRequestId) -> Result<AcceptedRequest> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    let request = get_follow_request(&tx, id)?.ok_or_else(|| Error::not_found("follow_request", id))?;
    let accepted = accept_in_tx(&tx, request)?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(accepted)
}

fn accept_in_tx(conn: &Connection, request: FollowRequest) -> Result<AcceptedRequest> {
    insert_follow(conn, request.requester_id, request.target_id)?;
    delete_follow_request(conn, request.id)?;
    let notification = notifications::create_notification(
        conn,
        request.requester_id,
        Some(request.target_id),
        NotificationKind::FollowAccepted,
        Some(&request.id.to_string()),
    )?;
    Ok(AcceptedRequest {
        request,
        notification,
    })
}

/// Accept every pending request addressed to `target`. The caller is
/// expected to hold a transaction.
pub fn accept_all_pending(conn: &Connection, target: UserId) -> Result<Vec<AcceptedRequest>> {
    list_incoming_requests(conn, target)?
        .into_iter()
        .map(|request| accept_in_tx(conn, request))
        .collect()
}

/// Delete a follow request (decline). Returns true if a row was deleted.
pub fn delete_follow_request(conn: &Connection, id: FollowRequestId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM follow_requests WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

fn list_related_users(conn: &Connection, sql: &str, user: UserId) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(sql).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([user.to_string()], User::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Users following `user`, most recent first.
pub fn list_followers(conn: &Connection, user: UserId) -> Result<Vec<User>> {
    list_related_users(
        conn,
        "SELECT u.id, u.email, u.password_hash, u.first_name, u.last_name, u.date_of_birth,
                u.nickname, u.about_me, u.avatar, u.is_public, u.created_at
         FROM follows f JOIN users u ON u.id = f.follower_id
         WHERE f.followee_id = ?1
         ORDER BY f.created_at DESC",
        user,
    )
}

/// Users `user` follows, most recent first.
pub fn list_following(conn: &Connection, user: UserId) -> Result<Vec<User>> {
    list_related_users(
        conn,
        "SELECT u.id, u.email, u.password_hash, u.first_name, u.last_name, u.date_of_birth,
                u.nickname, u.about_me, u.avatar, u.is_public, u.created_at
         FROM follows f JOIN users u ON u.id = f.followee_id
         WHERE f.follower_id = ?1
         ORDER BY f.created_at DESC",
        user,
    )
}

/// `(followers, following)` counts for `user`.
pub fn follow_counts(conn: &Connection, user: UserId) -> Result<(i64, i64)> {
    conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM follows WHERE followee_id = ?1),
            (SELECT COUNT(*) FROM follows WHERE follower_id = ?1)",
        [user.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .map_err(|e| Error::database(e.to_string()))
}

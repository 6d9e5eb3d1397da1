//! Like / dislike votes on posts and comments.
//!
//! Each user holds at most one vote per target. Casting the same value again
//! removes the vote, casting the opposite value switches it. The target's
//! `likes` / `dislikes` columns are kept equal to the matching rows in `votes`
//! by triggers (migration V6), which also covers cascaded deletes.

use agora_core::{CommentId, Error, PostId, Result, UserId};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::models::VoteValue;
use crate::time;

/// What a vote is cast on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTarget {
    Post(PostId),
    Comment(CommentId),
}

impl VoteTarget {
    fn table(&self) -> &'static str {
        match self {
            VoteTarget::Post(_) => "posts",
            VoteTarget::Comment(_) => "comments",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            VoteTarget::Post(_) => "post_id",
            VoteTarget::Comment(_) => "comment_id",
        }
    }

    fn entity(&self) -> &'static str {
        match self {
            VoteTarget::Post(_) => "post",
            VoteTarget::Comment(_) => "comment",
        }
    }

    fn id_string(&self) -> String {
        match self {
            VoteTarget::Post(id) => id.to_string(),
            VoteTarget::Comment(id) => id.to_string(),
        }
    }
}

/// How a cast changed the caller's vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    Added,
    Removed,
    Switched,
}

/// Counters after a vote together with the caller's current vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteTally {
    pub likes: i64,
    pub dislikes: i64,
    pub user_vote: Option<VoteValue>,
    pub outcome: VoteOutcome,
}

/// Cast `value` on `target` for `user`, toggling or switching an existing vote.
pub fn cast_vote(
    conn: &Connection,
    user: UserId,
    target: VoteTarget,
    value: VoteValue,
) -> Result<VoteTally> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let target_id = target.id_string();
    let exists: bool = tx
        .query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", target.table()),
            [&target_id],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    if !exists {
        return Err(Error::not_found(target.entity(), &target_id));
    }

    let (user_vote, outcome) = match get_user_vote(&tx, user, target)? {
        None => {
            tx.execute(
                &format!(
                    "INSERT INTO votes (user_id, {}, value, created_at) VALUES (?1, ?2, ?3, ?4)",
                    target.column()
                ),
                rusqlite::params![user.to_string(), target_id, value.as_i64(), time::now()],
            )
            .map_err(|e| Error::database(e.to_string()))?;
            (Some(value), VoteOutcome::Added)
        }
        Some(existing) if existing == value => {
            tx.execute(
                &format!("DELETE FROM votes WHERE user_id = ?1 AND {} = ?2", target.column()),
                rusqlite::params![user.to_string(), target_id],
            )
            .map_err(|e| Error::database(e.to_string()))?;
            (None, VoteOutcome::Removed)
        }
        Some(_) => {
            tx.execute(
                &format!(
                    "UPDATE votes SET value = ?1, created_at = ?2
                     WHERE user_id = ?3 AND {} = ?4",
                    target.column()
                ),
                rusqlite::params![value.as_i64(), time::now(), user.to_string(), target_id],
            )
            .map_err(|e| Error::database(e.to_string()))?;
            (Some(value), VoteOutcome::Switched)
        }
    };

    let (likes, dislikes) = counters(&tx, target)?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(VoteTally {
        likes,
        dislikes,
        user_vote,
        outcome,
    })
}

/// Current `(likes, dislikes)` of a target.
pub fn counters(conn: &Connection, target: VoteTarget) -> Result<(i64, i64)> {
    conn.query_row(
        &format!("SELECT likes, dislikes FROM {} WHERE id = ?1", target.table()),
        [target.id_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found(target.entity(), target.id_string()),
        other => Error::database(other.to_string()),
    })
}

/// The vote `user` currently holds on `target`, if any.
pub fn get_user_vote(conn: &Connection, user: UserId, target: VoteTarget) -> Result<Option<VoteValue>> {
    let value: Option<i64> = conn
        .query_row(
            &format!("SELECT value FROM votes WHERE user_id = ?1 AND {} = ?2", target.column()),
            rusqlite::params![user.to_string(), target.id_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(value.and_then(VoteValue::from_i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Privacy;
    use crate::pool::init_memory_pool;
    use crate::queries::comments;
    use crate::queries::posts::tests::make_post;
    use crate::queries::users::tests::make_user;

    fn row_count(conn: &Connection, target: VoteTarget, value: i64) -> i64 {
        conn.query_row(
            &format!("SELECT COUNT(*) FROM votes WHERE {} = ?1 AND value = ?2", target.column()),
            rusqlite::params![target.id_string(), value],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn like_toggles_on_and_off() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let post = make_post(&conn, alice.id, Privacy::Public);
        let target = VoteTarget::Post(post.id);

        let tally = cast_vote(&conn, alice.id, target, VoteValue::Like).unwrap();
        assert_eq!(tally.outcome, VoteOutcome::Added);
        assert_eq!((tally.likes, tally.dislikes), (1, 0));
        assert_eq!(tally.user_vote, Some(VoteValue::Like));

        let tally = cast_vote(&conn, alice.id, target, VoteValue::Like).unwrap();
        assert_eq!(tally.outcome, VoteOutcome::Removed);
        assert_eq!((tally.likes, tally.dislikes), (0, 0));
        assert_eq!(tally.user_vote, None);
        assert_eq!(get_user_vote(&conn, alice.id, target).unwrap(), None);
    }

    #[test]
    fn opposite_vote_switches_counters() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);
        let post = make_post(&conn, alice.id, Privacy::Public);
        let target = VoteTarget::Post(post.id);

        cast_vote(&conn, alice.id, target, VoteValue::Like).unwrap();
        cast_vote(&conn, bob.id, target, VoteValue::Like).unwrap();
        let tally = cast_vote(&conn, bob.id, target, VoteValue::Dislike).unwrap();

        assert_eq!(tally.outcome, VoteOutcome::Switched);
        assert_eq!((tally.likes, tally.dislikes), (1, 1));
        assert_eq!(row_count(&conn, target, 1), 1);
        assert_eq!(row_count(&conn, target, -1), 1);
    }

    #[test]
    fn counters_match_rows_after_sequence() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let post = make_post(&conn, alice.id, Privacy::Public);
        let comment = comments::create_comment(&conn, post.id, alice.id, "c", None).unwrap();
        let target = VoteTarget::Comment(comment.id);

        let users: Vec<_> = ["u1", "u2", "u3"].iter().map(|n| make_user(&conn, n, true)).collect();
        let sequence = [
            (0, VoteValue::Like),
            (1, VoteValue::Dislike),
            (2, VoteValue::Like),
            (0, VoteValue::Dislike),
            (1, VoteValue::Dislike),
            (2, VoteValue::Like),
            (2, VoteValue::Dislike),
        ];
        for (who, value) in sequence {
            cast_vote(&conn, users[who].id, target, value).unwrap();
        }

        let (likes, dislikes) = counters(&conn, target).unwrap();
        assert_eq!(likes, row_count(&conn, target, 1));
        assert_eq!(dislikes, row_count(&conn, target, -1));
        assert_eq!((likes, dislikes), (0, 2));

        // Post counters are untouched by comment votes.
        assert_eq!(counters(&conn, VoteTarget::Post(post.id)).unwrap(), (0, 0));
    }

    #[test]
    fn vote_on_missing_target() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let err = cast_vote(&conn, alice.id, VoteTarget::Post(PostId::new()), VoteValue::Like)
            .unwrap_err();
        assert_eq!(err.http_status(), 404);
    }
}

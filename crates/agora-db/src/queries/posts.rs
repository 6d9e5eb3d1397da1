//! Feed posts and their audience rules.
//!
//! A post is visible to a viewer when the viewer wrote it, when it is public,
//! when it is `almost_private` and the viewer follows the author, or when it
//! is `private` and the viewer was listed in `post_viewers`.

use agora_core::{Error, PostId, Result, UserId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{Post, Privacy};
use crate::queries::follows;
use crate::time;

const COLS: &str =
    "p.id, p.author_id, p.content, p.image, p.privacy, p.likes, p.dislikes, p.comment_count, p.created_at";

/// SQL predicate selecting posts `p` visible to the user bound as `?1`.
const VISIBLE_TO_VIEWER: &str = "(p.author_id = ?1
    OR p.privacy = 'public'
    OR (p.privacy = 'almost_private' AND EXISTS (
        SELECT 1 FROM follows f WHERE f.follower_id = ?1 AND f.followee_id = p.author_id))
    OR (p.privacy = 'private' AND EXISTS (
        SELECT 1 FROM post_viewers v WHERE v.post_id = p.id AND v.user_id = ?1)))";

/// Input for [`create_post`].
#[derive(Debug, Clone)]
pub struct NewPost {
    pub content: String,
    pub image: Option<String>,
    pub privacy: Privacy,
    /// Audience of a `private` post; ignored otherwise.
    pub viewers: Vec<UserId>,
}

/// Create a post. Private posts need at least one viewer and every viewer
/// must follow the author.
pub fn create_post(conn: &Connection, author: UserId, new: &NewPost) -> Result<Post> {
    if new.content.trim().is_empty() {
        return Err(Error::validation("Post content must not be empty"));
    }

    let mut viewers = Vec::new();
    if new.privacy == Privacy::Private {
        for &viewer in &new.viewers {
            if viewer != author && !viewers.contains(&viewer) {
                viewers.push(viewer);
            }
        }
        if viewers.is_empty() {
            return Err(Error::validation("A private post needs at least one viewer"));
        }
        for &viewer in &viewers {
            if !follows::is_following(conn, viewer, author)? {
                return Err(Error::validation(format!(
                    "User {viewer} does not follow you and cannot be a viewer"
                )));
            }
        }
    }

    let id = PostId::new();
    let created_at = time::now();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    tx.execute(
        "INSERT INTO posts (id, author_id, content, image, privacy, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.to_string(),
            author.to_string(),
            new.content,
            new.image,
            new.privacy.as_str(),
            created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    for viewer in &viewers {
        tx.execute(
            "INSERT INTO post_viewers (post_id, user_id) VALUES (?1, ?2)",
            rusqlite::params![id.to_string(), viewer.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(Post {
        id,
        author_id: author,
        content: new.content.clone(),
        image: new.image.clone(),
        privacy: new.privacy,
        likes: 0,
        dislikes: 0,
        comment_count: 0,
        created_at,
    })
}

/// Get a post by ID regardless of audience.
pub fn get_post(conn: &Connection, id: PostId) -> Result<Option<Post>> {
    conn.query_row(
        &format!("SELECT {COLS} FROM posts p WHERE p.id = ?1"),
        [id.to_string()],
        Post::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Get a post if `viewer` is allowed to see it.
pub fn get_visible_post(conn: &Connection, viewer: UserId, id: PostId) -> Result<Option<Post>> {
    conn.query_row(
        &format!("SELECT {COLS} FROM posts p WHERE p.id = ?2 AND {VISIBLE_TO_VIEWER}"),
        rusqlite::params![viewer.to_string(), id.to_string()],
        Post::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Posts visible to `viewer`, newest first.
pub fn list_feed(conn: &Connection, viewer: UserId, limit: i64, offset: i64) -> Result<Vec<Post>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLS} FROM posts p WHERE {VISIBLE_TO_VIEWER}
             ORDER BY p.created_at DESC, p.rowid DESC LIMIT ?2 OFFSET ?3"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![viewer.to_string(), limit, offset], Post::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Posts written by `author` that `viewer` may see, newest first.
pub fn list_posts_by_author(
    conn: &Connection,
    viewer: UserId,
    author: UserId,
    limit: i64,
    offset: i64,
) -> Result<Vec<Post>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLS} FROM posts p WHERE p.author_id = ?2 AND {VISIBLE_TO_VIEWER}
             ORDER BY p.created_at DESC, p.rowid DESC LIMIT ?3 OFFSET ?4"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(
            rusqlite::params![viewer.to_string(), author.to_string(), limit, offset],
            Post::from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// The explicit audience of a private post.
pub fn list_viewers(conn: &Connection, id: PostId) -> Result<Vec<UserId>> {
    let mut stmt = conn
        .prepare("SELECT user_id FROM post_viewers WHERE post_id = ?1")
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([id.to_string()], |row| crate::models::parse_id(row, 0))
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Delete a post; comments, votes and viewers go with it.
pub fn delete_post(conn: &Connection, id: PostId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM posts WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::users::tests::make_user;

    pub(crate) fn make_post(conn: &Connection, author: UserId, privacy: Privacy) -> Post {
        create_post(
            conn,
            author,
            &NewPost {
                content: "hello".into(),
                image: None,
                privacy,
                viewers: Vec::new(),
            },
        )
        .unwrap()
    }

    #[test]
    fn public_post_visible_to_all() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);

        let post = make_post(&conn, alice.id, Privacy::Public);
        assert!(get_visible_post(&conn, bob.id, post.id).unwrap().is_some());
        assert_eq!(list_feed(&conn, bob.id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn almost_private_needs_follow() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);

        let post = make_post(&conn, alice.id, Privacy::AlmostPrivate);
        assert!(get_visible_post(&conn, bob.id, post.id).unwrap().is_none());
        assert!(get_visible_post(&conn, alice.id, post.id).unwrap().is_some());

        follows::follow(&conn, bob.id, alice.id).unwrap();
        assert!(get_visible_post(&conn, bob.id, post.id).unwrap().is_some());
    }

    #[test]
    fn private_post_requires_follower_viewers() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);
        let carol = make_user(&conn, "carol", true);

        let mut new = NewPost {
            content: "secret".into(),
            image: None,
            privacy: Privacy::Private,
            viewers: Vec::new(),
        };
        assert_eq!(create_post(&conn, alice.id, &new).unwrap_err().http_status(), 400);

        new.viewers = vec![bob.id];
        assert_eq!(create_post(&conn, alice.id, &new).unwrap_err().http_status(), 400);

        follows::follow(&conn, bob.id, alice.id).unwrap();
        follows::follow(&conn, carol.id, alice.id).unwrap();
        let post = create_post(&conn, alice.id, &new).unwrap();

        assert_eq!(list_viewers(&conn, post.id).unwrap(), vec![bob.id]);
        assert!(get_visible_post(&conn, bob.id, post.id).unwrap().is_some());
        assert!(get_visible_post(&conn, carol.id, post.id).unwrap().is_none());
    }

    #[test]
    fn feed_is_newest_first_and_paged() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);

        let first = make_post(&conn, alice.id, Privacy::Public);
        let second = make_post(&conn, alice.id, Privacy::Public);

        let feed = list_feed(&conn, alice.id, 10, 0).unwrap();
        assert_eq!(feed[0].id, second.id);
        assert_eq!(feed[1].id, first.id);
        assert_eq!(list_feed(&conn, alice.id, 1, 1).unwrap()[0].id, first.id);
        assert_eq!(list_posts_by_author(&conn, alice.id, alice.id, 10, 0).unwrap().len(), 2);
    }

    #[test]
    fn empty_content_rejected() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let err = create_post(
            &conn,
            alice.id,
            &NewPost {
                content: "   ".into(),
                image: None,
                privacy: Privacy::Public,
                viewers: Vec::new(),
            },
        )
        .unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn delete_cascades() {
        use crate::models::VoteValue;
        use crate::queries::votes::{cast_vote, VoteTarget};
        use crate::queries::{comments, follows};

        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);
        follows::follow(&conn, bob.id, alice.id).unwrap();

        let post = create_post(
            &conn,
            alice.id,
            &NewPost {
                content: "for bob".into(),
                image: None,
                privacy: Privacy::Private,
                viewers: vec![bob.id],
            },
        )
        .unwrap();
        let comment = comments::create_comment(&conn, post.id, bob.id, "c", None).unwrap();
        cast_vote(&conn, bob.id, VoteTarget::Post(post.id), VoteValue::Like).unwrap();
        cast_vote(&conn, alice.id, VoteTarget::Comment(comment.id), VoteValue::Dislike).unwrap();

        assert!(delete_post(&conn, post.id).unwrap());
        for table in ["comments", "votes", "post_viewers"] {
            let n: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                .unwrap();
            assert_eq!(n, 0, "{table} not emptied");
        }
        assert!(!delete_post(&conn, post.id).unwrap());
    }
}

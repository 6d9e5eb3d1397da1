//! Comments on feed posts. `posts.comment_count` follows inserts and deletes
//! through triggers.

use agora_core::{CommentId, Error, PostId, Result, UserId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::Comment;
use crate::time;

const COLS: &str = "id, post_id, author_id, content, image, likes, dislikes, created_at";

/// Add a comment to a post.
pub fn create_comment(
    conn: &Connection,
    post_id: PostId,
    author: UserId,
    content: &str,
    image: Option<&str>,
) -> Result<Comment> {
    if content.trim().is_empty() {
        return Err(Error::validation("Comment content must not be empty"));
    }

    let id = CommentId::new();
    let created_at = time::now();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let exists: bool = tx
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
            [post_id.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    if !exists {
        return Err(Error::not_found("post", post_id));
    }

    tx.execute(
        "INSERT INTO comments (id, post_id, author_id, content, image, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.to_string(),
            post_id.to_string(),
            author.to_string(),
            content,
            image,
            created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(Comment {
        id,
        post_id,
        author_id: author,
        content: content.to_string(),
        image: image.map(str::to_string),
        likes: 0,
        dislikes: 0,
        created_at,
    })
}

/// Get a comment by ID.
pub fn get_comment(conn: &Connection, id: CommentId) -> Result<Option<Comment>> {
    conn.query_row(
        &format!("SELECT {COLS} FROM comments WHERE id = ?1"),
        [id.to_string()],
        Comment::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Comments on a post, oldest first.
pub fn list_comments(
    conn: &Connection,
    post_id: PostId,
    limit: i64,
    offset: i64,
) -> Result<Vec<Comment>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLS} FROM comments WHERE post_id = ?1
             ORDER BY created_at ASC, rowid ASC LIMIT ?2 OFFSET ?3"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![post_id.to_string(), limit, offset], Comment::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Delete a comment. Returns `false` if it did not exist.
pub fn delete_comment(conn: &Connection, id: CommentId) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM comments WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Privacy;
    use crate::pool::init_memory_pool;
    use crate::queries::posts::{self, tests::make_post};
    use crate::queries::users::tests::make_user;

    #[test]
    fn counter_follows_comments() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let post = make_post(&conn, alice.id, Privacy::Public);

        let c1 = create_comment(&conn, post.id, alice.id, "one", None).unwrap();
        create_comment(&conn, post.id, alice.id, "two", Some("img.png")).unwrap();
        assert_eq!(posts::get_post(&conn, post.id).unwrap().unwrap().comment_count, 2);

        let listed = list_comments(&conn, post.id, 10, 0).unwrap();
        assert_eq!(listed[0].content, "one");
        assert_eq!(listed[1].image.as_deref(), Some("img.png"));

        assert!(delete_comment(&conn, c1.id).unwrap());
        assert!(!delete_comment(&conn, c1.id).unwrap());
        assert_eq!(posts::get_post(&conn, post.id).unwrap().unwrap().comment_count, 1);
    }

    #[test]
    fn comment_on_missing_post() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let err = create_comment(&conn, PostId::new(), alice.id, "x", None).unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn blank_comment_rejected() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let post = make_post(&conn, alice.id, Privacy::Public);
        assert_eq!(
            create_comment(&conn, post.id, alice.id, "  ", None).unwrap_err().http_status(),
            400
        );
    }
}

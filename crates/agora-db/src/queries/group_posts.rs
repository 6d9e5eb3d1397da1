//! Posts and comments inside a group.

use agora_core::{Error, GroupCommentId, GroupId, GroupPostId, Result, UserId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{GroupComment, GroupPost};
use crate::time;

const POST_COLS: &str = "id, group_id, author_id, content, image, comment_count, created_at";
const COMMENT_COLS: &str = "id, group_post_id, author_id, content, created_at";

pub fn create_group_post(
    conn: &Connection,
    group: GroupId,
    author: UserId,
    content: &str,
    image: Option<&str>,
) -> Result<GroupPost> {
    if content.trim().is_empty() {
        return Err(Error::validation("Post content must not be empty"));
    }

    let id = GroupPostId::new();
    let created_at = time::now();
    conn.execute(
        "INSERT INTO group_posts (id, group_id, author_id, content, image, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.to_string(),
            group.to_string(),
            author.to_string(),
            content,
            image,
            created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(GroupPost {
        id,
        group_id: group,
        author_id: author,
        content: content.to_string(),
        image: image.map(str::to_string),
        comment_count: 0,
        created_at,
    })
}

pub fn get_group_post(conn: &Connection, id: GroupPostId) -> Result<Option<GroupPost>> {
    conn.query_row(
        &format!("SELECT {POST_COLS} FROM group_posts WHERE id = ?1"),
        [id.to_string()],
        GroupPost::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Posts of a group, newest first.
pub fn list_group_posts(
    conn: &Connection,
    group: GroupId,
    limit: i64,
    offset: i64,
) -> Result<Vec<GroupPost>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {POST_COLS} FROM group_posts WHERE group_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![group.to_string(), limit, offset], GroupPost::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Comment on a group post. Its `comment_count` is bumped by trigger.
pub fn create_group_comment(
    conn: &Connection,
    post: GroupPostId,
    author: UserId,
    content: &str,
) -> Result<GroupComment> {
    if content.trim().is_empty() {
        return Err(Error::validation("Comment content must not be empty"));
    }

    let id = GroupCommentId::new();
    let created_at = time::now();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let exists: bool = tx
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM group_posts WHERE id = ?1)",
            [post.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    if !exists {
        return Err(Error::not_found("group_post", post));
    }

    tx.execute(
        "INSERT INTO group_comments (id, group_post_id, author_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id.to_string(), post.to_string(), author.to_string(), content, created_at],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(GroupComment {
        id,
        group_post_id: post,
        author_id: author,
        content: content.to_string(),
        created_at,
    })
}

/// Comments on a group post, oldest first.
pub fn list_group_comments(conn: &Connection, post: GroupPostId) -> Result<Vec<GroupComment>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COMMENT_COLS} FROM group_comments WHERE group_post_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([post.to_string()], GroupComment::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

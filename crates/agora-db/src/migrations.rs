//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use agora_core::{Error, Result};
use rusqlite::Connection;

/// V1: accounts, sessions and the follow graph.
const V1_ACCOUNTS: &str = r#"
CREATE TABLE users (
    id            TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_hash TEXT NOT NULL,
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    date_of_birth TEXT NOT NULL,
    nickname      TEXT UNIQUE COLLATE NOCASE,
    about_me      TEXT,
    avatar        TEXT,
    is_public     INTEGER NOT NULL DEFAULT 1 CHECK (is_public IN (0, 1)),
    created_at    TEXT NOT NULL
);

CREATE TABLE sessions (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token      TEXT NOT NULL UNIQUE,
    expires_at TEXT NOT NULL
);

CREATE TABLE follows (
    follower_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    followee_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (follower_id, followee_id),
    CHECK (follower_id <> followee_id)
);

CREATE TABLE follow_requests (
    id           TEXT PRIMARY KEY,
    requester_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    target_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at   TEXT NOT NULL,
    UNIQUE (requester_id, target_id),
    CHECK (requester_id <> target_id)
);

CREATE INDEX idx_sessions_user           ON sessions(user_id);
CREATE INDEX idx_follows_followee        ON follows(followee_id);
CREATE INDEX idx_follow_requests_target  ON follow_requests(target_id);
"#;

/// V2: posts, comments and votes with denormalized counters.
const V2_POSTS: &str = r#"
CREATE TABLE posts (
    id            TEXT PRIMARY KEY,
    author_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    content       TEXT NOT NULL,
    image         TEXT,
    privacy       TEXT NOT NULL DEFAULT 'public'
                  CHECK (privacy IN ('public', 'almost_private', 'private')),
    likes         INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
    dislikes      INTEGER NOT NULL DEFAULT 0 CHECK (dislikes >= 0),
    comment_count INTEGER NOT NULL DEFAULT 0 CHECK (comment_count >= 0),
    created_at    TEXT NOT NULL
);

CREATE TABLE post_viewers (
    post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (post_id, user_id)
);

CREATE TABLE comments (
    id         TEXT PRIMARY KEY,
    post_id    TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    author_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    content    TEXT NOT NULL,
    image      TEXT,
    likes      INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
    dislikes   INTEGER NOT NULL DEFAULT 0 CHECK (dislikes >= 0),
    created_at TEXT NOT NULL
);

CREATE TABLE votes (
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    post_id    TEXT REFERENCES posts(id) ON DELETE CASCADE,
    comment_id TEXT REFERENCES comments(id) ON DELETE CASCADE,
    value      INTEGER NOT NULL CHECK (value IN (1, -1)),
    created_at TEXT NOT NULL,
    CHECK ((post_id IS NULL) <> (comment_id IS NULL)),
    UNIQUE (user_id, post_id),
    UNIQUE (user_id, comment_id)
);

CREATE INDEX idx_posts_author     ON posts(author_id);
CREATE INDEX idx_posts_created    ON posts(created_at);
CREATE INDEX idx_comments_post    ON comments(post_id);
CREATE INDEX idx_votes_post       ON votes(post_id);
CREATE INDEX idx_votes_comment    ON votes(comment_id);
"#;

/// V3: groups, membership, invitations, join requests, group content.
const V3_GROUPS: &str = r#"
CREATE TABLE social_groups (
    id          TEXT PRIMARY KEY,
    creator_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title       TEXT NOT NULL UNIQUE COLLATE NOCASE,
    description TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE group_members (
    group_id  TEXT NOT NULL REFERENCES social_groups(id) ON DELETE CASCADE,
    user_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role      TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('owner', 'member')),
    joined_at TEXT NOT NULL,
    PRIMARY KEY (group_id, user_id)
);

CREATE TABLE group_invitations (
    id         TEXT PRIMARY KEY,
    group_id   TEXT NOT NULL REFERENCES social_groups(id) ON DELETE CASCADE,
    inviter_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    invitee_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    UNIQUE (group_id, invitee_id)
);

CREATE TABLE group_join_requests (
    id         TEXT PRIMARY KEY,
    group_id   TEXT NOT NULL REFERENCES social_groups(id) ON DELETE CASCADE,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    UNIQUE (group_id, user_id)
);

CREATE TABLE group_posts (
    id            TEXT PRIMARY KEY,
    group_id      TEXT NOT NULL REFERENCES social_groups(id) ON DELETE CASCADE,
    author_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    content       TEXT NOT NULL,
    image         TEXT,
    comment_count INTEGER NOT NULL DEFAULT 0 CHECK (comment_count >= 0),
    created_at    TEXT NOT NULL
);

CREATE TABLE group_comments (
    id            TEXT PRIMARY KEY,
    group_post_id TEXT NOT NULL REFERENCES group_posts(id) ON DELETE CASCADE,
    author_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    content       TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE group_events (
    id          TEXT PRIMARY KEY,
    group_id    TEXT NOT NULL REFERENCES social_groups(id) ON DELETE CASCADE,
    creator_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    description TEXT NOT NULL,
    starts_at   TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE group_event_responses (
    event_id     TEXT NOT NULL REFERENCES group_events(id) ON DELETE CASCADE,
    user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    response     TEXT NOT NULL CHECK (response IN ('going', 'not_going')),
    responded_at TEXT NOT NULL,
    PRIMARY KEY (event_id, user_id)
);

CREATE INDEX idx_group_members_user     ON group_members(user_id);
CREATE INDEX idx_group_invitations_user ON group_invitations(invitee_id);
CREATE INDEX idx_group_posts_group      ON group_posts(group_id);
CREATE INDEX idx_group_comments_post    ON group_comments(group_post_id);
CREATE INDEX idx_group_events_group     ON group_events(group_id);
"#;

/// V4: chat conversations and messages.
const V4_CHAT: &str = r#"
CREATE TABLE conversations (
    id         TEXT PRIMARY KEY,
    kind       TEXT NOT NULL CHECK (kind IN ('direct', 'group')),
    group_id   TEXT UNIQUE REFERENCES social_groups(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    CHECK ((kind = 'group') = (group_id IS NOT NULL))
);

CREATE TABLE conversation_participants (
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    joined_at       TEXT NOT NULL,
    PRIMARY KEY (conversation_id, user_id)
);

CREATE TABLE messages (
    id              TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    content         TEXT NOT NULL CHECK (length(content) > 0),
    created_at      TEXT NOT NULL
);

CREATE INDEX idx_participants_user       ON conversation_participants(user_id);
CREATE INDEX idx_messages_conversation   ON messages(conversation_id, created_at);
"#;

/// V5: stored notifications.
const V5_NOTIFICATIONS: &str = r#"
CREATE TABLE notifications (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    actor_id   TEXT REFERENCES users(id) ON DELETE CASCADE,
    kind       TEXT NOT NULL CHECK (kind IN (
                   'follow', 'follow_accepted', 'group_invitation',
                   'group_join_request', 'group_join_accepted', 'group_event')),
    entity_id  TEXT,
    is_read    INTEGER NOT NULL DEFAULT 0 CHECK (is_read IN (0, 1)),
    created_at TEXT NOT NULL
);

CREATE INDEX idx_notifications_user ON notifications(user_id, created_at);
"#;

/// V6: counters maintained by triggers, so cascaded deletes (a user, a
/// comment, a post) keep `likes`, `dislikes` and `comment_count` equal to the
/// rows they summarize. Existing counters are recomputed once.
const V6_COUNTER_TRIGGERS: &str = r#"
CREATE TRIGGER votes_after_insert AFTER INSERT ON votes
BEGIN
    UPDATE posts SET
        likes    = likes    + (NEW.value = 1),
        dislikes = dislikes + (NEW.value = -1)
    WHERE id = NEW.post_id;
    UPDATE comments SET
        likes    = likes    + (NEW.value = 1),
        dislikes = dislikes + (NEW.value = -1)
    WHERE id = NEW.comment_id;
END;

CREATE TRIGGER votes_after_delete AFTER DELETE ON votes
BEGIN
    UPDATE posts SET
        likes    = likes    - (OLD.value = 1),
        dislikes = dislikes - (OLD.value = -1)
    WHERE id = OLD.post_id;
    UPDATE comments SET
        likes    = likes    - (OLD.value = 1),
        dislikes = dislikes - (OLD.value = -1)
    WHERE id = OLD.comment_id;
END;

CREATE TRIGGER votes_after_update AFTER UPDATE OF value ON votes
WHEN OLD.value <> NEW.value
BEGIN
    UPDATE posts SET
        likes    = likes    + (NEW.value = 1)  - (OLD.value = 1),
        dislikes = dislikes + (NEW.value = -1) - (OLD.value = -1)
    WHERE id = NEW.post_id;
    UPDATE comments SET
        likes    = likes    + (NEW.value = 1)  - (OLD.value = 1),
        dislikes = dislikes + (NEW.value = -1) - (OLD.value = -1)
    WHERE id = NEW.comment_id;
END;

CREATE TRIGGER comments_after_insert AFTER INSERT ON comments
BEGIN
    UPDATE posts SET comment_count = comment_count + 1 WHERE id = NEW.post_id;
END;

CREATE TRIGGER comments_after_delete AFTER DELETE ON comments
BEGIN
    UPDATE posts SET comment_count = comment_count - 1 WHERE id = OLD.post_id;
END;

CREATE TRIGGER group_comments_after_insert AFTER INSERT ON group_comments
BEGIN
    UPDATE group_posts SET comment_count = comment_count + 1 WHERE id = NEW.group_post_id;
END;

CREATE TRIGGER group_comments_after_delete AFTER DELETE ON group_comments
BEGIN
    UPDATE group_posts SET comment_count = comment_count - 1 WHERE id = OLD.group_post_id;
END;

UPDATE posts SET
    likes         = (SELECT COUNT(*) FROM votes v WHERE v.post_id = posts.id AND v.value = 1),
    dislikes      = (SELECT COUNT(*) FROM votes v WHERE v.post_id = posts.id AND v.value = -1),
    comment_count = (SELECT COUNT(*) FROM comments c WHERE c.post_id = posts.id);
UPDATE comments SET
    likes    = (SELECT COUNT(*) FROM votes v WHERE v.comment_id = comments.id AND v.value = 1),
    dislikes = (SELECT COUNT(*) FROM votes v WHERE v.comment_id = comments.id AND v.value = -1);
UPDATE group_posts SET
    comment_count = (SELECT COUNT(*) FROM group_comments c WHERE c.group_post_id = group_posts.id);
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, V1_ACCOUNTS),
    (2, V2_POSTS),
    (3, V3_GROUPS),
    (4, V4_CHAT),
    (5, V5_NOTIFICATIONS),
    (6, V6_COUNTER_TRIGGERS),
];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}

//! Direct and group conversations and their messages.

use agora_core::{ConversationId, Error, GroupId, MessageId, Result, UserId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{Conversation, ConversationKind, Message};
use crate::time;

const COLS: &str = "c.id, c.kind, c.group_id, c.created_at";
const MESSAGE_COLS: &str = "id, conversation_id, sender_id, content, created_at";

/// Longest accepted message, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// A conversation as listed in the caller's inbox.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    /// The other participant of a direct conversation.
    pub peer_id: Option<UserId>,
    /// Group title for group conversations.
    pub title: Option<String>,
    pub last_message: Option<Message>,
}

/// Get a conversation by ID.
pub fn get_conversation(conn: &Connection, id: ConversationId) -> Result<Option<Conversation>> {
    conn.query_row(
        &format!("SELECT {COLS} FROM conversations c WHERE c.id = ?1"),
        [id.to_string()],
        Conversation::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// The conversation attached to a group.
pub fn get_group_conversation(conn: &Connection, group_id: GroupId) -> Result<Option<Conversation>> {
    conn.query_row(
        &format!("SELECT {COLS} FROM conversations c WHERE c.group_id = ?1"),
        [group_id.to_string()],
        Conversation::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

fn insert_conversation(
    conn: &Connection,
    kind: ConversationKind,
    group_id: Option<GroupId>,
) -> Result<Conversation> {
    let id = ConversationId::new();
    let created_at = time::now();
    conn.execute(
        "INSERT INTO conversations (id, kind, group_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            id.to_string(),
            kind.as_str(),
            group_id.map(|g| g.to_string()),
            created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(Conversation {
        id,
        kind,
        group_id,
        created_at,
    })
}

/// Create the conversation of a newly created group. The caller holds the
/// surrounding transaction.
pub fn create_group_conversation(conn: &Connection, group_id: GroupId) -> Result<Conversation> {
    insert_conversation(conn, ConversationKind::Group, Some(group_id))
}

/// Get or create the direct conversation between two users.
pub fn get_or_create_direct(conn: &Connection, a: UserId, b: UserId) -> Result<Conversation> {
    if a == b {
        return Err(Error::validation("Cannot open a conversation with yourself"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let existing = tx
        .query_row(
            &format!(
                "SELECT {COLS} FROM conversations c
                 WHERE c.kind = 'direct'
                   AND EXISTS (SELECT 1 FROM conversation_participants p
                               WHERE p.conversation_id = c.id AND p.user_id = ?1)
                   AND EXISTS (SELECT 1 FROM conversation_participants p
                               WHERE p.conversation_id = c.id AND p.user_id = ?2)
                 LIMIT 1"
            ),
            rusqlite::params![a.to_string(), b.to_string()],
            Conversation::from_row,
        )
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;

    let conversation = match existing {
        Some(c) => c,
        None => {
            let c = insert_conversation(&tx, ConversationKind::Direct, None)?;
            add_participant(&tx, c.id, a)?;
            add_participant(&tx, c.id, b)?;
            c
        }
    };

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(conversation)
}

/// Add a participant; adding an existing participant is a no-op.
pub fn add_participant(conn: &Connection, conversation: ConversationId, user: UserId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, joined_at)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![conversation.to_string(), user.to_string(), time::now()],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Remove a participant. Returns true if a row was deleted.
pub fn remove_participant(conn: &Connection, conversation: ConversationId, user: UserId) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
            rusqlite::params![conversation.to_string(), user.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

pub fn is_participant(conn: &Connection, conversation: ConversationId, user: UserId) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM conversation_participants
                       WHERE conversation_id = ?1 AND user_id = ?2)",
        rusqlite::params![conversation.to_string(), user.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

pub fn list_participants(conn: &Connection, conversation: ConversationId) -> Result<Vec<UserId>> {
    let mut stmt = conn
        .prepare(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = ?1
             ORDER BY joined_at, rowid",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([conversation.to_string()], |row| crate::models::parse_id(row, 0))
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// The caller's conversations, most recent activity first.
pub fn list_conversations(conn: &Connection, user: UserId) -> Result<Vec<ConversationSummary>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLS},
                    (SELECT p2.user_id FROM conversation_participants p2
                      WHERE p2.conversation_id = c.id AND p2.user_id <> ?1 AND c.kind = 'direct'
                      LIMIT 1) AS peer_id,
                    (SELECT g.title FROM social_groups g WHERE g.id = c.group_id) AS title,
                    m.id, m.conversation_id, m.sender_id, m.content, m.created_at
             FROM conversations c
             JOIN conversation_participants p ON p.conversation_id = c.id AND p.user_id = ?1
             LEFT JOIN messages m ON m.rowid = (
                 SELECT m2.rowid FROM messages m2 WHERE m2.conversation_id = c.id
                 ORDER BY m2.created_at DESC, m2.rowid DESC LIMIT 1)
             ORDER BY COALESCE(m.created_at, c.created_at) DESC"
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([user.to_string()], |row| {
            let conversation = Conversation::from_row(row)?;
            let peer_id = crate::models::parse_opt_id(row, 4)?;
            let title: Option<String> = row.get(5)?;
            let message_id: Option<String> = row.get(6)?;
            let last_message = match message_id {
                Some(_) => Some(Message {
                    id: crate::models::parse_id(row, 6)?,
                    conversation_id: crate::models::parse_id(row, 7)?,
                    sender_id: crate::models::parse_id(row, 8)?,
                    content: row.get(9)?,
                    created_at: row.get(10)?,
                }),
                None => None,
            };
            Ok(ConversationSummary {
                conversation,
                peer_id,
                title,
                last_message,
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Store a message. Content is trimmed, must be non-empty and at most
/// [`MAX_MESSAGE_LENGTH`] characters.
pub fn send_message(
    conn: &Connection,
    conversation: ConversationId,
    sender: UserId,
    content: &str,
) -> Result<Message> {
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::validation("Message must not be empty"));
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(Error::validation(format!(
            "Message exceeds {MAX_MESSAGE_LENGTH} characters"
        )));
    }

    let id = MessageId::new();
    let created_at = time::now();
    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            id.to_string(),
            conversation.to_string(),
            sender.to_string(),
            content,
            created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Message {
        id,
        conversation_id: conversation,
        sender_id: sender,
        content: content.to_string(),
        created_at,
    })
}

/// The newest `limit` messages (optionally older than the message `before`),
/// returned in chronological order. Ties on `created_at` are broken by
/// insertion order, so paging never skips a message.
pub fn list_messages(
    conn: &Connection,
    conversation: ConversationId,
    limit: i64,
    before: Option<MessageId>,
) -> Result<Vec<Message>> {
    let cursor: Option<(String, i64)> = match before {
        Some(id) => Some(
            conn.query_row(
                "SELECT created_at, rowid FROM messages WHERE id = ?1 AND conversation_id = ?2",
                rusqlite::params![id.to_string(), conversation.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| Error::database(e.to_string()))?
            .ok_or_else(|| Error::not_found("message", id))?,
        ),
        None => None,
    };
    let (before_at, before_rowid) = cursor.unzip();

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {MESSAGE_COLS} FROM messages
             WHERE conversation_id = ?1
               AND (?2 IS NULL OR created_at < ?2 OR (created_at = ?2 AND rowid < ?3))
             ORDER BY created_at DESC, rowid DESC LIMIT ?4"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let mut rows = stmt
        .query_map(
            rusqlite::params![conversation.to_string(), before_at, before_rowid, limit],
            Message::from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    rows.reverse();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::users::tests::make_user;

    #[test]
    fn direct_conversation_is_reused() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);

        let c1 = get_or_create_direct(&conn, alice.id, bob.id).unwrap();
        let c2 = get_or_create_direct(&conn, bob.id, alice.id).unwrap();
        assert_eq!(c1.id, c2.id);
        assert_eq!(c1.kind, ConversationKind::Direct);
        assert_eq!(list_participants(&conn, c1.id).unwrap().len(), 2);
        assert!(get_or_create_direct(&conn, alice.id, alice.id).is_err());
    }

    #[test]
    fn messages_are_chronological_pages() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);
        let c = get_or_create_direct(&conn, alice.id, bob.id).unwrap();

        for text in ["one", "two", "three"] {
            send_message(&conn, c.id, alice.id, text).unwrap();
        }

        let page = list_messages(&conn, c.id, 2, None).unwrap();
        let texts: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);

        let older = list_messages(&conn, c.id, 10, Some(page[0].id)).unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].content, "one");
    }

    #[test]
    fn paging_keeps_messages_sharing_a_timestamp() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);
        let c = get_or_create_direct(&conn, alice.id, bob.id).unwrap();

        for text in ["a", "b", "c", "d"] {
            send_message(&conn, c.id, alice.id, text).unwrap();
        }
        conn.execute(
            "UPDATE messages SET created_at = '2030-01-01T00:00:00.000000Z'",
            [],
        )
        .unwrap();

        let newest = list_messages(&conn, c.id, 2, None).unwrap();
        let texts: Vec<_> = newest.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["c", "d"]);

        let older = list_messages(&conn, c.id, 2, Some(newest[0].id)).unwrap();
        let texts: Vec<_> = older.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);

        let err = list_messages(&conn, c.id, 2, Some(MessageId::new())).unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn message_bounds() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);
        let c = get_or_create_direct(&conn, alice.id, bob.id).unwrap();

        assert!(send_message(&conn, c.id, alice.id, "   ").is_err());
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert_eq!(send_message(&conn, c.id, alice.id, &long).unwrap_err().http_status(), 400);
        assert_eq!(send_message(&conn, c.id, alice.id, "  hi  ").unwrap().content, "hi");
    }

    #[test]
    fn inbox_orders_by_activity() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);
        let carol = make_user(&conn, "carol", true);

        let with_bob = get_or_create_direct(&conn, alice.id, bob.id).unwrap();
        let with_carol = get_or_create_direct(&conn, alice.id, carol.id).unwrap();
        send_message(&conn, with_bob.id, bob.id, "latest").unwrap();

        let inbox = list_conversations(&conn, alice.id).unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].conversation.id, with_bob.id);
        assert_eq!(inbox[0].peer_id, Some(bob.id));
        assert_eq!(inbox[0].last_message.as_ref().unwrap().content, "latest");
        assert_eq!(inbox[1].conversation.id, with_carol.id);
        assert!(inbox[1].last_message.is_none());
    }
}

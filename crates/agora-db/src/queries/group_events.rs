//! Group events and member RSVPs.

use agora_core::{Error, EventId, GroupId, Result, UserId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{GroupEvent, Notification, NotificationKind, Rsvp};
use crate::queries::notifications;
use crate::time;

const COLS: &str = "e.id, e.group_id, e.creator_id, e.title, e.description, e.starts_at, e.created_at,
    (SELECT COUNT(*) FROM group_event_responses r WHERE r.event_id = e.id AND r.response = 'going'),
    (SELECT COUNT(*) FROM group_event_responses r WHERE r.event_id = e.id AND r.response = 'not_going')";

/// Input for [`create_event`].
#[derive(Debug, Clone)]
pub struct NewEvent<'a> {
    pub title: &'a str,
    pub description: &'a str,
    /// RFC 3339 start time.
    pub starts_at: &'a str,
}

/// Create an event and notify every other member of the group.
pub fn create_event(
    conn: &Connection,
    group: GroupId,
    creator: UserId,
    new: &NewEvent<'_>,
) -> Result<(GroupEvent, Vec<Notification>)> {
    let title = new.title.trim();
    if title.is_empty() {
        return Err(Error::validation("Event title must not be empty"));
    }
    let starts_at = chrono::DateTime::parse_from_rfc3339(new.starts_at)
        .map_err(|e| Error::validation(format!("starts_at is not an RFC 3339 timestamp: {e}")))?;
    let starts_at = time::format(starts_at.with_timezone(&chrono::Utc));

    let id = EventId::new();
    let created_at = time::now();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    tx.execute(
        "INSERT INTO group_events (id, group_id, creator_id, title, description, starts_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            id.to_string(),
            group.to_string(),
            creator.to_string(),
            title,
            new.description,
            starts_at,
            created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let recipients: Vec<UserId> = {
        let mut stmt = tx
            .prepare("SELECT user_id FROM group_members WHERE group_id = ?1 AND user_id <> ?2")
            .map_err(|e| Error::database(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![group.to_string(), creator.to_string()], |row| {
                crate::models::parse_id(row, 0)
            })
            .map_err(|e| Error::database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::database(e.to_string()))?;
        rows
    };

    let entity = id.to_string();
    let notes = recipients
        .into_iter()
        .map(|member| {
            notifications::create_notification(
                &tx,
                member,
                Some(creator),
                NotificationKind::GroupEvent,
                Some(&entity),
            )
        })
        .collect::<Result<Vec<_>>>()?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok((
        GroupEvent {
            id,
            group_id: group,
            creator_id: creator,
            title: title.to_string(),
            description: new.description.to_string(),
            starts_at,
            created_at,
            going: 0,
            not_going: 0,
        },
        notes,
    ))
}

pub fn get_event(conn: &Connection, id: EventId) -> Result<Option<GroupEvent>> {
    conn.query_row(
        &format!("SELECT {COLS} FROM group_events e WHERE e.id = ?1"),
        [id.to_string()],
        GroupEvent::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Events of a group ordered by start time.
pub fn list_events(conn: &Connection, group: GroupId) -> Result<Vec<GroupEvent>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLS} FROM group_events e WHERE e.group_id = ?1
             ORDER BY e.starts_at ASC, e.rowid ASC"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([group.to_string()], GroupEvent::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Record or replace `user`'s answer to an event and return the fresh tallies.
pub fn respond(conn: &Connection, event: EventId, user: UserId, response: Rsvp) -> Result<GroupEvent> {
    conn.execute(
        "INSERT INTO group_event_responses (event_id, user_id, response, responded_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (event_id, user_id)
         DO UPDATE SET response = excluded.response, responded_at = excluded.responded_at",
        rusqlite::params![event.to_string(), user.to_string(), response.as_str(), time::now()],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    get_event(conn, event)?.ok_or_else(|| Error::not_found("event", event))
}

/// `user`'s answer to an event, if any.
pub fn get_response(conn: &Connection, event: EventId, user: UserId) -> Result<Option<Rsvp>> {
    let text: Option<String> = conn
        .query_row(
            "SELECT response FROM group_event_responses WHERE event_id = ?1 AND user_id = ?2",
            rusqlite::params![event.to_string(), user.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;
    text.map(|t| t.parse::<Rsvp>().map_err(|e| Error::database(format!("bad stored response: {e}"))))
        .transpose()
}

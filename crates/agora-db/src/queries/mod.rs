//! Database query modules.

pub mod chats;
pub mod comments;
pub mod follows;
pub mod group_events;
pub mod group_posts;
pub mod groups;
pub mod notifications;
pub mod posts;
pub mod sessions;
pub mod users;
pub mod votes;

use agora_core::Error;

/// Map a rusqlite error to [`Error::Conflict`] when it is a uniqueness
/// violation, or to a database error otherwise.
pub(crate) fn conflict_or_db(e: rusqlite::Error, message: impl FnOnce() -> String) -> Error {
    if e.to_string().contains("UNIQUE constraint failed") {
        Error::Conflict(message())
    } else {
        Error::database(e.to_string())
    }
}

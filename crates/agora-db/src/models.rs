//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row` selected with the column order documented on it.

use std::fmt;
use std::str::FromStr;

use agora_core::{
    CommentId, ConversationId, EventId, FollowRequestId, GroupCommentId, GroupId, GroupPostId,
    InvitationId, JoinRequestId, MessageId, NotificationId, PostId, SessionId, UserId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

/// Parse a UUID-based ID from a text column.
pub(crate) fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))?;
    Ok(T::from(uuid))
}

pub(crate) fn parse_opt_id<T: From<Uuid>>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(v) => {
            let uuid = Uuid::parse_str(&v).map_err(|e| conversion_error(idx, e))?;
            Ok(Some(T::from(uuid)))
        }
        None => Ok(None),
    }
}

fn parse_enum<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion_error(idx, e))
}

/// Error returned when a stored enum column holds an unexpected value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// Generate `as_str`, `Display` and `FromStr` for a fieldless text enum.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// enums
// ---------------------------------------------------------------------------

/// Audience of a feed post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    /// Everyone can see it.
    Public,
    /// Only the author's followers.
    AlmostPrivate,
    /// Only the followers listed in `post_viewers`.
    Private,
}

text_enum!(Privacy {
    Public => "public",
    AlmostPrivate => "almost_private",
    Private => "private",
});

/// Direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteValue {
    Like,
    Dislike,
}

text_enum!(VoteValue {
    Like => "like",
    Dislike => "dislike",
});

impl VoteValue {
    /// The integer stored in `votes.value`.
    pub fn as_i64(self) -> i64 {
        match self {
            VoteValue::Like => 1,
            VoteValue::Dislike => -1,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            1 => Some(VoteValue::Like),
            -1 => Some(VoteValue::Dislike),
            _ => None,
        }
    }
}

/// Role of a group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

text_enum!(MemberRole {
    Owner => "owner",
    Member => "member",
});

/// A member's answer to a group event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rsvp {
    Going,
    NotGoing,
}

text_enum!(Rsvp {
    Going => "going",
    NotGoing => "not_going",
});

/// Whether a conversation is a one-to-one chat or a group room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Direct,
    Group,
}

text_enum!(ConversationKind {
    Direct => "direct",
    Group => "group",
});

/// Notification categories. `FollowRequest` is never stored; it is
/// synthesized from pending rows of `follow_requests`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Follow,
    FollowRequest,
    FollowAccepted,
    GroupInvitation,
    GroupJoinRequest,
    GroupJoinAccepted,
    GroupEvent,
}

text_enum!(NotificationKind {
    Follow => "follow",
    FollowRequest => "follow_request",
    FollowAccepted => "follow_accepted",
    GroupInvitation => "group_invitation",
    GroupJoinRequest => "group_join_request",
    GroupJoinAccepted => "group_join_accepted",
    GroupEvent => "group_event",
});

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar: Option<String>,
    pub is_public: bool,
    pub created_at: String,
}

impl User {
    /// Build from a row selected as:
    /// id, email, password_hash, first_name, last_name, date_of_birth,
    /// nickname, about_me, avatar, is_public, created_at
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            date_of_birth: row.get(5)?,
            nickname: row.get(6)?,
            about_me: row.get(7)?,
            avatar: row.get(8)?,
            is_public: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: String,
}

impl Session {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            token: row.get(2)?,
            expires_at: row.get(3)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Follow graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FollowRequest {
    pub id: FollowRequestId,
    pub requester_id: UserId,
    pub target_id: UserId,
    pub created_at: String,
}

impl FollowRequest {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            requester_id: parse_id(row, 1)?,
            target_id: parse_id(row, 2)?,
            created_at: row.get(3)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Posts, comments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub content: String,
    pub image: Option<String>,
    pub privacy: Privacy,
    pub likes: i64,
    pub dislikes: i64,
    pub comment_count: i64,
    pub created_at: String,
}

impl Post {
    /// Build from a row selected as:
    /// id, author_id, content, image, privacy, likes, dislikes,
    /// comment_count, created_at
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            author_id: parse_id(row, 1)?,
            content: row.get(2)?,
            image: row.get(3)?,
            privacy: parse_enum(row, 4)?,
            likes: row.get(5)?,
            dislikes: row.get(6)?,
            comment_count: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub content: String,
    pub image: Option<String>,
    pub likes: i64,
    pub dislikes: i64,
    pub created_at: String,
}

impl Comment {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            post_id: parse_id(row, 1)?,
            author_id: parse_id(row, 2)?,
            content: row.get(3)?,
            image: row.get(4)?,
            likes: row.get(5)?,
            dislikes: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    pub creator_id: UserId,
    pub title: String,
    pub description: String,
    pub created_at: String,
    pub member_count: i64,
}

impl Group {
    /// Build from a row selected as:
    /// id, creator_id, title, description, created_at, member_count
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            creator_id: parse_id(row, 1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            created_at: row.get(4)?,
            member_count: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroupMember {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub role: MemberRole,
    pub joined_at: String,
}

impl GroupMember {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            group_id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            role: parse_enum(row, 2)?,
            joined_at: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroupInvitation {
    pub id: InvitationId,
    pub group_id: GroupId,
    pub inviter_id: UserId,
    pub invitee_id: UserId,
    pub created_at: String,
}

impl GroupInvitation {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            group_id: parse_id(row, 1)?,
            inviter_id: parse_id(row, 2)?,
            invitee_id: parse_id(row, 3)?,
            created_at: row.get(4)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub id: JoinRequestId,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub created_at: String,
}

impl JoinRequest {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            group_id: parse_id(row, 1)?,
            user_id: parse_id(row, 2)?,
            created_at: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroupPost {
    pub id: GroupPostId,
    pub group_id: GroupId,
    pub author_id: UserId,
    pub content: String,
    pub image: Option<String>,
    pub comment_count: i64,
    pub created_at: String,
}

impl GroupPost {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            group_id: parse_id(row, 1)?,
            author_id: parse_id(row, 2)?,
            content: row.get(3)?,
            image: row.get(4)?,
            comment_count: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroupComment {
    pub id: GroupCommentId,
    pub group_post_id: GroupPostId,
    pub author_id: UserId,
    pub content: String,
    pub created_at: String,
}

impl GroupComment {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            group_post_id: parse_id(row, 1)?,
            author_id: parse_id(row, 2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroupEvent {
    pub id: EventId,
    pub group_id: GroupId,
    pub creator_id: UserId,
    pub title: String,
    pub description: String,
    pub starts_at: String,
    pub created_at: String,
    pub going: i64,
    pub not_going: i64,
}

impl GroupEvent {
    /// Build from a row selected as:
    /// id, group_id, creator_id, title, description, starts_at, created_at,
    /// going, not_going
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            group_id: parse_id(row, 1)?,
            creator_id: parse_id(row, 2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            starts_at: row.get(5)?,
            created_at: row.get(6)?,
            going: row.get(7)?,
            not_going: row.get(8)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    pub group_id: Option<GroupId>,
    pub created_at: String,
}

impl Conversation {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            kind: parse_enum(row, 1)?,
            group_id: parse_opt_id(row, 2)?,
            created_at: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: String,
}

impl Message {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            conversation_id: parse_id(row, 1)?,
            sender_id: parse_id(row, 2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A notification as shown to the user. Stored rows carry a
/// [`NotificationId`]; synthesized follow-request entries carry `None`.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Option<NotificationId>,
    pub user_id: UserId,
    pub actor_id: Option<UserId>,
    pub kind: NotificationKind,
    pub entity_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl Notification {
    /// Build from a row selected as:
    /// id, user_id, actor_id, kind, entity_id, is_read, created_at
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(parse_id(row, 0)?),
            user_id: parse_id(row, 1)?,
            actor_id: parse_opt_id(row, 2)?,
            kind: parse_enum(row, 3)?,
            entity_id: row.get(4)?,
            is_read: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    /// Whether this entry exists only as a projection of another table.
    pub fn is_synthetic(&self) -> bool {
        self.id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_round_trip() {
        for p in [Privacy::Public, Privacy::AlmostPrivate, Privacy::Private] {
            assert_eq!(p.as_str().parse::<Privacy>().unwrap(), p);
        }
        assert_eq!("not_going".parse::<Rsvp>().unwrap(), Rsvp::NotGoing);
        assert!("maybe".parse::<Rsvp>().is_err());
    }

    #[test]
    fn serde_matches_storage_text() {
        let json = serde_json::to_string(&NotificationKind::GroupJoinRequest).unwrap();
        assert_eq!(json, "\"group_join_request\"");
        assert_eq!(NotificationKind::GroupJoinRequest.as_str(), "group_join_request");
    }

    #[test]
    fn vote_values() {
        assert_eq!(VoteValue::Like.as_i64(), 1);
        assert_eq!(VoteValue::from_i64(-1), Some(VoteValue::Dislike));
        assert_eq!(VoteValue::from_i64(0), None);
    }
}

//! Chat route handlers: direct conversations, group conversations, messages.

use agora_core::events::EventPayload;
use agora_core::{ConversationId, MessageId, UserId};
use agora_db::models::{Conversation, Message};
use agora_db::queries::chats::{self, ConversationSummary};
use agora_db::queries::{follows, users};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::parse_id;
use crate::routes::users::UserSummary;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
}

impl From<&Message> for MessageResponse {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.to_string(),
            conversation_id: m.conversation_id.to_string(),
            sender_id: m.sender_id.to_string(),
            content: m.content.clone(),
            created_at: m.created_at.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub id: String,
    /// `direct` or `group`.
    pub kind: String,
    pub group_id: Option<String>,
    /// The other participant of a direct conversation.
    pub peer: Option<UserSummary>,
    /// Group title for group conversations.
    pub title: Option<String>,
    pub last_message: Option<MessageResponse>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenDirectRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<i64>,
    /// Id of the oldest message already seen; returns the page before it.
    pub before: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

fn summary_response(conn: &Connection, s: &ConversationSummary) -> agora_core::Result<ConversationResponse> {
    let peer = match s.peer_id {
        Some(id) => users::get_user_by_id(conn, id)?.as_ref().map(UserSummary::from),
        None => None,
    };
    Ok(ConversationResponse {
        id: s.conversation.id.to_string(),
        kind: s.conversation.kind.as_str().to_string(),
        group_id: s.conversation.group_id.map(|g| g.to_string()),
        peer,
        title: s.title.clone(),
        last_message: s.last_message.as_ref().map(MessageResponse::from),
        created_at: s.conversation.created_at.clone(),
    })
}

/// Load a conversation and check the caller takes part in it.
fn participant_conversation(
    conn: &Connection,
    id: ConversationId,
    user: UserId,
) -> agora_core::Result<Conversation> {
    let conversation = chats::get_conversation(conn, id)?
        .ok_or_else(|| agora_core::Error::not_found("conversation", id))?;
    if !chats::is_participant(conn, id, user)? {
        return Err(agora_core::Error::Forbidden(
            "You are not a participant in this conversation".into(),
        ));
    }
    Ok(conversation)
}

/// POST /api/chats/direct
///
/// Allowed when the target is public or either user follows the other.
pub async fn open_direct(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Json(payload): Json<OpenDirectRequest>,
) -> Result<Json<ConversationResponse>, AppError> {
    let target_id: UserId = parse_id(&payload.user_id, "user")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let target = users::get_user_by_id(&conn, target_id)?
        .ok_or_else(|| agora_core::Error::not_found("user", target_id))?;

    let allowed = target.is_public
        || follows::is_following(&conn, user_id, target_id)?
        || follows::is_following(&conn, target_id, user_id)?;
    if !allowed {
        return Err(agora_core::Error::Forbidden(
            "You can only message public users or users you are connected with".into(),
        )
        .into());
    }

    let conversation = chats::get_or_create_direct(&conn, user_id, target_id)?;
    Ok(Json(ConversationResponse {
        id: conversation.id.to_string(),
        kind: conversation.kind.as_str().to_string(),
        group_id: None,
        peer: Some(UserSummary::from(&target)),
        title: None,
        last_message: None,
        created_at: conversation.created_at,
    }))
}

/// GET /api/chats
pub async fn list_conversations(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<Vec<ConversationResponse>>, AppError> {
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let list = chats::list_conversations(&conn, user_id)?;
    let out = list
        .iter()
        .map(|s| summary_response(&conn, s))
        .collect::<agora_core::Result<Vec<_>>>()?;
    Ok(Json(out))
}

/// GET /api/chats/{id}/messages
pub async fn list_messages(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Query(params): Query<MessagesQuery>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    let id: ConversationId = parse_id(&id, "conversation")?;
    let limit = ctx.config.feed.page_size(params.limit);
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    participant_conversation(&conn, id, user_id)?;
    let before = params
        .before
        .as_deref()
        .map(|raw| parse_id::<MessageId>(raw, "message"))
        .transpose()?;
    let messages = chats::list_messages(&conn, id, limit, before)?;
    Ok(Json(messages.iter().map(MessageResponse::from).collect()))
}

/// POST /api/chats/{id}/messages
pub async fn send_message(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let id: ConversationId = parse_id(&id, "conversation")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    participant_conversation(&conn, id, user_id)?;
    let message = chats::send_message(&conn, id, user_id, &payload.content)?;

    let recipients: Vec<UserId> = chats::list_participants(&conn, id)?
        .into_iter()
        .filter(|p| *p != user_id)
        .collect();
    ctx.event_bus.publish(
        recipients,
        EventPayload::MessageSent {
            conversation_id: id,
            message_id: message.id,
            sender_id: user_id,
            content: message.content.clone(),
            created_at: message.created_at.clone(),
        },
    );

    Ok((StatusCode::CREATED, Json(MessageResponse::from(&message))))
}

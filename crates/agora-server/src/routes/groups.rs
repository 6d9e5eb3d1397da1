//! Group route handlers: membership, invitations, join requests, posts,
//! comments and events.

use agora_core::{EventId, GroupId, GroupPostId, InvitationId, JoinRequestId, UserId};
use agora_db::models::{Group, GroupComment, GroupEvent, GroupMember, GroupPost, MemberRole, Rsvp};
use agora_db::queries::group_events::{self, NewEvent};
use agora_db::queries::groups::{self, JoinOutcome};
use agora_db::queries::{group_posts, users};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::users::UserSummary;
use crate::routes::{parse_id, publish_notification, ListParams};

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub creator_id: String,
    pub member_count: i64,
    pub is_member: bool,
    /// `owner` or `member` when the caller belongs to the group.
    pub role: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub user: UserSummary,
    pub role: String,
    pub joined_at: String,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub id: String,
    pub group_id: String,
    pub group_title: String,
    pub inviter: UserSummary,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    /// `joined` when a pending invitation was accepted, else `requested`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JoinRequestResponse {
    pub id: String,
    pub group_id: String,
    pub user: UserSummary,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupPostRequest {
    pub content: String,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GroupPostResponse {
    pub id: String,
    pub group_id: String,
    pub author: UserSummary,
    pub content: String,
    pub image: Option<String>,
    pub comment_count: i64,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupCommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct GroupCommentResponse {
    pub id: String,
    pub group_post_id: String,
    pub author: UserSummary,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// RFC 3339 timestamp.
    pub starts_at: String,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    /// `going` or `not_going`.
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: String,
    pub group_id: String,
    pub creator_id: String,
    pub title: String,
    pub description: String,
    pub starts_at: String,
    pub going: i64,
    pub not_going: i64,
    pub my_response: Option<String>,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_group(conn: &Connection, id: GroupId) -> agora_core::Result<Group> {
    groups::get_group(conn, id)?.ok_or_else(|| agora_core::Error::not_found("group", id))
}

/// Load the group and the caller's membership, rejecting non-members.
fn require_member(conn: &Connection, group: GroupId, user: UserId) -> agora_core::Result<(Group, GroupMember)> {
    let g = load_group(conn, group)?;
    let member = groups::get_member(conn, group, user)?
        .ok_or_else(|| agora_core::Error::Forbidden("You are not a member of this group".into()))?;
    Ok((g, member))
}

fn require_owner(conn: &Connection, group: GroupId, user: UserId) -> agora_core::Result<Group> {
    let (g, member) = require_member(conn, group, user)?;
    if member.role != MemberRole::Owner {
        return Err(agora_core::Error::Forbidden(
            "Only the group owner can manage join requests".into(),
        ));
    }
    Ok(g)
}

fn user_summary(conn: &Connection, id: UserId) -> agora_core::Result<UserSummary> {
    let user = users::get_user_by_id(conn, id)?.ok_or_else(|| agora_core::Error::not_found("user", id))?;
    Ok(UserSummary::from(&user))
}

fn group_response(conn: &Connection, viewer: UserId, g: &Group) -> agora_core::Result<GroupResponse> {
    let member = groups::get_member(conn, g.id, viewer)?;
    Ok(GroupResponse {
        id: g.id.to_string(),
        title: g.title.clone(),
        description: g.description.clone(),
        creator_id: g.creator_id.to_string(),
        member_count: g.member_count,
        is_member: member.is_some(),
        role: member.map(|m| m.role.as_str().to_string()),
        created_at: g.created_at.clone(),
    })
}

fn group_post_response(conn: &Connection, p: &GroupPost) -> agora_core::Result<GroupPostResponse> {
    Ok(GroupPostResponse {
        id: p.id.to_string(),
        group_id: p.group_id.to_string(),
        author: user_summary(conn, p.author_id)?,
        content: p.content.clone(),
        image: p.image.clone(),
        comment_count: p.comment_count,
        created_at: p.created_at.clone(),
    })
}

fn group_comment_response(conn: &Connection, c: &GroupComment) -> agora_core::Result<GroupCommentResponse> {
    Ok(GroupCommentResponse {
        id: c.id.to_string(),
        group_post_id: c.group_post_id.to_string(),
        author: user_summary(conn, c.author_id)?,
        content: c.content.clone(),
        created_at: c.created_at.clone(),
    })
}

fn event_response(conn: &Connection, viewer: UserId, e: &GroupEvent) -> agora_core::Result<EventResponse> {
    let mine = group_events::get_response(conn, e.id, viewer)?;
    Ok(EventResponse {
        id: e.id.to_string(),
        group_id: e.group_id.to_string(),
        creator_id: e.creator_id.to_string(),
        title: e.title.clone(),
        description: e.description.clone(),
        starts_at: e.starts_at.clone(),
        going: e.going,
        not_going: e.not_going,
        my_response: mine.map(|r| r.as_str().to_string()),
        created_at: e.created_at.clone(),
    })
}

/// Load a group post and check the caller belongs to its group.
fn member_group_post(conn: &Connection, id: GroupPostId, user: UserId) -> agora_core::Result<GroupPost> {
    let post = group_posts::get_group_post(conn, id)?
        .ok_or_else(|| agora_core::Error::not_found("group_post", id))?;
    require_member(conn, post.group_id, user)?;
    Ok(post)
}

// ---------------------------------------------------------------------------
// Groups and membership
// ---------------------------------------------------------------------------

/// GET /api/groups
pub async fn list_groups(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<GroupResponse>>, AppError> {
    let (limit, offset) = params.resolve(&ctx.config.feed);
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let list = groups::list_groups(&conn, limit, offset)?;
    let out = list
        .iter()
        .map(|g| group_response(&conn, user_id, g))
        .collect::<agora_core::Result<Vec<_>>>()?;
    Ok(Json(out))
}

/// POST /api/groups
pub async fn create_group(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), AppError> {
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let group = groups::create_group(&conn, user_id, &payload.title, payload.description.trim())?;
    tracing::info!(group_id = %group.id, creator = %user_id, "Group created");
    Ok((StatusCode::CREATED, Json(group_response(&conn, user_id, &group)?)))
}

/// GET /api/groups/{id}
pub async fn get_group(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<GroupResponse>, AppError> {
    let id: GroupId = parse_id(&id, "group")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let group = load_group(&conn, id)?;
    Ok(Json(group_response(&conn, user_id, &group)?))
}

/// GET /api/groups/{id}/members
pub async fn list_members(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MemberResponse>>, AppError> {
    let id: GroupId = parse_id(&id, "group")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    require_member(&conn, id, user_id)?;
    let members = groups::list_members(&conn, id)?;
    let out = members
        .iter()
        .map(|m| -> agora_core::Result<MemberResponse> {
            Ok(MemberResponse {
                user: user_summary(&conn, m.user_id)?,
                role: m.role.as_str().to_string(),
                joined_at: m.joined_at.clone(),
            })
        })
        .collect::<agora_core::Result<Vec<_>>>()?;
    Ok(Json(out))
}

/// POST /api/groups/{id}/leave
pub async fn leave_group(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: GroupId = parse_id(&id, "group")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    load_group(&conn, id)?;
    groups::leave_group(&conn, id, user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

/// POST /api/groups/{id}/invitations
pub async fn invite(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Json(payload): Json<InviteRequest>,
) -> Result<(StatusCode, Json<InvitationResponse>), AppError> {
    let id: GroupId = parse_id(&id, "group")?;
    let invitee: UserId = parse_id(&payload.user_id, "user")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let (group, _) = require_member(&conn, id, user_id)?;
    users::get_user_by_id(&conn, invitee)?.ok_or_else(|| agora_core::Error::not_found("user", invitee))?;

    let (invitation, notification) = groups::create_invitation(&conn, id, user_id, invitee)?;
    publish_notification(&ctx, &notification);

    Ok((
        StatusCode::CREATED,
        Json(InvitationResponse {
            id: invitation.id.to_string(),
            group_id: group.id.to_string(),
            group_title: group.title,
            inviter: user_summary(&conn, user_id)?,
            created_at: invitation.created_at,
        }),
    ))
}

/// GET /api/group-invitations
pub async fn my_invitations(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<Vec<InvitationResponse>>, AppError> {
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let invitations = groups::list_invitations_for(&conn, user_id)?;
    let out = invitations
        .iter()
        .map(|inv| -> agora_core::Result<InvitationResponse> {
            let group = load_group(&conn, inv.group_id)?;
            Ok(InvitationResponse {
                id: inv.id.to_string(),
                group_id: group.id.to_string(),
                group_title: group.title,
                inviter: user_summary(&conn, inv.inviter_id)?,
                created_at: inv.created_at.clone(),
            })
        })
        .collect::<agora_core::Result<Vec<_>>>()?;
    Ok(Json(out))
}

fn own_invitation(conn: &Connection, id: InvitationId, user_id: UserId) -> agora_core::Result<()> {
    let invitation = groups::get_invitation(conn, id)?
        .ok_or_else(|| agora_core::Error::not_found("invitation", id))?;
    if invitation.invitee_id != user_id {
        return Err(agora_core::Error::Forbidden(
            "Only the invited user can answer an invitation".into(),
        ));
    }
    Ok(())
}

/// POST /api/group-invitations/{id}/accept
pub async fn accept_invitation(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<GroupResponse>, AppError> {
    let id: InvitationId = parse_id(&id, "invitation")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    own_invitation(&conn, id, user_id)?;
    let member = groups::accept_invitation(&conn, id)?;
    let group = load_group(&conn, member.group_id)?;
    tracing::debug!(group_id = %group.id, user_id = %user_id, "Invitation accepted");
    Ok(Json(group_response(&conn, user_id, &group)?))
}

/// POST /api/group-invitations/{id}/decline
pub async fn decline_invitation(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: InvitationId = parse_id(&id, "invitation")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    own_invitation(&conn, id, user_id)?;
    groups::delete_invitation(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Join requests
// ---------------------------------------------------------------------------

/// POST /api/groups/{id}/join-requests
pub async fn request_join(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<JoinResponse>), AppError> {
    let id: GroupId = parse_id(&id, "group")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let response = match groups::request_join(&conn, id, user_id)? {
        JoinOutcome::Joined(_) => JoinResponse {
            status: "joined".into(),
            request_id: None,
        },
        JoinOutcome::Requested {
            request,
            notification,
        } => {
            publish_notification(&ctx, &notification);
            JoinResponse {
                status: "requested".into(),
                request_id: Some(request.id.to_string()),
            }
        }
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/groups/{id}/join-requests
pub async fn list_join_requests(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<Vec<JoinRequestResponse>>, AppError> {
    let id: GroupId = parse_id(&id, "group")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    require_owner(&conn, id, user_id)?;
    let requests = groups::list_join_requests(&conn, id)?;
    let out = requests
        .iter()
        .map(|r| -> agora_core::Result<JoinRequestResponse> {
            Ok(JoinRequestResponse {
                id: r.id.to_string(),
                group_id: r.group_id.to_string(),
                user: user_summary(&conn, r.user_id)?,
                created_at: r.created_at.clone(),
            })
        })
        .collect::<agora_core::Result<Vec<_>>>()?;
    Ok(Json(out))
}

fn owned_join_request(conn: &Connection, id: JoinRequestId, user_id: UserId) -> agora_core::Result<()> {
    let request = groups::get_join_request(conn, id)?
        .ok_or_else(|| agora_core::Error::not_found("join_request", id))?;
    require_owner(conn, request.group_id, user_id)?;
    Ok(())
}

/// POST /api/group-join-requests/{id}/accept
pub async fn accept_join_request(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: JoinRequestId = parse_id(&id, "join request")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    owned_join_request(&conn, id, user_id)?;
    let (member, notification) = groups::accept_join_request(&conn, id, user_id)?;
    publish_notification(&ctx, &notification);
    tracing::debug!(group_id = %member.group_id, user_id = %member.user_id, "Join request accepted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/group-join-requests/{id}/decline
pub async fn decline_join_request(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: JoinRequestId = parse_id(&id, "join request")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    owned_join_request(&conn, id, user_id)?;
    groups::delete_join_request(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Group posts and comments
// ---------------------------------------------------------------------------

/// GET /api/groups/{id}/posts
pub async fn list_group_posts(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<GroupPostResponse>>, AppError> {
    let id: GroupId = parse_id(&id, "group")?;
    let (limit, offset) = params.resolve(&ctx.config.feed);
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    require_member(&conn, id, user_id)?;
    let list = group_posts::list_group_posts(&conn, id, limit, offset)?;
    let out = list
        .iter()
        .map(|p| group_post_response(&conn, p))
        .collect::<agora_core::Result<Vec<_>>>()?;
    Ok(Json(out))
}

/// POST /api/groups/{id}/posts
pub async fn create_group_post(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Json(payload): Json<CreateGroupPostRequest>,
) -> Result<(StatusCode, Json<GroupPostResponse>), AppError> {
    let id: GroupId = parse_id(&id, "group")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    require_member(&conn, id, user_id)?;
    let post = group_posts::create_group_post(&conn, id, user_id, &payload.content, payload.image.as_deref())?;
    Ok((StatusCode::CREATED, Json(group_post_response(&conn, &post)?)))
}

/// GET /api/group-posts/{id}/comments
pub async fn list_group_comments(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<Vec<GroupCommentResponse>>, AppError> {
    let id: GroupPostId = parse_id(&id, "group post")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    member_group_post(&conn, id, user_id)?;
    let list = group_posts::list_group_comments(&conn, id)?;
    let out = list
        .iter()
        .map(|c| group_comment_response(&conn, c))
        .collect::<agora_core::Result<Vec<_>>>()?;
    Ok(Json(out))
}

/// POST /api/group-posts/{id}/comments
pub async fn create_group_comment(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Json(payload): Json<CreateGroupCommentRequest>,
) -> Result<(StatusCode, Json<GroupCommentResponse>), AppError> {
    let id: GroupPostId = parse_id(&id, "group post")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    member_group_post(&conn, id, user_id)?;
    let comment = group_posts::create_group_comment(&conn, id, user_id, &payload.content)?;
    Ok((StatusCode::CREATED, Json(group_comment_response(&conn, &comment)?)))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// GET /api/groups/{id}/events
pub async fn list_events(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let id: GroupId = parse_id(&id, "group")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    require_member(&conn, id, user_id)?;
    let list = group_events::list_events(&conn, id)?;
    let out = list
        .iter()
        .map(|e| event_response(&conn, user_id, e))
        .collect::<agora_core::Result<Vec<_>>>()?;
    Ok(Json(out))
}

/// POST /api/groups/{id}/events
pub async fn create_event(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let id: GroupId = parse_id(&id, "group")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    require_member(&conn, id, user_id)?;
    let (event, notifications) = group_events::create_event(
        &conn,
        id,
        user_id,
        &NewEvent {
            title: &payload.title,
            description: payload.description.trim(),
            starts_at: payload.starts_at.trim(),
        },
    )?;
    for n in &notifications {
        publish_notification(&ctx, n);
    }
    tracing::debug!(event_id = %event.id, notified = notifications.len(), "Group event created");
    Ok((StatusCode::CREATED, Json(event_response(&conn, user_id, &event)?)))
}

/// POST /api/group-events/{id}/respond
pub async fn respond_to_event(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<EventResponse>, AppError> {
    let id: EventId = parse_id(&id, "event")?;
    let response = payload.response.parse::<Rsvp>().map_err(|_| {
        agora_core::Error::Validation("response must be 'going' or 'not_going'".into())
    })?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let event = group_events::get_event(&conn, id)?
        .ok_or_else(|| agora_core::Error::not_found("event", id))?;
    require_member(&conn, event.group_id, user_id)?;
    let updated = group_events::respond(&conn, id, user_id, response)?;
    Ok(Json(event_response(&conn, user_id, &updated)?))
}

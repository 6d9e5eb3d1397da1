//! Follow and follow-request route handlers.

use agora_core::events::EventPayload;
use agora_core::{FollowRequestId, UserId};
use agora_db::models::{FollowRequest, User};
use agora_db::queries::follows::{self, FollowOutcome};
use agora_db::queries::users;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::users::UserSummary;
use crate::routes::{parse_id, publish_notification};

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    /// `following` or `requested`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FollowRequestResponse {
    pub id: String,
    pub requester: UserSummary,
    pub created_at: String,
}

fn request_response(request: &FollowRequest, requester: &User) -> FollowRequestResponse {
    FollowRequestResponse {
        id: request.id.to_string(),
        requester: UserSummary::from(requester),
        created_at: request.created_at.clone(),
    }
}

/// Load a request and check that `user_id` is its target.
fn owned_request(
    conn: &rusqlite::Connection,
    id: FollowRequestId,
    user_id: UserId,
) -> Result<FollowRequest, AppError> {
    let request = follows::get_follow_request(conn, id)?
        .ok_or_else(|| agora_core::Error::not_found("follow_request", id))?;
    if request.target_id != user_id {
        return Err(agora_core::Error::Forbidden(
            "Only the requested user can answer a follow request".into(),
        )
        .into());
    }
    Ok(request)
}

/// POST /api/users/{id}/follow
pub async fn follow_user(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<FollowResponse>, AppError> {
    let target: UserId = parse_id(&id, "user")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let outcome = follows::follow(&conn, user_id, target)?;

    let request_id = match &outcome {
        FollowOutcome::AlreadyFollowing => None,
        FollowOutcome::Followed { notification } => {
            publish_notification(&ctx, notification);
            None
        }
        FollowOutcome::Requested { request, created } => {
            if *created {
                ctx.event_bus.publish(
                    vec![target],
                    EventPayload::FollowRequestReceived {
                        request_id: request.id,
                        requester_id: user_id,
                    },
                );
            }
            Some(request.id.to_string())
        }
    };

    tracing::debug!(follower = %user_id, target = %target, status = outcome.relationship().as_str(), "Follow");
    Ok(Json(FollowResponse {
        status: outcome.relationship().as_str().to_string(),
        request_id,
    }))
}

/// DELETE /api/users/{id}/follow
pub async fn unfollow_user(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let target: UserId = parse_id(&id, "user")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    follows::unfollow(&conn, user_id, target)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/follow-requests
pub async fn list_requests(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<Vec<FollowRequestResponse>>, AppError> {
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let requests = follows::list_incoming_requests(&conn, user_id)?;
    let mut out = Vec::with_capacity(requests.len());
    for request in &requests {
        if let Some(requester) = users::get_user_by_id(&conn, request.requester_id)? {
            out.push(request_response(request, &requester));
        }
    }
    Ok(Json(out))
}

/// POST /api/follow-requests/{id}/accept
pub async fn accept_request(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: FollowRequestId = parse_id(&id, "follow request")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    owned_request(&conn, id, user_id)?;
    let accepted = follows::accept_follow_request(&conn, id)?;
    publish_notification(&ctx, &accepted.notification);
    tracing::debug!(request_id = %id, "Follow request accepted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/follow-requests/{id}/decline
pub async fn decline_request(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: FollowRequestId = parse_id(&id, "follow request")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    owned_request(&conn, id, user_id)?;
    follows::delete_follow_request(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}

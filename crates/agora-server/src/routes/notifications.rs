//! Notification route handlers.
//!
//! The list merges stored notifications with pending follow requests, which
//! are reported as `follow_request` entries with a synthetic ID derived from
//! the request. Synthetic entries cannot be marked read; they disappear once
//! the request is answered.

use agora_core::{NotificationId, UserId};
use agora_db::models::Notification;
use agora_db::queries::notifications;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;

/// Prefix of the IDs given to follow-request entries.
const FOLLOW_REQUEST_ID_PREFIX: &str = "follow-request-";

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct NotificationResponse {
    pub id: String,
    /// e.g. `follow`, `follow_request`, `group_invitation`.
    pub kind: String,
    pub actor_id: Option<String>,
    /// The follow request, group or event the notification refers to.
    pub entity_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl From<&Notification> for NotificationResponse {
    fn from(n: &Notification) -> Self {
        let id = match n.id {
            Some(id) => id.to_string(),
            None => format!(
                "{FOLLOW_REQUEST_ID_PREFIX}{}",
                n.entity_id.as_deref().unwrap_or_default()
            ),
        };
        Self {
            id,
            kind: n.kind.as_str().to_string(),
            actor_id: n.actor_id.map(|a| a.to_string()),
            entity_id: n.entity_id.clone(),
            is_read: n.is_read,
            created_at: n.created_at.clone(),
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

/// GET /api/notifications
#[utoipa::path(
    get,
    path = "/api/notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Notifications and pending follow requests, newest first", body = Vec<NotificationResponse>)
    )
)]
pub async fn list_notifications(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Query(params): Query<NotificationQuery>,
) -> Result<Json<Vec<NotificationResponse>>, AppError> {
    let limit = ctx.config.feed.page_size(params.limit);
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let list = notifications::list_notifications(&conn, user_id, limit)?;
    Ok(Json(list.iter().map(NotificationResponse::from).collect()))
}

/// GET /api/notifications/unread-count
#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    responses(
        (status = 200, description = "Unread notifications plus pending follow requests", body = UnreadCountResponse)
    )
)]
pub async fn unread_count(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let count = notifications::unread_count(&conn, user_id)?;
    Ok(Json(UnreadCountResponse { count }))
}

/// POST /api/notifications/{id}/read
#[utoipa::path(
    post,
    path = "/api/notifications/{id}/read",
    params(("id" = String, Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Marked read"),
        (status = 404, description = "No such stored notification for the caller")
    )
)]
pub async fn mark_read(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let not_found = || AppError::from(agora_core::Error::not_found("notification", &id));
    let parsed: NotificationId = id.parse().map_err(|_| not_found())?;

    let conn = agora_db::pool::get_conn(&ctx.db)?;
    if !notifications::mark_read(&conn, parsed, user_id)? {
        return Err(not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/notifications/read-all
#[utoipa::path(
    post,
    path = "/api/notifications/read-all",
    responses(
        (status = 200, description = "Number of notifications marked read", body = MarkAllReadResponse)
    )
)]
pub async fn mark_all_read(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<MarkAllReadResponse>, AppError> {
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let updated = notifications::mark_all_read(&conn, user_id)?;
    Ok(Json(MarkAllReadResponse { updated }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_db::models::NotificationKind;

    #[test]
    fn synthetic_entries_get_prefixed_ids() {
        let n = Notification {
            id: None,
            user_id: UserId::new(),
            actor_id: Some(UserId::new()),
            kind: NotificationKind::FollowRequest,
            entity_id: Some("abc".into()),
            is_read: false,
            created_at: "2026-01-01T00:00:00.000000Z".into(),
        };
        let r = NotificationResponse::from(&n);
        assert_eq!(r.id, "follow-request-abc");
        assert_eq!(r.kind, "follow_request");
        assert!(r.id.parse::<NotificationId>().is_err());
    }
}

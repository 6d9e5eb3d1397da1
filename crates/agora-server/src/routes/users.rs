//! Profile, directory and follower-list route handlers.

use agora_core::UserId;
use agora_db::models::User;
use agora_db::queries::{follows, users};
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::auth::normalize_nickname;
use crate::routes::posts::{post_response, PostResponse};
use crate::routes::{parse_id, publish_notification, ListParams};

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Compact user card used in lists.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub is_public: bool,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.to_string(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            nickname: u.nickname.clone(),
            avatar: u.avatar.clone(),
            is_public: u.is_public,
        }
    }
}

/// A user profile as seen by the caller.
///
/// When `restricted` is true only the card fields and counters are filled in.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProfileResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about_me: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub followers: i64,
    pub following: i64,
    /// `none`, `requested` or `following`, from the caller's side.
    pub relationship: String,
    pub restricted: bool,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserSearchParams {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// A blank value removes the nickname.
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar: Option<String>,
    pub is_public: Option<bool>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether `viewer` may see the full profile of `target`.
pub(crate) fn can_view_full(conn: &Connection, viewer: UserId, target: &User) -> agora_core::Result<bool> {
    if target.is_public || target.id == viewer {
        return Ok(true);
    }
    follows::is_following(conn, viewer, target.id)
}

/// Build the caller-specific view of `target`.
pub(crate) fn profile_response(
    conn: &Connection,
    viewer: UserId,
    target: &User,
) -> agora_core::Result<ProfileResponse> {
    let full = can_view_full(conn, viewer, target)?;
    let is_self = viewer == target.id;
    let (followers, following) = follows::follow_counts(conn, target.id)?;
    let relationship = if is_self {
        follows::Relationship::None
    } else {
        follows::relationship(conn, viewer, target.id)?
    };

    Ok(ProfileResponse {
        id: target.id.to_string(),
        first_name: target.first_name.clone(),
        last_name: target.last_name.clone(),
        nickname: target.nickname.clone(),
        avatar: target.avatar.clone(),
        is_public: target.is_public,
        email: is_self.then(|| target.email.clone()),
        date_of_birth: full.then(|| target.date_of_birth.clone()),
        about_me: if full { target.about_me.clone() } else { None },
        created_at: full.then(|| target.created_at.clone()),
        followers,
        following,
        relationship: relationship.as_str().to_string(),
        restricted: !full,
    })
}

fn load_user(conn: &Connection, id: UserId) -> agora_core::Result<User> {
    users::get_user_by_id(conn, id)?.ok_or_else(|| agora_core::Error::not_found("user", id))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/users?q=
pub async fn list_users(
    State(ctx): State<AppContext>,
    Query(params): Query<UserSearchParams>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let limit = ctx.config.feed.page_size(params.limit);
    let offset = params.offset.unwrap_or(0).max(0);
    let found = users::search_users(&conn, params.q.as_deref(), limit, offset)?;
    Ok(Json(found.iter().map(UserSummary::from).collect()))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(ctx): State<AppContext>,
    Extension(viewer): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    let id: UserId = parse_id(&id, "user")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let target = load_user(&conn, id)?;
    Ok(Json(profile_response(&conn, viewer, &target)?))
}

/// PUT /api/users/me
pub async fn update_me(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    for (field, value) in [("first_name", &payload.first_name), ("last_name", &payload.last_name)] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(agora_core::Error::Validation(format!("{field} must not be empty")).into());
        }
    }

    let nickname = payload
        .nickname
        .as_deref()
        .map(|raw| normalize_nickname(Some(raw)))
        .transpose()?;

    let update = users::ProfileUpdate {
        first_name: payload.first_name.map(|s| s.trim().to_string()),
        last_name: payload.last_name.map(|s| s.trim().to_string()),
        nickname,
        about_me: payload.about_me,
        avatar: payload.avatar,
        is_public: payload.is_public,
    };

    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let (user, accepted) = users::update_profile(&conn, user_id, &update)?;
    if !accepted.is_empty() {
        tracing::info!(
            user_id = %user_id,
            count = accepted.len(),
            "Profile made public; pending follow requests accepted"
        );
    }
    for a in &accepted {
        publish_notification(&ctx, &a.notification);
    }

    Ok(Json(profile_response(&conn, user_id, &user)?))
}

/// GET /api/users/{id}/followers
pub async fn list_followers(
    State(ctx): State<AppContext>,
    Extension(viewer): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    let id: UserId = parse_id(&id, "user")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let target = load_user(&conn, id)?;
    if !can_view_full(&conn, viewer, &target)? {
        return Err(agora_core::Error::Forbidden("This profile is private".into()).into());
    }
    let list = follows::list_followers(&conn, id)?;
    Ok(Json(list.iter().map(UserSummary::from).collect()))
}

/// GET /api/users/{id}/following
pub async fn list_following(
    State(ctx): State<AppContext>,
    Extension(viewer): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    let id: UserId = parse_id(&id, "user")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let target = load_user(&conn, id)?;
    if !can_view_full(&conn, viewer, &target)? {
        return Err(agora_core::Error::Forbidden("This profile is private".into()).into());
    }
    let list = follows::list_following(&conn, id)?;
    Ok(Json(list.iter().map(UserSummary::from).collect()))
}

/// GET /api/users/{id}/posts
///
/// Posts by the user that the caller is allowed to see, newest first.
pub async fn list_user_posts(
    State(ctx): State<AppContext>,
    Extension(viewer): Extension<UserId>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    let id: UserId = parse_id(&id, "user")?;
    let (limit, offset) = params.resolve(&ctx.config.feed);
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    load_user(&conn, id)?;
    let posts = agora_db::queries::posts::list_posts_by_author(&conn, viewer, id, limit, offset)?;
    let out = posts
        .iter()
        .map(|p| post_response(&conn, viewer, p))
        .collect::<agora_core::Result<Vec<_>>>()?;
    Ok(Json(out))
}

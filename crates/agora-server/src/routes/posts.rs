//! Post, comment and vote route handlers.

use agora_core::{CommentId, PostId, UserId};
use agora_db::models::{Comment, Post, Privacy, User, VoteValue};
use agora_db::queries::votes::{self, VoteTarget};
use agora_db::queries::{comments, posts, users};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::users::UserSummary;
use crate::routes::{parse_id, ListParams};

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PostResponse {
    pub id: String,
    pub author: UserSummary,
    pub content: String,
    pub image: Option<String>,
    /// `public`, `almost_private` or `private`.
    pub privacy: String,
    pub likes: i64,
    pub dislikes: i64,
    pub comment_count: i64,
    /// The caller's vote: `like`, `dislike` or null.
    pub user_vote: Option<String>,
    /// Selected viewers of a private post; only shown to its author.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewers: Option<Vec<String>>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreatePostRequest {
    pub content: String,
    pub image: Option<String>,
    /// Defaults to `public`.
    pub privacy: Option<String>,
    /// Required for `private` posts: followers allowed to see the post.
    #[serde(default)]
    pub viewers: Vec<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CommentResponse {
    pub id: String,
    pub post_id: String,
    pub author: UserSummary,
    pub content: String,
    pub image: Option<String>,
    pub likes: i64,
    pub dislikes: i64,
    pub user_vote: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateCommentRequest {
    pub content: String,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct VoteRequest {
    /// `like` or `dislike`.
    pub value: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VoteResponse {
    pub likes: i64,
    pub dislikes: i64,
    pub user_vote: Option<String>,
    /// `added`, `removed` or `switched`.
    #[schema(value_type = String)]
    pub outcome: votes::VoteOutcome,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn author_summary(conn: &Connection, id: UserId) -> agora_core::Result<UserSummary> {
    let user: User = users::get_user_by_id(conn, id)?.ok_or_else(|| agora_core::Error::not_found("user", id))?;
    Ok(UserSummary::from(&user))
}

pub(crate) fn post_response(conn: &Connection, viewer: UserId, post: &Post) -> agora_core::Result<PostResponse> {
    let user_vote = votes::get_user_vote(conn, viewer, VoteTarget::Post(post.id))?;
    let viewers = if post.privacy == Privacy::Private && post.author_id == viewer {
        Some(
            posts::list_viewers(conn, post.id)?
                .into_iter()
                .map(|id| id.to_string())
                .collect(),
        )
    } else {
        None
    };

    Ok(PostResponse {
        id: post.id.to_string(),
        author: author_summary(conn, post.author_id)?,
        content: post.content.clone(),
        image: post.image.clone(),
        privacy: post.privacy.as_str().to_string(),
        likes: post.likes,
        dislikes: post.dislikes,
        comment_count: post.comment_count,
        user_vote: user_vote.map(|v| v.as_str().to_string()),
        viewers,
        created_at: post.created_at.clone(),
    })
}

fn comment_response(conn: &Connection, viewer: UserId, comment: &Comment) -> agora_core::Result<CommentResponse> {
    let user_vote = votes::get_user_vote(conn, viewer, VoteTarget::Comment(comment.id))?;
    Ok(CommentResponse {
        id: comment.id.to_string(),
        post_id: comment.post_id.to_string(),
        author: author_summary(conn, comment.author_id)?,
        content: comment.content.clone(),
        image: comment.image.clone(),
        likes: comment.likes,
        dislikes: comment.dislikes,
        user_vote: user_vote.map(|v| v.as_str().to_string()),
        created_at: comment.created_at.clone(),
    })
}

/// Load a post the caller may see. Invisible posts look missing.
fn visible_post(conn: &Connection, viewer: UserId, id: PostId) -> agora_core::Result<Post> {
    posts::get_visible_post(conn, viewer, id)?.ok_or_else(|| agora_core::Error::not_found("post", id))
}

fn parse_vote(raw: &str) -> Result<VoteValue, AppError> {
    raw.parse::<VoteValue>()
        .map_err(|_| agora_core::Error::Validation("Vote must be 'like' or 'dislike'".into()).into())
}

fn vote_response(tally: votes::VoteTally) -> VoteResponse {
    VoteResponse {
        likes: tally.likes,
        dislikes: tally.dislikes,
        user_vote: tally.user_vote.map(|v| v.as_str().to_string()),
        outcome: tally.outcome,
    }
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// GET /api/posts
#[utoipa::path(
    get,
    path = "/api/posts",
    params(ListParams),
    responses(
        (status = 200, description = "Posts visible to the caller, newest first", body = Vec<PostResponse>)
    )
)]
pub async fn feed(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    let (limit, offset) = params.resolve(&ctx.config.feed);
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let list = posts::list_feed(&conn, user_id, limit, offset)?;
    let out = list
        .iter()
        .map(|p| post_response(&conn, user_id, p))
        .collect::<agora_core::Result<Vec<_>>>()?;
    Ok(Json(out))
}

/// POST /api/posts
#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = PostResponse),
        (status = 400, description = "Invalid content, privacy or viewers")
    )
)]
pub async fn create_post(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), AppError> {
    let privacy = match payload.privacy.as_deref() {
        None => Privacy::Public,
        Some(raw) => raw.parse::<Privacy>().map_err(|_| {
            agora_core::Error::Validation(
                "privacy must be one of public, almost_private, private".into(),
            )
        })?,
    };
    let viewers = payload
        .viewers
        .iter()
        .map(|v| parse_id::<UserId>(v, "viewer"))
        .collect::<Result<Vec<_>, _>>()?;

    let new = posts::NewPost {
        content: payload.content,
        image: payload.image,
        privacy,
        viewers,
    };

    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let post = posts::create_post(&conn, user_id, &new)?;
    tracing::debug!(post_id = %post.id, privacy = post.privacy.as_str(), "Post created");
    Ok((StatusCode::CREATED, Json(post_response(&conn, user_id, &post)?)))
}

/// GET /api/posts/{id}
#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = String, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post", body = PostResponse),
        (status = 404, description = "Post not found or not visible")
    )
)]
pub async fn get_post(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<PostResponse>, AppError> {
    let id: PostId = parse_id(&id, "post")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let post = visible_post(&conn, user_id, id)?;
    Ok(Json(post_response(&conn, user_id, &post)?))
}

/// DELETE /api/posts/{id}
#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = String, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Post deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: PostId = parse_id(&id, "post")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let post = visible_post(&conn, user_id, id)?;
    if post.author_id != user_id {
        return Err(agora_core::Error::Forbidden("Only the author can delete a post".into()).into());
    }
    posts::delete_post(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/posts/{id}/vote
#[utoipa::path(
    post,
    path = "/api/posts/{id}/vote",
    params(("id" = String, Path, description = "Post ID")),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Fresh counters and the caller's vote", body = VoteResponse),
        (status = 404, description = "Post not found or not visible")
    )
)]
pub async fn vote_post(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let id: PostId = parse_id(&id, "post")?;
    let value = parse_vote(&payload.value)?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    visible_post(&conn, user_id, id)?;
    let tally = votes::cast_vote(&conn, user_id, VoteTarget::Post(id), value)?;
    Ok(Json(vote_response(tally)))
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

/// GET /api/posts/{id}/comments
#[utoipa::path(
    get,
    path = "/api/posts/{id}/comments",
    params(("id" = String, Path, description = "Post ID"), ListParams),
    responses(
        (status = 200, description = "Comments, oldest first", body = Vec<CommentResponse>),
        (status = 404, description = "Post not found or not visible")
    )
)]
pub async fn list_comments(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<CommentResponse>>, AppError> {
    let id: PostId = parse_id(&id, "post")?;
    let (limit, offset) = params.resolve(&ctx.config.feed);
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    visible_post(&conn, user_id, id)?;
    let list = comments::list_comments(&conn, id, limit, offset)?;
    let out = list
        .iter()
        .map(|c| comment_response(&conn, user_id, c))
        .collect::<agora_core::Result<Vec<_>>>()?;
    Ok(Json(out))
}

/// POST /api/posts/{id}/comments
#[utoipa::path(
    post,
    path = "/api/posts/{id}/comments",
    params(("id" = String, Path, description = "Post ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = CommentResponse),
        (status = 400, description = "Empty comment"),
        (status = 404, description = "Post not found or not visible")
    )
)]
pub async fn create_comment(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), AppError> {
    let id: PostId = parse_id(&id, "post")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    visible_post(&conn, user_id, id)?;
    let comment = comments::create_comment(&conn, id, user_id, &payload.content, payload.image.as_deref())?;
    Ok((StatusCode::CREATED, Json(comment_response(&conn, user_id, &comment)?)))
}

/// DELETE /api/comments/{id}
#[utoipa::path(
    delete,
    path = "/api/comments/{id}",
    params(("id" = String, Path, description = "Comment ID")),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 403, description = "Neither the comment's nor the post's author"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn delete_comment(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: CommentId = parse_id(&id, "comment")?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let comment = comments::get_comment(&conn, id)?
        .ok_or_else(|| agora_core::Error::not_found("comment", id))?;
    let post = visible_post(&conn, user_id, comment.post_id)?;
    if comment.author_id != user_id && post.author_id != user_id {
        return Err(agora_core::Error::Forbidden(
            "Only the comment's author or the post's author can delete it".into(),
        )
        .into());
    }
    comments::delete_comment(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/comments/{id}/vote
#[utoipa::path(
    post,
    path = "/api/comments/{id}/vote",
    params(("id" = String, Path, description = "Comment ID")),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Fresh counters and the caller's vote", body = VoteResponse),
        (status = 404, description = "Comment not found or its post is not visible")
    )
)]
pub async fn vote_comment(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let id: CommentId = parse_id(&id, "comment")?;
    let value = parse_vote(&payload.value)?;
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let comment = comments::get_comment(&conn, id)?
        .ok_or_else(|| agora_core::Error::not_found("comment", id))?;
    visible_post(&conn, user_id, comment.post_id)?;
    let tally = votes::cast_vote(&conn, user_id, VoteTarget::Comment(id), value)?;
    Ok(Json(vote_response(tally)))
}

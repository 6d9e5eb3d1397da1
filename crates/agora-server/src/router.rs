//! Axum router construction.
//!
//! Builds the full application router with all route groups and middleware
//! layers.

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::auth_rate_limit_middleware;
use crate::middleware::request_id::{request_id_middleware, X_REQUEST_ID};
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::auth::register,
        routes::auth::login,
        routes::auth::logout,
        routes::auth::me,
        routes::posts::feed,
        routes::posts::create_post,
        routes::posts::get_post,
        routes::posts::delete_post,
        routes::posts::vote_post,
        routes::posts::list_comments,
        routes::posts::create_comment,
        routes::posts::delete_comment,
        routes::posts::vote_comment,
        routes::notifications::list_notifications,
        routes::notifications::unread_count,
        routes::notifications::mark_read,
        routes::notifications::mark_all_read,
    ),
    components(schemas(
        routes::auth::RegisterRequest,
        routes::auth::LoginRequest,
        routes::auth::AuthResponse,
        routes::users::ProfileResponse,
        routes::users::UserSummary,
        routes::posts::PostResponse,
        routes::posts::CreatePostRequest,
        routes::posts::CommentResponse,
        routes::posts::CreateCommentRequest,
        routes::posts::VoteRequest,
        routes::posts::VoteResponse,
        routes::notifications::NotificationResponse,
        routes::notifications::UnreadCountResponse,
        routes::notifications::MarkAllReadResponse,
    ))
)]
struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer(ctx: &AppContext) -> CorsLayer {
    let origins: Vec<HeaderValue> = ctx
        .config
        .cors
        .allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {o:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, X_REQUEST_ID.clone()])
        .expose_headers([X_REQUEST_ID.clone()])
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = cors_layer(&ctx);

    // Login and register: public but throttled.
    let auth_routes = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth_rate_limit_middleware,
        ));

    // Protected API routes.
    let protected_routes = Router::new()
        // Session
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/me", get(routes::auth::me))
        // Users
        .route("/users", get(routes::users::list_users))
        .route("/users/me", put(routes::users::update_me))
        .route("/users/{id}", get(routes::users::get_user))
        .route("/users/{id}/followers", get(routes::users::list_followers))
        .route("/users/{id}/following", get(routes::users::list_following))
        .route("/users/{id}/posts", get(routes::users::list_user_posts))
        // Follows
        .route(
            "/users/{id}/follow",
            post(routes::follows::follow_user).delete(routes::follows::unfollow_user),
        )
        .route("/follow-requests", get(routes::follows::list_requests))
        .route(
            "/follow-requests/{id}/accept",
            post(routes::follows::accept_request),
        )
        .route(
            "/follow-requests/{id}/decline",
            post(routes::follows::decline_request),
        )
        // Posts, comments and votes
        .route(
            "/posts",
            get(routes::posts::feed).post(routes::posts::create_post),
        )
        .route(
            "/posts/{id}",
            get(routes::posts::get_post).delete(routes::posts::delete_post),
        )
        .route("/posts/{id}/vote", post(routes::posts::vote_post))
        .route(
            "/posts/{id}/comments",
            get(routes::posts::list_comments).post(routes::posts::create_comment),
        )
        .route("/comments/{id}", delete(routes::posts::delete_comment))
        .route("/comments/{id}/vote", post(routes::posts::vote_comment))
        // Groups
        .route(
            "/groups",
            get(routes::groups::list_groups).post(routes::groups::create_group),
        )
        .route("/groups/{id}", get(routes::groups::get_group))
        .route("/groups/{id}/members", get(routes::groups::list_members))
        .route("/groups/{id}/leave", post(routes::groups::leave_group))
        .route("/groups/{id}/invitations", post(routes::groups::invite))
        .route("/group-invitations", get(routes::groups::my_invitations))
        .route(
            "/group-invitations/{id}/accept",
            post(routes::groups::accept_invitation),
        )
        .route(
            "/group-invitations/{id}/decline",
            post(routes::groups::decline_invitation),
        )
        .route(
            "/groups/{id}/join-requests",
            get(routes::groups::list_join_requests).post(routes::groups::request_join),
        )
        .route(
            "/group-join-requests/{id}/accept",
            post(routes::groups::accept_join_request),
        )
        .route(
            "/group-join-requests/{id}/decline",
            post(routes::groups::decline_join_request),
        )
        .route(
            "/groups/{id}/posts",
            get(routes::groups::list_group_posts).post(routes::groups::create_group_post),
        )
        .route(
            "/group-posts/{id}/comments",
            get(routes::groups::list_group_comments).post(routes::groups::create_group_comment),
        )
        .route(
            "/groups/{id}/events",
            get(routes::groups::list_events).post(routes::groups::create_event),
        )
        .route(
            "/group-events/{id}/respond",
            post(routes::groups::respond_to_event),
        )
        // Chat
        .route("/chats", get(routes::chats::list_conversations))
        .route("/chats/direct", post(routes::chats::open_direct))
        .route(
            "/chats/{id}/messages",
            get(routes::chats::list_messages).post(routes::chats::send_message),
        )
        // Notifications
        .route(
            "/notifications",
            get(routes::notifications::list_notifications),
        )
        .route(
            "/notifications/unread-count",
            get(routes::notifications::unread_count),
        )
        .route(
            "/notifications/read-all",
            post(routes::notifications::mark_all_read),
        )
        .route(
            "/notifications/{id}/read",
            post(routes::notifications::mark_read),
        )
        // SSE Events
        .route("/events", get(routes::events::events_handler))
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    let api = auth_routes.merge(protected_routes);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api", api)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

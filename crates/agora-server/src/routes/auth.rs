//! Authentication route handlers: register, login, logout, me.

use agora_core::UserId;
use agora_db::queries::{sessions, users};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{Duration, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::SessionToken;
use crate::routes::users::{profile_response, ProfileResponse};

/// Registration payload.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// `YYYY-MM-DD`, must lie in the past.
    pub date_of_birth: String,
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar: Option<String>,
    /// Defaults to a public profile.
    pub is_public: Option<bool>,
}

/// Login payload. `login` is an email address or a nickname.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "nickname")]
    pub login: String,
    pub password: String,
}

/// Returned by register and login.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: String,
    pub user: ProfileResponse,
}

fn invalid(msg: impl Into<String>) -> AppError {
    agora_core::Error::Validation(msg.into()).into()
}

fn validate_registration(req: &RegisterRequest, min_password_length: usize) -> Result<(), AppError> {
    let email = req.email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        });
    if !well_formed || email.chars().any(char::is_whitespace) {
        return Err(invalid("Invalid email address"));
    }

    if req.password.chars().count() < min_password_length {
        return Err(invalid(format!(
            "Password must be at least {min_password_length} characters"
        )));
    }

    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err(invalid("First and last name are required"));
    }

    let dob = NaiveDate::parse_from_str(req.date_of_birth.trim(), "%Y-%m-%d")
        .map_err(|_| invalid("date_of_birth must be formatted YYYY-MM-DD"))?;
    if dob >= Utc::now().date_naive() {
        return Err(invalid("date_of_birth must be in the past"));
    }

    normalize_nickname(req.nickname.as_deref())?;

    Ok(())
}

/// Trim a submitted nickname. Blank means no nickname; `@` is reserved for
/// email logins.
pub(crate) fn normalize_nickname(raw: Option<&str>) -> Result<Option<String>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(nick) if nick.contains('@') => Err(invalid("Nickname must not contain '@'")),
        Some(nick) => Ok(Some(nick.to_string())),
    }
}

/// Create a session for `user_id`, returning the token, its expiry and the
/// `Set-Cookie` header value carrying it.
fn start_session(
    ctx: &AppContext,
    conn: &Connection,
    user_id: UserId,
) -> Result<(String, String, HeaderValue), AppError> {
    let token = uuid::Uuid::new_v4().to_string();
    let hours = ctx.config.auth.session_timeout_hours;
    let expires_at = agora_db::time::format(Utc::now() + Duration::hours(hours as i64));
    sessions::create_session(conn, user_id, &token, &expires_at)?;

    let cookie = session_cookie(ctx, &token, hours * 3600)?;
    Ok((token, expires_at, cookie))
}

fn session_cookie(ctx: &AppContext, token: &str, max_age_secs: u64) -> Result<HeaderValue, AppError> {
    let secure = if ctx.config.auth.cookie_secure {
        "; Secure"
    } else {
        ""
    };
    let value = format!(
        "{}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}{secure}",
        ctx.config.auth.cookie_name
    );
    HeaderValue::from_str(&value)
        .map_err(|e| agora_core::Error::Internal(format!("invalid cookie header: {e}")).into())
}

/// POST /api/auth/register
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and session started", body = AuthResponse),
        (status = 400, description = "Invalid registration data"),
        (status = 409, description = "Email or nickname already taken"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn register(
    State(ctx): State<AppContext>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    validate_registration(&payload, ctx.config.auth.min_password_length)?;

    let hash = bcrypt::hash(&payload.password, ctx.config.auth.bcrypt_cost)
        .map_err(|e| agora_core::Error::Internal(format!("bcrypt error: {e}")))?;

    let email = payload.email.trim().to_lowercase();
    let nickname = normalize_nickname(payload.nickname.as_deref())?;

    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let user = users::create_user(
        &conn,
        &users::NewUser {
            email: &email,
            password_hash: &hash,
            first_name: payload.first_name.trim(),
            last_name: payload.last_name.trim(),
            date_of_birth: payload.date_of_birth.trim(),
            nickname: nickname.as_deref(),
            about_me: payload.about_me.as_deref(),
            avatar: payload.avatar.as_deref(),
            is_public: payload.is_public.unwrap_or(true),
        },
    )?;

    let (token, expires_at, cookie) = start_session(&ctx, &conn, user.id)?;
    tracing::info!(user_id = %user.id, "User registered");

    let body = AuthResponse {
        token,
        expires_at,
        user: profile_response(&conn, user.id, &user)?,
    };
    Ok((StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// POST /api/auth/login
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn login(
    State(ctx): State<AppContext>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let user = users::get_user_by_login(&conn, payload.login.trim())?;

    let Some(user) = user.filter(|u| bcrypt::verify(&payload.password, &u.password_hash).unwrap_or(false))
    else {
        tracing::debug!("Rejected login attempt");
        return Err(agora_core::Error::Unauthorized("Invalid credentials".into()).into());
    };

    let (token, expires_at, cookie) = start_session(&ctx, &conn, user.id)?;
    tracing::info!(user_id = %user.id, "User logged in");

    let body = AuthResponse {
        token,
        expires_at,
        user: profile_response(&conn, user.id, &user)?,
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// POST /api/auth/logout
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 204, description = "Session ended"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn logout(
    State(ctx): State<AppContext>,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> Result<Response, AppError> {
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    sessions::delete_session(&conn, &token)?;
    let cleared = session_cookie(&ctx, "", 0)?;
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cleared)]).into_response())
}

/// GET /api/auth/me
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "The caller's profile", body = ProfileResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<ProfileResponse>, AppError> {
    let conn = agora_db::pool::get_conn(&ctx.db)?;
    let user = users::get_user_by_id(&conn, user_id)?
        .ok_or_else(|| agora_core::Error::not_found("user", user_id))?;
    Ok(Json(profile_response(&conn, user_id, &user)?))
}

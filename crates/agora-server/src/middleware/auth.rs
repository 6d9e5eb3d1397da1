//! Authentication middleware.
//!
//! Resolves the caller's session from an `Authorization: Bearer <token>`
//! header or the session cookie and injects the authenticated [`UserId`]
//! (plus the raw [`SessionToken`]) into request extensions.

use agora_core::UserId;
use agora_db::pool::DbPool;
use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;

/// The token of the session that authenticated the current request.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Extract a session token from request headers.
///
/// Resolution order:
/// 1. `Authorization: Bearer <token>`
/// 2. Cookie: `<cookie_name>=<token>`
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    let cookies = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())?;
    let prefix = format!("{cookie_name}=");
    cookies
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix(prefix.as_str()))
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Look up an unexpired session for `token`.
fn validate_token(db: &DbPool, token: &str) -> agora_core::Result<Option<UserId>> {
    let conn = agora_db::pool::get_conn(db)?;
    let session =
        agora_db::queries::sessions::get_valid_session(&conn, token, &agora_db::time::now())?;
    Ok(session.map(|s| s.user_id))
}

/// Authentication middleware. Applied to protected routes only.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let request_id = request.extensions().get::<RequestId>().map(|r| r.0.clone());
    let reject = |err: agora_core::Error| {
        let err = match &request_id {
            Some(id) => AppError::new(err).with_request_id(id.clone()),
            None => AppError::new(err),
        };
        err.into_response()
    };
    let unauthorized = || agora_core::Error::Unauthorized("Authentication required".into());

    let Some(token) = extract_token(request.headers(), &ctx.config.auth.cookie_name) else {
        return Err(reject(unauthorized()));
    };

    match validate_token(&ctx.db, &token) {
        Ok(Some(user_id)) => {
            request.extensions_mut().insert(user_id);
            request.extensions_mut().insert(SessionToken(token));
            Ok(next.run(request).await)
        }
        Ok(None) => Err(reject(unauthorized())),
        Err(e) => Err(reject(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        headers.insert("cookie", HeaderValue::from_static("agora_session=def"));
        assert_eq!(extract_token(&headers, "agora_session").as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("theme=dark; agora_session=tok123; lang=en"),
        );
        assert_eq!(
            extract_token(&headers, "agora_session").as_deref(),
            Some("tok123")
        );
    }

    #[test]
    fn missing_or_empty_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_token(&headers, "agora_session").is_none());
        headers.insert("authorization", HeaderValue::from_static("Basic Zm9v"));
        headers.insert("cookie", HeaderValue::from_static("agora_session="));
        assert!(extract_token(&headers, "agora_session").is_none());
    }
}

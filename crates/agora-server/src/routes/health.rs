//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::context::AppContext;

/// GET /health
///
/// Reports `ok` when a pooled connection can run a trivial query.
pub async fn health_check(State(ctx): State<AppContext>) -> (StatusCode, Json<Value>) {
    let db_ok = agora_db::pool::get_conn(&ctx.db)
        .map(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok())
        .unwrap_or(false);

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "database": db_ok,
        })),
    )
}

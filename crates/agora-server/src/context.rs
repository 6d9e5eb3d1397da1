//! Application context shared by all route handlers via Axum state.

use std::sync::Arc;

use agora_core::config::Config;
use agora_core::events::EventBus;
use agora_db::pool::DbPool;

use crate::middleware::rate_limit::{create_limiter, SharedLimiter};

/// Application context shared by all request handlers.
///
/// This is cheaply cloneable because it only holds `Arc`s and the pool.
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool.
    pub db: DbPool,
    /// Immutable application configuration.
    pub config: Arc<Config>,
    /// Broadcast event bus feeding the SSE stream.
    pub event_bus: Arc<EventBus>,
    /// Throttle for the unauthenticated login and register endpoints.
    pub auth_limiter: SharedLimiter,
}

impl AppContext {
    pub fn new(db: DbPool, config: Config) -> Self {
        let auth_limiter = create_limiter(config.rate_limit.auth_requests_per_minute);
        Self {
            db,
            config: Arc::new(config),
            event_bus: Arc::new(EventBus::default()),
            auth_limiter,
        }
    }
}

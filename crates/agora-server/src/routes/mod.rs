//! Route handlers for the HTTP API.

pub mod auth;
pub mod chats;
pub mod events;
pub mod follows;
pub mod groups;
pub mod health;
pub mod notifications;
pub mod posts;
pub mod users;

use std::str::FromStr;

use agora_core::config::FeedConfig;
use agora_core::events::EventPayload;
use agora_db::models::Notification;
use serde::Deserialize;

use crate::context::AppContext;
use crate::error::AppError;

/// Paging query parameters shared by list endpoints.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListParams {
    /// Resolve to a `(limit, offset)` pair bounded by the feed config.
    pub fn resolve(&self, feed: &FeedConfig) -> (i64, i64) {
        (feed.page_size(self.limit), self.offset.unwrap_or(0).max(0))
    }
}

/// Parse a path segment into a typed ID, mapping failure to 400.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, AppError> {
    raw.parse()
        .map_err(|_| agora_core::Error::Validation(format!("Invalid {what} ID")).into())
}

/// Push a freshly stored notification to its recipient's event stream.
pub(crate) fn publish_notification(ctx: &AppContext, notification: &Notification) {
    let Some(notification_id) = notification.id else {
        return;
    };
    ctx.event_bus.publish(
        vec![notification.user_id],
        EventPayload::NotificationCreated {
            notification_id,
            kind: notification.kind.as_str().to_string(),
        },
    );
}

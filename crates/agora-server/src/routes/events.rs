//! Server-Sent Events (SSE) handler.
//!
//! Subscribes to the [`agora_core::events::EventBus`], forwards only events
//! addressed to the caller, replays missed events when the client reconnects
//! with `Last-Event-ID`, and sends keepalive heartbeats.

use agora_core::events::{Event as BusEvent, EventPayload};
use agora_core::UserId;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Extension;
use std::convert::Infallible;
use std::time::Duration;

use crate::context::AppContext;

/// How many recent events are searched when replaying.
const REPLAY_WINDOW: usize = 50;

fn event_name(payload: &EventPayload) -> &'static str {
    match payload {
        EventPayload::MessageSent { .. } => "message_sent",
        EventPayload::NotificationCreated { .. } => "notification_created",
        EventPayload::FollowRequestReceived { .. } => "follow_request_received",
    }
}

fn to_sse(event: &BusEvent) -> Option<Event> {
    let data = serde_json::to_string(event).ok()?;
    Some(
        Event::default()
            .id(event.id.to_string())
            .event(event_name(&event.payload))
            .data(data),
    )
}

/// Events newer than `last_seen`, oldest first. `recent` is newest first; an
/// unknown `last_seen` replays the whole window.
fn events_after(recent: Vec<BusEvent>, last_seen: &str) -> Vec<BusEvent> {
    let mut missed: Vec<BusEvent> = recent
        .into_iter()
        .take_while(|e| e.id.to_string() != last_seen)
        .collect();
    missed.reverse();
    missed
}

/// GET /api/events -- SSE stream of events addressed to the caller.
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    headers: HeaderMap,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    // Subscribe before reading the replay window so nothing falls in between.
    let mut rx = ctx.event_bus.subscribe();
    let replay = match last_event_id.as_deref() {
        Some(last) => events_after(ctx.event_bus.recent_for(user_id, REPLAY_WINDOW), last),
        None => Vec::new(),
    };
    tracing::debug!(user_id = %user_id, replayed = replay.len(), "SSE client connected");

    let stream = async_stream::stream! {
        let mut replayed = std::collections::HashSet::new();
        for event in replay {
            replayed.insert(event.id);
            if let Some(sse) = to_sse(&event) {
                yield Ok(sse);
            }
        }

        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if event.is_for(user_id) && !replayed.contains(&event.id) {
                                if let Some(sse) = to_sse(&event) {
                                    yield Ok(sse);
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!("SSE client lagged by {n} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(Event::default()
                        .event("heartbeat")
                        .data(r#"{"type":"heartbeat"}"#));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::events::EventBus;
    use agora_core::{FollowRequestId, NotificationId};

    fn notification_event() -> EventPayload {
        EventPayload::NotificationCreated {
            notification_id: NotificationId::new(),
            kind: "follow".into(),
        }
    }

    #[test]
    fn replay_returns_only_newer_events_in_order() {
        let bus = EventBus::default();
        let user = UserId::new();
        for _ in 0..3 {
            bus.publish(vec![user], notification_event());
        }
        let recent = bus.recent_for(user, REPLAY_WINDOW);
        let oldest = recent[2].id;
        let middle = recent[1].id;
        let newest = recent[0].id;

        let missed = events_after(recent, &oldest.to_string());
        let ids: Vec<_> = missed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![middle, newest]);
    }

    #[test]
    fn unknown_last_id_replays_window() {
        let bus = EventBus::default();
        let user = UserId::new();
        bus.publish(
            vec![user],
            EventPayload::FollowRequestReceived {
                request_id: FollowRequestId::new(),
                requester_id: UserId::new(),
            },
        );
        bus.publish(vec![user], notification_event());
        let missed = events_after(bus.recent_for(user, REPLAY_WINDOW), "gone");
        assert_eq!(missed.len(), 2);
        assert_eq!(event_name(&missed[0].payload), "follow_request_received");
    }
}

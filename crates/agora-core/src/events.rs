//! Application event system for SSE delivery.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that a client reconnecting its stream can
//! catch up. Every event is addressed to an explicit set of users; stream
//! handlers only forward events whose recipient list contains the caller.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::{ConversationId, FollowRequestId, MessageId, NotificationId, UserId};

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    MessageSent {
        conversation_id: ConversationId,
        message_id: MessageId,
        sender_id: UserId,
        content: String,
        created_at: String,
    },
    NotificationCreated {
        notification_id: NotificationId,
        kind: String,
    },
    FollowRequestReceived {
        request_id: FollowRequestId,
        requester_id: UserId,
    },
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped, addressed event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Users who should receive the event.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub recipients: Vec<UserId>,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(recipients: Vec<UserId>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            recipients,
            payload,
        }
    }

    /// Whether `user` is one of the addressees.
    pub fn is_for(&self, user: UserId) -> bool {
        self.recipients.contains(&user)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event to `recipients`. Events with no recipients are dropped.
    pub fn publish(&self, recipients: Vec<UserId>, payload: EventPayload) {
        if recipients.is_empty() {
            return;
        }
        let event = Event::new(recipients, payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // Ignore send errors (no subscribers).
        let _ = self.tx.send(event);
    }

    /// Return up to `n` most recent events addressed to `user` (newest first).
    pub fn recent_for(&self, user: UserId, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().filter(|e| e.is_for(user)).take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(kind: &str) -> EventPayload {
        EventPayload::NotificationCreated {
            notification_id: NotificationId::new(),
            kind: kind.into(),
        }
    }

    #[test]
    fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let alice = UserId::new();

        bus.publish(vec![alice], notification("follow"));

        let event = rx.try_recv().unwrap();
        assert!(event.is_for(alice));
        assert!(!event.is_for(UserId::new()));
    }

    #[test]
    fn empty_recipients_are_dropped() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(Vec::new(), notification("follow"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(256);
        let alice = UserId::new();
        for _ in 0..(MAX_RECENT_EVENTS + 50) {
            bus.publish(vec![alice], notification("follow"));
        }
        assert_eq!(bus.recent_for(alice, 1000).len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn recent_for_filters_by_recipient() {
        let bus = EventBus::default();
        let alice = UserId::new();
        let bob = UserId::new();
        bus.publish(vec![alice], notification("follow"));
        bus.publish(vec![bob], notification("group_event"));
        bus.publish(vec![alice, bob], notification("group_invitation"));

        let for_alice = bus.recent_for(alice, 10);
        assert_eq!(for_alice.len(), 2);
        // Newest first.
        match &for_alice[0].payload {
            EventPayload::NotificationCreated { kind, .. } => assert_eq!(kind, "group_invitation"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn recipients_not_serialized() {
        let event = Event::new(
            vec![UserId::new()],
            EventPayload::FollowRequestReceived {
                request_id: FollowRequestId::new(),
                requester_id: UserId::new(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("recipients").is_none());
        assert_eq!(json["payload"]["type"], "follow_request_received");
    }
}

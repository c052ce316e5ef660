//! Events delivered by the queue.

use crate::id::EventId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;

/// Priority assigned when none is given.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Channel assigned when none is given.
pub const DEFAULT_CHANNEL: &str = "default";

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

/// An immutable unit of work.
///
/// The `with_*` setters consume the event, so an event is fully described
/// before it is handed to a queue and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    kind: String,
    #[serde(default)]
    payload: Map<String, JsonValue>,
    #[serde(default = "default_priority")]
    priority: i32,
    #[serde(default = "default_channel")]
    channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
}

impl Event {
    /// Creates an event of the given kind with a fresh ID and defaults.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            kind: kind.into(),
            payload: Map::new(),
            priority: DEFAULT_PRIORITY,
            channel: default_channel(),
            reply_to: None,
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Map<String, JsonValue>) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the priority. Higher values are serviced first.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the routing channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Sets the correlation tag replies should carry.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Unique identifier assigned at creation.
    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    /// What kind of work this event represents.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Opaque data carried to the consumer.
    #[must_use]
    pub fn payload(&self) -> &Map<String, JsonValue> {
        &self.payload
    }

    /// Service priority; higher is more urgent.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Routing channel.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Correlation tag for replies, if any.
    #[must_use]
    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// Service order between two events: higher priority sorts first.
    ///
    /// Events of equal priority compare `Equal` whatever their IDs; there is
    /// no per-event secondary key (see DESIGN.md, "Event tie-break").
    #[must_use]
    pub fn cmp_dispatch(&self, other: &Self) -> Ordering {
        other.priority.cmp(&self.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_event_has_defaults() {
        let event = Event::new("report.generate");
        assert_eq!(event.kind(), "report.generate");
        assert_eq!(event.priority(), DEFAULT_PRIORITY);
        assert_eq!(event.channel(), "default");
        assert!(event.reply_to().is_none());
        assert!(event.payload().is_empty());
    }

    #[test]
    fn builder_sets_fields() {
        let mut payload = Map::new();
        payload.insert("user".to_string(), json!("ada"));

        let event = Event::new("mail.send")
            .with_payload(payload)
            .with_priority(20)
            .with_channel("outbound")
            .with_reply_to("req-42");

        assert_eq!(event.priority(), 20);
        assert_eq!(event.channel(), "outbound");
        assert_eq!(event.reply_to(), Some("req-42"));
        assert_eq!(event.payload()["user"], json!("ada"));
    }

    #[test]
    fn each_event_gets_its_own_id() {
        assert_ne!(Event::new("a").id(), Event::new("a").id());
    }

    #[test]
    fn higher_priority_dispatches_first() {
        let urgent = Event::new("x").with_priority(20);
        let routine = Event::new("x").with_priority(5);

        assert_eq!(urgent.cmp_dispatch(&routine), Ordering::Less);
        assert_eq!(routine.cmp_dispatch(&urgent), Ordering::Greater);

        let mut events = vec![routine.clone(), urgent.clone()];
        events.sort_by(Event::cmp_dispatch);
        assert_eq!(events[0].id(), urgent.id());
    }

    #[test]
    fn equal_priority_does_not_discriminate_by_id() {
        let a = Event::new("x");
        let b = Event::new("y");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.cmp_dispatch(&b), Ordering::Equal);
        assert_eq!(b.cmp_dispatch(&a), Ordering::Equal);
    }

    #[test]
    fn deserialize_fills_defaults() {
        let id = EventId::new();
        let event: Event = serde_json::from_value(json!({
            "id": id,
            "kind": "ping",
        }))
        .expect("deserialize");

        assert_eq!(event.id(), id);
        assert_eq!(event.priority(), DEFAULT_PRIORITY);
        assert_eq!(event.channel(), DEFAULT_CHANNEL);
    }

    #[test]
    fn serialize_omits_missing_reply_to() {
        let json = serde_json::to_value(Event::new("ping")).expect("serialize");
        assert!(json.get("reply_to").is_none());
        assert_eq!(json["priority"], 10);
    }
}

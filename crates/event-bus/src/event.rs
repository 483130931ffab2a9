use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{DecodeError, EventBusError, Result};

/// Unique identifier for an event, and the deduplication key consumers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A family of related events sharing one wire contract.
///
/// Implementors are serde enums tagged by `eventType`:
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// #[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
/// enum PaymentEvent {
///     PaymentCompleted(PaymentEventData),
///     PaymentFailed(PaymentEventData),
/// }
/// ```
///
/// `EVENT_TYPES` lists every tag the family accepts so that decoding can tell
/// an event that belongs elsewhere (dropped) from a broken one (dead-lettered).
pub trait EventContract: Serialize + DeserializeOwned + Send + Sync {
    /// Every `eventType` value this family accepts.
    const EVENT_TYPES: &'static [&'static str];

    /// The `eventType` tag of this event.
    fn event_type(&self) -> &'static str;
}

/// The wire shape of every event on the bus.
///
/// Serialized flat: `{"eventId", "eventType", "eventTime", ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The type of the event (e.g. `PAYMENT_COMPLETED`).
    pub event_type: String,

    /// When the event was created.
    pub event_time: DateTime<Utc>,

    /// Every other top-level field.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl EventEnvelope {
    /// Creates a new event envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Wraps a typed event in a fresh envelope.
    pub fn wrap<E: EventContract>(event: &E) -> Result<Self> {
        Self::builder().event(event)?.build()
    }

    /// Decodes the payload into the given event family.
    pub fn decode<E: EventContract>(&self) -> std::result::Result<E, DecodeError> {
        if !E::EVENT_TYPES.contains(&self.event_type.as_str()) {
            return Err(DecodeError::UnknownType(self.event_type.clone()));
        }

        let mut object = self.payload.clone();
        object.insert("eventType".to_string(), Value::String(self.event_type.clone()));

        serde_json::from_value(Value::Object(object)).map_err(|e| DecodeError::Malformed {
            event_type: self.event_type.clone(),
            reason: e.to_string(),
        })
    }

    /// Serializes the envelope into a message body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a message body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Returns a top-level payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    event_time: Option<DateTime<Utc>>,
    payload: Map<String, Value>,
}

impl EventEnvelopeBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the event time. If not set, the current time will be used.
    pub fn event_time(mut self, time: DateTime<Utc>) -> Self {
        self.event_time = Some(time);
        self
    }

    /// Adds a single payload field.
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.payload.insert(name.into(), value);
        self
    }

    /// Merges every field of a serializable struct into the payload.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        match serde_json::to_value(payload)? {
            Value::Object(fields) => {
                self.payload.extend(fields);
                Ok(self)
            }
            other => Err(EventBusError::InvalidEnvelope(format!(
                "payload must serialize to a JSON object, got {other}"
            ))),
        }
    }

    /// Sets the type and payload from a typed event.
    pub fn event<E: EventContract>(self, event: &E) -> Result<Self> {
        let mut builder = self.event_type(event.event_type()).payload(event)?;
        builder.payload.remove("eventType");
        Ok(builder)
    }

    /// Builds the envelope, failing if no event type was set.
    pub fn build(self) -> Result<EventEnvelope> {
        self.try_build()
            .ok_or_else(|| EventBusError::InvalidEnvelope("event_type is required".to_string()))
    }

    /// Tries to build the event envelope, returning None if the type is missing.
    pub fn try_build(self) -> Option<EventEnvelope> {
        Some(EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type?,
            event_time: self.event_time.unwrap_or_else(Utc::now),
            payload: self.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Ping {
        target: String,
        count: u32,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
    enum PingEvent {
        PingSent(Ping),
        PingLost(Ping),
    }

    impl EventContract for PingEvent {
        const EVENT_TYPES: &'static [&'static str] = &["PING_SENT", "PING_LOST"];

        fn event_type(&self) -> &'static str {
            match self {
                PingEvent::PingSent(_) => "PING_SENT",
                PingEvent::PingLost(_) => "PING_LOST",
            }
        }
    }

    #[test]
    fn event_id_new_creates_unique_ids() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn envelope_serializes_flat() {
        let envelope = EventEnvelope::builder()
            .event_type("PING_SENT")
            .field("target", json!("host-a"))
            .build()
            .unwrap();

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["eventType"], "PING_SENT");
        assert_eq!(value["target"], "host-a");
        assert!(value["eventId"].is_string());
        assert!(value["eventTime"].is_string());
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn wrap_and_decode_typed_event() {
        let event = PingEvent::PingLost(Ping {
            target: "host-b".to_string(),
            count: 3,
        });

        let envelope = EventEnvelope::wrap(&event).unwrap();
        assert_eq!(envelope.event_type, "PING_LOST");
        assert!(envelope.field("eventType").is_none());

        let bytes = envelope.to_bytes().unwrap();
        let parsed = EventEnvelope::from_slice(&bytes).unwrap();
        assert_eq!(parsed.event_id, envelope.event_id);
        assert_eq!(parsed.decode::<PingEvent>().unwrap(), event);
    }

    #[test]
    fn decode_rejects_types_outside_the_family() {
        let envelope = EventEnvelope::builder()
            .event_type("PONG_RECEIVED")
            .build()
            .unwrap();

        assert_eq!(
            envelope.decode::<PingEvent>(),
            Err(DecodeError::UnknownType("PONG_RECEIVED".to_string()))
        );
    }

    #[test]
    fn decode_reports_malformed_payloads() {
        let envelope = EventEnvelope::builder()
            .event_type("PING_SENT")
            .field("target", json!("host-a"))
            .build()
            .unwrap();

        assert!(matches!(
            envelope.decode::<PingEvent>(),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn missing_event_type_is_not_an_envelope() {
        let body = json!({
            "eventId": EventId::new(),
            "eventTime": Utc::now(),
            "items": []
        });
        let bytes = serde_json::to_vec(&body).unwrap();
        assert!(EventEnvelope::from_slice(&bytes).is_err());
    }

    #[test]
    fn builder_requires_event_type() {
        assert!(EventEnvelope::builder().try_build().is_none());
        assert!(EventEnvelope::builder().build().is_err());
    }
}

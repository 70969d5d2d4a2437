//! Wyoming event protocol.
//!
//! Every message is an [`Event`]: a type name, a JSON object of data and an
//! optional binary payload. [`EventCodec`] frames events on a byte stream and
//! the message structs below give the typed view of the events this service
//! sends and receives.

mod codec;
mod messages;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

pub use codec::EventCodec;
pub use messages::*;

/// Errors raised while framing or interpreting events.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event header exceeds {0} bytes")]
    HeaderTooLong(usize),

    #[error("event data must be a JSON object")]
    DataNotObject,

    #[error("invalid '{event_type}' event: {reason}")]
    InvalidData { event_type: String, reason: String },
}

/// A single protocol event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    pub event_type: String,      // Event type name, e.g. "audio-chunk"
    pub data: Map<String, Value>, // Event data (empty when absent)
    pub payload: Option<Bytes>,  // Binary payload (audio)
}

impl Event {
    /// Create an event without data or payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self { event_type: event_type.into(), ..Default::default() }
    }

    /// Create an event from a typed message.
    ///
    /// # Errors
    /// Returns an error if the message does not serialize to a JSON object.
    pub fn from_message<M: Message>(message: &M) -> Result<Self, ProtocolError> {
        let data = match serde_json::to_value(message)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(ProtocolError::DataNotObject),
        };
        Ok(Self { data, ..Self::new(M::EVENT_TYPE) })
    }

    /// Attach a binary payload.
    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Check whether this event carries the given message type.
    pub fn is<M: Message>(&self) -> bool {
        self.event_type == M::EVENT_TYPE
    }

    /// Interpret the event data as a typed message.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidData`] if the type does not match or the
    /// data does not have the message's shape.
    pub fn to_message<M: Message>(&self) -> Result<M, ProtocolError> {
        if !self.is::<M>() {
            return Err(ProtocolError::InvalidData {
                event_type: self.event_type.clone(),
                reason: format!("expected '{}'", M::EVENT_TYPE),
            });
        }
        serde_json::from_value(Value::Object(self.data.clone()))
            .map_err(|e| ProtocolError::InvalidData { event_type: self.event_type.clone(), reason: e.to_string() })
    }
}

/// A typed event body with a fixed event type name.
pub trait Message: Serialize + DeserializeOwned {
    const EVENT_TYPE: &'static str;

    /// Convert into an event.
    ///
    /// # Errors
    /// Returns an error if the message cannot be serialized.
    fn to_event(&self) -> Result<Event, ProtocolError> {
        Event::from_message(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_message_round_trip_through_event() {
        let event = SynthesizeChunk { text: "Hello".into() }.to_event().unwrap();
        assert_eq!(event.event_type, "synthesize-chunk");
        assert!(event.payload.is_none());
        assert_eq!(event.data.get("text"), Some(&json!("Hello")));
        assert_eq!(event.to_message::<SynthesizeChunk>().unwrap().text, "Hello");
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let event = Event::new("describe");
        assert!(matches!(event.to_message::<Synthesize>(), Err(ProtocolError::InvalidData { .. })));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let event = Event::new(Synthesize::EVENT_TYPE);
        let err = event.to_message::<Synthesize>().unwrap_err();
        assert!(err.to_string().contains("text"), "{}", err);
    }

    #[test]
    fn test_unit_message_has_empty_data() {
        let event = SynthesizeStopped {}.to_event().unwrap();
        assert!(event.data.is_empty());
        assert!(event.payload.is_none());
    }
}

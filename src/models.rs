use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::errors::DecodeError;

// ============================================================================
// Payload values
// ============================================================================
//
// Clients send an open JSON object. Each top-level value is narrowed to a
// small closed set of variants so the flattening rule stays precise:
//
//   "checkout"      -> Text       -> checkout
//   1 / 2.5         -> Number     -> 1 / 2.5
//   true            -> Bool       -> true
//   null            -> Null       -> null
//   {..} / [..]     -> Nested     -> compact JSON text
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum PayloadValue {
    Text(String),
    Number(Number),
    Bool(bool),
    Null,
    Nested(String),
}

impl From<Value> for PayloadValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => PayloadValue::Text(s),
            Value::Number(n) => PayloadValue::Number(n),
            Value::Bool(b) => PayloadValue::Bool(b),
            Value::Null => PayloadValue::Null,
            nested @ (Value::Array(_) | Value::Object(_)) => {
                PayloadValue::Nested(nested.to_string())
            }
        }
    }
}

impl PayloadValue {
    /// Text form stored in the wide-record payload map.
    pub fn flatten(&self) -> String {
        match self {
            PayloadValue::Text(s) => s.clone(),
            PayloadValue::Number(n) => n.to_string(),
            PayloadValue::Bool(b) => b.to_string(),
            PayloadValue::Null => "null".to_string(),
            PayloadValue::Nested(json) => json.clone(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PayloadValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

pub type Payload = BTreeMap<String, PayloadValue>;

// ============================================================================
// Queue wire format
// ============================================================================

/// What the gateway publishes: the caller's body, untouched, under `payload`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEvent {
    pub project_id: String,
    pub payload: Map<String, Value>,
}

impl OutboundEvent {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

// Body fields are optional and nullable: an explicit `null` decodes the same
// as an absent field.
#[derive(Debug, Deserialize)]
struct QueueMessage {
    project_id: String,
    #[serde(default)]
    payload: Option<EventBody>,
}

#[derive(Debug, Default, Deserialize)]
struct EventBody {
    #[serde(default)]
    event_name: Option<String>,
    #[serde(default)]
    payload: Option<Payload>,
}

/// A decoded queue message. Never mutated once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedEvent {
    pub project_id: String,
    pub event_name: String,
    pub payload: Payload,
}

impl IngestedEvent {
    /// Decode a raw queue message body.
    ///
    /// `event_name` and the inner `payload` default to empty when absent.
    /// `project_id` is required: it is the partition key of the wide-record
    /// table and an event without one cannot be stored.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let message: QueueMessage = serde_json::from_slice(bytes)?;
        if message.project_id.is_empty() {
            return Err(DecodeError::MissingProjectId);
        }

        let body = message.payload.unwrap_or_default();

        Ok(Self {
            project_id: message.project_id,
            event_name: body.event_name.unwrap_or_default(),
            payload: body.payload.unwrap_or_default(),
        })
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(Uuid);

impl LogId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Full event as persisted in the wide-record store.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub project_id: String,
    pub log_id: LogId,
    pub event_name: String,
    pub timestamp: i64,
    pub payload: HashMap<String, String>,
}

/// Search-oriented projection written to the index store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub project_id: String,
    pub log_id: LogId,
    pub event_name: String,
    pub timestamp: i64,
    pub searchable_key: Option<String>,
}

impl LogRecord {
    pub fn from_event(event: &IngestedEvent, log_id: LogId, timestamp: i64) -> Self {
        Self {
            project_id: event.project_id.clone(),
            log_id,
            event_name: event.event_name.clone(),
            timestamp,
            payload: event
                .payload
                .iter()
                .map(|(k, v)| (k.clone(), v.flatten()))
                .collect(),
        }
    }
}

impl IndexRecord {
    /// Only a non-empty string value of `searchable_field` becomes the key.
    pub fn from_event(
        event: &IngestedEvent,
        log_id: LogId,
        timestamp: i64,
        searchable_field: &str,
    ) -> Self {
        let searchable_key = event
            .payload
            .get(searchable_field)
            .and_then(PayloadValue::as_text)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            project_id: event.project_id.clone(),
            log_id,
            event_name: event.event_name.clone(),
            timestamp,
            searchable_key,
        }
    }
}

// ============================================================================
// Read-side views
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub log_id: String,
    pub event_name: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLog {
    pub project_id: String,
    pub log_id: String,
    pub event_name: String,
    pub timestamp: i64,
    pub payload: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> IngestedEvent {
        IngestedEvent::decode(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_decode_wire_message() {
        let event = decode(
            r#"{"project_id":"p1","payload":{"event_name":"click","payload":{"searchable_key_1":"checkout","x":"1"}}}"#,
        );

        assert_eq!(event.project_id, "p1");
        assert_eq!(event.event_name, "click");
        assert_eq!(
            event.payload.get("searchable_key_1"),
            Some(&PayloadValue::Text("checkout".to_string()))
        );
    }

    #[test]
    fn test_decode_defaults_missing_body_fields() {
        let event = decode(r#"{"project_id":"p1","payload":{}}"#);
        assert_eq!(event.event_name, "");
        assert!(event.payload.is_empty());

        let event = decode(r#"{"project_id":"p1"}"#);
        assert!(event.payload.is_empty());
    }

    #[test]
    fn test_decode_treats_null_body_fields_as_absent() {
        let event = decode(r#"{"project_id":"p1","payload":{"event_name":null,"payload":{"x":"1"}}}"#);
        assert_eq!(event.event_name, "");
        assert_eq!(event.payload.get("x"), Some(&PayloadValue::Text("1".to_string())));

        let event = decode(r#"{"project_id":"p1","payload":{"event_name":"click","payload":null}}"#);
        assert_eq!(event.event_name, "click");
        assert!(event.payload.is_empty());

        let event = decode(r#"{"project_id":"p1","payload":null}"#);
        assert_eq!(event.event_name, "");
        assert!(event.payload.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            IngestedEvent::decode(b"\x00\x01not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(IngestedEvent::decode(b""), Err(DecodeError::Empty)));
        assert!(matches!(
            IngestedEvent::decode(br#"{"payload":{"event_name":"x"}}"#),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            IngestedEvent::decode(br#"{"project_id":"","payload":{}}"#),
            Err(DecodeError::MissingProjectId)
        ));
        // inner payload must be an object
        assert!(IngestedEvent::decode(br#"{"project_id":"p","payload":{"payload":[1]}}"#).is_err());
    }

    #[test]
    fn test_flatten_rule() {
        let event = decode(
            r#"{"project_id":"p","payload":{"event_name":"e","payload":{
                "s":"text","i":1,"f":2.5,"b":true,"n":null,"o":{"a":1},"l":[1,"x"]}}}"#,
        );
        let record = LogRecord::from_event(&event, LogId::generate(), 0);

        assert_eq!(record.payload["s"], "text");
        assert_eq!(record.payload["i"], "1");
        assert_eq!(record.payload["f"], "2.5");
        assert_eq!(record.payload["b"], "true");
        assert_eq!(record.payload["n"], "null");
        assert_eq!(record.payload["o"], r#"{"a":1}"#);
        assert_eq!(record.payload["l"], r#"[1,"x"]"#);
    }

    #[test]
    fn test_searchable_key_extraction() {
        let id = LogId::generate();

        let with_key = decode(r#"{"project_id":"p","payload":{"payload":{"sk":"checkout"}}}"#);
        assert_eq!(
            IndexRecord::from_event(&with_key, id, 1, "sk").searchable_key.as_deref(),
            Some("checkout")
        );

        let missing = decode(r#"{"project_id":"p","payload":{"payload":{"other":"x"}}}"#);
        assert_eq!(IndexRecord::from_event(&missing, id, 1, "sk").searchable_key, None);

        let numeric = decode(r#"{"project_id":"p","payload":{"payload":{"sk":42}}}"#);
        assert_eq!(IndexRecord::from_event(&numeric, id, 1, "sk").searchable_key, None);

        let empty = decode(r#"{"project_id":"p","payload":{"payload":{"sk":""}}}"#);
        assert_eq!(IndexRecord::from_event(&empty, id, 1, "sk").searchable_key, None);
    }

    #[test]
    fn test_outbound_event_matches_wire_shape() {
        let mut body = Map::new();
        body.insert("event_name".into(), Value::from("click"));
        let bytes = OutboundEvent { project_id: "p1".into(), payload: body }
            .to_bytes()
            .unwrap();

        let event = IngestedEvent::decode(&bytes).unwrap();
        assert_eq!(event.project_id, "p1");
        assert_eq!(event.event_name, "click");
    }
}

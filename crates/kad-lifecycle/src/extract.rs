//! Resource state extraction from a stored audit event payload.

use crate::diff::Document;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use kad_types::EventType;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("malformed audit payload: {0}")]
    MalformedPayload(String),
    #[error("malformed {field}: {reason}")]
    MalformedObject { field: &'static str, reason: String },
}

const REQUEST_OBJECT: &str = "requestObject";
const RESPONSE_OBJECT: &str = "responseObject";

/// Parse the stored raw payload; the root must be a JSON object.
pub fn parse_payload(raw: &str) -> Result<Document, ExtractError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(payload)) => Ok(payload),
        Ok(_) => Err(ExtractError::MalformedPayload(
            "payload root is not an object".to_string(),
        )),
        Err(e) => Err(ExtractError::MalformedPayload(e.to_string())),
    }
}

/// Resource state captured by one audit event.
///
/// Create/Update prefer the response object and fall back to the request object; Get uses the
/// response object; Delete has no state. `Ok(None)` means the payload carried no object.
pub fn extract_state(
    event_type: EventType,
    payload: &Document,
) -> Result<Option<Document>, ExtractError> {
    match event_type {
        EventType::Create | EventType::Update => {
            match decode_object(RESPONSE_OBJECT, payload.get(RESPONSE_OBJECT))? {
                Some(state) => Ok(Some(state)),
                None => decode_request_object(payload.get(REQUEST_OBJECT)),
            }
        }
        EventType::Get => decode_object(RESPONSE_OBJECT, payload.get(RESPONSE_OBJECT)),
        EventType::Delete => Ok(None),
    }
}

/// `user.username` of the audit event, if present and non-empty.
pub fn extract_user(payload: &Document) -> Option<&str> {
    payload
        .get("user")
        .and_then(|u| u.get("username"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// JSON-patch requests carry an operation list instead of the resource, so only a mapping
/// request object is a state.
fn decode_request_object(value: Option<&Value>) -> Result<Option<Document>, ExtractError> {
    match value {
        Some(Value::Object(_)) => decode_object(REQUEST_OBJECT, value),
        _ => Ok(None),
    }
}

/// An object field is either the resource document inline or a `{"raw": ...}` wrapper whose
/// value is base64-encoded JSON bytes, JSON text, or an inline document.
fn decode_object(
    field: &'static str,
    value: Option<&Value>,
) -> Result<Option<Document>, ExtractError> {
    let malformed = |reason: String| ExtractError::MalformedObject { field, reason };
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(obj)) if obj.len() == 1 && obj.contains_key("raw") => match &obj["raw"] {
            Value::Null => Ok(None),
            Value::Object(doc) => Ok(Some(doc.clone())),
            Value::String(text) => decode_raw_text(text).map(Some).map_err(malformed),
            other => Err(malformed(format!("unexpected raw value {}", other))),
        },
        Some(Value::Object(doc)) => Ok(Some(doc.clone())),
        Some(other) => Err(malformed(format!("expected an object, found {}", other))),
    }
}

fn decode_raw_text(text: &str) -> Result<Document, String> {
    let bytes = match STANDARD.decode(text) {
        Ok(bytes) => bytes,
        Err(_) => text.as_bytes().to_vec(),
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err("raw object is not a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

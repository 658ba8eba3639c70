//! Inbound payload shapes. The HTTP-boundary envelopes deserialize with
//! serde; the three event payloads parse field-by-field so a malformed
//! delivery names the exact field it was missing.

use herald_core::MalformedEventError;
use serde::Deserialize;
use serde_json::{Map, Value};

pub(crate) const KIND_MESSAGE: &str = "message";
pub(crate) const KIND_SLASH: &str = "slash_command";
pub(crate) const KIND_ACTION: &str = "block_action";

/// Outer body of an events-API delivery. `url_verification` bodies carry
/// a `challenge` to echo; `event_callback` bodies carry the inner event.
#[derive(Clone, Debug, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub challenge: Option<String>,
    pub event: Option<Value>,
    pub event_id: Option<String>,
}

/// Form body of an interactivity delivery: a single `payload` field
/// holding the JSON callback.
#[derive(Clone, Debug, Deserialize)]
pub struct ActionRequest {
    pub payload: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageCallback {
    pub event_type: String,
    pub subtype: Option<String>,
    pub text: Option<String>,
    pub user: Option<String>,
    pub channel: String,
    pub ts: String,
    pub event_ts: Option<String>,
    pub thread_ts: Option<String>,
}

impl MessageCallback {
    pub fn parse(raw: &Value) -> Result<Self, MalformedEventError> {
        let obj = object(raw, KIND_MESSAGE)?;
        Ok(Self {
            event_type: required_str(obj, KIND_MESSAGE, "type")?,
            subtype: optional_str(obj, KIND_MESSAGE, "subtype")?,
            text: optional_str(obj, KIND_MESSAGE, "text")?,
            user: optional_str(obj, KIND_MESSAGE, "user")?,
            channel: required_str(obj, KIND_MESSAGE, "channel")?,
            ts: required_str(obj, KIND_MESSAGE, "ts")?,
            event_ts: optional_str(obj, KIND_MESSAGE, "event_ts")?,
            thread_ts: optional_str(obj, KIND_MESSAGE, "thread_ts")?,
        })
    }

    /// Timestamp the delivery identity is built from. Deliveries carry
    /// `event_ts` alongside `ts`; redeliveries repeat both.
    pub fn identity_ts(&self) -> &str {
        self.event_ts.as_deref().unwrap_or(&self.ts)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCallback {
    pub command: String,
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
    pub thread_ts: Option<String>,
}

impl SlashCallback {
    pub fn parse(raw: &Value) -> Result<Self, MalformedEventError> {
        let obj = object(raw, KIND_SLASH)?;
        Ok(Self {
            command: required_str(obj, KIND_SLASH, "command")?,
            text: optional_str(obj, KIND_SLASH, "text")?.unwrap_or_default(),
            user_id: required_str(obj, KIND_SLASH, "user_id")?,
            channel_id: required_str(obj, KIND_SLASH, "channel_id")?,
            thread_ts: optional_str(obj, KIND_SLASH, "thread_ts")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionCallback {
    pub user_id: String,
    pub channel_id: Option<String>,
    pub action_id: String,
    pub value: Option<String>,
    pub trigger_id: Option<String>,
    pub message_ts: Option<String>,
    pub response_url: Option<String>,
}

impl ActionCallback {
    pub fn parse(raw: &Value) -> Result<Self, MalformedEventError> {
        let obj = object(raw, KIND_ACTION)?;

        let user_id = nested_str(obj, KIND_ACTION, "user", "id")?;
        let channel_id = match optional_nested_str(obj, KIND_ACTION, "channel", "id")? {
            Some(id) => Some(id),
            None => optional_nested_str(obj, KIND_ACTION, "container", "channel_id")?,
        };

        let actions = match obj.get("actions") {
            None => return Err(MalformedEventError::missing(KIND_ACTION, "actions")),
            Some(Value::Array(actions)) => actions,
            Some(_) => return Err(MalformedEventError::wrong_type(KIND_ACTION, "actions")),
        };
        // The platform delivers exactly one action entry per callback.
        let first = match actions.first() {
            None => return Err(MalformedEventError::missing(KIND_ACTION, "actions[0]")),
            Some(Value::Object(first)) => first,
            Some(_) => return Err(MalformedEventError::wrong_type(KIND_ACTION, "actions[0]")),
        };

        Ok(Self {
            user_id,
            channel_id,
            action_id: required_str(first, KIND_ACTION, "action_id")?,
            value: optional_str(first, KIND_ACTION, "value")?,
            trigger_id: optional_str(obj, KIND_ACTION, "trigger_id")?,
            message_ts: optional_nested_str(obj, KIND_ACTION, "container", "message_ts")?,
            response_url: optional_str(obj, KIND_ACTION, "response_url")?,
        })
    }
}

fn object<'a>(
    raw: &'a Value,
    kind: &'static str,
) -> Result<&'a Map<String, Value>, MalformedEventError> {
    raw.as_object().ok_or_else(|| MalformedEventError::NotAnObject { kind: kind.to_owned() })
}

fn required_str(
    obj: &Map<String, Value>,
    kind: &'static str,
    field: &'static str,
) -> Result<String, MalformedEventError> {
    match obj.get(field) {
        None => Err(MalformedEventError::missing(kind, field)),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(MalformedEventError::wrong_type(kind, field)),
    }
}

fn optional_str(
    obj: &Map<String, Value>,
    kind: &'static str,
    field: &'static str,
) -> Result<Option<String>, MalformedEventError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(MalformedEventError::wrong_type(kind, field)),
    }
}

fn nested_str(
    obj: &Map<String, Value>,
    kind: &'static str,
    parent: &'static str,
    field: &'static str,
) -> Result<String, MalformedEventError> {
    let Some(parent_value) = obj.get(parent) else {
        return Err(MalformedEventError::missing(kind, parent));
    };
    let parent_obj = parent_value
        .as_object()
        .ok_or_else(|| MalformedEventError::wrong_type(kind, parent))?;
    match parent_obj.get(field) {
        None => Err(MalformedEventError::missing(kind, format!("{parent}.{field}"))),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(MalformedEventError::wrong_type(kind, format!("{parent}.{field}"))),
    }
}

fn optional_nested_str(
    obj: &Map<String, Value>,
    kind: &'static str,
    parent: &'static str,
    field: &'static str,
) -> Result<Option<String>, MalformedEventError> {
    let Some(parent_value) = obj.get(parent) else {
        return Ok(None);
    };
    if parent_value.is_null() {
        return Ok(None);
    }
    let parent_obj = parent_value
        .as_object()
        .ok_or_else(|| MalformedEventError::wrong_type(kind, parent))?;
    match parent_obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(MalformedEventError::wrong_type(kind, format!("{parent}.{field}"))),
    }
}

#[cfg(test)]
mod tests {
    use herald_core::MalformedEventError;
    use serde_json::json;

    use super::{ActionCallback, EventEnvelope, MessageCallback, SlashCallback};

    #[test]
    fn message_callback_parses_the_documented_shape() {
        let raw = json!({
            "type": "message",
            "text": "<@UBOT123> Echo HELLO",
            "user": "U42",
            "channel": "C100",
            "ts": "1730000000.000100",
            "event_ts": "1730000000.000200",
            "thread_ts": "1729999999.000001"
        });

        let callback = MessageCallback::parse(&raw).expect("message parses");
        assert_eq!(callback.channel, "C100");
        assert_eq!(callback.identity_ts(), "1730000000.000200");
        assert_eq!(callback.thread_ts.as_deref(), Some("1729999999.000001"));
        assert_eq!(callback.subtype, None);
    }

    #[test]
    fn missing_channel_is_named_in_the_error() {
        let raw = json!({ "type": "message", "ts": "1730000000.000100" });
        let err = MessageCallback::parse(&raw).expect_err("channel is required");
        assert_eq!(err, MalformedEventError::missing("message", "channel"));
    }

    #[test]
    fn mistyped_timestamp_is_rejected() {
        let raw = json!({ "type": "message", "channel": "C100", "ts": 1730000000 });
        let err = MessageCallback::parse(&raw).expect_err("numeric ts is not a string");
        assert_eq!(err, MalformedEventError::wrong_type("message", "ts"));
    }

    #[test]
    fn slash_callback_defaults_empty_text() {
        let raw = json!({
            "command": "/make-sticker",
            "user_id": "U1",
            "channel_id": "C9"
        });

        let callback = SlashCallback::parse(&raw).expect("slash parses");
        assert_eq!(callback.text, "");
        assert_eq!(callback.thread_ts, None);
    }

    #[test]
    fn action_callback_reads_nested_user_and_container_channel() {
        let raw = json!({
            "user": { "id": "U7", "username": "casey" },
            "container": { "channel_id": "C55", "message_ts": "1730000001.000400" },
            "trigger_id": "T900",
            "actions": [
                { "action_id": "AF-abc123-U7-color", "value": "blue" }
            ]
        });

        let callback = ActionCallback::parse(&raw).expect("action parses");
        assert_eq!(callback.user_id, "U7");
        assert_eq!(callback.channel_id.as_deref(), Some("C55"));
        assert_eq!(callback.action_id, "AF-abc123-U7-color");
        assert_eq!(callback.value.as_deref(), Some("blue"));
        assert_eq!(callback.message_ts.as_deref(), Some("1730000001.000400"));
    }

    #[test]
    fn action_callback_requires_one_action_entry() {
        let raw = json!({ "user": { "id": "U7" }, "actions": [] });
        let err = ActionCallback::parse(&raw).expect_err("empty actions array");
        assert_eq!(err, MalformedEventError::missing("block_action", "actions[0]"));
    }

    #[test]
    fn envelope_splits_verification_from_callbacks() {
        let verification: EventEnvelope = serde_json::from_value(json!({
            "type": "url_verification",
            "challenge": "c0ffee"
        }))
        .expect("envelope deserializes");
        assert_eq!(verification.kind, "url_verification");
        assert_eq!(verification.challenge.as_deref(), Some("c0ffee"));

        let callback: EventEnvelope = serde_json::from_value(json!({
            "type": "event_callback",
            "event_id": "Ev123",
            "event": { "type": "message" }
        }))
        .expect("envelope deserializes");
        assert_eq!(callback.kind, "event_callback");
        assert!(callback.event.is_some());
    }
}

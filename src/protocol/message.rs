//! Protocol message model.
//!
//! Every frame body is one JSON object with a `type` discriminator:
//!
//! ```text
//! { "type": "call",     "id": "<token>", "function": "<name>", "params": { ... } }
//! { "type": "result",   "id": "<token>", "result": <any> }
//! { "type": "error",    "id": "<token>", "error": "<message>" }
//! { "type": "ping",     "id": "<token>" }
//! { "type": "pong",     "id": "<token>" }
//! { "type": "register", "params": { "functions": ["<name>", ...] } }
//! { "type": "stop" }
//! ```
//!
//! Empty `id` and absent optional fields are omitted on the wire. Unknown
//! fields are ignored when decoding.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Parameter payload of `call` and `register` messages.
pub type Params = Map<String, Value>;

/// Message discriminator (`type` field).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    Call,
    Result,
    Error,
    Ping,
    Pong,
    Register,
    Stop,
    /// Any type string this runtime does not know. Ignored by the router.
    Unknown(String),
}

impl MessageType {
    /// Wire name of this type.
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Call => "call",
            MessageType::Result => "result",
            MessageType::Error => "error",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Register => "register",
            MessageType::Stop => "stop",
            MessageType::Unknown(other) => other,
        }
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        match s {
            "call" => MessageType::Call,
            "result" => MessageType::Result,
            "error" => MessageType::Error,
            "ping" => MessageType::Ping,
            "pong" => MessageType::Pong,
            "register" => MessageType::Register,
            "stop" => MessageType::Stop,
            other => MessageType::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(MessageType::from(s.as_str()))
    }
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message type. Required on decode.
    #[serde(rename = "type")]
    pub kind: MessageType,

    /// Correlation id. Empty on `register` / `stop`; `null` decodes as empty.
    #[serde(
        default,
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_empty"
    )]
    pub id: String,

    /// Function name (`call` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    /// Call parameters, or the function list on `register`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,

    /// Call result (`result` only). A JSON `null` result is kept as `Some(Null)`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub result: Option<Value>,

    /// Failure description (`error` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Present field (even `null`) becomes `Some`; absence is handled by `default`.
fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Message {
    fn bare(kind: MessageType, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            function: None,
            params: None,
            result: None,
            error: None,
        }
    }

    /// Build a `call` message.
    pub fn call(id: impl Into<String>, function: impl Into<String>, params: Params) -> Self {
        Self {
            function: Some(function.into()),
            params: Some(params),
            ..Self::bare(MessageType::Call, id)
        }
    }

    /// Build a `result` reply.
    pub fn result(id: impl Into<String>, result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::bare(MessageType::Result, id)
        }
    }

    /// Build an `error` reply.
    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::bare(MessageType::Error, id)
        }
    }

    pub fn ping(id: impl Into<String>) -> Self {
        Self::bare(MessageType::Ping, id)
    }

    pub fn pong(id: impl Into<String>) -> Self {
        Self::bare(MessageType::Pong, id)
    }

    /// Build the `register` handshake advertising the given function names.
    pub fn register<I, S>(functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<Value> = functions
            .into_iter()
            .map(|name| Value::String(name.into()))
            .collect();

        let mut params = Params::new();
        params.insert("functions".to_string(), Value::Array(names));

        Self {
            params: Some(params),
            ..Self::bare(MessageType::Register, "")
        }
    }

    pub fn stop() -> Self {
        Self::bare(MessageType::Stop, "")
    }

    /// Function name of a `call`, or `""`.
    #[inline]
    pub fn function_name(&self) -> &str {
        self.function.as_deref().unwrap_or("")
    }

    /// Function names carried by a `register` message.
    pub fn registered_functions(&self) -> Vec<&str> {
        self.params
            .as_ref()
            .and_then(|p| p.get("functions"))
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether this is a reply (`result` or `error`).
    #[inline]
    pub fn is_reply(&self) -> bool {
        matches!(self.kind, MessageType::Result | MessageType::Error)
    }
}

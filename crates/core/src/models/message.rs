use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The envelope every message on the broker travels in:
/// `{data, meta: {correlationId, source}}`.
///
/// Dispatch requests put `{method, request, job_key?}` inside `data`; replies
/// put the response payload there. The subscriber reads inbound bodies
/// leniently (malformed messages must not crash the worker), so this type is
/// mostly used on the publishing side where the shape is under our control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub data: Value,
    pub meta: MessageMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMeta {
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    pub source: String,
}

impl WireMessage {
    pub fn new(data: Value, source: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            data,
            meta: MessageMeta {
                correlation_id: correlation_id.into(),
                source: source.into(),
            },
        }
    }

    pub fn method(&self) -> Option<&str> {
        self.data.get("method").and_then(Value::as_str)
    }

    pub fn request(&self) -> Option<&Value> {
        self.data.get("request")
    }
}

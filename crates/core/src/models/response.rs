use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The normalized reply shape `{code, response}`.
///
/// `response` is either `{message, errors?}` for textual results, or an
/// arbitrary business payload: when the message is not a string, the payload
/// replaces the whole `response` body. That substitution is how handlers
/// return raw objects through the same envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub code: u16,
    pub response: Value,
}

impl ResponseEnvelope {
    /// Build an envelope from a status code and optional message/errors.
    ///
    /// A missing or empty message is substituted with the canonical phrase
    /// for `code` unless `avoid_empty_message` is set, in which case the
    /// message stays null.
    pub fn build(
        code: u16,
        message: Option<Value>,
        errors: Option<Value>,
        avoid_empty_message: bool,
    ) -> Self {
        let message = match message {
            Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            other => other,
        };
        let message = match message {
            Some(m) => m,
            None if avoid_empty_message => Value::Null,
            None => Value::String(canonical_phrase(code).unwrap_or(DEFAULT_MESSAGE).to_string()),
        };

        let response = match message {
            Value::String(_) | Value::Null => {
                let mut body = json!({ "message": message });
                if let Some(errors) = errors {
                    body["errors"] = errors;
                }
                body
            }
            // Structured payload replaces the response body entirely.
            payload => payload,
        };

        Self { code, response }
    }

    /// Envelope with a plain text message.
    pub fn text(code: u16, message: &str) -> Self {
        Self::build(code, Some(Value::String(message.to_string())), None, false)
    }

    /// Envelope carrying a raw business payload.
    pub fn payload(code: u16, payload: Value) -> Self {
        Self::build(code, Some(payload), None, false)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

const DEFAULT_MESSAGE: &str = "Default message";

/// Canonical phrase for an HTTP-style status code, used as the default
/// envelope message.
pub fn canonical_phrase(code: u16) -> Option<&'static str> {
    let phrase = match code {
        100 => "Continue",
        101 => "Switching Protocols",
        103 => "Early Hints",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "I'm a teapot",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        510 => "Not Extended",
        511 => "Network Authentication Required",
        _ => return None,
    };
    Some(phrase)
}

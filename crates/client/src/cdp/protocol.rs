//! CDP Wire Types
//!
//! The four envelopes that travel over the transport. Domain payloads stay
//! `serde_json::Value`; the schema describes them, we don't model them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request ID - monotonically increasing, starts at 1
pub type RequestId = u64;

/// Target ID from the remote endpoint
pub type TargetId = String;

/// Session ID for attached targets
pub type SessionId = String;

/// Command sent to the remote
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub id: RequestId,
    pub method: &'a str,
    pub params: &'a Value,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
}

/// Reply to a command
///
/// Some implementations omit both `result` and `error` on success, so both
/// are optional here and the dispatcher treats "neither" as `{}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorObject>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl Response {
    /// Split into the success payload or the error envelope
    pub fn into_outcome(self) -> Result<Value, ErrorObject> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Object(Map::new())),
        }
    }
}

/// Error envelope inside a response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Event pushed by the remote (no request ID)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// A reply whose `id` is readable but whose body is not a valid response
#[derive(Debug, Clone)]
pub struct MalformedReply {
    pub id: RequestId,
    /// Best-effort reading of a non-conforming `error` member
    pub error: Option<ErrorObject>,
    pub reason: String,
}

impl MalformedReply {
    fn new(id: RequestId, message: &Value, reason: serde_json::Error) -> Self {
        let error = message
            .get("error")
            .filter(|error| !error.is_null())
            .map(salvage_error);
        Self {
            id,
            error,
            reason: reason.to_string(),
        }
    }
}

fn salvage_error(error: &Value) -> ErrorObject {
    let message = match error {
        Value::String(message) => message.clone(),
        _ => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    };
    ErrorObject {
        code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
        message,
        data: error.get("data").cloned(),
    }
}

/// Anything the remote can send us
///
/// A numeric `id` makes it a reply, whether or not the rest fits.
#[derive(Debug, Clone)]
pub enum Inbound {
    Response(Response),
    Malformed(MalformedReply),
    Event(EventMessage),
}

impl Inbound {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let message: Value = serde_json::from_str(text)?;
        match message.get("id").and_then(Value::as_u64) {
            Some(id) => Ok(match Response::deserialize(&message) {
                Ok(response) => Inbound::Response(response),
                Err(e) => Inbound::Malformed(MalformedReply::new(id, &message, e)),
            }),
            None => EventMessage::deserialize(message).map(Inbound::Event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let params = json!({"url": "about:blank"});
        let request = Request {
            id: 7,
            method: "Page.navigate",
            params: &params,
            session_id: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"id": 7, "method": "Page.navigate", "params": {"url": "about:blank"}})
        );

        let scoped = Request {
            session_id: Some("S1"),
            ..request
        };
        assert_eq!(serde_json::to_value(&scoped).unwrap()["sessionId"], json!("S1"));
    }

    #[test]
    fn test_response_without_result_or_error_is_success() {
        let Inbound::Response(response) = Inbound::parse(r#"{"id": 3}"#).unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(response.into_outcome().unwrap(), json!({}));
    }

    #[test]
    fn test_error_response() {
        let text = r#"{"id": 4, "error": {"code": -32601, "message": "'Foo.bar' wasn't found"}}"#;
        let Inbound::Response(response) = Inbound::parse(text).unwrap() else {
            panic!("expected a response");
        };
        let error = response.into_outcome().unwrap_err();
        assert_eq!(error.code, -32601);
        assert!(error.data.is_none());
    }

    #[test]
    fn test_malformed_reply_keeps_its_id() {
        match Inbound::parse(r#"{"id": 5, "error": {"code": -32000}}"#).unwrap() {
            Inbound::Malformed(reply) => {
                assert_eq!(reply.id, 5);
                let error = reply.error.unwrap();
                assert_eq!(error.code, -32000);
                assert_eq!(error.message, r#"{"code":-32000}"#);
            }
            other => panic!("expected a malformed reply, got {:?}", other),
        }

        match Inbound::parse(r#"{"id": 6, "error": "Target closed"}"#).unwrap() {
            Inbound::Malformed(reply) => {
                assert_eq!(reply.error.unwrap().message, "Target closed");
            }
            other => panic!("expected a malformed reply, got {:?}", other),
        }

        match Inbound::parse(r#"{"id": 7, "sessionId": 12}"#).unwrap() {
            Inbound::Malformed(reply) => assert!(reply.error.is_none()),
            other => panic!("expected a malformed reply, got {:?}", other),
        }

        assert!(Inbound::parse("[1, 2]").is_err());
    }

    #[test]
    fn test_event_parsing() {
        let text = r#"{"method": "Page.loadEventFired", "params": {"timestamp": 1.5}, "sessionId": "S1"}"#;
        match Inbound::parse(text).unwrap() {
            Inbound::Event(event) => {
                assert_eq!(event.method, "Page.loadEventFired");
                assert_eq!(event.params["timestamp"], json!(1.5));
                assert_eq!(event.session_id.as_deref(), Some("S1"));
            }
            other => panic!("expected an event, got {:?}", other),
        }

        // params are optional on the wire
        match Inbound::parse(r#"{"method": "Inspector.detached"}"#).unwrap() {
            Inbound::Event(event) => assert!(event.params.is_null()),
            other => panic!("expected an event, got {:?}", other),
        }
    }
}

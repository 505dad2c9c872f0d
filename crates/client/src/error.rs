//! Error types for the client runtime
//!
//! One flat enum for everything a caller can see. Transport failures keep
//! their original error so a failed write is distinguishable from a
//! protocol-level rejection.

use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Discovery request to {url} failed: {reason}")]
    Discovery { url: String, reason: String },

    #[error("Discovery request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("client disconnected")]
    Disconnected,

    #[error("Connection closed")]
    Closed,

    #[error("Schema error: {0}")]
    Schema(#[from] cdp_schema::SchemaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown {kind} '{name}'")]
    UnknownItem { kind: &'static str, name: String },
}

impl Error {
    pub(crate) fn discovery(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Discovery {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownItem {
            kind,
            name: name.into(),
        }
    }

    /// True for failures raised by the transport itself (before or instead of
    /// a protocol reply)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::WebSocket(_) | Error::Io(_) | Error::Transport(_)
        )
    }

    /// The remote's error envelope, if this is a protocol-level failure
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            Error::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

/// Failures while picking the target to attach to
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("No inspectable targets")]
    NoInspectableTargets,

    #[error("Invalid target index {index} ({len} targets available)")]
    InvalidTargetIndex { index: i64, len: usize },

    #[error("Invalid target {0}")]
    InvalidTarget(String),

    #[error("Target {0} is not inspectable (another debugger client is attached)")]
    TargetNotInspectable(String),

    #[error("Target selector returned no target")]
    NoTargetSelected,
}

/// Error envelope returned by the remote for a command
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolError {
    pub method: String,
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        match &self.data {
            Some(Value::String(data)) => write!(f, " ({})", data)?,
            Some(Value::Null) | None => {}
            Some(data) => write!(f, " ({})", data)?,
        }
        write!(f, " [{} code {}]", self.method, self.code)
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError {
            method: "Page.navigate".into(),
            code: -32602,
            message: "Invalid parameters".into(),
            data: Some(json!("url: string value expected")),
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameters (url: string value expected) [Page.navigate code -32602]"
        );

        let bare = ProtocolError { data: None, ..err };
        assert_eq!(bare.to_string(), "Invalid parameters [Page.navigate code -32602]");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::Transport("broken pipe".into()).is_transport());
        assert!(!Error::Disconnected.is_transport());
        assert_eq!(
            Error::Target(TargetError::NoInspectableTargets).to_string(),
            "No inspectable targets"
        );
    }
}

//! Discovery data types
//!
//! Snapshots as returned by `/json/list` and `/json/version`. The remote owns
//! target lifecycle; we only ever see copies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cdp::protocol::TargetId;

/// A remote inspectable entity (tab, worker, the browser itself, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: TargetId,
    #[serde(rename = "type", default)]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devtools_frontend_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    /// Absent while another client holds the target's only debugger connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_socket_debugger_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Target {
    /// Tabs are the preferred thing to attach to
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }

    pub fn is_inspectable(&self) -> bool {
        self.web_socket_debugger_url.is_some()
    }
}

/// `/json/version` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
    #[serde(rename = "User-Agent", default, skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    #[serde(rename = "V8-Version", default, skip_serializing_if = "Option::is_none")]
    pub v8_version: Option<String>,
    #[serde(rename = "WebKit-Version", default, skip_serializing_if = "Option::is_none")]
    pub webkit_version: Option<String>,
    #[serde(rename = "webSocketDebuggerUrl", default, skip_serializing_if = "Option::is_none")]
    pub web_socket_debugger_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VersionInfo {
    /// Node.js answers with a one-element array, everyone else with an object
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        match value {
            Value::Array(mut items) if !items.is_empty() => serde_json::from_value(items.swap_remove(0)),
            other => serde_json::from_value(other),
        }
    }
}

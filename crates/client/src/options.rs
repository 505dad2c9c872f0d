//! Connection configuration

use cdp_schema::ProtocolDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resolver::TargetSelector;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9222;
/// Bound on every discovery HTTP call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the remote's HTTP control surface lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            secure: false,
        }
    }
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            secure: false,
        }
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Host/port of a debugger URL, keeping our `secure` flag
    pub fn from_url(url: &url::Url, secure: bool) -> Option<Self> {
        let host = url.host_str()?.trim_start_matches('[').trim_end_matches(']');
        let port = url.port_or_known_default()?;
        Some(Self::new(host, port).with_secure(secure))
    }

    fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `http(s)://host:port`
    pub fn http_base(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.authority())
    }

    /// `ws(s)://host:port`
    pub fn ws_base(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}", scheme, self.authority())
    }
}

/// Everything `connect` needs. Not modified once the connection starts.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub endpoint: Endpoint,
    /// Use this descriptor instead of fetching one
    pub protocol: Option<ProtocolDescriptor>,
    /// Use the embedded descriptor instead of fetching one
    pub local: bool,
    pub target: TargetSelector,
    pub timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            protocol: None,
            local: false,
            target: TargetSelector::Default,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.endpoint.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.endpoint.port = port;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.endpoint.secure = secure;
        self
    }

    pub fn protocol(mut self, descriptor: ProtocolDescriptor) -> Self {
        self.protocol = Some(descriptor);
        self
    }

    pub fn local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn target(mut self, target: impl Into<TargetSelector>) -> Self {
        self.target = target.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::default();
        assert_eq!(options.endpoint.http_base(), "http://localhost:9222");
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert!(matches!(options.target, TargetSelector::Default));
    }

    #[test]
    fn test_endpoint_bases() {
        let endpoint = Endpoint::new("::1", 9229).with_secure(true);
        assert_eq!(endpoint.http_base(), "https://[::1]:9229");
        assert_eq!(endpoint.ws_base(), "wss://[::1]:9229");
    }

    #[test]
    fn test_endpoint_from_debugger_url() {
        let url = url::Url::parse("ws://127.0.0.1:9333/devtools/page/ABC").unwrap();
        assert_eq!(
            Endpoint::from_url(&url, false),
            Some(Endpoint::new("127.0.0.1", 9333))
        );

        let url = url::Url::parse("wss://[::1]/devtools/browser").unwrap();
        assert_eq!(
            Endpoint::from_url(&url, true),
            Some(Endpoint::new("::1", 443).with_secure(true))
        );
    }

    #[test]
    fn test_endpoint_deserializes_with_defaults() {
        let endpoint: Endpoint = serde_json::from_str(r#"{"port": 9333}"#).unwrap();
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 9333);
        assert!(!endpoint.secure);
    }
}

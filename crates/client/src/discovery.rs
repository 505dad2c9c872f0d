//! Discovery Client - the remote's HTTP control surface
//!
//! `/json/list`, `/json/new`, `/json/activate`, `/json/close`,
//! `/json/version` and `/json/protocol`. Every request is bounded by the
//! configured timeout; only a `200 OK` counts as success.

use cdp_schema::ProtocolDescriptor;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::options::{Endpoint, DEFAULT_TIMEOUT};
use crate::target::{Target, VersionInfo};

/// Implementations known to serve `/json/protocol`, matched on the
/// `Browser` field of `/json/version`
const PROTOCOL_SERVERS: &[&str] = &[
    "Chrome/",
    "HeadlessChrome/",
    "Microsoft Edge ",
    "Edg/",
    "node.js/",
];

/// Where a descriptor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOrigin {
    Remote,
    Embedded,
}

#[derive(Debug, Clone)]
pub struct FetchedProtocol {
    pub descriptor: ProtocolDescriptor,
    pub origin: SchemaOrigin,
}

impl FetchedProtocol {
    pub fn embedded() -> Result<Self> {
        Ok(Self {
            descriptor: cdp_schema::embedded()?,
            origin: SchemaOrigin::Embedded,
        })
    }
}

/// HTTP client bound to one endpoint
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    timeout: Duration,
}

impl DiscoveryClient {
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        // DevTools endpoints are local; never route them through a proxy
        let http = reqwest::Client::builder()
            .no_proxy()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::discovery(endpoint.http_base(), e))?;
        Ok(Self {
            http,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.http_base(), path)
    }

    fn map_err(&self, url: &str, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            Error::discovery(url, e)
        }
    }

    async fn request(&self, method: Method, path: &str) -> Result<String> {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);

        let response = self
            .http
            .request(method, &url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_err(&url, e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_err(&url, e))?;
        if status != StatusCode::OK {
            return Err(Error::discovery(
                url,
                format!("HTTP {}: {}", status, body.trim()),
            ));
        }
        Ok(body)
    }

    async fn request_json<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T> {
        let body = self.request(method, path).await?;
        serde_json::from_str(&body)
            .map_err(|e| Error::discovery(self.url(path), format!("invalid JSON: {}", e)))
    }

    /// `GET /json/list`
    pub async fn list_targets(&self) -> Result<Vec<Target>> {
        self.request_json(Method::GET, "/json/list").await
    }

    /// `PUT /json/new?<url>`; the remote opens `about:blank` without a url
    pub async fn create_target(&self, url: Option<&str>) -> Result<Target> {
        let path = match url {
            Some(url) => format!("/json/new?{}", url),
            None => "/json/new".to_string(),
        };
        self.request_json(Method::PUT, &path).await
    }

    /// `GET /json/activate/<id>`
    pub async fn activate_target(&self, id: &str) -> Result<()> {
        self.request(Method::GET, &format!("/json/activate/{}", id))
            .await
            .map(|_| ())
    }

    /// `GET /json/close/<id>`
    pub async fn close_target(&self, id: &str) -> Result<()> {
        self.request(Method::GET, &format!("/json/close/{}", id))
            .await
            .map(|_| ())
    }

    /// `GET /json/version`
    pub async fn version(&self) -> Result<VersionInfo> {
        let value = self.request_json(Method::GET, "/json/version").await?;
        VersionInfo::from_value(value)
            .map_err(|e| Error::discovery(self.url("/json/version"), format!("invalid version info: {}", e)))
    }

    /// Protocol descriptor for this endpoint
    ///
    /// Never fails because of the remote: anything short of a usable
    /// `/json/protocol` falls back to the embedded descriptor.
    pub async fn fetch_protocol(&self, prefer_local: bool) -> Result<FetchedProtocol> {
        if prefer_local {
            return FetchedProtocol::embedded();
        }
        match self.fetch_remote_protocol().await {
            Ok(descriptor) => Ok(FetchedProtocol {
                descriptor,
                origin: SchemaOrigin::Remote,
            }),
            Err(e) => {
                tracing::warn!("Using embedded protocol descriptor: {}", e);
                FetchedProtocol::embedded()
            }
        }
    }

    async fn fetch_remote_protocol(&self) -> Result<ProtocolDescriptor> {
        let version = self.version().await?;
        if !serves_protocol(&version.browser) {
            return Err(Error::discovery(
                self.url("/json/version"),
                format!("'{}' does not serve /json/protocol", version.browser),
            ));
        }
        let value = self.request_json(Method::GET, "/json/protocol").await?;
        let descriptor = ProtocolDescriptor::from_value(value)?;
        tracing::debug!(
            "Fetched protocol with {} domains from {}",
            descriptor.domains.len(),
            self.endpoint.http_base()
        );
        Ok(descriptor)
    }
}

fn serves_protocol(browser: &str) -> bool {
    PROTOCOL_SERVERS.iter().any(|prefix| browser.starts_with(prefix))
}

pub async fn list_targets(endpoint: &Endpoint) -> Result<Vec<Target>> {
    DiscoveryClient::new(endpoint.clone())?.list_targets().await
}

pub async fn create_target(endpoint: &Endpoint, url: Option<&str>) -> Result<Target> {
    DiscoveryClient::new(endpoint.clone())?.create_target(url).await
}

pub async fn activate_target(endpoint: &Endpoint, id: &str) -> Result<()> {
    DiscoveryClient::new(endpoint.clone())?.activate_target(id).await
}

pub async fn close_target(endpoint: &Endpoint, id: &str) -> Result<()> {
    DiscoveryClient::new(endpoint.clone())?.close_target(id).await
}

pub async fn version(endpoint: &Endpoint) -> Result<VersionInfo> {
    DiscoveryClient::new(endpoint.clone())?.version().await
}

pub async fn fetch_protocol(endpoint: &Endpoint, prefer_local: bool) -> Result<FetchedProtocol> {
    DiscoveryClient::new(endpoint.clone())?
        .fetch_protocol(prefer_local)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_protocol_servers() {
        assert!(serves_protocol("Chrome/120.0.6099.109"));
        assert!(serves_protocol("HeadlessChrome/120.0.6099.109"));
        assert!(serves_protocol("Microsoft Edge 120.0.2210.61"));
        assert!(serves_protocol("node.js/v20.10.0"));
        assert!(!serves_protocol("Firefox/121.0"));
        assert!(!serves_protocol(""));
    }

    #[tokio::test]
    async fn test_prefer_local_skips_network() {
        // nothing listens on port 1; a network call would fail
        let client = DiscoveryClient::new(Endpoint::new("127.0.0.1", 1)).unwrap();
        let fetched = client.fetch_protocol(true).await.unwrap();
        assert_eq!(fetched.origin, SchemaOrigin::Embedded);
        assert!(fetched.descriptor.domains.iter().any(|d| d.domain == "Page"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_discovery_error() {
        let client = DiscoveryClient::new(Endpoint::new("127.0.0.1", 1)).unwrap();
        let err = client.list_targets().await.unwrap_err();
        assert!(matches!(err, Error::Discovery { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unreachable_protocol_falls_back() {
        let client = DiscoveryClient::new(Endpoint::new("127.0.0.1", 1)).unwrap();
        let fetched = client.fetch_protocol(false).await.unwrap();
        assert_eq!(fetched.origin, SchemaOrigin::Embedded);
    }
}

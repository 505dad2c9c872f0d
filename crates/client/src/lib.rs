//! DevTools protocol client runtime
//!
//! Connects to a DevTools-protocol endpoint (Chrome, Edge, Node.js, ...),
//! picks a target over the HTTP discovery surface, loads the protocol
//! schema and multiplexes commands and events over one WebSocket.
//!
//! # Architecture
//!
//! 1. **Data first**: wire envelopes and schema are plain serde types
//! 2. **One connection, many sessions**: session ids are routing data only
//! 3. **Per-connection API**: generated from that connection's schema, never global
//! 4. **Fail fast**: no retries, no queueing; closing fails what is pending

use std::sync::Arc;

use cdp_schema::Schema;

pub mod api;
pub mod cdp;
pub mod discovery;
pub mod error;
pub mod events;
pub mod options;
pub mod resolver;
pub mod target;
pub mod transport;

pub use api::{Api, Command, Domain, Event};
pub use cdp::{Client, ConnectionState, EventMessage, Session, Subscription};
pub use discovery::{DiscoveryClient, FetchedProtocol, SchemaOrigin};
pub use error::{Error, ProtocolError, Result, TargetError};
pub use events::ClientEvent;
pub use options::{ConnectionOptions, Endpoint};
pub use resolver::{Selection, TargetSelector, TargetSource};
pub use target::{Target, VersionInfo};
pub use transport::{MessageSink, MessageStream, Transport};

pub use cdp_schema as schema;

/// `ws:` becomes `wss:`, anything else is left alone
fn secure_url(url: &str) -> String {
    match url.get(..3) {
        Some(scheme) if scheme.eq_ignore_ascii_case("ws:") => format!("wss:{}", &url[3..]),
        _ => url.to_string(),
    }
}

/// Resolve the target, load its schema and open the connection
///
/// Any failure along the way is returned as is; no half-built client is
/// ever handed out.
pub async fn connect(options: ConnectionOptions) -> Result<Arc<Client>> {
    let ConnectionOptions {
        endpoint,
        protocol,
        local,
        target,
        timeout,
    } = options;

    let discovery = DiscoveryClient::with_timeout(endpoint.clone(), timeout)?;
    let mut url = resolver::resolve(&target, &endpoint, &discovery).await?;
    if endpoint.secure {
        url = secure_url(&url);
    }
    tracing::debug!("Debugger URL: {}", url);

    let descriptor = match protocol {
        Some(descriptor) => descriptor,
        None => {
            // the schema comes from whoever serves the target, which for a
            // URL selector need not be `endpoint`
            let parsed = url::Url::parse(&url)
                .map_err(|e| Error::Transport(format!("invalid debugger URL {}: {}", url, e)))?;
            let schema_endpoint =
                Endpoint::from_url(&parsed, endpoint.secure).unwrap_or_else(|| endpoint.clone());
            let fetched = if schema_endpoint == endpoint {
                discovery.fetch_protocol(local).await?
            } else {
                DiscoveryClient::with_timeout(schema_endpoint, timeout)?
                    .fetch_protocol(local)
                    .await?
            };
            tracing::debug!("Protocol descriptor origin: {:?}", fetched.origin);
            fetched.descriptor
        }
    };

    let schema = Schema::load(&descriptor)?;
    tracing::debug!(
        "Loaded schema: {} commands, {} events",
        schema.command_count(),
        schema.event_count()
    );

    let transport = Transport::websocket(&url).await?;
    Ok(Client::open(transport, Arc::new(schema), url))
}

/// Callback flavour of [`connect`]
pub fn connect_with<F>(options: ConnectionOptions, callback: F)
where
    F: FnOnce(Result<Arc<Client>>) + Send + 'static,
{
    tokio::spawn(async move {
        callback(connect(options).await);
    });
}

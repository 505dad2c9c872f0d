//! CDP Client - the dispatch core
//!
//! Design decisions:
//! 1. One transport per client, multiplexed by session id
//! 2. Sends never wait on each other beyond the single write; replies are
//!    matched by id and may arrive in any order
//! 3. One reader task processes inbound traffic strictly in arrival order
//! 4. Fail fast - no retries, no per-command timeout. Closing fails everything
//!    still pending.

use cdp_schema::{Item, ProtocolDescriptor, Schema};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, oneshot, watch, Mutex, Notify};
use tokio::task::JoinHandle;

use super::protocol::{ErrorObject, EventMessage, Inbound, MalformedReply, Request, RequestId, SessionId};
use super::router::{EventRouter, Subscription};
use crate::api::{Api, Domain};
use crate::error::{Error, ProtocolError, Result};
use crate::events::{ClientEvent, Notifier};
use crate::transport::{MessageSink, MessageStream, Transport};

/// Lifecycle of a client. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

struct PendingCommand {
    method: String,
    tx: oneshot::Sender<Result<Value>>,
}

/// A live protocol connection
pub struct Client {
    url: String,

    /// Monotonic request id, first id is 1
    next_id: AtomicU64,

    /// Commands written but not yet answered
    pending: DashMap<RequestId, PendingCommand>,

    router: Arc<EventRouter>,

    /// Write half, locked for the duration of one write
    sink: Mutex<Box<dyn MessageSink>>,

    state: watch::Sender<ConnectionState>,

    /// Set before the transport is closed on purpose, so teardown stays quiet
    user_closed: AtomicBool,
    torn_down: AtomicBool,

    shutdown: Arc<Notify>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    /// The one shutdown run, shared by every `close()` caller
    closing: std::sync::Mutex<Option<Shared<BoxFuture<'static, ()>>>>,

    notifier: Notifier,
    schema: Arc<Schema>,
    api: Api,
}

impl Client {
    /// Open a client over an already established transport
    ///
    /// The descriptor is loaded into a fresh schema for this connection only.
    pub fn with_transport(
        transport: Transport,
        descriptor: &ProtocolDescriptor,
        url: impl Into<String>,
    ) -> Result<Arc<Self>> {
        let schema = Schema::load(descriptor)?;
        Ok(Self::open(transport, Arc::new(schema), url.into()))
    }

    pub(crate) fn open(transport: Transport, schema: Arc<Schema>, url: String) -> Arc<Self> {
        let (sink, stream) = transport.into_parts();
        let api = Api::attach(&schema);
        let (state, _) = watch::channel(ConnectionState::Connecting);

        let client = Arc::new(Self {
            url,
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            router: EventRouter::new(),
            sink: Mutex::new(sink),
            state,
            user_closed: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            shutdown: Arc::new(Notify::new()),
            reader: std::sync::Mutex::new(None),
            closing: std::sync::Mutex::new(None),
            notifier: Notifier::new(),
            schema,
            api,
        });

        // Open before the reader starts, so an immediate EOF lands on Closed
        client.state.send_replace(ConnectionState::Open);

        let handle = tokio::spawn(read_loop(
            Arc::downgrade(&client),
            stream,
            client.shutdown.clone(),
        ));
        match client.reader.lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }

        tracing::info!("Connected to {}", client.url);
        client
    }

    /// Send a command and wait for its reply
    ///
    /// `params` defaults to `{}`. A `session_id` routes the command to an
    /// attached target.
    pub async fn send(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value> {
        if self.state() != ConnectionState::Open {
            return Err(Error::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let params = params.unwrap_or_else(|| Value::Object(Map::new()));
        let message = serde_json::to_string(&Request {
            id,
            method,
            params: &params,
            session_id,
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCommand {
                method: method.to_string(),
                tx,
            },
        );
        // teardown may have drained the table before our insert landed
        if self.torn_down.load(Ordering::SeqCst) {
            self.pending.remove(&id);
            return Err(Error::Disconnected);
        }

        let written = {
            let mut sink = self.sink.lock().await;
            if self.state() != ConnectionState::Open {
                Err(Error::Closed)
            } else {
                sink.send(message).await
            }
        };
        if let Err(e) = written {
            self.pending.remove(&id);
            if e.is_transport() {
                tracing::error!("Failed to send {} (id {}): {}", method, id, e);
            }
            return Err(e);
        }
        tracing::debug!("Sent {} (id {})", method, id);

        rx.await.map_err(|_| Error::Disconnected)?
    }

    /// Callback flavour of [`Client::send`]
    pub fn send_with<F>(
        self: &Arc<Self>,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
        callback: F,
    ) where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let client = self.clone();
        let method = method.into();
        tokio::spawn(async move {
            let result = client.send(&method, params, session_id.as_deref()).await;
            callback(result);
        });
    }

    /// Close the connection
    ///
    /// Idempotent: the transport is closed once, every caller gets `Ok`,
    /// and no `Disconnected` notification is published. The shutdown runs
    /// on its own task, so dropping a `close()` future does not interrupt
    /// it and a later call waits on the same run.
    pub async fn close(self: &Arc<Self>) -> Result<()> {
        let shutdown = {
            let mut slot = match self.closing.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.get_or_insert_with(|| {
                let client = self.clone();
                tokio::spawn(async move { client.shutdown_connection().await })
                    .map(|_| ())
                    .boxed()
                    .shared()
            })
            .clone()
        };
        shutdown.await;
        Ok(())
    }

    /// Callback flavour of [`Client::close`]
    pub fn close_with<F>(self: &Arc<Self>, callback: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            callback(client.close().await);
        });
    }

    async fn shutdown_connection(&self) {
        self.user_closed.store(true, Ordering::SeqCst);
        self.state.send_if_modified(|state| match *state {
            ConnectionState::Connecting | ConnectionState::Open => {
                *state = ConnectionState::Closing;
                true
            }
            _ => false,
        });

        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.close().await {
                tracing::debug!("Transport close for {}: {}", self.url, e);
            }
        }

        self.shutdown.notify_one();
        if let Some(reader) = self.take_reader() {
            let _ = reader.await;
        }
        self.teardown();
    }

    fn take_reader(&self) -> Option<JoinHandle<()>> {
        match self.reader.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Single exit path to `Closed`, whoever gets here first
    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.send_replace(ConnectionState::Closed);

        let ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let failed = ids
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .map(|(_, pending)| {
                let _ = pending.tx.send(Err(Error::Disconnected));
            })
            .count();

        self.router.close();

        if self.user_closed.load(Ordering::SeqCst) {
            tracing::info!("Connection to {} closed", self.url);
        } else {
            tracing::warn!(
                "Connection to {} lost with {} commands pending",
                self.url,
                failed
            );
            self.notifier.notify(ClientEvent::Disconnected);
        }
    }

    fn handle_message(&self, text: &str) {
        match Inbound::parse(text) {
            Ok(Inbound::Response(response)) => self.complete(response.id, |method| {
                response
                    .into_outcome()
                    .map_err(|error| protocol_error(method, error))
            }),
            Ok(Inbound::Malformed(reply)) => self.fail_malformed(reply),
            Ok(Inbound::Event(event)) => self.router.dispatch(&event),
            Err(e) => {
                let preview: String = text.chars().take(120).collect();
                tracing::warn!("Skipping malformed message ({}): {}", e, preview);
            }
        }
    }

    fn fail_malformed(&self, reply: MalformedReply) {
        tracing::warn!("Malformed reply to request {}: {}", reply.id, reply.reason);
        let MalformedReply { id, error, reason } = reply;
        self.complete(id, |method| {
            Err(match error {
                Some(error) => protocol_error(method, error),
                None => Error::Transport(format!("malformed reply to {}: {}", method, reason)),
            })
        });
    }

    /// Remove `id` from the pending table and hand its caller the outcome
    fn complete<F>(&self, id: RequestId, outcome: F)
    where
        F: FnOnce(String) -> Result<Value>,
    {
        let Some((_, pending)) = self.pending.remove(&id) else {
            tracing::warn!("Received response for unknown request: {}", id);
            return;
        };

        let _ = pending.tx.send(outcome(pending.method)); // caller may have given up

        if self.pending.is_empty() {
            self.notifier.notify(ClientEvent::Ready);
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// `Ready` / `Disconnected` signals for this connection
    pub fn notifications(&self) -> broadcast::Receiver<ClientEvent> {
        self.notifier.listen()
    }

    /// Resolves once the client reaches `Closed`, for whatever reason
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }

    /// Every event envelope, before any keyed listener
    pub fn on_any<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&EventMessage) + Send + Sync + 'static,
    {
        self.router.subscribe_raw(Arc::new(listener))
    }

    /// `method` from every session
    pub fn on<F>(&self, method: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.router.subscribe(method, None, Arc::new(listener))
    }

    /// `method` from one session only
    pub fn on_session<F>(
        &self,
        method: impl Into<String>,
        session_id: impl Into<SessionId>,
        listener: F,
    ) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.router
            .subscribe(method, Some(session_id.into()), Arc::new(listener))
    }

    /// Params of the next matching event
    pub async fn once(&self, method: &str, session_id: Option<&str>) -> Result<Value> {
        self.router
            .once(method, session_id.map(str::to_string))
            .await
    }

    pub fn remove_all_listeners(&self) {
        self.router.remove_all_listeners();
    }

    pub(crate) fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Handle on one protocol domain of this connection
    pub fn domain(self: &Arc<Self>, name: &str) -> Result<Domain> {
        Domain::new(self.clone(), name)
    }

    /// Send `domain.command`, checked against this connection's schema
    pub async fn invoke(
        &self,
        domain: &str,
        command: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value> {
        let method = self
            .api
            .command(domain, command)
            .ok_or_else(|| Error::unknown("command", format!("{}.{}", domain, command)))?
            .clone();
        self.send(&method, params, session_id).await
    }

    /// Schema metadata for `Domain.name` (command, event or type)
    pub fn help(&self, qualified: &str) -> Result<&Item> {
        self.schema
            .lookup(qualified)
            .ok_or_else(|| Error::unknown("item", qualified))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("url", &self.url).finish_non_exhaustive()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

fn protocol_error(method: String, error: ErrorObject) -> Error {
    Error::Protocol(ProtocolError {
        method,
        code: error.code,
        message: error.message,
        data: error.data,
    })
}

async fn read_loop(client: Weak<Client>, mut stream: Box<dyn MessageStream>, shutdown: Arc<Notify>) {
    loop {
        let message = tokio::select! {
            message = stream.recv() => message,
            _ = shutdown.notified() => {
                tracing::debug!("Reader stopping");
                break;
            }
        };

        let Some(client) = client.upgrade() else {
            break;
        };
        match message {
            Some(Ok(text)) => client.handle_message(&text),
            Some(Err(e)) => {
                tracing::error!("Transport error on {}: {}", client.url, e);
                break;
            }
            None => {
                tracing::info!("Transport to {} closed", client.url);
                break;
            }
        }
    }

    if let Some(client) = client.upgrade() {
        client.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn descriptor() -> ProtocolDescriptor {
        ProtocolDescriptor::from_value(json!({
            "domains": [{
                "domain": "Page",
                "commands": [{"name": "navigate", "parameters": [{"name": "url", "type": "string"}]}],
                "events": [{"name": "loadEventFired"}]
            }]
        }))
        .unwrap()
    }

    /// Client over an in-memory pipe, plus the remote's raw ends
    fn pipe_client() -> (
        Arc<Client>,
        BufReader<tokio::io::DuplexStream>,
        tokio::io::DuplexStream,
    ) {
        let (client_out, remote_in) = duplex(4096);
        let (remote_out, client_in) = duplex(4096);
        let transport = Transport::pipe(client_in, client_out);
        let client = Client::with_transport(transport, &descriptor(), "pipe://test").unwrap();
        (client, BufReader::new(remote_in), remote_out)
    }

    async fn read_request(remote_in: &mut BufReader<tokio::io::DuplexStream>) -> Value {
        let mut buf = Vec::new();
        remote_in.read_until(0, &mut buf).await.unwrap();
        buf.pop();
        serde_json::from_slice(&buf).unwrap()
    }

    async fn write_message(remote_out: &mut tokio::io::DuplexStream, message: Value) {
        remote_out
            .write_all(format!("{}\0", message).as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ids_start_at_one_and_params_default_to_empty() {
        let (client, mut remote_in, mut remote_out) = pipe_client();

        let call = {
            let client = client.clone();
            tokio::spawn(async move { client.send("Page.enable", None, None).await })
        };
        let request = read_request(&mut remote_in).await;
        assert_eq!(request, json!({"id": 1, "method": "Page.enable", "params": {}}));

        write_message(&mut remote_out, json!({"id": 1, "result": {"ok": true}})).await;
        assert_eq!(call.await.unwrap().unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_protocol_error_carries_method() {
        let (client, mut remote_in, mut remote_out) = pipe_client();

        let call = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .send("Page.navigate", Some(json!({"url": 1})), Some("S1"))
                    .await
            })
        };
        let request = read_request(&mut remote_in).await;
        assert_eq!(request["sessionId"], json!("S1"));

        write_message(
            &mut remote_out,
            json!({"id": request["id"], "error": {"code": -32602, "message": "Invalid parameters"}}),
        )
        .await;

        let err = call.await.unwrap().unwrap_err();
        let protocol = err.as_protocol().unwrap();
        assert_eq!(protocol.method, "Page.navigate");
        assert_eq!(protocol.code, -32602);
    }

    #[tokio::test]
    async fn test_remote_eof_fails_pending_and_notifies() {
        let (client, mut remote_in, remote_out) = pipe_client();
        let mut notifications = client.notifications();

        let call = {
            let client = client.clone();
            tokio::spawn(async move { client.send("Page.enable", None, None).await })
        };
        read_request(&mut remote_in).await;
        drop(remote_out);

        assert!(matches!(call.await.unwrap(), Err(Error::Disconnected)));
        assert_eq!(notifications.recv().await.unwrap(), ClientEvent::Disconnected);
        client.closed().await;
        assert!(matches!(client.send("Page.enable", None, None).await, Err(Error::Closed)));

        // closing an already disconnected client still succeeds
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_response_and_garbage_are_skipped() {
        let (client, mut remote_in, mut remote_out) = pipe_client();

        let call = {
            let client = client.clone();
            tokio::spawn(async move { client.send("Page.enable", None, None).await })
        };
        read_request(&mut remote_in).await;

        remote_out.write_all(b"not json\0").await.unwrap();
        write_message(&mut remote_out, json!({"id": 99, "result": {}})).await;
        write_message(&mut remote_out, json!({"id": 1})).await;

        assert_eq!(call.await.unwrap().unwrap(), json!({}));
        assert!(client.is_open());
    }

    #[tokio::test]
    async fn test_invoke_checks_schema() {
        let (client, _remote_in, _remote_out) = pipe_client();

        let err = client.invoke("Page", "explode", None, None).await.unwrap_err();
        assert!(matches!(err, Error::UnknownItem { kind: "command", .. }));
        assert_eq!(client.help("Page.navigate").unwrap().parameters.len(), 1);
        assert!(client.help("Page.nothing").is_err());
    }
}

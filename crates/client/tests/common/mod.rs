#![allow(dead_code)]

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{OriginalUri, State};
use axum::http::{header, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use cdp_client::{Client, MessageSink, MessageStream, Result, Transport};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::TcpListener;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The far end of a pipe transport, speaking raw NUL-framed JSON
pub struct FakeRemote {
    reader: BufReader<DuplexStream>,
    writer: DuplexStream,
}

impl FakeRemote {
    /// Next request from the client, `None` once the client hung up
    pub async fn recv(&mut self) -> Option<Value> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(0, &mut buf).await.ok()?;
        if n == 0 || buf.last() != Some(&0) {
            return None;
        }
        buf.pop();
        Some(serde_json::from_slice(&buf).unwrap())
    }

    pub async fn send(&mut self, message: Value) {
        self.writer
            .write_all(format!("{}\0", message).as_bytes())
            .await
            .unwrap();
    }

    pub async fn reply(&mut self, id: &Value, result: Value) {
        self.send(json!({"id": id, "result": result})).await;
    }

    pub async fn event(&mut self, method: &str, params: Value, session_id: Option<&str>) {
        let mut message = json!({"method": method, "params": params});
        if let Some(session_id) = session_id {
            message["sessionId"] = json!(session_id);
        }
        self.send(message).await;
    }
}

/// Counts `close` calls on the wrapped sink
pub struct CountingSink<S> {
    inner: S,
    pub closes: Arc<AtomicUsize>,
    /// How long each close takes after it has been counted
    pub close_delay: Duration,
}

#[async_trait::async_trait]
impl<S: MessageSink> MessageSink for CountingSink<S> {
    async fn send(&mut self, message: String) -> Result<()> {
        self.inner.send(message).await
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.close_delay).await;
        self.inner.close().await
    }
}

/// A stream that never yields anything
pub struct SilentStream;

#[async_trait::async_trait]
impl MessageStream for SilentStream {
    async fn recv(&mut self) -> Option<Result<String>> {
        std::future::pending().await
    }
}

pub fn descriptor() -> cdp_client::schema::ProtocolDescriptor {
    cdp_client::schema::embedded().unwrap()
}

/// Client over an in-memory pipe with the embedded schema
pub fn pipe_client() -> (Arc<Client>, FakeRemote) {
    let (client_out, remote_in) = duplex(64 * 1024);
    let (remote_out, client_in) = duplex(64 * 1024);
    let transport = Transport::pipe(client_in, client_out);
    let client = Client::with_transport(transport, &descriptor(), "pipe://fake").unwrap();
    (
        client,
        FakeRemote {
            reader: BufReader::new(remote_in),
            writer: remote_out,
        },
    )
}

/// Like `pipe_client`, also counting transport closes
pub fn counting_pipe_client() -> (Arc<Client>, FakeRemote, Arc<AtomicUsize>) {
    slow_closing_pipe_client(Duration::ZERO)
}

/// Like `counting_pipe_client`, with a transport close that takes `delay`
pub fn slow_closing_pipe_client(delay: Duration) -> (Arc<Client>, FakeRemote, Arc<AtomicUsize>) {
    let (client_out, remote_in) = duplex(64 * 1024);
    let (remote_out, client_in) = duplex(64 * 1024);
    let closes = Arc::new(AtomicUsize::new(0));
    let sink = CountingSink {
        inner: cdp_client::transport::PipeSink::new(client_out),
        closes: closes.clone(),
        close_delay: delay,
    };
    let transport = Transport::new(sink, cdp_client::transport::PipeStream::new(client_in));
    let client = Client::with_transport(transport, &descriptor(), "pipe://fake").unwrap();
    (
        client,
        FakeRemote {
            reader: BufReader::new(remote_in),
            writer: remote_out,
        },
        closes,
    )
}

pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            body: "Not Found".to_string(),
        }
    }
}

type Routes = Arc<dyn Fn(&str, &str) -> HttpResponse + Send + Sync>;

#[derive(Clone)]
struct MockState {
    routes: Routes,
    log: Arc<Mutex<Vec<String>>>,
}

/// Loopback endpoint: `/json/*` answered by the given routes, everything else
/// upgraded to a WebSocket that answers commands
pub struct MockServer {
    pub port: u16,
    /// "METHOD /path" of every discovery request, in order
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    /// `routes` is built from the bound port, so listings can point back here
    pub async fn start<M, F>(routes: M) -> Self
    where
        M: FnOnce(u16) -> F,
        F: Fn(&str, &str) -> HttpResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            routes: Arc::new(routes(port)),
            log: requests.clone(),
        };

        let app = Router::new()
            .route("/json", any(discovery_route))
            .route("/json/*rest", any(discovery_route))
            .fallback(devtools_socket)
            .with_state(state);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { port, requests }
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://127.0.0.1:{}{}", self.port, path)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn discovery_route(
    State(state): State<MockState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
) -> impl IntoResponse {
    let path = uri
        .path_and_query()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    state.log.lock().unwrap().push(format!("{} {}", method, path));

    let response = (state.routes)(method.as_str(), &path);
    (
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        [(header::CONTENT_TYPE, "application/json")],
        response.body,
    )
}

async fn devtools_socket(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(answer_commands)
}

/// Answers every command with `{}`, except `Page.navigate` which also fires
/// `Page.loadEventFired`
async fn answer_commands(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let request: Value = serde_json::from_str(&text).unwrap();
        let id = request["id"].clone();
        let replies = match request["method"].as_str() {
            Some("Page.navigate") => vec![
                json!({"id": id, "result": {"frameId": "F1"}}),
                json!({"method": "Page.loadEventFired", "params": {"timestamp": 1.5}}),
            ],
            _ => vec![json!({"id": id, "result": {}})],
        };
        for reply in replies {
            if socket.send(Message::Text(reply.to_string())).await.is_err() {
                return;
            }
        }
    }
}

/// Accepts connections and never answers
pub async fn silent_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    port
}

pub fn chrome_version() -> Value {
    json!({
        "Browser": "Chrome/120.0.6099.109",
        "Protocol-Version": "1.3",
        "User-Agent": "Mozilla/5.0",
        "V8-Version": "12.0.267.8",
        "WebKit-Version": "537.36"
    })
}

pub fn page(id: &str, port: u16) -> Value {
    json!({
        "id": id,
        "type": "page",
        "title": "about:blank",
        "url": "about:blank",
        "webSocketDebuggerUrl": format!("ws://127.0.0.1:{}/devtools/page/{}", port, id)
    })
}

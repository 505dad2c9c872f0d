mod common;

use cdp_client::discovery::{self, DiscoveryClient};
use cdp_client::{Endpoint, Error, SchemaOrigin};
use common::{chrome_version, page, silent_server, HttpResponse, MockServer};
use serde_json::json;
use std::time::{Duration, Instant};

fn endpoint(port: u16) -> Endpoint {
    Endpoint::new("127.0.0.1", port)
}

#[tokio::test]
async fn target_management_endpoints() {
    common::init_tracing();
    let server = MockServer::start(|port| {
        move |method: &str, path: &str| match (method, path) {
            ("GET", "/json/list") => HttpResponse::ok(json!([page("P1", port), page("P2", port)])),
            ("PUT", "/json/new?about:blank") => HttpResponse::ok(page("P3", port)),
            ("GET", "/json/activate/P1") => HttpResponse {
                status: 200,
                body: "Target activated".into(),
            },
            ("GET", "/json/close/P2") => HttpResponse {
                status: 200,
                body: "Target is closing".into(),
            },
            _ => HttpResponse::not_found(),
        }
    })
    .await;
    let client = DiscoveryClient::new(endpoint(server.port)).unwrap();

    let targets = client.list_targets().await.unwrap();
    assert_eq!(targets.len(), 2);
    assert_eq!(
        targets[0].web_socket_debugger_url.as_deref(),
        Some(server.ws_url("/devtools/page/P1").as_str())
    );

    let created = client.create_target(Some("about:blank")).await.unwrap();
    assert_eq!(created.id, "P3");

    client.activate_target("P1").await.unwrap();
    client.close_target("P2").await.unwrap();

    let err = client.close_target("MISSING").await.unwrap_err();
    assert!(matches!(err, Error::Discovery { .. }), "{:?}", err);

    assert_eq!(
        server.requests(),
        vec![
            "GET /json/list",
            "PUT /json/new?about:blank",
            "GET /json/activate/P1",
            "GET /json/close/P2",
            "GET /json/close/MISSING",
        ]
    );
}

#[tokio::test]
async fn version_accepts_node_array_form() {
    let server = MockServer::start(|_| {
        |_: &str, path: &str| match path {
            "/json/version" => HttpResponse::ok(json!([{"Browser": "node.js/v20.10.0", "Protocol-Version": "1.1"}])),
            _ => HttpResponse::not_found(),
        }
    })
    .await;

    let version = discovery::version(&endpoint(server.port)).await.unwrap();
    assert_eq!(version.browser, "node.js/v20.10.0");
    assert_eq!(version.protocol_version, "1.1");
}

#[tokio::test]
async fn unparseable_listing_is_discovery_error() {
    let server = MockServer::start(|_| {
        |_: &str, _: &str| HttpResponse {
            status: 200,
            body: "<html>".into(),
        }
    })
    .await;

    let err = discovery::list_targets(&endpoint(server.port)).await.unwrap_err();
    assert!(matches!(err, Error::Discovery { .. }), "{:?}", err);
}

#[tokio::test]
async fn protocol_404_falls_back_to_embedded() {
    let server = MockServer::start(|_| {
        |_: &str, path: &str| match path {
            "/json/version" => HttpResponse::ok(chrome_version()),
            _ => HttpResponse::not_found(),
        }
    })
    .await;

    let fetched = discovery::fetch_protocol(&endpoint(server.port), false).await.unwrap();
    assert_eq!(fetched.origin, SchemaOrigin::Embedded);
    assert_eq!(server.requests(), vec!["GET /json/version", "GET /json/protocol"]);
}

#[tokio::test]
async fn protocol_fetched_from_known_implementation() {
    let server = MockServer::start(|_| {
        |_: &str, path: &str| match path {
            "/json/version" => HttpResponse::ok(chrome_version()),
            "/json/protocol" => HttpResponse::ok(json!({
                "version": {"major": "1", "minor": "3"},
                "domains": [{"domain": "Custom", "commands": [{"name": "ping"}]}]
            })),
            _ => HttpResponse::not_found(),
        }
    })
    .await;

    let fetched = discovery::fetch_protocol(&endpoint(server.port), false).await.unwrap();
    assert_eq!(fetched.origin, SchemaOrigin::Remote);
    assert_eq!(fetched.descriptor.domains[0].domain, "Custom");
}

#[tokio::test]
async fn unknown_implementation_is_not_asked_for_protocol() {
    let server = MockServer::start(|_| {
        |_: &str, path: &str| match path {
            "/json/version" => HttpResponse::ok(json!({"Browser": "Firefox/121.0"})),
            _ => HttpResponse::ok(json!({"domains": []})),
        }
    })
    .await;

    let fetched = discovery::fetch_protocol(&endpoint(server.port), false).await.unwrap();
    assert_eq!(fetched.origin, SchemaOrigin::Embedded);
    assert_eq!(server.requests(), vec!["GET /json/version"]);
}

#[tokio::test]
async fn silent_endpoint_times_out() {
    let port = silent_server().await;
    let timeout = Duration::from_millis(300);
    let client = DiscoveryClient::with_timeout(endpoint(port), timeout).unwrap();

    let started = Instant::now();
    let err = client.list_targets().await.unwrap_err();
    assert!(
        matches!(err, Error::Timeout { timeout: t, .. } if t == timeout),
        "{:?}",
        err
    );
    assert!(started.elapsed() < Duration::from_secs(5));
}

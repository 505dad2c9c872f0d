//! Session example - one browser connection, several attached tabs

use cdp_client::discovery::DiscoveryClient;
use cdp_client::{connect, ClientEvent, ConnectionOptions, Endpoint, Session};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Browser-level connection
    let endpoint = Endpoint::default();
    let version = DiscoveryClient::new(endpoint.clone())?.version().await?;
    let browser_url = version
        .web_socket_debugger_url
        .ok_or("remote does not expose a browser target")?;
    println!("Browser: {} ({})", version.browser, browser_url);

    let client = connect(ConnectionOptions::new().target(browser_url)).await?;

    let mut notifications = client.notifications();
    tokio::spawn(async move {
        while let Ok(event) = notifications.recv().await {
            if event == ClientEvent::Disconnected {
                eprintln!("Browser went away");
            }
        }
    });

    // Two tabs, each with its own session on the same socket
    let mut sessions = Vec::new();
    for url in ["https://www.rust-lang.org", "https://github.com"] {
        let created = client
            .send("Target.createTarget", Some(json!({"url": "about:blank"})), None)
            .await?;
        let target_id = created["targetId"].as_str().unwrap_or_default().to_string();

        let session = Session::attach_with_domains(client.clone(), target_id, &["Page", "Runtime"]).await?;
        println!("Attached to {} as {}", session.target_id, session.session_id);

        let (loaded, navigated) = tokio::join!(
            session.next_event("Page.loadEventFired"),
            session.send("Page.navigate", Some(json!({"url": url}))),
        );
        navigated?;
        loaded?;
        sessions.push(session);
    }

    for session in &sessions {
        let title = session
            .send(
                "Runtime.evaluate",
                Some(json!({"expression": "document.title", "returnByValue": true})),
            )
            .await?;
        println!("{}: {}", session.target_id, title["result"]["value"]);
    }

    for session in &sessions {
        session.detach().await?;
        client
            .send("Target.closeTarget", Some(json!({"targetId": session.target_id})), None)
            .await?;
    }

    client.close().await?;
    Ok(())
}

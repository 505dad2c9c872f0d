//! Basic example - connect to the active page, navigate, wait for load

use cdp_client::{connect, ConnectionOptions};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Connect to the first page of a local Chrome
    let client = connect(ConnectionOptions::new()).await?;
    println!("Connected to {}", client.url());

    let network = client.domain("Network")?;
    let page = client.domain("Page")?;

    // Print every request the page makes
    network.on("requestWillBeSent", |params| {
        println!("-> {}", params["request"]["url"]);
    })?;

    network.command("enable")?.call(None, None).await?;
    page.command("enable")?.call(None, None).await?;

    // Wait for the load event while the navigation is in flight
    let loaded = page.event("loadEventFired")?;
    let navigate = page.command("navigate")?;
    let (params, navigated) = tokio::join!(
        loaded.next(None),
        navigate.call(Some(json!({"url": "https://www.rust-lang.org"})), None),
    );
    navigated?;
    let params = params?;
    println!("Loaded at {}", params["timestamp"]);

    // Clean shutdown
    client.close().await?;
    println!("Disconnected");

    Ok(())
}

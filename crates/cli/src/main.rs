mod shell;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use cdp_client::discovery::DiscoveryClient;
use cdp_client::schema::ProtocolDescriptor;
use cdp_client::{ConnectionOptions, Endpoint, TargetSelector};

#[derive(Parser)]
#[command(name = "cdp")]
#[command(about = "DevTools protocol client")]
#[command(version)]
struct Cli {
    /// HTTP frontend host
    #[arg(short = 't', long, global = true, env = "CDP_HOST", default_value = "localhost")]
    host: String,

    /// HTTP frontend port
    #[arg(short, long, global = true, env = "CDP_PORT", default_value_t = 9222)]
    port: u16,

    /// HTTPS/WSS frontend
    #[arg(short, long, global = true, env = "CDP_SECURE")]
    secure: bool,

    /// Discovery timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive shell on a target (default: the active page)
    Inspect {
        /// Target id, or WebSocket URL with --web-socket
        target: Option<String>,

        /// Interpret <target> as a WebSocket URL instead of a target id
        #[arg(short, long = "web-socket")]
        web_socket: bool,

        /// Protocol descriptor file (overrides --local)
        #[arg(short = 'j', long, value_name = "FILE")]
        protocol: Option<std::path::PathBuf>,

        /// Use the embedded protocol descriptor
        #[arg(short, long)]
        local: bool,
    },
    /// List the inspectable targets
    List,
    /// Create a new target
    New { url: Option<String> },
    /// Activate a target by id
    Activate { id: String },
    /// Close a target by id
    Close { id: String },
    /// Show the remote's version information
    Version,
    /// Show the protocol descriptor
    Protocol {
        /// Return the embedded protocol descriptor
        #[arg(short, long)]
        local: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_descriptor(path: &std::path::Path) -> Result<ProtocolDescriptor> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    ProtocolDescriptor::from_json(&text)
        .with_context(|| format!("invalid protocol descriptor {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let endpoint = Endpoint::new(cli.host, cli.port).with_secure(cli.secure);
    let timeout = Duration::from_secs(cli.timeout);
    let discovery = DiscoveryClient::with_timeout(endpoint.clone(), timeout)?;

    match cli.command {
        Commands::Inspect {
            target,
            web_socket,
            protocol,
            local,
        } => {
            let mut options = ConnectionOptions {
                endpoint,
                timeout,
                local,
                ..Default::default()
            };
            if let Some(target) = target {
                options.target = if web_socket {
                    TargetSelector::Url(target)
                } else {
                    TargetSelector::Id(target)
                };
            }
            if let Some(path) = protocol {
                options.protocol = Some(read_descriptor(&path)?);
            }

            let client = cdp_client::connect(options)
                .await
                .context("Cannot connect to remote endpoint")?;
            if !shell::run(client).await? {
                std::process::exit(1);
            }
        }
        Commands::List => print_json(&discovery.list_targets().await?)?,
        Commands::New { url } => print_json(&discovery.create_target(url.as_deref()).await?)?,
        Commands::Activate { id } => discovery.activate_target(&id).await?,
        Commands::Close { id } => discovery.close_target(&id).await?,
        Commands::Version => print_json(&discovery.version().await?)?,
        Commands::Protocol { local } => {
            let fetched = discovery.fetch_protocol(local).await?;
            tracing::info!("Protocol descriptor origin: {:?}", fetched.origin);
            print_json(&fetched.descriptor)?;
        }
    }

    Ok(())
}

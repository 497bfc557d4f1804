mod cache;
mod config;
mod error;
mod fetch;
mod market;
mod rate_limit;
mod server;
mod sessions;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;

/// Resilient market data proxy for Nigerian equities.
#[derive(Parser)]
#[command(name = "ngx-proxy", version, about)]
struct Cli {
    /// Host to bind to
    #[arg(long, env = "NGX_PROXY_HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(long, env = "NGX_PROXY_PORT")]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "ngx_proxy=debug"
    } else {
        "ngx_proxy=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings = Settings::from_env();
    if let Some(host) = cli.host {
        settings.host = host;
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }

    server::serve(settings).await
}

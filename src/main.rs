mod shell;

use clap::Parser;
use dapp_wallet::{App, AppConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dapp-wallet")]
#[command(about = "Wallet-connected client for balances and contract deployment")]
struct Cli {
    /// Render the initial view and exit
    #[arg(long)]
    once: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // stdout carries the rendered view, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dapp_wallet=debug".into()),
        )
        .with(cli.json_logs.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!cli.json_logs).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();

    info!("Starting dapp-wallet v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::init()?;
    info!("Configuration loaded");

    let app = Arc::new(App::bootstrap(config));
    if !app.is_available() {
        warn!("Running without a wallet provider; set provider.url or DAPP_PROVIDER__URL");
    }

    shell::run(app, cli.once).await
}

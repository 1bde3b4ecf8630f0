use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pledge_checkout::{
    app,
    config::{Config, Overrides},
    payments::sign_payload,
    state::AppState,
};

#[derive(Parser)]
#[command(name = "pledge-checkout", version, about = "Donation pledge server backed by Stripe Checkout")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Overrides HOST
        #[arg(long)]
        host: Option<String>,
        /// Overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print a stripe-signature header for a payload file, for local webhook testing
    SignWebhook {
        /// JSON event body to sign
        #[arg(long)]
        payload: PathBuf,
        /// Unix timestamp to sign with (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            let config = Config::from_env_with(Overrides { host, port })?;
            serve(config).await
        }
        Command::SignWebhook { payload, timestamp } => {
            let config = Config::from_env()?;
            let secret = config
                .stripe_webhook_secret
                .as_deref()
                .context("STRIPE_WEBHOOK_SECRET must be set to sign payloads")?;
            let body = std::fs::read(&payload)
                .with_context(|| format!("Failed to read {}", payload.display()))?;
            let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
            println!("{}", sign_payload(secret, timestamp, &body));
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.addr();

    if config.stripe_webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set - webhook events will be acknowledged but not processed");
    }
    if !config.static_dir.join("index.html").exists() {
        tracing::warn!(
            "No index.html in {} - the pledge form will 404",
            config.static_dir.display()
        );
    }

    tracing::info!(
        "Pledges: {} per unit, up to {} units, campaign \"{}\"",
        config.unit_price,
        config.total_units,
        config.campaign_name
    );

    let state = AppState::new(config)?;
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Pledge server listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

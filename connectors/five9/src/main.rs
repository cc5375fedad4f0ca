//! FCP Five9 Connector Binary
//!
//! Streams normalized call events for one agent as JSON lines on stdout.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use fcp_five9::http::ReqwestFetcher;
use fcp_five9::transport::TungsteniteConnector;
use fcp_five9::{ConfigDocument, Five9Connector, JsonLinesSink};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "fcp-five9", version, about = "Five9 call event socket connector")]
struct Cli {
    /// Path to the JSON configuration document.
    #[arg(long, env = "FIVE9_CONFIG")]
    config: PathBuf,

    /// Agent user id (overrides `userId` from the config document).
    #[arg(long, env = "FIVE9_USER_ID")]
    user_id: Option<String>,

    /// Log output format (logs go to stderr).
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let document = ConfigDocument::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let user_id = cli
        .user_id
        .or_else(|| document.user_id.clone())
        .context("no user id: pass --user-id or set userId in the config document")?;

    let fetcher = ReqwestFetcher::new(&document.settings, &document.headers)?;
    let connector = Five9Connector::new(
        Arc::new(document.config_provider()),
        user_id,
        Arc::new(fetcher),
        Arc::new(TungsteniteConnector::new(document.settings.connect_timeout())),
        Arc::new(JsonLinesSink),
    )
    .with_settings(document.settings.clone());

    let Some(supervisor) = connector.init().await? else {
        return Ok(());
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutting down");
    supervisor.shutdown().await?;
    Ok(())
}

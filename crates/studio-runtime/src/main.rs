//! # Prompt Studio Runtime
//!
//! Entry point for the studio gateway.
//!
//! ## Startup Sequence
//!
//! 1. Parse flags and initialise logging
//! 2. Layer configuration: defaults, TOML file, environment, flags
//! 3. Build provider adapters (live HTTP or in-memory with `--offline`)
//! 4. Report unconfigured providers
//! 5. Serve until Ctrl+C, then shut down gracefully

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use studio_gateway::adapters::{self, InMemoryQuotaStore};
use studio_gateway::ports::{QuotaStore, StudioPorts, SystemTimeSource};
use studio_gateway::{GatewayConfig, StudioGateway};

/// Prompt Studio gateway
#[derive(Parser, Debug)]
#[command(name = "studio-runtime")]
#[command(about = "HTTP gateway for the Prompt Studio image generator")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config and environment)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Listen port (overrides config and STUDIO_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Generations allowed per user per day
    #[arg(long)]
    daily_limit: Option<u32>,

    /// Use in-memory providers instead of the hosted services
    #[arg(long)]
    offline: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
}

/// Build the effective configuration.
fn load_config<F>(args: &Args, env: F) -> Result<GatewayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            GatewayConfig::from_toml_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => GatewayConfig::default(),
    };

    config
        .apply_env(env)
        .context("applying environment overrides")?;

    if let Some(host) = args.host {
        config.http.host = host;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(limit) = args.daily_limit {
        config.quota.daily_limit = limit;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn build_ports(config: &GatewayConfig, offline: bool) -> Result<StudioPorts> {
    let quota_store: Arc<dyn QuotaStore> = match &config.quota.snapshot_path {
        Some(path) => {
            info!(path = %path, "Persisting quota counters");
            Arc::new(InMemoryQuotaStore::with_snapshot(path))
        }
        None => Arc::new(InMemoryQuotaStore::new()),
    };

    if offline {
        warn!("Running with in-memory providers; nothing leaves this process");
        return Ok(adapters::offline_ports(Arc::new(SystemTimeSource), quota_store));
    }
    adapters::live_ports(config, quota_store).context("building provider clients")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs)?;

    let config = load_config(&args, |key| std::env::var(key).ok())?;
    let ports = build_ports(&config, args.offline)?;

    info!(
        version = studio_gateway::VERSION,
        addr = %config.http_addr(),
        daily_limit = config.quota.daily_limit,
        "Starting Prompt Studio gateway"
    );

    let mut gateway = StudioGateway::new(config, ports).context("creating gateway")?;
    gateway.report_providers();

    if let Some(trigger) = gateway.take_shutdown_trigger() {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl+C received, shutting down"),
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
            }
            let _ = trigger.send(());
        });
    }

    gateway.start().await.context("gateway stopped with an error")?;
    Ok(())
}

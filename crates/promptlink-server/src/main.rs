//! PromptLink relay server: entry point.
//!
//! Starts a standalone relay that devices pair with and a browser extension
//! (the target) registers with.  At startup it prints two join URLs: one with
//! a fresh pairing code and one with a pre-issued token.
//!
//! # Usage
//!
//! ```text
//! promptlink-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>            Config file [default: platform config dir]
//!   --bind <IP>                Interface to bind
//!   --port <PORT>              Single port to try before the fallbacks
//!   --advertise-host <HOST>    Host written into join URLs
//!   --heartbeat-secs <SECS>    Heartbeat sweep period
//!   --token-sweep-secs <SECS>  Token / code expiry sweep period
//!   --tls                      Advertise wss:// URLs
//!   --log-level <LEVEL>        Log level when RUST_LOG is unset
//!   --init-config              Write the effective config file and exit
//! ```
//!
//! Precedence: CLI flag (or its `PROMPTLINK_*` variable) > config file >
//! built-in default.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use promptlink_core::DeviceType;
use promptlink_server::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, AppConfig,
};
use promptlink_server::RelayServer;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// PromptLink relay server.
///
/// Every option is optional: an absent flag falls back to the config file and
/// then to the built-in default.
#[derive(Debug, Parser)]
#[command(
    name = "promptlink-server",
    about = "Pairing and prompt relay for PromptLink devices",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "PROMPTLINK_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind (`0.0.0.0` for all interfaces).
    #[arg(long, env = "PROMPTLINK_BIND")]
    bind: Option<String>,

    /// Port to try first; the configured fallback ports still apply.
    #[arg(long, env = "PROMPTLINK_PORT")]
    port: Option<u16>,

    /// Host name or IP written into join URLs.
    #[arg(long, env = "PROMPTLINK_ADVERTISE_HOST")]
    advertise_host: Option<String>,

    /// Heartbeat sweep period in seconds.
    #[arg(long, env = "PROMPTLINK_HEARTBEAT_SECS")]
    heartbeat_secs: Option<u64>,

    /// Token and pairing-code expiry sweep period in seconds.
    #[arg(long, env = "PROMPTLINK_TOKEN_SWEEP_SECS")]
    token_sweep_secs: Option<u64>,

    /// Advertise `wss://` URLs (TLS terminated in front of the relay).
    #[arg(long, env = "PROMPTLINK_TLS")]
    tls: bool,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, env = "PROMPTLINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write the effective configuration to the config path and exit.
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    /// Overlays the flags that were given onto `config`.
    fn apply_to(&self, mut config: AppConfig) -> AppConfig {
        if let Some(bind) = &self.bind {
            config.network.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.network.preferred_ports = vec![port];
        }
        if let Some(host) = &self.advertise_host {
            config.network.advertise_host = Some(host.clone());
        }
        if let Some(secs) = self.heartbeat_secs {
            config.relay.heartbeat_interval_secs = secs;
        }
        if let Some(secs) = self.token_sweep_secs {
            config.relay.token_sweep_interval_secs = secs;
        }
        if self.tls {
            config.network.tls = true;
        }
        if let Some(level) = &self.log_level {
            config.relay.log_level = level.clone();
        }
        config
    }

    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given and no platform config dir"),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = cli.config_path()?;
    let file_config = load_config_from(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    let app_config = cli.apply_to(file_config);

    // `RUST_LOG` wins; otherwise the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&app_config.relay.log_level)),
        )
        .init();

    if cli.init_config {
        save_config_to(&path, &app_config)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let config = app_config
        .to_server_config()
        .context("invalid configuration")?;
    info!(
        "PromptLink relay starting: bind={}, heartbeat={}s",
        config.bind_ip,
        config.heartbeat_interval.as_secs()
    );

    let server = RelayServer::start(config, None).await?;

    let (code, code_url) = server.generate_pairing_code(DeviceType::Unknown).await;
    let (_, token_url) = server.issue_token(None).await;
    println!("PromptLink relay listening on {}", server.local_addr());
    println!("  pairing code: {} (valid 10 minutes)", code.code);
    if let Some(url) = code_url {
        println!("  pair URL:     {url}");
    }
    if let Some(url) = token_url {
        println!("  token URL:    {url}");
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    server.shutdown().await;
    info!("PromptLink relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_flags_keeps_file_config() {
        // Arrange
        let cli = Cli::parse_from(["promptlink-server"]);
        let mut file = AppConfig::default();
        file.relay.heartbeat_interval_secs = 12;

        // Act
        let merged = cli.apply_to(file.clone());

        // Assert
        assert_eq!(merged, file);
    }

    #[test]
    fn test_cli_port_replaces_preferred_ports_only() {
        let cli = Cli::parse_from(["promptlink-server", "--port", "9000"]);

        let merged = cli.apply_to(AppConfig::default());

        assert_eq!(merged.network.preferred_ports, vec![9000]);
        assert_eq!(
            merged.network.fallback_ports,
            AppConfig::default().network.fallback_ports
        );
    }

    #[test]
    fn test_cli_flags_override_file_values() {
        // Arrange
        let cli = Cli::parse_from([
            "promptlink-server",
            "--bind",
            "127.0.0.1",
            "--advertise-host",
            "desk.local",
            "--heartbeat-secs",
            "5",
            "--token-sweep-secs",
            "60",
            "--tls",
            "--log-level",
            "debug",
        ]);

        // Act
        let merged = cli.apply_to(AppConfig::default());

        // Assert
        assert_eq!(merged.network.bind_address, "127.0.0.1");
        assert_eq!(merged.network.advertise_host.as_deref(), Some("desk.local"));
        assert_eq!(merged.relay.heartbeat_interval_secs, 5);
        assert_eq!(merged.relay.token_sweep_interval_secs, 60);
        assert!(merged.network.tls);
        assert_eq!(merged.relay.log_level, "debug");
    }

    #[test]
    fn test_explicit_config_path_is_used() {
        let cli = Cli::parse_from(["promptlink-server", "--config", "/tmp/pl.toml"]);
        assert_eq!(cli.config_path().unwrap(), PathBuf::from("/tmp/pl.toml"));
    }

    #[test]
    fn test_init_config_flag_parses() {
        let cli = Cli::parse_from(["promptlink-server", "--init-config"]);
        assert!(cli.init_config);
    }
}

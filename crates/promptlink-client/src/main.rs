//! PromptLink client: entry point.
//!
//! Joins a relay from the command line.  As a device it reads prompts from
//! stdin, one per line, and submits them.  With `--target` it registers as
//! the target and prints every relayed prompt to stdout.
//!
//! # Usage
//!
//! ```text
//! promptlink-client [OPTIONS] <URL>
//!
//! Arguments:
//!   <URL>  Join URL, e.g. ws://192.168.1.20:8787?code=482913
//!
//! Options:
//!   --target                       Register as the prompt target
//!   --heartbeat-secs <SECS>        Client ping period [default: 30]
//!   --connect-timeout-secs <SECS>  Connect timeout [default: 10]
//!   --device-info <JSON>           Metadata sent with pair / preauth
//!   --log-level <LEVEL>            Log level when RUST_LOG is unset [default: info]
//! ```
//!
//! The client keeps running after stdin closes so queued prompts can still
//! go out; stop it with Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use promptlink_client::{ClientConfig, ClientEvent, RelayClient, Role};
use promptlink_core::{DeviceInfo, PromptSink};

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "promptlink-client",
    about = "Pair with a PromptLink relay and send or receive prompts",
    version
)]
struct Cli {
    /// Join URL carrying a pairing code or a token.
    #[arg(env = "PROMPTLINK_URL")]
    url: String,

    /// Register as the target and print relayed prompts.
    #[arg(long)]
    target: bool,

    #[arg(long, env = "PROMPTLINK_HEARTBEAT_SECS")]
    heartbeat_secs: Option<u64>,

    #[arg(long, env = "PROMPTLINK_CONNECT_TIMEOUT_SECS")]
    connect_timeout_secs: Option<u64>,

    /// JSON object describing this device.
    #[arg(long)]
    device_info: Option<String>,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, env = "PROMPTLINK_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn to_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = ClientConfig::from_url(&self.url).context("invalid join URL")?;
        if self.target {
            config = config.with_role(Role::Target);
        }
        if let Some(secs) = self.heartbeat_secs {
            config.heartbeat_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(json) = &self.device_info {
            let info: DeviceInfo =
                serde_json::from_str(json).context("--device-info is not valid JSON")?;
            config = config.with_device_info(info);
        }
        Ok(config)
    }
}

/// Prints relayed prompts, one per line.
struct StdoutSink;

impl PromptSink for StdoutSink {
    fn deliver_prompt(&self, text: &str) {
        println!("{text}");
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.to_config()?;
    let role = config.role;
    info!(role = %role, url = %config.url.socket_url(), "PromptLink client starting");

    let sink: Option<Arc<dyn PromptSink>> = match role {
        Role::Target => Some(Arc::new(StdoutSink)),
        Role::Device => None,
    };
    let (client, mut events) = RelayClient::connect(config, sink);

    let mut lines = match role {
        Role::Device => Some(BufReader::new(tokio::io::stdin()).lines()),
        Role::Target => None,
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    error!("failed to listen for Ctrl+C signal: {e}");
                }
                info!("shutting down");
                break;
            }

            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },

            line = next_line(&mut lines) => match line {
                Ok(Some(text)) if text.trim().is_empty() => {}
                Ok(Some(text)) => {
                    let outcome = client.submit_prompt(text).await?;
                    info!(?outcome, "prompt submitted");
                }
                Ok(None) => {
                    info!("stdin closed; press Ctrl+C to exit");
                    lines = None;
                }
                Err(e) => {
                    warn!("failed to read stdin: {e}");
                    lines = None;
                }
            },
        }
    }

    client.shutdown().await;
    Ok(())
}

/// The next stdin line, or never when stdin is not being read.
async fn next_line(lines: &mut Option<Lines<BufReader<Stdin>>>) -> std::io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

fn log_event(event: &ClientEvent) {
    match event {
        ClientEvent::StateChanged(state) => info!(%state, "connection state changed"),
        ClientEvent::Paired {
            expires_in_seconds, ..
        } => info!(expires_in_seconds, "paired"),
        ClientEvent::TargetRegistered => info!("registered as target"),
        ClientEvent::PromptQueued {
            queued,
            dropped_oldest,
        } => info!(queued, dropped_oldest, "prompt queued until reconnect"),
        ClientEvent::PromptReceived => info!("relay received prompt"),
        ClientEvent::PromptDelivered => info!("prompt delivered to target"),
        ClientEvent::PromptFailed(code) => warn!(?code, "prompt failed: {}", code.description()),
        ClientEvent::ServerError(code) => warn!(?code, "relay error: {}", code.description()),
        ClientEvent::ReauthRequired => {
            error!("relay rejected this client's credentials; rejoin with a fresh pairing code")
        }
        ClientEvent::ReconnectScheduled { attempt, delay } => {
            info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting")
        }
        ClientEvent::Failed => error!("gave up reconnecting"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use promptlink_core::JoinCredential;

    use super::*;

    #[test]
    fn test_url_only_builds_device_config() {
        // Arrange
        let cli = Cli::parse_from(["promptlink-client", "ws://10.0.0.5:8787?code=482913"]);

        // Act
        let config = cli.to_config().unwrap();

        // Assert
        assert_eq!(config.role, Role::Device);
        assert_eq!(
            config.url.credential,
            Some(JoinCredential::Code("482913".to_string()))
        );
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_target_flag_and_timing_overrides() {
        let cli = Cli::parse_from([
            "promptlink-client",
            "ws://10.0.0.5:8787",
            "--target",
            "--heartbeat-secs",
            "5",
            "--connect-timeout-secs",
            "2",
        ]);

        let config = cli.to_config().unwrap();

        assert_eq!(config.role, Role::Target);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_device_info_json_is_attached() {
        let cli = Cli::parse_from([
            "promptlink-client",
            "ws://10.0.0.5:8787?code=482913",
            "--device-info",
            r#"{"name":"kitchen tablet"}"#,
        ]);

        let config = cli.to_config().unwrap();

        assert_eq!(
            config.device_info,
            Some(serde_json::json!({ "name": "kitchen tablet" }))
        );
    }

    #[test]
    fn test_invalid_device_info_is_rejected() {
        let cli = Cli::parse_from([
            "promptlink-client",
            "ws://10.0.0.5:8787",
            "--device-info",
            "{not json",
        ]);

        assert!(cli.to_config().is_err());
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let cli = Cli::parse_from(["promptlink-client", "http://10.0.0.5:8787"]);
        assert!(cli.to_config().is_err());
    }
}

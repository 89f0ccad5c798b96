//! gcs: Google Cloud Shell from the terminal
//!
//! Thin client for a cloudshell-gateway. The gateway holds the OAuth token
//! and talks to the Cloud Shell API; `gcs` polls it, opens the consent page
//! when needed and hands off to the local `ssh` binary.

mod error;
mod gateway;
mod ssh;
mod wait;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cloudshell_api::EnvironmentState;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::gateway::{GatewayClient, Reply};
use crate::wait::PollSettings;

const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8787";
const UNAUTHORIZED: &str = "Unauthorized or token has expired, please reauthorize.";

#[derive(Parser, Debug, PartialEq)]
#[command(name = "gcs")]
#[command(about = "Google Cloud Shell through a cloudshell-gateway", long_about = None)]
struct Cli {
    /// Base URL of the gateway
    #[arg(long, env = "GCS_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    gateway: String,

    /// Seconds between /connect polls while waiting
    #[arg(long, default_value_t = 3)]
    poll_interval_secs: u64,

    /// Give up waiting for the environment after this many seconds
    #[arg(long, default_value_t = 300)]
    wait_timeout_secs: u64,

    /// Per-request timeout for gateway calls
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Wait for the environment, then open an SSH session
    Ssh {
        /// Extra arguments passed to ssh after the destination
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Show the environment state and SSH endpoint
    #[command(alias = "state")]
    Status,
    /// Start the environment if it is suspended
    Start,
    /// Register an OpenSSH public key with the environment
    #[command(name = "addPublicKey")]
    AddPublicKey {
        /// Key text, e.g. "ssh-ed25519 AAAA... user@host"
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let client = GatewayClient::new(http, &cli.gateway)?;

    match cli.command {
        Command::Ssh { args } => {
            let poll = PollSettings {
                interval: Duration::from_secs(cli.poll_interval_secs),
                timeout: Duration::from_secs(cli.wait_timeout_secs),
            };
            info!(gateway = %cli.gateway, "getting Google Cloud Shell status");
            let target = wait::wait_for_ssh(&client, poll, |url| open::that(url)).await?;
            let status = ssh::launch(&target, &args).await?;
            if !status.success() {
                std::process::exit(status.code().unwrap_or(1));
            }
        }
        Command::Status => {
            let reply = client.status().await?;
            for line in status_lines(&reply) {
                println!("{line}");
            }
        }
        Command::Start => {
            let reply = client.connect().await?;
            println!("{}", start_line(&reply)?);
        }
        Command::AddPublicKey { key } => {
            println!("Public key: {key}");
            let reply = client.add_public_key(&key).await.map_err(|e| match e {
                error::Error::NotJson { .. } => anyhow::anyhow!(
                    "{e} (is server.lifecycle_routes enabled on the gateway?)"
                ),
                e => e.into(),
            })?;
            match reply {
                Reply::Unauthorized => bail!(UNAUTHORIZED),
                Reply::Failed(error) => bail!("adding public key failed: {error}"),
                _ => println!("Public Key added successfully"),
            }
        }
    }

    Ok(())
}

/// Human-readable lines for `gcs status`.
fn status_lines(reply: &Reply) -> Vec<String> {
    match reply {
        Reply::Unauthorized => vec![UNAUTHORIZED.to_string()],
        Reply::Environment(env) if env.state == Some(EnvironmentState::Running) => vec![
            "State: RUNNING".to_string(),
            format!("Username: {}", env.ssh_username.as_deref().unwrap_or("")),
            format!("Host: {}", env.ssh_host.as_deref().unwrap_or("")),
            format!(
                "Port: {}",
                env.ssh_port.map(|p| p.to_string()).unwrap_or_default()
            ),
        ],
        Reply::Environment(env) => vec![format!(
            "State: {}",
            env.state.as_ref().map(EnvironmentState::as_str).unwrap_or("")
        )],
        Reply::Failed(error) => vec![format!("Error: {error}")],
        Reply::Started => vec!["State: STARTING".to_string()],
        Reply::Unrecognized(body) => vec![format!("Unknown state: {body}")],
    }
}

/// Outcome line for `gcs start`, from the gateway's `/connect` reply.
fn start_line(reply: &Reply) -> Result<&'static str> {
    match reply {
        Reply::Started => Ok("Start cloud shell success"),
        Reply::Environment(env) => match env.state {
            Some(EnvironmentState::Running) => Ok("Cloud shell is running"),
            Some(EnvironmentState::Starting) => Ok("Cloud shell is starting"),
            _ => bail!("unexpected environment state: {:?}", env.state),
        },
        Reply::Unauthorized => bail!(UNAUTHORIZED),
        Reply::Failed(error) => bail!("start failed: {error}"),
        Reply::Unrecognized(body) => bail!("unknown state: {body}"),
    }
}

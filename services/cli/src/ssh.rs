//! SSH hand-off once the environment is running

use std::process::ExitStatus;

use cloudshell_api::Environment;
use tokio::process::Command;
use tracing::info;

use crate::error::{Error, Result};

const DEFAULT_SSH_PORT: u16 = 22;

/// Where to connect, as reported by a running environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub username: String,
    pub host: String,
    pub port: u16,
}

impl SshTarget {
    pub fn from_environment(env: &Environment) -> Result<Self> {
        let host = env
            .ssh_host
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or(Error::MissingEndpoint("host"))?;
        let username = env
            .ssh_username
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or(Error::MissingEndpoint("username"))?;
        Ok(Self {
            username,
            host,
            port: env.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
        })
    }
}

/// `ssh` arguments: port, destination, host-key options (the environment's
/// host key changes on every boot), then the caller's extra arguments.
pub fn ssh_args(target: &SshTarget, extra: &[String]) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        target.port.to_string(),
        format!("{}@{}", target.username, target.host),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
    ];
    args.extend(extra.iter().cloned());
    args
}

/// Run `ssh` attached to this terminal and wait for it to exit.
pub async fn launch(target: &SshTarget, extra: &[String]) -> Result<ExitStatus> {
    info!(host = %target.host, port = target.port, "connecting");
    Command::new("ssh")
        .args(ssh_args(target, extra))
        .status()
        .await
        .map_err(|e| Error::Ssh(e.to_string()))
}

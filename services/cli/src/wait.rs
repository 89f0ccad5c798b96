//! Poll the gateway until the environment accepts SSH
//!
//! The gateway's `/connect` is single-shot; the waiting happens here. A 401
//! opens the consent page once and keeps polling while the user authorizes.

use std::time::Duration;

use cloudshell_api::EnvironmentState;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::gateway::{GatewayClient, Reply};
use crate::ssh::SshTarget;

/// Poll cadence and overall deadline.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Call `/connect` until it reports a running environment.
///
/// `open_browser` is called with the gateway's `/auth` URL the first time
/// the gateway has no token.
pub async fn wait_for_ssh<F>(
    client: &GatewayClient,
    poll: PollSettings,
    open_browser: F,
) -> Result<SshTarget>
where
    F: Fn(&str) -> std::io::Result<()>,
{
    let deadline = Instant::now() + poll.timeout;
    let mut browser_opened = false;

    loop {
        match client.connect().await? {
            Reply::Environment(env) if env.state == Some(EnvironmentState::Running) => {
                info!("environment running");
                return SshTarget::from_environment(&env);
            }
            Reply::Unauthorized if !browser_opened => {
                let auth_url = client.auth_url();
                warn!("unauthorized or token has expired, please reauthorize");
                if let Err(e) = open_browser(&auth_url) {
                    warn!(error = %e, url = %auth_url, "could not open a browser, open the URL manually");
                } else {
                    info!(url = %auth_url, "opened authorization page");
                }
                browser_opened = true;
            }
            Reply::Unauthorized => info!("waiting for authorization"),
            Reply::Environment(env) => {
                let state = env.state.as_ref().map(EnvironmentState::as_str);
                info!(state, "waiting for environment");
            }
            Reply::Started => info!("environment starting"),
            Reply::Failed(error) => warn!(%error, "gateway relayed an error"),
            Reply::Unrecognized(body) => warn!(%body, "unrecognized gateway response"),
        }

        if Instant::now() + poll.interval > deadline {
            return Err(Error::WaitTimeout(poll.timeout));
        }
        tokio::time::sleep(poll.interval).await;
    }
}

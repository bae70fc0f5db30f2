//! Reachability probe for the application under test

use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// How long to keep polling the signup page before giving up
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub timeout: Duration,
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Poll `url` until it answers with anything other than a server error.
///
/// Client errors count as reachable: staging hosts commonly answer bare
/// requests with 403 while still serving browsers.
pub async fn wait_until_reachable(url: &str, config: &ProbeConfig) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(url).send().await {
            Ok(resp) if !resp.status().is_server_error() => {
                info!("{} reachable ({}) after {} attempt(s)", url, resp.status(), attempts);
                return Ok(());
            }
            Ok(resp) => {
                warn!("{} returned {}", url, resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to respond...", url);
                }
                if !e.is_connect() && !e.is_timeout() {
                    warn!("Probe error: {}", e);
                }
            }
        }

        if start.elapsed() + config.interval >= config.timeout {
            return Err(E2eError::TargetUnreachable {
                url: url.to_string(),
                attempts,
            });
        }
        sleep(config.interval).await;
    }
}

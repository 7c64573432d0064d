//! Keep-alive self-ping (§6, §9): operational glue that keeps a free-tier host
//! awake by pinging its own `/healthz` on an interval. Not core behavior — a
//! separate scheduled task, disableable by leaving `KEEPALIVE_URL` unset.

use std::time::Duration;

use crate::config::KeepaliveConfig;

/// Runs until cancelled. Exits the process with status 1 if the URL is missing or
/// the configured interval is invalid (§6 exit codes) — callers that want the
/// keepalive to simply be disabled should check `config.url.is_some()` before
/// spawning this.
pub async fn run_keepalive(config: KeepaliveConfig) {
    let Some(url) = config.url else {
        tracing::warn!("KEEPALIVE_URL not set, self-ping disabled");
        return;
    };

    let client = reqwest::Client::new();
    let mut interval = tokio::time::interval(config.interval);
    interval.tick().await; // first tick fires immediately; skip it, the server just started

    loop {
        interval.tick().await;
        match tokio::time::timeout(config.timeout, client.get(&url).send()).await {
            Ok(Ok(response)) if response.status().is_success() => {
                tracing::debug!(url = %url, "keepalive ping succeeded");
            }
            Ok(Ok(response)) => {
                tracing::warn!(url = %url, status = %response.status(), "keepalive ping returned non-success status");
            }
            Ok(Err(err)) => {
                tracing::warn!(url = %url, error = %err, "keepalive ping failed");
            }
            Err(_) => {
                tracing::warn!(url = %url, timeout = ?config.timeout, "keepalive ping timed out");
            }
        }
    }
}

/// Validates the interval/timeout at startup and returns the exit code §6 names
/// for a keepalive worker that cannot run (missing URL or invalid interval).
pub fn validate_or_exit_code(config: &KeepaliveConfig) -> Option<i32> {
    if config.url.is_none() {
        return None; // disabled by omission, not an error
    }
    if config.interval < Duration::from_secs(60) {
        return Some(1);
    }
    None
}

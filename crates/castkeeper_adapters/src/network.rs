//! Shared HTTP client configuration for the platform and webhook calls.

use std::time::Duration;

use castkeeper_core::Error;
use reqwest::Client;

/// Default timeout for HTTP requests (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout (10 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const USER_AGENT: &str = concat!("castkeeper/", env!("CARGO_PKG_VERSION"));

/// Build a configured HTTP client for the OAuth token endpoints.
pub fn build_oauth_client() -> Result<Client, Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Error::Network(format!("failed to create OAuth HTTP client: {}", e)))
}

/// Build a configured HTTP client for outbound webhook notifications.
pub fn build_webhook_client() -> Result<Client, Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Error::Network(format!("failed to create webhook HTTP client: {}", e)))
}

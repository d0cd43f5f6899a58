//! HTTP client construction policy for release lookups.
//!
//! Unlike transfers, a lookup is a small JSON request, so it gets an overall
//! timeout as well as a connect timeout.

use std::time::Duration;

use reqwest::Client;

use crate::user_agent;

/// Default overall timeout for one release lookup.
pub const RESOLVER_TIMEOUT_SECS: u64 = 30;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Builds the client used for release lookups.
///
/// # Errors
///
/// Returns the builder error when the TLS backend cannot be initialized.
pub fn build_resolver_http_client(timeout_secs: u64) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS.min(timeout_secs)))
        .timeout(Duration::from_secs(timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
        .build()
}

//! Shared User-Agent string for transfer and release-lookup traffic.
//!
//! Release APIs such as GitHub's reject requests without a User-Agent, so
//! every client the crate builds sends this one.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/appfetch/appfetch";

/// User-Agent sent by every HTTP client in the crate.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("appfetch/{version} (+{PROJECT_UA_URL})")
}

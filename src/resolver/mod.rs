//! Release lookups that turn a marker token into a download URL.
//!
//! A marker names a [`MarkerRule`]: a release-metadata endpoint plus a
//! platform token and file extension. One lookup serves every item that
//! shares the marker.
//!
//! # Example
//!
//! ```no_run
//! use appfetch_core::catalog::builtin_markers;
//! use appfetch_core::resolver::ReleaseResolver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = ReleaseResolver::new(30)?;
//! let markers = builtin_markers();
//! let rule = &markers["GITHUB_LATEST"];
//! let url = resolver.lookup(rule).await?;
//! println!("latest: {url}");
//! # Ok(())
//! # }
//! ```

mod error;
mod http_client;

pub use error::{FETCH_FAILED_REASON, NO_MATCHING_ASSET_REASON, ResolveError};
pub use http_client::{RESOLVER_TIMEOUT_SECS, build_resolver_http_client};

use std::sync::Arc;

use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::catalog::MarkerRule;
use crate::queue::{DownloadItem, ItemStatus};

/// Release document returned by the metadata endpoint.
///
/// Unknown fields are ignored; only the asset list is required.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    /// Release tag, when present.
    #[serde(default)]
    pub tag_name: Option<String>,
    /// Downloadable assets in server order.
    pub assets: Vec<ReleaseAsset>,
}

/// One downloadable asset of a release.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    /// Asset file name.
    #[serde(default)]
    pub name: Option<String>,
    /// Direct download URL.
    #[serde(default, alias = "downloadUrl", alias = "download_url")]
    pub browser_download_url: Option<String>,
}

/// Returns the URL of the first asset matching `platform` and `extension`.
///
/// The name must contain `platform` and end with `extension`, both compared
/// case-insensitively. Assets without a name, or whose URL is not an
/// absolute URL, are skipped.
#[must_use]
pub fn select_asset<'a>(
    assets: &'a [ReleaseAsset],
    platform: &str,
    extension: &str,
) -> Option<&'a str> {
    let platform = platform.to_lowercase();
    let extension = extension.to_lowercase();

    assets.iter().find_map(|asset| {
        let name = asset.name.as_deref()?.to_lowercase();
        if !name.contains(&platform) || !name.ends_with(&extension) {
            return None;
        }
        let url = asset.browser_download_url.as_deref()?;
        match Url::parse(url) {
            Ok(_) => Some(url),
            Err(e) => {
                debug!(asset = %name, url, error = %e, "skipping asset with unparsable URL");
                None
            }
        }
    })
}

/// Performs release lookups over a shared HTTP client.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    client: Client,
}

impl ReleaseResolver {
    /// Creates a resolver with its own client and the given overall timeout.
    ///
    /// # Errors
    ///
    /// Returns the builder error when the HTTP client cannot be constructed.
    pub fn new(timeout_secs: u64) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_resolver_http_client(timeout_secs)?))
    }

    /// Creates a resolver over an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Issues one request to the rule's endpoint and returns the matching asset URL.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::FetchFailed`] for transport errors, non-success
    /// statuses and unparsable bodies, and [`ResolveError::NoMatchingAsset`]
    /// when the release has no asset passing the filter.
    #[instrument(skip(self), fields(endpoint = %rule.endpoint))]
    pub async fn lookup(&self, rule: &MarkerRule) -> Result<String, ResolveError> {
        let endpoint = rule.endpoint.as_str();
        Url::parse(endpoint).map_err(|e| ResolveError::fetch_failed(endpoint, e.to_string()))?;

        let response = self
            .client
            .get(endpoint)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ResolveError::fetch_failed(endpoint, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::fetch_failed(
                endpoint,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let release: Release = response
            .json()
            .await
            .map_err(|e| ResolveError::fetch_failed(endpoint, e.to_string()))?;
        debug!(
            tag = release.tag_name.as_deref().unwrap_or("-"),
            assets = release.assets.len(),
            "release info received"
        );

        select_asset(&release.assets, &rule.platform, &rule.extension)
            .map(str::to_string)
            .ok_or_else(|| {
                ResolveError::no_matching_asset(endpoint, &rule.platform, &rule.extension)
            })
    }

    /// Resolves one marker group.
    ///
    /// Every item is moved to `resolving` first. After the single lookup,
    /// each item either holds the resolved URL and is back in `queued`, or is
    /// `failed` with the lookup's item reason.
    ///
    /// # Errors
    ///
    /// Returns the lookup error after it has been recorded on the items.
    pub async fn resolve_group(
        &self,
        rule: &MarkerRule,
        items: &[Arc<DownloadItem>],
    ) -> Result<String, ResolveError> {
        for item in items {
            item.transition(ItemStatus::Resolving);
        }

        match self.lookup(rule).await {
            Ok(url) => {
                for item in items {
                    item.assign_url(&url);
                }
                info!(url = %url, items = items.len(), "marker resolved");
                Ok(url)
            }
            Err(error) => {
                for item in items {
                    item.fail(error.item_reason());
                }
                warn!(error = %error, items = items.len(), "marker resolution failed");
                Err(error)
            }
        }
    }
}

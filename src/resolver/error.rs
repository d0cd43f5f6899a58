//! Error types for release lookups.
//!
//! Follows the What/Why/Fix layout used across the project. The `Display`
//! text is for logs; items record the short [`ResolveError::item_reason`].

use thiserror::Error;

/// Per-item reason when the release document could not be obtained.
pub const FETCH_FAILED_REASON: &str = "could not fetch release info";

/// Per-item reason when no asset passes the platform/extension filter.
pub const NO_MATCHING_ASSET_REASON: &str = "no matching asset in release";

/// Errors that can occur while turning a marker into a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Transport failure, non-success status, or a body that is not a release document.
    #[error(
        "could not fetch release info from '{endpoint}': {reason}\n  Suggestion: Check network access and the marker endpoint"
    )]
    FetchFailed {
        /// Release endpoint that was queried.
        endpoint: String,
        /// Underlying cause.
        reason: String,
    },

    /// The release parsed but none of its assets matched.
    #[error(
        "no asset in release '{endpoint}' matches platform '{platform}' with extension '{extension}'\n  Suggestion: Check the marker's platform and extension settings"
    )]
    NoMatchingAsset {
        /// Release endpoint that was queried.
        endpoint: String,
        /// Required platform token.
        platform: String,
        /// Required extension.
        extension: String,
    },
}

impl ResolveError {
    /// Creates a fetch failure.
    pub fn fetch_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a no-match failure.
    pub fn no_matching_asset(
        endpoint: impl Into<String>,
        platform: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self::NoMatchingAsset {
            endpoint: endpoint.into(),
            platform: platform.into(),
            extension: extension.into(),
        }
    }

    /// Short reason recorded on every affected item.
    #[must_use]
    pub fn item_reason(&self) -> &'static str {
        match self {
            Self::FetchFailed { .. } => FETCH_FAILED_REASON,
            Self::NoMatchingAsset { .. } => NO_MATCHING_ASSET_REASON,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_reasons() {
        assert_eq!(
            ResolveError::fetch_failed("https://api.example.com", "timeout").item_reason(),
            "could not fetch release info"
        );
        assert_eq!(
            ResolveError::no_matching_asset("https://api.example.com", "mac", ".dmg")
                .item_reason(),
            "no matching asset in release"
        );
    }

    #[test]
    fn test_display_includes_suggestion() {
        let msg = ResolveError::no_matching_asset("https://api.example.com", "mac", ".dmg")
            .to_string();
        assert!(msg.contains("mac"), "Expected platform in: {msg}");
        assert!(msg.contains("Suggestion:"), "Expected suggestion in: {msg}");
    }
}

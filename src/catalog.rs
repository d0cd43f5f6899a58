//! Static catalog of download definitions.
//!
//! A catalog is the ordered list of files a batch should fetch. Each entry
//! either carries a concrete URL or a marker token that is turned into a URL
//! by the release resolver before the entry can be scheduled.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Marker token used by the built-in catalog for "latest GitHub release" lookups.
pub const GITHUB_LATEST_MARKER: &str = "GITHUB_LATEST";

/// Where a definition's download URL comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlSource {
    /// A concrete absolute URL.
    Static(String),
    /// A sentinel token that must be resolved through a [`MarkerRule`].
    Marker(String),
}

impl UrlSource {
    /// Classifies a raw catalog value.
    ///
    /// Anything that parses as an absolute `http`/`https` URL is static;
    /// every other value is treated as a marker token.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Static(trimmed.to_string()),
            _ => Self::Marker(trimmed.to_string()),
        }
    }

    /// Returns the marker token, if this source is a marker.
    #[must_use]
    pub fn marker(&self) -> Option<&str> {
        match self {
            Self::Marker(token) => Some(token),
            Self::Static(_) => None,
        }
    }
}

impl fmt::Display for UrlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(url) => write!(f, "{url}"),
            Self::Marker(token) => write!(f, "<{token}>"),
        }
    }
}

/// One immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDefinition {
    /// Name shown to the user.
    pub display_name: String,
    /// File name written under the destination root.
    pub file_name: String,
    /// URL or marker.
    pub source: UrlSource,
}

impl DownloadDefinition {
    /// Creates a definition, classifying `url_or_marker` with [`UrlSource::parse`].
    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        file_name: impl Into<String>,
        url_or_marker: &str,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            file_name: file_name.into(),
            source: UrlSource::parse(url_or_marker),
        }
    }
}

/// How to turn a marker token into a concrete URL.
///
/// The endpoint must return a release document with an `assets` list. The
/// first asset whose lowercased name contains `platform` and ends with
/// `extension` provides the download URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRule {
    /// Release metadata endpoint.
    pub endpoint: String,
    /// Token that must appear in the asset name (case-insensitive).
    pub platform: String,
    /// Required file extension, including the leading dot.
    pub extension: String,
}

/// Catalog validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// An entry has an empty display name or file name.
    #[error("catalog entry {index} has an empty {field}")]
    EmptyField {
        /// Zero-based entry position.
        index: usize,
        /// Name of the empty field.
        field: &'static str,
    },

    /// A file name is not a single plain path component.
    #[error("catalog entry {index} has file name '{file_name}' which is not a plain file name")]
    InvalidFileName {
        /// Zero-based entry position.
        index: usize,
        /// The offending file name.
        file_name: String,
    },

    /// Two entries write to the same destination file.
    #[error("duplicate destination file name '{file_name}' in catalog")]
    DuplicateFileName {
        /// The duplicated file name.
        file_name: String,
    },
}

/// Ordered list of download definitions plus the marker rules they may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    definitions: Vec<DownloadDefinition>,
    markers: BTreeMap<String, MarkerRule>,
}

impl Catalog {
    /// Builds a validated catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when a definition has empty fields, a file
    /// name that is not a single path component, or a duplicated file name.
    pub fn new(
        definitions: Vec<DownloadDefinition>,
        markers: BTreeMap<String, MarkerRule>,
    ) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for (index, definition) in definitions.iter().enumerate() {
            if definition.display_name.trim().is_empty() {
                return Err(CatalogError::EmptyField {
                    index,
                    field: "name",
                });
            }
            if definition.file_name.trim().is_empty() {
                return Err(CatalogError::EmptyField {
                    index,
                    field: "file_name",
                });
            }
            if !is_plain_file_name(&definition.file_name) {
                return Err(CatalogError::InvalidFileName {
                    index,
                    file_name: definition.file_name.clone(),
                });
            }
            if !seen.insert(definition.file_name.as_str()) {
                return Err(CatalogError::DuplicateFileName {
                    file_name: definition.file_name.clone(),
                });
            }
        }

        Ok(Self {
            definitions,
            markers,
        })
    }

    /// The built-in catalog of desktop applications.
    #[must_use]
    pub fn builtin() -> Self {
        let definitions = vec![
            DownloadDefinition::new("Bambu Studio", "BambuStudio.dmg", GITHUB_LATEST_MARKER),
            DownloadDefinition::new(
                "Brave Browser",
                "BraveBrowser.dmg",
                "https://referrals.brave.com/latest/Brave-Browser-arm64.dmg",
            ),
            DownloadDefinition::new(
                "Google Chrome",
                "GoogleChrome.dmg",
                "https://dl.google.com/chrome/mac/universal/stable/GGRO/googlechrome.dmg",
            ),
            DownloadDefinition::new(
                "ChatGPT",
                "ChatGPT.dmg",
                "https://persistent.oaistatic.com/sidekick/public/ChatGPT_Desktop_public_latest.dmg",
            ),
            DownloadDefinition::new(
                "Grammarly Desktop",
                "Grammarly.dmg",
                "https://download-mac.grammarly.com/Grammarly.dmg",
            ),
            DownloadDefinition::new(
                "Visual Studio Code",
                "VSCode-arm64.zip",
                "https://update.code.visualstudio.com/latest/darwin-arm64/stable",
            ),
        ];

        Self {
            definitions,
            markers: builtin_markers(),
        }
    }

    /// Definitions in catalog order.
    #[must_use]
    pub fn definitions(&self) -> &[DownloadDefinition] {
        &self.definitions
    }

    /// Marker rules keyed by token.
    #[must_use]
    pub fn markers(&self) -> &BTreeMap<String, MarkerRule> {
        &self.markers
    }

    /// Looks up the rule for a marker token.
    #[must_use]
    pub fn marker_rule(&self, token: &str) -> Option<&MarkerRule> {
        self.markers.get(token)
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// True when the catalog has no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Marker rules shipped with the binary.
#[must_use]
pub fn builtin_markers() -> BTreeMap<String, MarkerRule> {
    let mut markers = BTreeMap::new();
    markers.insert(
        GITHUB_LATEST_MARKER.to_string(),
        MarkerRule {
            endpoint: "https://api.github.com/repos/bambulab/BambuStudio/releases/latest"
                .to_string(),
            platform: "mac".to_string(),
            extension: ".dmg".to_string(),
        },
    );
    markers
}

fn is_plain_file_name(name: &str) -> bool {
    let path = std::path::Path::new(name);
    let mut components = path.components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_url_source_classifies_http_urls_as_static() {
        assert_eq!(
            UrlSource::parse("https://example.com/a.dmg"),
            UrlSource::Static("https://example.com/a.dmg".to_string())
        );
        assert_eq!(
            UrlSource::parse("http://example.com/a.dmg"),
            UrlSource::Static("http://example.com/a.dmg".to_string())
        );
    }

    #[test]
    fn test_url_source_treats_non_urls_as_markers() {
        assert_eq!(
            UrlSource::parse("GITHUB_LATEST"),
            UrlSource::Marker("GITHUB_LATEST".to_string())
        );
        // Non-HTTP schemes are not downloadable, so they count as markers.
        assert_eq!(
            UrlSource::parse("ftp://example.com/a.dmg").marker(),
            Some("ftp://example.com/a.dmg")
        );
    }

    #[test]
    fn test_builtin_catalog_shape() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.len(), 6);
        let markers: Vec<_> = catalog
            .definitions()
            .iter()
            .filter_map(|d| d.source.marker())
            .collect();
        assert_eq!(markers, vec![GITHUB_LATEST_MARKER]);
        assert!(catalog.marker_rule(GITHUB_LATEST_MARKER).is_some());
    }

    #[test]
    fn test_builtin_catalog_passes_validation() {
        let builtin = Catalog::builtin();
        let rebuilt = Catalog::new(
            builtin.definitions().to_vec(),
            builtin.markers().clone(),
        )
        .unwrap();
        assert_eq!(rebuilt, builtin);
    }

    #[test]
    fn test_catalog_rejects_duplicate_file_names() {
        let result = Catalog::new(
            vec![
                DownloadDefinition::new("A", "same.dmg", "https://example.com/a"),
                DownloadDefinition::new("B", "same.dmg", "https://example.com/b"),
            ],
            BTreeMap::new(),
        );
        assert!(matches!(
            result,
            Err(CatalogError::DuplicateFileName { file_name }) if file_name == "same.dmg"
        ));
    }

    #[test]
    fn test_catalog_rejects_path_traversal_file_names() {
        for bad in ["../evil.dmg", "sub/dir.dmg", "/abs.dmg", ".."] {
            let result = Catalog::new(
                vec![DownloadDefinition::new("A", bad, "https://example.com/a")],
                BTreeMap::new(),
            );
            assert!(
                matches!(result, Err(CatalogError::InvalidFileName { .. })),
                "expected {bad} to be rejected"
            );
        }
    }

    #[test]
    fn test_catalog_rejects_empty_name() {
        let result = Catalog::new(
            vec![DownloadDefinition::new("  ", "a.dmg", "https://example.com/a")],
            BTreeMap::new(),
        );
        assert_eq!(
            result,
            Err(CatalogError::EmptyField {
                index: 0,
                field: "name"
            })
        );
    }
}

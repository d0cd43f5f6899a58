//! File configuration and catalog loading.
//!
//! The config file is optional TOML. Command-line flags override its values;
//! its values override built-in defaults.
//!
//! ```toml
//! output_dir = "/Users/me/Desktop"
//! concurrency = 5
//!
//! [markers.GITHUB_LATEST]
//! endpoint = "https://api.github.com/repos/bambulab/BambuStudio/releases/latest"
//! platform = "mac"
//! extension = ".dmg"
//!
//! [[downloads]]
//! name = "Bambu Studio"
//! file_name = "BambuStudio.dmg"
//! url = "GITHUB_LATEST"
//! ```

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::catalog::{Catalog, DownloadDefinition, MarkerRule, builtin_markers};
use crate::download::{MAX_CONCURRENCY, MIN_CONCURRENCY};

const APP_DIR: &str = "appfetch";
const CONFIG_FILE: &str = "config.toml";

/// One `[[downloads]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadEntry {
    /// Display name.
    pub name: String,
    /// Destination file name.
    pub file_name: String,
    /// Absolute URL or marker token.
    pub url: String,
}

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default output directory for downloads.
    pub output_dir: Option<PathBuf>,
    /// Default concurrency (same range as CLI).
    pub concurrency: Option<usize>,
    /// Transfer connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Release lookup timeout in seconds.
    pub resolver_timeout_secs: Option<u64>,
    /// Marker rules; merged over the built-in ones.
    #[serde(default)]
    pub markers: BTreeMap<String, MarkerRule>,
    /// Catalog entries; the built-in catalog is used when empty.
    #[serde(default)]
    pub downloads: Vec<DownloadEntry>,
}

impl FileConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error for TOML syntax errors, unknown keys, and values
    /// rejected by [`Self::validate`].
    pub fn parse_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Invalid config syntax")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates config values against runtime and CLI constraints.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency)
        {
            bail!(
                "Invalid config value for `concurrency`: {concurrency}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}"
            );
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("resolver_timeout_secs", self.resolver_timeout_secs)?;

        for (token, rule) in &self.markers {
            validate_marker_rule(token, rule)?;
        }
        Ok(())
    }

    /// Builds the effective catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured downloads do not form a valid catalog.
    pub fn catalog(&self) -> Result<Catalog> {
        let mut markers = builtin_markers();
        markers.extend(
            self.markers
                .iter()
                .map(|(token, rule)| (token.clone(), rule.clone())),
        );

        if self.downloads.is_empty() {
            let builtin = Catalog::builtin();
            return Catalog::new(builtin.definitions().to_vec(), markers)
                .context("Invalid built-in catalog");
        }

        let definitions = self
            .downloads
            .iter()
            .map(|entry| DownloadDefinition::new(&entry.name, &entry.file_name, &entry.url))
            .collect();
        Catalog::new(definitions, markers).context("Invalid `downloads` in config")
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

fn validate_marker_rule(token: &str, rule: &MarkerRule) -> Result<()> {
    if token.trim().is_empty() {
        bail!("Invalid config: marker names must not be empty");
    }
    let endpoint = Url::parse(&rule.endpoint)
        .with_context(|| format!("Invalid `endpoint` for marker `{token}`"))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        bail!(
            "Invalid `endpoint` for marker `{token}`: expected an http(s) URL, got '{}'",
            rule.endpoint
        );
    }
    if rule.platform.trim().is_empty() {
        bail!("Invalid config: `platform` for marker `{token}` must not be empty");
    }
    if rule.extension.trim().is_empty() {
        bail!("Invalid config: `extension` for marker `{token}` must not be empty");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

impl LoadedConfig {
    /// The file config, or defaults when none was loaded.
    #[must_use]
    pub fn file_config(&self) -> FileConfig {
        self.config.clone().unwrap_or_default()
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/appfetch/config.toml`
/// 2. `$HOME/.config/appfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
    )
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg_config_home) = xdg_config_home {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join(CONFIG_FILE));
    }
    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or is invalid.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig::default());
    };

    if !path_ref.exists() {
        debug!(path = %path_ref.display(), "no config file");
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    }

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
        loaded_from_file: true,
    })
}

/// Loads and validates the config file at `path`.
///
/// # Errors
///
/// Returns an error when the file cannot be read or is invalid.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config = FileConfig::parse_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    debug!(path = %path.display(), "config file loaded");
    Ok(config)
}

/// Directory downloads go to when neither flag nor config names one.
///
/// `$HOME/Downloads` when a home directory is known, else `./downloads`.
#[must_use]
pub fn default_output_dir() -> PathBuf {
    env_var_non_empty_os("HOME").map_or_else(
        || PathBuf::from("downloads"),
        |home| PathBuf::from(home).join("Downloads"),
    )
}

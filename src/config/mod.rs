//! Layered configuration for rosterlink.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! # Example config file (rosterlink.toml)
//! ```toml
//! [credential]
//! page_size = 500
//! canonical_domain = "test.com"
//! export_path = "auth_users_export.csv"
//!
//! [document]
//! collection = "officials"
//!
//! [reconcile]
//! detect_ambiguity = true
//! repair_linked_handles = false
//! ```
//!
//! Environment variables use the `ROSTERLINK_` prefix and `__` between
//! section and key, e.g. `ROSTERLINK_RECONCILE__DRY_RUN=true`.

mod defaults;

pub use defaults::*;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    pub credential: CredentialConfig,
    pub document: DocumentConfig,
    pub reconcile: ReconcileConfig,
}

impl RosterConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(RosterConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        figment = figment.merge(Serialized::defaults(overrides));

        let config: RosterConfig = figment.extract().map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.credential.page_size == 0 {
            return Err(ConfigError::new("credential.page_size must be at least 1"));
        }
        if self.credential.canonical_domain.trim_start_matches('@').is_empty() {
            return Err(ConfigError::new("credential.canonical_domain must not be empty"));
        }
        if self.document.collection.is_empty() {
            return Err(ConfigError::new("document.collection must not be empty"));
        }
        Ok(())
    }
}

/// Credential store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Identities requested per listing page
    pub page_size: usize,
    /// Domain used for canonical handles
    pub canonical_domain: String,
    /// CSV export to seed the handle index from instead of a live listing
    pub export_path: Option<PathBuf>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            canonical_domain: DEFAULT_CANONICAL_DOMAIN.to_string(),
            export_path: None,
        }
    }
}

/// Document store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Collection holding roster records
    pub collection: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

/// Reconciliation behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Report other identities that satisfy the same winning rule
    pub detect_ambiguity: bool,
    /// Rewrite handles of already-linked records to the canonical form
    pub repair_linked_handles: bool,
    /// Match and tally without requesting any updates
    pub dry_run: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            detect_ambiguity: true,
            repair_linked_handles: false,
            dry_run: false,
        }
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair_linked_handles: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RosterConfig::default();
        assert_eq!(config.credential.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.credential.canonical_domain, "test.com");
        assert_eq!(config.document.collection, "officials");
        assert!(config.reconcile.detect_ambiguity);
        assert!(!config.reconcile.dry_run);
    }

    #[test]
    fn test_file_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rosterlink.toml");
        std::fs::write(
            &path,
            "[credential]\npage_size = 250\ncanonical_domain = \"league.org\"\n\n[reconcile]\ndry_run = true\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            reconcile: Some(ReconcileOverrides {
                dry_run: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = RosterConfig::load(path.to_str(), overrides).unwrap();
        assert_eq!(config.credential.page_size, 250);
        assert_eq!(config.credential.canonical_domain, "league.org");
        assert!(!config.reconcile.dry_run);
        assert_eq!(config.document.collection, DEFAULT_COLLECTION);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let overrides = ConfigOverrides {
            credential: Some(CredentialOverrides {
                page_size: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = RosterConfig::load(None, overrides).unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }
}

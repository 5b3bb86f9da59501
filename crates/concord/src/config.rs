//! Configuration management for the Concord node.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use zeroize::Zeroizing;

use concord::settings::{AffixSetting, SecureSetting, SettingDeclaration, Settings};
use concord_common::constants::{DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_LISTEN_ADDR};
use concord_common::{NodeRole, PublishedHashes};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// This node's unique ID (auto-generated if not set)
    #[serde(default = "generate_node_id")]
    pub node_id: String,

    /// Whether this node elects itself coordinator at startup
    #[serde(default)]
    pub role: NodeRole,

    /// Interval of the background consistency check
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Plain (non-secret) node settings
    #[serde(default)]
    pub settings: BTreeMap<String, String>,

    /// JSON file mapping secure setting keys to their values
    #[serde(default)]
    pub keystore_path: Option<String>,

    /// Secure settings subject to the consistency check
    #[serde(default)]
    pub declarations: Vec<DeclarationConfig>,

    /// JSON file with already published hashes (for followers)
    #[serde(default)]
    pub published_hashes_path: Option<String>,
}

/// One secure setting declaration, concrete or templated
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DeclarationConfig {
    /// `prefix.<namespace>.suffix`
    Affix {
        prefix: String,
        suffix: String,
        #[serde(default = "default_consistent")]
        consistent: bool,
    },
    /// Fixed key
    Concrete {
        key: String,
        #[serde(default = "default_consistent")]
        consistent: bool,
    },
}

impl From<&DeclarationConfig> for SettingDeclaration {
    fn from(config: &DeclarationConfig) -> Self {
        match config {
            DeclarationConfig::Affix {
                prefix,
                suffix,
                consistent,
            } => AffixSetting::new(prefix.clone(), suffix.clone(), *consistent).into(),
            DeclarationConfig::Concrete { key, consistent } => {
                SecureSetting::new(key.clone(), *consistent).into()
            }
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_check_interval() -> u64 { DEFAULT_CHECK_INTERVAL_SECS }
fn default_consistent() -> bool { true }

fn generate_node_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    format!("node-{:08x}", rng.random::<u32>())
}

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .add_source(config::Environment::with_prefix("CONCORD").separator("__"))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref node_id) = args.node_id {
            config.node_id = node_id.clone();
        }
        if let Some(role) = args.role {
            config.role = role.into();
        }

        Ok(config)
    }

    /// Declarations as configured, consistent or not
    pub fn declarations(&self) -> Vec<SettingDeclaration> {
        self.declarations.iter().map(SettingDeclaration::from).collect()
    }

    /// Node settings: plain values plus the keystore, if configured
    pub fn load_settings(&self) -> Result<Settings> {
        let mut settings = self
            .settings
            .iter()
            .fold(Settings::new(), |s, (k, v)| s.with_value(k.clone(), v.clone()));

        if let Some(ref path) = self.keystore_path {
            let raw = Zeroizing::new(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read keystore {path}"))?,
            );
            let secrets: BTreeMap<String, String> =
                serde_json::from_str(&raw).context("Failed to parse keystore")?;
            for (key, value) in secrets {
                settings.insert_secure(key, value.into_bytes());
            }
            tracing::info!(path = %path, secure = settings.secure_len(), "Keystore loaded");
        }

        Ok(settings)
    }

    /// Published hashes to seed the cluster state with, if configured
    pub fn load_published_hashes(&self) -> Result<Option<PublishedHashes>> {
        let Some(ref path) = self.published_hashes_path else {
            return Ok(None);
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read published hashes {path}"))?;
        let hashes = serde_json::from_str(&raw).context("Failed to parse published hashes")?;
        Ok(Some(hashes))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            node_id: generate_node_id(),
            role: NodeRole::default(),
            check_interval_secs: default_check_interval(),
            settings: BTreeMap::new(),
            keystore_path: None,
            declarations: Vec::new(),
            published_hashes_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declarations_deserialize() {
        let raw = r#"{
            "declarations": [
                { "key": "bootstrap.password" },
                { "prefix": "remote", "suffix": "secure_password" },
                { "key": "ignored.password", "consistent": false }
            ]
        }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        let declarations = config.declarations();

        assert_eq!(config.role, NodeRole::Follower);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(declarations.len(), 3);
        assert_eq!(declarations[0].key(), "bootstrap.password");
        assert_eq!(declarations[1].key(), "remote.*.secure_password");
        assert!(!declarations[2].is_consistent());
    }

    #[test]
    fn test_settings_without_keystore() {
        let mut config = AppConfig::default();
        config.settings.insert("remote.east.url".to_string(), "https://east".to_string());
        let settings = config.load_settings().unwrap();
        assert_eq!(settings.get("remote.east.url"), Some("https://east"));
        assert_eq!(settings.secure_len(), 0);
        assert!(config.load_published_hashes().unwrap().is_none());
    }
}

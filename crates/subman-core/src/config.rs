//! Process configuration.
//!
//! Read once at startup from `$SUBMAN_CONFIG` or `/etc/subman/subman.toml`.
//! Every section and key is optional; a missing file means all defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "SUBMAN_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/subman/subman.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmanConfig {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub certd: CertdConfig,
}

/// Where the entitlement service lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    /// Handler path prepended to every request path.
    pub prefix: String,
    pub scheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".into(),
            port: 8080,
            prefix: "/candlepin".into(),
            scheme: "http".into(),
            timeout_secs: None,
        }
    }
}

impl ServerConfig {
    /// `scheme://hostname:port/prefix` without a trailing slash.
    pub fn base_url(&self) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}://{}:{}", self.scheme, self.hostname, self.port)
        } else {
            format!("{}://{}:{}/{prefix}", self.scheme, self.hostname, self.port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub consumer_dir: PathBuf,
    pub entitlement_dir: PathBuf,
    pub product_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            consumer_dir: PathBuf::from("/etc/pki/consumer"),
            entitlement_dir: PathBuf::from("/etc/pki/entitlement"),
            product_dir: PathBuf::from("/etc/pki/product"),
        }
    }
}

/// Schedule for `subman-certd`, in minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertdConfig {
    pub cert_interval_minutes: u64,
    pub heal_interval_minutes: u64,
    pub retry_minutes: u64,
    pub lock_file: PathBuf,
    pub update_file: PathBuf,
}

impl Default for CertdConfig {
    fn default() -> Self {
        Self {
            cert_interval_minutes: 240,
            heal_interval_minutes: 1440,
            retry_minutes: 10,
            lock_file: PathBuf::from("/var/lock/subsys/subman-certd"),
            update_file: PathBuf::from("/var/run/subman/update"),
        }
    }
}

impl SubmanConfig {
    /// `$SUBMAN_CONFIG` if set, else the system path.
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load config from disk, or return the defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("{}: invalid config", path.display()))
    }

    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_legacy_client() {
        let config = SubmanConfig::default();
        assert_eq!(config.server.base_url(), "http://localhost:8080/candlepin");
        assert_eq!(config.certd.cert_interval_minutes, 240);
        assert_eq!(config.certd.heal_interval_minutes, 1440);
        assert_eq!(config.certd.retry_minutes, 10);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SubmanConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SubmanConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subman.toml");
        std::fs::write(
            &path,
            "[server]\nhostname = \"entitlement.example.com\"\nport = 8443\nscheme = \"https\"\n\n[paths]\nproduct_dir = \"/opt/products\"\n",
        )
        .unwrap();

        let config = SubmanConfig::load(&path).unwrap();
        assert_eq!(
            config.server.base_url(),
            "https://entitlement.example.com:8443/candlepin"
        );
        assert_eq!(config.paths.product_dir, PathBuf::from("/opt/products"));
        assert_eq!(
            config.paths.entitlement_dir,
            PathBuf::from("/etc/pki/entitlement")
        );
        assert_eq!(config.certd, CertdConfig::default());
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subman.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        let err = SubmanConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("invalid config"));
    }

    #[test]
    fn empty_prefix_has_no_trailing_slash() {
        let server = ServerConfig {
            prefix: "/".into(),
            ..ServerConfig::default()
        };
        assert_eq!(server.base_url(), "http://localhost:8080");
    }

    #[test]
    fn roundtrip() {
        let config = SubmanConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: SubmanConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}

// src/config.rs

//! Agent configuration
//!
//! TOML configuration with the following sections:
//! - [server] - Management server URL and consumer certificate paths
//! - [paths] - Repository file and cache locations
//! - [plugins] - Upload plugin toggles
//!
//! A missing file yields the defaults. Each plugin toggle can be
//! force-disabled through an environment variable, which wins over the
//! file.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable disabling package profile uploads.
pub const DISABLE_PACKAGE_PROFILE_VAR: &str = "DISABLE_KATELLO_PACKAGE_PROFILE";

/// Environment variable disabling enabled-repos uploads.
pub const DISABLE_ENABLED_REPOS_VAR: &str = "DISABLE_KATELLO_ENABLED_REPOS";

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/katello/agent.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub plugins: PluginsSection,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            paths: PathsSection::default(),
            plugins: PluginsSection::default(),
        }
    }
}

/// Management server connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Base URL of the subscription/content management API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Consumer identity certificate
    #[serde(default = "default_consumer_cert")]
    pub consumer_cert: PathBuf,

    /// Consumer identity private key
    #[serde(default = "default_consumer_key")]
    pub consumer_key: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            consumer_cert: default_consumer_cert(),
            consumer_key: default_consumer_key(),
        }
    }
}

/// Host filesystem locations
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Subscription-managed yum/dnf repository file
    #[serde(default = "default_repo_file")]
    pub repo_file: PathBuf,

    /// Directory for upload deduplication caches
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            repo_file: default_repo_file(),
            cache_dir: default_cache_dir(),
        }
    }
}

/// Upload plugin toggles
#[derive(Debug, Clone, Deserialize)]
pub struct PluginsSection {
    #[serde(default = "default_true")]
    pub package_profile: bool,

    #[serde(default = "default_true")]
    pub enabled_repos: bool,
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            package_profile: true,
            enabled_repos: true,
        }
    }
}

fn default_base_url() -> String {
    "https://localhost:8443/rhsm".to_string()
}

fn default_consumer_cert() -> PathBuf {
    PathBuf::from("/etc/pki/consumer/cert.pem")
}

fn default_consumer_key() -> PathBuf {
    PathBuf::from("/etc/pki/consumer/key.pem")
}

fn default_repo_file() -> PathBuf {
    PathBuf::from("/etc/yum.repos.d/redhat.repo")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/katello-agent")
}

fn default_true() -> bool {
    true
}

impl AgentConfig {
    /// Load configuration from a TOML file. A missing file is not an
    /// error; it yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Whether package profile uploads should run. `force` bypasses the
    /// plugin toggle but not a broken configuration.
    pub fn package_profile_enabled(&self, force: bool) -> bool {
        if std::env::var_os(DISABLE_PACKAGE_PROFILE_VAR).is_some() {
            return false;
        }
        force || self.plugins.package_profile
    }

    /// Whether enabled-repos uploads should run.
    pub fn enabled_repos_enabled(&self, force: bool) -> bool {
        if std::env::var_os(DISABLE_ENABLED_REPOS_VAR).is_some() {
            return false;
        }
        force || self.plugins.enabled_repos
    }
}

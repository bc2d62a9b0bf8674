//! Configuration system for capdisco.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CAPDISCO_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/capdisco/config.toml
//!   3. ~/.config/capdisco/config.toml

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapdiscoConfig {
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the datagram socket binds to.
    pub bind_addr: IpAddr,
    /// UDP port for announcements, queries and responses.
    pub port: u16,
    /// Peers our own fingerprint is announced to.
    pub announce_to: Vec<SocketAddr>,
    /// Seconds between announcements. 0 = announce once at startup.
    pub announce_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Give up on (or retry) a query after this many seconds. 0 = wait forever.
    pub query_timeout_secs: u64,
    /// Resends allowed per query after the first attempt.
    pub max_retries: u32,
    /// Treat a remote error like a timeout and resend.
    pub retry_on_remote_error: bool,
    /// How often stale queries are checked.
    pub expiry_interval_ms: u64,
    /// How often diagnostics counters are logged. 0 = never.
    pub stats_interval_secs: u64,
}

/// What this daemon answers when a peer queries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub node: String,
    pub ver: String,
    pub client_name: String,
    pub features: Vec<String>,
    /// Legacy extension name → its features. Announced alongside the
    /// fingerprint and answered at `node#ver#ext`.
    pub extensions: BTreeMap<String, Vec<String>>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from([0u16; 8]),
            port: 15222,
            announce_to: Vec::new(),
            announce_interval_secs: 30,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: 0,
            max_retries: 0,
            retry_on_remote_error: false,
            expiry_interval_ms: 1000,
            stats_interval_secs: 30,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            node: "https://capdisco.invalid/caps".to_string(),
            ver: "1".to_string(),
            client_name: "capdiscod".to_string(),
            features: vec![
                "http://jabber.org/protocol/caps".to_string(),
                "http://jabber.org/protocol/disco#info".to_string(),
                "jabber:iq:version".to_string(),
                "urn:xmpp:ping".to_string(),
            ],
            extensions: BTreeMap::new(),
        }
    }
}

impl NetworkConfig {
    pub fn announce_interval(&self) -> Option<Duration> {
        (self.announce_interval_secs > 0).then(|| Duration::from_secs(self.announce_interval_secs))
    }
}

impl DiscoveryConfig {
    /// None when queries never time out.
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }

    pub fn expiry_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_interval_ms.max(1))
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("capdisco")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CapdiscoConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::file_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a config file, or defaults if it doesn't exist.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CAPDISCO_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    fn write_default_to(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text =
            toml::to_string_pretty(&Self::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply CAPDISCO_* overrides. `lookup` is `std::env::var` outside tests.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CAPDISCO_NETWORK__BIND_ADDR") {
            if let Ok(addr) = v.parse() {
                self.network.bind_addr = addr;
            }
        }
        if let Some(v) = lookup("CAPDISCO_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Some(v) = lookup("CAPDISCO_DISCOVERY__QUERY_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.discovery.query_timeout_secs = secs;
            }
        }
        if let Some(v) = lookup("CAPDISCO_DISCOVERY__MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                self.discovery.max_retries = n;
            }
        }
        if let Some(v) = lookup("CAPDISCO_DISCOVERY__RETRY_ON_REMOTE_ERROR") {
            self.discovery.retry_on_remote_error = v == "true" || v == "1";
        }
    }
}

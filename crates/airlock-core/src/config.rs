//! Configuration system for Airlock.
//!
//! Resolution order: CLI flags (daemon) → environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $AIRLOCK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/airlock/config.toml
//!   3. ~/.config/airlock/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{DEFAULT_PORT, HEARTBEAT_INTERVAL_SECS, IDLE_THRESHOLD_SECS};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AirlockConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub liveness: LivenessConfig,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Name shown next to our chat lines. May be empty.
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host to bind the listen socket on.
    pub host: String,
    /// UDP listen port.
    pub port: u16,
    /// Peer to join through at startup, as `host:port`. None = start a new circle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Seconds between heartbeat rounds.
    pub heartbeat_interval_secs: u64,
    /// Peers silent for longer than this are skipped by the broadcaster.
    pub idle_threshold_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Seconds to wait for the bootstrap's reply. 0 = wait forever.
    pub timeout_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            bootstrap: None,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
            idle_threshold_secs: IDLE_THRESHOLD_SECS,
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl AirlockConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        // tokio's interval panics on a zero period.
        Duration::from_secs(self.liveness.heartbeat_interval_secs.max(1))
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.liveness.idle_threshold_secs)
    }

    pub fn discovery_timeout(&self) -> Option<Duration> {
        match self.discovery.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("airlock")
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

impl AirlockConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            AirlockConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("AIRLOCK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&AirlockConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply AIRLOCK_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparsable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("AIRLOCK_IDENTITY__DISPLAY_NAME") {
            self.identity.display_name = v;
        }
        if let Some(v) = lookup("AIRLOCK_NETWORK__HOST") {
            self.network.host = v;
        }
        if let Some(p) = lookup("AIRLOCK_NETWORK__PORT").and_then(|v| v.parse().ok()) {
            self.network.port = p;
        }
        if let Some(v) = lookup("AIRLOCK_NETWORK__BOOTSTRAP") {
            self.network.bootstrap = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(s) =
            lookup("AIRLOCK_LIVENESS__HEARTBEAT_INTERVAL_SECS").and_then(|v| v.parse().ok())
        {
            self.liveness.heartbeat_interval_secs = s;
        }
        if let Some(s) = lookup("AIRLOCK_LIVENESS__IDLE_THRESHOLD_SECS").and_then(|v| v.parse().ok())
        {
            self.liveness.idle_threshold_secs = s;
        }
        if let Some(s) = lookup("AIRLOCK_DISCOVERY__TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.discovery.timeout_secs = s;
        }
    }
}

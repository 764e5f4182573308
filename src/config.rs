// src/config.rs
//! Runtime configuration: which sources run, their page ceilings and
//! timeouts, the cache TTL, and whether external geocoding is allowed.
//! Loaded from TOML with an env path override; a missing or malformed
//! file logs a warning and falls back to defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cache::DEFAULT_TTL;

pub const ENV_CONFIG_PATH: &str = "EVENTS_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/sources.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache_ttl_secs: u64,
    pub geocoding_enabled: bool,
    pub russia_running: SourceConfig,
    pub probeg: SourceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            geocoding_enabled: true,
            russia_running: SourceConfig::default(),
            probeg: SourceConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    /// `None` means the source's built-in production URL.
    pub base_url: Option<String>,
    pub max_pages: u32,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            max_pages: 10,
            timeout_secs: 10,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn load_from(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    toml::from_str(&content).context("parsing config toml")
}

/// Load config from `$EVENTS_CONFIG_PATH`, falling back to
/// `config/sources.toml`, falling back to built-in defaults.
pub fn load_default() -> AppConfig {
    let path = std::env::var(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    match load_from(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(
                error = ?e,
                path = %path.display(),
                "config unavailable; using defaults"
            );
            AppConfig::default()
        }
    }
}

//! Configuration Loader
//!
//! Loads and merges gateway configuration from multiple sources.

use crate::config::profile::GatewayConfig;
use crate::error::{GatewayError, Result};
use std::path::{Path, PathBuf};

/// Configuration loader with support for multiple sources
#[derive(Debug)]
pub struct ConfigLoader {
    config: GatewayConfig,
}

impl ConfigLoader {
    /// Create a new config loader and load from default locations
    pub fn new() -> Result<Self> {
        let mut loader = Self {
            config: Self::builtin_defaults()?,
        };

        loader.load_from_default_paths()?;
        loader.config.apply_env_overrides();

        Ok(loader)
    }

    /// Create a loader with a specific config file layered over the builtins
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self {
            config: Self::builtin_defaults()?,
        };

        loader.load_from_file(path)?;
        loader.config.apply_env_overrides();

        Ok(loader)
    }

    /// Parse the builtin provider catalog
    fn builtin_defaults() -> Result<GatewayConfig> {
        let defaults = include_str!("../../providers.json");
        serde_json::from_str(defaults).map_err(|e| {
            GatewayError::Config(format!("Failed to parse built-in providers.json: {}", e))
        })
    }

    /// Load configuration from default paths
    fn load_from_default_paths(&mut self) -> Result<()> {
        for path in Self::get_config_paths() {
            if path.exists() {
                self.load_from_file(&path)?;
            }
        }

        Ok(())
    }

    /// Get list of config paths to check
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. Environment variable
        if let Ok(custom_path) = std::env::var("LLMGATE_CONFIG_PATH") {
            paths.push(PathBuf::from(custom_path));
        }

        // 2. Current directory
        paths.push(PathBuf::from("llmgate.json"));

        // 3. User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("llmgate").join("llmgate.json"));
        }

        // 4. Home directory
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".llmgate").join("llmgate.json"));
        }

        paths
    }

    /// Load configuration from a specific file
    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let other: GatewayConfig = serde_json::from_str(&content).map_err(|e| {
            GatewayError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        self.merge_config(other);
        Ok(())
    }

    /// Merge another config into this one (later configs override earlier)
    fn merge_config(&mut self, other: GatewayConfig) {
        for (name, profile) in other.providers {
            self.config.providers.insert(name, profile);
        }

        self.config.default_provider = other.default_provider;
        if !other.fallback_chain.is_empty() {
            self.config.fallback_chain = other.fallback_chain;
        }
        self.config.breaker = other.breaker;
        self.config.cooldown = other.cooldown;
        self.config.council = other.council;
        self.config.request_timeout_secs = other.request_timeout_secs;
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Take ownership of the configuration
    pub fn into_config(self) -> GatewayConfig {
        self.config
    }
}

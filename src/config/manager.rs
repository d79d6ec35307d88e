//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest graceful shutdown we accept
const MAX_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(300);

/// Largest per-connection outbound queue we accept
const MAX_OUTBOUND_QUEUE_CAPACITY: usize = 65_536;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with environment variables layered under the file.
    ///
    /// Keys the file sets win over `SIGNAL_RELAY_*` variables, which win
    /// over the built-in defaults. A missing file leaves the environment
    /// and defaults in effect.
    pub fn load(path: &Path) -> Result<Config> {
        Self::load_layered(path, |key| std::env::var(key).ok())
    }

    /// Load configuration from file over the built-in defaults
    pub fn load_from_file(path: &Path) -> Result<Config> {
        Self::load_layered(path, |_| None)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        Self::load_from_vars(|key| std::env::var(key).ok())
    }

    /// Apply `SIGNAL_RELAY_*` overrides read through `var` on top of the defaults
    pub fn load_from_vars<F>(var: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::apply_vars(Config::default(), var)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer the file at `path` over the variables read through `var`
    pub fn load_layered<F>(path: &Path, var: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = Self::apply_vars(Config::default(), var)?;

        if !path.exists() {
            tracing::info!("Configuration file not found at {}, using environment and defaults", path.display());
            base.validate()?;
            return Ok(base);
        }

        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::overlay(base, &content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()
            .with_context(|| "Configuration validation failed")?;

        tracing::info!("Configuration loaded and validated successfully");
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Config> {
        Self::overlay(Config::default(), content)
    }

    /// Replace the values in `base` with every key `content` sets
    fn overlay(base: Config, content: &str) -> Result<Config> {
        let mut merged = toml::Value::try_from(&base)
            .context("Failed to serialize base configuration")?;
        let file: toml::Table = toml::from_str(content)?;

        merge_values(&mut merged, toml::Value::Table(file));
        Ok(merged.try_into()?)
    }

    fn apply_vars<F>(mut config: Config, var: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind_addr) = var("SIGNAL_RELAY_BIND_ADDR") {
            config.server.bind_addr = bind_addr.parse::<SocketAddr>()
                .with_context(|| format!("Invalid SIGNAL_RELAY_BIND_ADDR: {}", bind_addr))?;
        }

        if let Some(index_page) = var("SIGNAL_RELAY_INDEX_PAGE") {
            config.server.index_page = Some(PathBuf::from(index_page));
        }

        if let Some(timeout) = var("SIGNAL_RELAY_SHUTDOWN_TIMEOUT") {
            config.server.shutdown_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid SIGNAL_RELAY_SHUTDOWN_TIMEOUT: {}", timeout))?;
        }

        if let Some(capacity) = var("SIGNAL_RELAY_OUTBOUND_QUEUE_CAPACITY") {
            config.server.outbound_queue_capacity = capacity.parse::<usize>()
                .with_context(|| format!("Invalid SIGNAL_RELAY_OUTBOUND_QUEUE_CAPACITY: {}", capacity))?;
        }

        if let Some(log_level) = var("SIGNAL_RELAY_LOG_LEVEL") {
            config.monitoring.log_level = log_level;
        }

        if let Some(metrics_enabled) = var("SIGNAL_RELAY_METRICS_ENABLED") {
            config.monitoring.metrics_enabled = metrics_enabled.parse::<bool>()
                .with_context(|| format!("Invalid SIGNAL_RELAY_METRICS_ENABLED: {}", metrics_enabled))?;
        }

        Ok(config)
    }
}

/// Recursively merge tables; any other value in `overlay` replaces `base`
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    /// Validate server configuration
    fn validate_server_config(&self) -> Result<()> {
        if self.server.shutdown_timeout.is_zero() {
            bail!("shutdown_timeout must be greater than 0");
        }

        if self.server.shutdown_timeout > MAX_SHUTDOWN_TIMEOUT {
            bail!("shutdown_timeout cannot exceed 5 minutes");
        }

        if self.server.outbound_queue_capacity == 0 {
            bail!("outbound_queue_capacity must be greater than 0");
        }

        if self.server.outbound_queue_capacity > MAX_OUTBOUND_QUEUE_CAPACITY {
            bail!("outbound_queue_capacity cannot exceed {}", MAX_OUTBOUND_QUEUE_CAPACITY);
        }

        if let Some(page) = &self.server.index_page {
            if !page.is_file() {
                bail!("index_page {} does not exist", page.display());
            }
        }

        Ok(())
    }

    /// Validate monitoring configuration
    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        log_level: Option<&str>,
        no_metrics: bool,
    ) {
        if let Some(bind_str) = bind {
            if let Ok(addr) = bind_str.parse::<SocketAddr>() {
                self.server.bind_addr = addr;
                tracing::info!("CLI override: bind address set to {}", addr);
            } else {
                tracing::warn!("Invalid bind address provided: {}", bind_str);
            }
        }

        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(level) = log_level {
            self.monitoring.log_level = level.to_string();
        }

        if no_metrics {
            self.monitoring.metrics_enabled = false;
            tracing::info!("CLI override: metrics endpoint disabled");
        }
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::permissions::{PermissionPolicy, KNOWN_CAPABILITIES};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite database
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    /// User or group name -> granted capabilities
    #[serde(default = "PermissionPolicy::default_grants")]
    pub permissions: HashMap<String, Vec<String>>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_database() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("ticketrel").join("relations.db"))
        .unwrap_or_else(|| PathBuf::from("relations.db"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            log_level: default_log_level(),
            server: ServerConfig::default(),
            permissions: PermissionPolicy::default_grants(),
        }
    }
}

impl Config {
    /// Loads configuration.
    ///
    /// An explicit path must exist. Otherwise `TICKETREL_CONFIG` or the
    /// default location is read if present, and built-in defaults are used
    /// when it is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => (get_config_path()?, false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Parses and validates YAML configuration
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be greater than 0");
        }

        let level = self.log_level.to_lowercase();
        if !["error", "warn", "info", "debug", "trace", "off"].contains(&level.as_str()) {
            anyhow::bail!("Invalid log_level: {}", self.log_level);
        }

        for (subject, caps) in &self.permissions {
            for cap in caps {
                if !KNOWN_CAPABILITIES.contains(&cap.as_str()) {
                    anyhow::bail!("Unknown capability '{}' granted to '{}'", cap, subject);
                }
            }
        }
        Ok(())
    }

    pub fn permission_policy(&self) -> PermissionPolicy {
        PermissionPolicy::new(&self.permissions)
    }

    /// Writes the configuration as YAML, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;
        Ok(())
    }
}

/// Gets the path to the configuration file
pub fn get_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("TICKETREL_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    let config_dir = dirs::config_dir().context("Failed to determine config directory")?;
    Ok(config_dir.join("ticketrel").join("config.yaml"))
}

//! agentrun configuration management
//! Handles loading and saving the config file

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::provider::ProviderRegistry;
use crate::session::SessionLimits;
use crate::stream::{DecoderOptions, DetectionWindow, DEFAULT_MAX_FRAME_BYTES};

/// agentrun configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Session timing and decoder bounds
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Per-provider adjustments, keyed by provider id
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderOverride>,
}

/// Session limits as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_activity_grace_secs")]
    pub activity_grace_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
    #[serde(default = "default_monitor_startup_grace_secs")]
    pub monitor_startup_grace_secs: u64,
    #[serde(default = "default_detection_lines")]
    pub detection_lines: usize,
    #[serde(default = "default_detection_bytes")]
    pub detection_bytes: usize,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_timeout_secs() -> u64 {
    30 * 60
}

fn default_activity_grace_secs() -> u64 {
    5 * 60
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_kill_grace_secs() -> u64 {
    10
}

fn default_monitor_startup_grace_secs() -> u64 {
    30
}

fn default_detection_lines() -> usize {
    DetectionWindow::default().max_lines
}

fn default_detection_bytes() -> usize {
    DetectionWindow::default().max_bytes
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            activity_grace_secs: default_activity_grace_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            kill_grace_secs: default_kill_grace_secs(),
            monitor_startup_grace_secs: default_monitor_startup_grace_secs(),
            detection_lines: default_detection_lines(),
            detection_bytes: default_detection_bytes(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl LimitsConfig {
    pub fn to_limits(&self) -> SessionLimits {
        SessionLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            activity_grace: Duration::from_secs(self.activity_grace_secs),
            // A zero interval would spin the supervisor loop
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(10)),
            kill_grace: Duration::from_secs(self.kill_grace_secs),
            monitor_startup_grace: Duration::from_secs(self.monitor_startup_grace_secs),
            decoder: DecoderOptions {
                window: DetectionWindow {
                    max_lines: self.detection_lines.max(1),
                    max_bytes: self.detection_bytes.max(1),
                },
                max_frame_bytes: self.max_frame_bytes.max(1),
            },
        }
    }
}

/// Where a provider keeps its side-channel state on this machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched_files: Option<Vec<String>>,
}

impl Config {
    /// Load config from the given path, `$AGENTRUN_CONFIG`, or the default location
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = Self::config_path(path)?;

        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Config::default();
            config.save(path)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&raw).context("Failed to parse config file")?;

        debug!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Save config to the resolved location
    pub fn save(&self, path: Option<&str>) -> Result<()> {
        let config_path = Self::config_path(path)?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(&self)?;
        fs::write(&config_path, content).context("Failed to write config file")?;

        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the config file path
    fn config_path(path: Option<&str>) -> Result<PathBuf> {
        if let Some(p) = path {
            return Ok(PathBuf::from(p));
        }

        if let Ok(env_path) = std::env::var("AGENTRUN_CONFIG") {
            return Ok(PathBuf::from(env_path));
        }

        let home = dirs::home_dir().context("Cannot find home directory")?;
        Ok(home.join(".agentrun").join("config.yml"))
    }

    /// Apply the provider overrides to a registry
    pub fn apply_overrides(&self, registry: &mut ProviderRegistry) -> Result<()> {
        for (id, over) in &self.providers {
            registry
                .override_activity(id, over.state_dir.clone(), over.watched_files.clone())
                .with_context(|| format!("Invalid override for provider {id}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yml");
        let path_str = path.to_string_lossy().to_string();

        let config = Config::load(Some(&path_str)).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load(Some(&path_str)).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            "limits:\n  activity_grace_secs: 90\nproviders:\n  claude:\n    state_dir: /srv/claude\n",
        )
        .unwrap();

        let config = Config::load(Some(&path.to_string_lossy())).unwrap();
        assert_eq!(config.limits.activity_grace_secs, 90);
        assert_eq!(config.limits.timeout_secs, 1800);
        assert_eq!(
            config.providers["claude"].state_dir,
            Some(PathBuf::from("/srv/claude"))
        );

        let limits = config.limits.to_limits();
        assert_eq!(limits.activity_grace, Duration::from_secs(90));
        assert_eq!(limits.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn overrides_apply_to_registry() {
        let mut config = Config::default();
        config.providers.insert(
            "aider".to_string(),
            ProviderOverride {
                state_dir: None,
                watched_files: Some(vec!["notes.md".to_string()]),
            },
        );
        let mut registry = ProviderRegistry::with_builtins().unwrap();
        config.apply_overrides(&mut registry).unwrap();
        assert_eq!(registry.get("aider").unwrap().watched_files, vec!["notes.md"]);

        config
            .providers
            .insert("nobody".to_string(), ProviderOverride::default());
        assert!(config.apply_overrides(&mut registry).is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "limits: [not, a, map]\n").unwrap();
        let err = Config::load(Some(&path.to_string_lossy())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::task::Capability;
use crate::orchestration::SchedulerConfig;
use crate::service::RetryPolicy;
use crate::{flog_debug, Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    pub log_file: Option<String>,
    pub task_timeout_secs: Option<u64>,
    /// Number of agents per role.
    #[serde(default)]
    pub agents: HashMap<Capability, usize>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Config {
    pub fn foreman_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".foreman"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::foreman_dir()?.join("foreman.toml"))
    }

    /// Resolved log file path, expanding a leading `~/`.
    pub fn log_path(&self) -> Result<PathBuf> {
        match &self.log_file {
            Some(path) => Ok(expand_tilde(path)),
            None => Ok(Self::foreman_dir()?.join("foreman.log")),
        }
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            task_timeout: self.task_timeout(),
        }
    }

    /// Load `~/.foreman/foreman.toml`, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        flog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            flog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        flog_debug!(
            "Config loaded: agents={:?}, task_timeout_secs={:?}, fallback_attempts={}",
            config.agents,
            config.task_timeout_secs,
            config.retry.fallback_attempts
        );
        Ok(config)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

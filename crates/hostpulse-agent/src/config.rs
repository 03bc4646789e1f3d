use crate::error::AgentError;
use crate::scheduler::PostSettings;
use anyhow::Context;
use hostpulse_checks::{CheckConfig, Checker, CommandChecker};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_apibase")]
    pub apibase: String,
    #[serde(default)]
    pub apikey: String,
    /// Directory holding the persisted host id.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    pub display_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Log every request to the monitoring service at debug level.
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
    #[serde(default = "default_post_metrics_interval")]
    pub post_metrics_interval_secs: u64,
    #[serde(default = "default_host_spec_interval")]
    pub host_spec_interval_secs: u64,
    #[serde(default = "default_check_report_interval")]
    pub check_report_interval_secs: u64,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub host_status: HostStatusConfig,
    #[serde(default)]
    pub filesystems: FilesystemsConfig,
    #[serde(default)]
    pub checks: BTreeMap<String, CheckConfig>,
}

/// Post queue tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_buffer_size")]
    pub post_metrics_buffer_size: usize,
    #[serde(default = "default_dequeue_delay")]
    pub post_metrics_dequeue_delay_seconds: u64,
    #[serde(default = "default_retry_delay")]
    pub post_metrics_retry_delay_seconds: u64,
    #[serde(default = "default_retry_max")]
    pub post_metrics_retry_max: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            post_metrics_buffer_size: default_buffer_size(),
            post_metrics_dequeue_delay_seconds: default_dequeue_delay(),
            post_metrics_retry_delay_seconds: default_retry_delay(),
            post_metrics_retry_max: default_retry_max(),
        }
    }
}

/// Host status applied when the agent starts and after it stopped cleanly.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostStatusConfig {
    pub on_start: Option<String>,
    pub on_stop: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesystemsConfig {
    /// Devices matching this regex are not reported.
    pub ignore: Option<String>,
}

fn default_apibase() -> String {
    "https://api.mackerelio.com".to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from("/var/lib/hostpulse")
}

fn default_metrics_interval() -> u64 {
    60
}

fn default_post_metrics_interval() -> u64 {
    60
}

fn default_host_spec_interval() -> u64 {
    3600
}

fn default_check_report_interval() -> u64 {
    60
}

fn default_buffer_size() -> usize {
    360
}

fn default_dequeue_delay() -> u64 {
    30
}

fn default_retry_delay() -> u64 {
    60
}

fn default_retry_max() -> u32 {
    60
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        Self::from_toml(&content).with_context(|| format!("invalid config file {path}"))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.apikey.trim().is_empty() {
            return Err(AgentError::Config("apikey is empty".to_string()));
        }
        let intervals = [
            ("metrics_interval_secs", self.metrics_interval_secs),
            ("post_metrics_interval_secs", self.post_metrics_interval_secs),
            ("host_spec_interval_secs", self.host_spec_interval_secs),
            ("check_report_interval_secs", self.check_report_interval_secs),
        ];
        for (key, value) in intervals {
            if value == 0 {
                return Err(AgentError::Config(format!("{key} must be greater than 0")));
            }
        }
        if self.connection.post_metrics_buffer_size == 0 {
            return Err(AgentError::Config(
                "connection.post_metrics_buffer_size must be greater than 0".to_string(),
            ));
        }
        for (name, check) in &self.checks {
            if check.command.trim().is_empty() {
                return Err(AgentError::Config(format!("checks.{name}.command is empty")));
            }
            if check.check_interval_secs == 0 {
                return Err(AgentError::Config(format!(
                    "checks.{name}.check_interval_secs must be greater than 0"
                )));
            }
        }
        self.filesystem_ignore()?;
        Ok(())
    }

    pub fn host_id_path(&self) -> PathBuf {
        self.root.join("id")
    }

    pub fn post_settings(&self) -> PostSettings {
        PostSettings {
            dequeue_delay: Duration::from_secs(self.connection.post_metrics_dequeue_delay_seconds),
            retry_delay: Duration::from_secs(self.connection.post_metrics_retry_delay_seconds),
            retry_max: self.connection.post_metrics_retry_max,
            post_interval: Duration::from_secs(self.post_metrics_interval_secs),
        }
    }

    pub fn filesystem_ignore(&self) -> Result<Option<Regex>, AgentError> {
        self.filesystems
            .ignore
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| AgentError::Config(format!("filesystems.ignore is not a valid regex: {e}")))
    }

    pub fn check_names(&self) -> Vec<String> {
        self.checks.keys().cloned().collect()
    }

    pub fn checkers(&self) -> Vec<Arc<dyn Checker>> {
        self.checks
            .iter()
            .map(|(name, check)| Arc::new(CommandChecker::new(name, check)) as Arc<dyn Checker>)
            .collect()
    }
}

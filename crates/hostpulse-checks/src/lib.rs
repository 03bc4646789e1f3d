//! Health checks run periodically by the agent.
//!
//! A [`Checker`] produces one [`CheckReport`] per invocation. The agent runs
//! every configured checker on its own interval and decides which reports
//! are worth forwarding; checkers themselves are stateless.

pub mod command;

use anyhow::Result;
use async_trait::async_trait;
use hostpulse_common::types::CheckReport;
use serde::Deserialize;
use std::time::Duration;

pub use command::CommandChecker;

/// A health check that runs on the agent host.
#[async_trait]
pub trait Checker: Send + Sync {
    /// The check name as registered with the monitoring service (e.g., `"disk"`).
    fn name(&self) -> &str;

    /// How often the check runs.
    fn interval(&self) -> Duration;

    /// Executes the check once.
    ///
    /// # Errors
    ///
    /// Returns an error when the check could not be executed at all. A check
    /// that ran and found a problem reports it through the returned status.
    async fn check(&self) -> Result<CheckReport>;
}

/// Settings of one `[checks.<name>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    pub command: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_check_timeout")]
    pub timeout_secs: u64,
}

fn default_check_interval() -> u64 {
    60
}

fn default_check_timeout() -> u64 {
    30
}

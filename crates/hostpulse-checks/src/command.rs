use crate::{CheckConfig, Checker};
use anyhow::{Context, Result};
use async_trait::async_trait;
use hostpulse_common::types::{CheckReport, CheckStatus};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Longest message forwarded for a single report.
const MAX_MESSAGE_CHARS: usize = 1024;

/// Runs a shell command and maps its exit code to a check status, following
/// the usual plugin convention: 0 OK, 1 WARNING, 2 CRITICAL, anything else
/// UNKNOWN. The combined stdout/stderr output becomes the report message.
pub struct CommandChecker {
    name: String,
    command: String,
    interval: Duration,
    timeout: Duration,
}

impl CommandChecker {
    pub fn new(name: &str, config: &CheckConfig) -> Self {
        Self {
            name: name.to_string(),
            command: config.command.clone(),
            interval: Duration::from_secs(config.check_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn shell_command(&self) -> Command {
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        };
        #[cfg(not(windows))]
        let mut cmd = {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            cmd
        };
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }
}

pub fn status_from_exit_code(code: Option<i32>) -> CheckStatus {
    match code {
        Some(0) => CheckStatus::Ok,
        Some(1) => CheckStatus::Warning,
        Some(2) => CheckStatus::Critical,
        _ => CheckStatus::Unknown,
    }
}

fn truncate_message(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((end, _)) => format!("{}...", &trimmed[..end]),
        None => trimmed.to_string(),
    }
}

#[async_trait]
impl Checker for CommandChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn check(&self) -> Result<CheckReport> {
        let output = self.shell_command().output();
        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(result) => result.with_context(|| format!("failed to run check command {:?}", self.command))?,
            Err(_) => {
                tracing::warn!(check = %self.name, timeout = ?self.timeout, "Check command timed out");
                return Ok(CheckReport::new(
                    &self.name,
                    CheckStatus::Unknown,
                    format!("command timed out after {}s", self.timeout.as_secs()),
                ));
            }
        };

        let mut message = String::from_utf8_lossy(&output.stdout).into_owned();
        message.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CheckReport::new(
            &self.name,
            status_from_exit_code(output.status.code()),
            truncate_message(&message),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(command: &str) -> CommandChecker {
        CommandChecker::new(
            "test",
            &CheckConfig {
                command: command.to_string(),
                check_interval_secs: 60,
                timeout_secs: 5,
            },
        )
    }

    #[test]
    fn maps_exit_codes_to_statuses() {
        assert_eq!(status_from_exit_code(Some(0)), CheckStatus::Ok);
        assert_eq!(status_from_exit_code(Some(1)), CheckStatus::Warning);
        assert_eq!(status_from_exit_code(Some(2)), CheckStatus::Critical);
        assert_eq!(status_from_exit_code(Some(3)), CheckStatus::Unknown);
        assert_eq!(status_from_exit_code(None), CheckStatus::Unknown);
    }

    #[test]
    fn long_messages_are_truncated() {
        let long = "x".repeat(MAX_MESSAGE_CHARS + 10);
        let msg = truncate_message(&long);
        assert_eq!(msg.len(), MAX_MESSAGE_CHARS + 3);
        assert!(msg.ends_with("..."));
        assert_eq!(truncate_message("  fine \n"), "fine");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_command_output_and_status() {
        let report = checker("echo 'low space'; exit 1").check().await.unwrap();
        assert_eq!(report.name, "test");
        assert_eq!(report.status, CheckStatus::Warning);
        assert_eq!(report.message, "low space");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_command_reports_unknown() {
        let report = checker("sleep 5")
            .with_timeout(Duration::from_millis(100))
            .check()
            .await
            .unwrap();
        assert_eq!(report.status, CheckStatus::Unknown);
        assert!(report.message.contains("timed out"));
    }
}

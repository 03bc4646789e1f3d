/// Errors that stop the agent or one of its startup steps.
///
/// # Examples
///
/// ```rust
/// use hostpulse_agent::error::AgentError;
///
/// let err = AgentError::Config("apikey is empty".to_string());
/// assert!(err.to_string().contains("apikey"));
/// assert!(AgentError::ForcedTermination.is_forced_termination());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The configuration file is missing a required value or holds an invalid one.
    #[error("Agent: invalid configuration: {0}")]
    Config(String),

    /// The host could not be resolved or registered with the monitoring service.
    #[error("Agent: host registration failed: {0}")]
    Registration(String),

    /// Reading or writing the persisted host id failed.
    #[error("Agent: host id storage error: {0}")]
    HostIdStore(#[from] std::io::Error),

    /// A termination signal arrived while the post queue was already draining.
    #[error("Agent: received terminate instruction again while draining, forcing exit")]
    ForcedTermination,
}

impl AgentError {
    pub fn is_forced_termination(&self) -> bool {
        matches!(self, AgentError::ForcedTermination)
    }
}

/// Convenience `Result` alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors returned by the monitoring service client.
///
/// Callers decide whether to retry with [`ApiError::is_client_error`]: a
/// client error (bad API key, validation failure, unknown host) will not go
/// away by asking again, while transport and server failures might.
///
/// # Examples
///
/// ```rust
/// use hostpulse_api::error::ApiError;
///
/// let err = ApiError::Client { status: 403, message: "invalid api key".to_string() };
/// assert!(err.is_client_error());
/// assert!(!err.is_transient());
///
/// let err = ApiError::Server { status: 503, message: "maintenance".to_string() };
/// assert!(err.is_transient());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The service rejected the request (4xx other than 404).
    #[error("API client error: status={status}, message={message}")]
    Client { status: u16, message: String },

    /// The requested resource does not exist (404).
    #[error("API: not found: {0}")]
    NotFound(String),

    /// The service failed to handle the request (5xx or unexpected status).
    #[error("API server error: status={status}, message={message}")]
    Server { status: u16, message: String },

    /// The request never produced a response.
    #[error("API transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("API JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Builds the error matching a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => ApiError::NotFound(message),
            400..=499 => ApiError::Client { status, message },
            _ => ApiError::Server { status, message },
        }
    }

    /// True for every 4xx response, `NotFound` included.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ApiError::Client { .. } | ApiError::NotFound(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    pub fn is_transient(&self) -> bool {
        !self.is_client_error()
    }
}

/// Convenience `Result` alias for monitoring service calls.
pub type Result<T> = std::result::Result<T, ApiError>;

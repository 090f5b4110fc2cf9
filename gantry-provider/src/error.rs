//! Error types for provisioning providers

use thiserror::Error;

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur when talking to a provisioning provider
///
/// `Unavailable` is transient: the provider could not be reached or did not
/// answer in time, and the same call may succeed later. Everything else is a
/// definite answer from the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider unreachable (spawn failure, network error, timeout, 5xx)
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Provider refused the request
    #[error("Provider rejected request (status {status}): {message}")]
    Rejected {
        /// Exit code of the CLI or HTTP status code
        status: i32,
        /// Error text reported by the provider
        message: String,
    },

    /// Instance or resource type not known to the provider
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider answered with something we cannot read
    #[error("Failed to parse provider response: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Create a rejection from a status code and message
    pub fn rejected(status: i32, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Check if retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::Rejected { status: 404, .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Unavailable("timeout".into()).is_transient());
        assert!(!ProviderError::rejected(1, "bad gpu type").is_transient());
        assert!(!ProviderError::Parse("garbage".into()).is_transient());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ProviderError::NotFound("gpu-1".into()).is_not_found());
        assert!(ProviderError::rejected(404, "no such instance").is_not_found());
        assert!(!ProviderError::rejected(400, "bad request").is_not_found());
    }
}

//! LLM error types.

use std::time::Duration;

use crate::models::ProviderKind;

/// Longest provider body kept in an error, in characters.
const MAX_ERROR_BODY: usize = 512;

/// Errors from talking to a provider.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Network failure, timeout or broken stream.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success status. Auth failures land
    /// here with 401/403.
    #[error("provider returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// The provider answered with something the adapter cannot interpret.
    #[error("unreadable {provider} response (status {status}): {reason}")]
    Parse {
        provider: ProviderKind,
        status: u16,
        reason: String,
        body: String,
    },

    /// No response headers within the provider timeout.
    #[error("provider did not respond within {0:?}")]
    Timeout(Duration),

    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    pub fn api(status: u16, body: &str) -> Self {
        LlmError::Api {
            status,
            body: truncate_body(body),
        }
    }

    pub fn parse(provider: ProviderKind, status: u16, reason: impl Into<String>, body: &str) -> Self {
        LlmError::Parse {
            provider,
            status,
            reason: reason.into(),
            body: truncate_body(body),
        }
    }

    /// Whether the provider rejected our credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, LlmError::Api { status: 401 | 403, .. })
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            LlmError::Timeout(_) => true,
            LlmError::Transport(err) => err.is_timeout(),
            _ => false,
        }
    }
}

/// Adapter-level failure to interpret a provider payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        Self(format!("unexpected JSON shape: {e}"))
    }
}

/// Returned by tool handlers; becomes a tool-result message for the model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ToolExecutionError(pub String);

impl ToolExecutionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Cut a provider body down for logs and errors, on a char boundary.
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_truncated() {
        let body = "é".repeat(600);
        let cut = truncate_body(&body);
        assert_eq!(cut.chars().count(), MAX_ERROR_BODY + 1);
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn auth_failures_are_recognised() {
        assert!(LlmError::api(401, "bad key").is_auth_failure());
        assert!(LlmError::api(403, "").is_auth_failure());
        assert!(!LlmError::api(500, "").is_auth_failure());
        assert!(!LlmError::Cancelled.is_auth_failure());
    }

    #[test]
    fn stalled_stream_counts_as_timeout() {
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!LlmError::Cancelled.is_timeout());
    }
}

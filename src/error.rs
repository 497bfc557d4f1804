//! Error taxonomy for upstream fetching.

use thiserror::Error;

/// Maximum length of an upstream error message kept for diagnostics.
pub const MAX_ERROR_MESSAGE_LEN: usize = 200;

/// Outcome of a failed fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Local rate limit exceeded. Never retried.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Upstream returned a non-success status.
    #[error("upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Response body contained a bot-challenge marker.
    #[error("bot challenge detected in response body")]
    BotChallenge,

    /// Upstream returned a success status with no usable body.
    #[error("empty response body")]
    EmptyBody,

    /// Per-attempt timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// Transport-level failure (connect, TLS, decode).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    /// Build an upstream error with the message truncated for diagnostics.
    pub fn upstream(status: u16, message: &str) -> Self {
        FetchError::Upstream {
            status,
            message: truncate_message(message),
        }
    }

    /// Upstream HTTP status, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Upstream { status, .. } => Some(*status),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Permanent upstream failures that must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self.status(), Some(401) | Some(404))
    }

    /// Blocks that look identity-based rather than rate-based. The retry
    /// loop swaps sessions without a backoff delay for these.
    pub fn is_identity_block(&self) -> bool {
        self.status() == Some(403)
    }
}

/// Truncate an upstream message to the documented diagnostic length.
pub fn truncate_message(message: &str) -> String {
    if message.len() <= MAX_ERROR_MESSAGE_LEN {
        message.to_string()
    } else {
        let mut end = MAX_ERROR_MESSAGE_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message[..end].to_string()
    }
}

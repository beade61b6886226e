//! Error types shared by the API client, renderer and feeds

use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between fetching a post and displaying it
#[derive(Debug, Error)]
pub enum Error {
    /// No response was received (DNS, connection refused, timeout)
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// A response arrived with a non-success status
    #[error("API error: {status}")]
    Request { status: u16 },

    /// The response body was not the JSON we expected
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The caller's cancellation token fired before the result was applied
    #[error("request cancelled")]
    Cancelled,

    /// Markdown or diagram transformation failed
    #[error("{0}")]
    Render(String),

    /// Input rejected before any network call
    #[error("{0}")]
    Validation(String),

    /// Bad or missing configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status carried by a `Request` error
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Request { status } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether a user-initiated retry can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Request { .. } | Error::Decode(_)
        )
    }

    /// Message shown to a reader. Never includes backend internals.
    pub fn user_message(&self) -> String {
        match self {
            Error::Network(_) => "Could not load content. Please try again.".to_string(),
            Error::Request { status: 404 } => {
                "The content you're looking for doesn't exist.".to_string()
            }
            Error::Request { status } if *status >= 500 => format!(
                "The content service is having trouble right now (status {}). Please try again.",
                status
            ),
            Error::Request { status } => {
                format!("Could not load content (status {}).", status)
            }
            Error::Decode(_) => "Could not load content. Please try again.".to_string(),
            Error::Cancelled => "Loading was cancelled.".to_string(),
            Error::Render(msg) => format!("Error rendering content: {}", msg),
            Error::Validation(msg) => msg.clone(),
            Error::Config(_) => "This site is not configured correctly.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_helpers() {
        let err = Error::Request { status: 404 };
        assert_eq!(err.status(), Some(404));
        assert!(err.is_not_found());
        assert!(err.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn test_user_message_hides_details() {
        let err = Error::Request { status: 503 };
        let msg = err.user_message();
        assert!(msg.contains("503"));
        assert!(msg.contains("try again"));

        let decode = serde_json::from_str::<u32>("nope").unwrap_err();
        let msg = Error::Decode(decode).user_message();
        assert!(!msg.contains("expected"));
    }

    #[test]
    fn test_render_message() {
        let err = Error::Render("boom".into());
        assert_eq!(err.user_message(), "Error rendering content: boom");
    }
}

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("No network connection: {0}")]
    NoConnection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Failed to decode response: {0}")]
    DecodeError(String),
}

/// Maximum length for error response bodies in log messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            code => ApiError::ServerError(code),
        }
    }

    /// Whether a refresh hitting this error should fall back to cached data.
    pub fn is_fallback_eligible(&self) -> bool {
        !matches!(self, ApiError::Unauthorized)
    }

    /// Short message suitable for display. Never includes raw response detail.
    pub fn user_summary(&self) -> String {
        match self {
            ApiError::NoConnection(_) => "Network error. Check your connection.".to_string(),
            ApiError::Timeout => "The server took too long to respond.".to_string(),
            ApiError::ServerError(429) => {
                "Server is busy. Please wait a moment and try again.".to_string()
            }
            ApiError::ServerError(_) => "The server had a problem. Try again later.".to_string(),
            ApiError::Unauthorized => "Session expired. Please log in again.".to_string(),
            ApiError::DecodeError(_) => "Received unexpected data from the server.".to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::DecodeError(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::from_status(status)
        } else {
            ApiError::NoConnection(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::DecodeError(e.to_string())
    }
}

//! API Error Types
//!
//! Classifies REST failures into the categories callers act on: transient
//! network trouble, rejected credentials, refusals by the server and
//! responses that could not be decoded.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the REST layer
#[derive(Error, Debug)]
pub enum ApiError {
    /// Connection refused, reset or timed out
    #[error("Network error: {0}")]
    Network(String),

    /// The server rejected the bearer credential (401)
    #[error("Not authorized")]
    Unauthorized,

    /// Any other non-success status, with the server's explanation
    #[error("API error {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// The response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether a manual retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Text suitable for showing to the viewer
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => "Unable to reach the server. Please try again.".to_string(),
            ApiError::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            ApiError::Rejected { detail, .. } => detail.clone(),
            ApiError::Decode(_) => "Unexpected response from the server.".to_string(),
        }
    }

    /// Build an error from a non-success response body
    pub(crate) fn from_status(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            return ApiError::Unauthorized;
        }
        ApiError::Rejected {
            status: status.as_u16(),
            detail: extract_detail(body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            }),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Pull the `detail` field out of an error body.
///
/// Validation failures carry a list of `{loc, msg}` objects instead of a
/// string; their messages are joined.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        other => Some(other.to_string()),
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

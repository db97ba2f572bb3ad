use serde::Deserialize;
use thiserror::Error;

/// Message used when the server gave no usable explanation
pub const GENERIC_FAILURE: &str = "Request failed";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {}", .0.as_deref().unwrap_or(GENERIC_FAILURE))]
    Unauthorized(Option<String>),

    #[error("Access denied: {}", .0.as_deref().unwrap_or(GENERIC_FAILURE))]
    AccessDenied(Option<String>),

    #[error("Resource not found: {}", .0.as_deref().unwrap_or(GENERIC_FAILURE))]
    NotFound(Option<String>),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {}", .0.as_deref().unwrap_or(GENERIC_FAILURE))]
    ServerError(Option<String>),

    #[error("Request failed with status {status}: {}", .message.as_deref().unwrap_or(GENERIC_FAILURE))]
    RequestFailed {
        status: u16,
        message: Option<String>,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("No token in response")]
    MissingToken,

    #[error("Stored token is not a valid header value")]
    InvalidToken,
}

/// Maximum length for error response bodies kept in messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape used by the backend: `{ "message": ... }` or `{ "error": ... }`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
}

impl ApiError {
    /// Truncate a response body to avoid carrying excessive data
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

    /// Pull the server's explanation out of an error body.
    ///
    /// Looks at `message` first, then `error`. Non-JSON bodies and
    /// bodies without either field give `None`.
    pub fn extract_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        [parsed.message, parsed.error]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
            .map(|s| Self::truncate_body(&s))
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::extract_message(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            other => ApiError::RequestFailed {
                status: other,
                message,
            },
        }
    }

    /// The message the server sent with the failure, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized(m)
            | ApiError::AccessDenied(m)
            | ApiError::NotFound(m)
            | ApiError::ServerError(m)
            | ApiError::RequestFailed { message: m, .. } => m.as_deref(),
            _ => None,
        }
    }

    /// Server message for display, or `fallback` when there is none.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }

    /// HTTP status of the failed response, when the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::AccessDenied(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::RateLimited => Some(429),
            ApiError::RequestFailed { status, .. } => Some(*status),
            ApiError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_extract_message_prefers_message_field() {
        let body = r#"{"message":"Invalid credentials","error":"bad"}"#;
        assert_eq!(
            ApiError::extract_message(body).as_deref(),
            Some("Invalid credentials")
        );
    }

    #[test]
    fn test_extract_message_falls_back_to_error_field() {
        let body = r#"{"error":"User not found"}"#;
        assert_eq!(ApiError::extract_message(body).as_deref(), Some("User not found"));

        let body = r#"{"message":"","error":"User not found"}"#;
        assert_eq!(ApiError::extract_message(body).as_deref(), Some("User not found"));
    }

    #[test]
    fn test_extract_message_without_usable_field() {
        assert_eq!(ApiError::extract_message("<html>oops</html>"), None);
        assert_eq!(ApiError::extract_message(r#"{"status":"fail"}"#), None);
        assert_eq!(ApiError::extract_message(r#"{"message":{"code":1}}"#), None);
        assert_eq!(ApiError::extract_message(""), None);
    }

    #[test]
    fn test_from_status_mapping() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"message":"nope"}"#);
        assert!(matches!(err, ApiError::Unauthorized(Some(ref m)) if m == "nope"));
        assert_eq!(err.status(), Some(401));

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, "plain text");
        assert!(matches!(err, ApiError::RequestFailed { status: 400, message: None }));
        assert_eq!(err.to_string(), "Request failed with status 400: Request failed");

        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "");
        assert!(matches!(err, ApiError::ServerError(None)));

        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
    }

    #[test]
    fn test_user_message_fallback() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.user_message("Please try again"), "Please try again");

        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"error":"Locked"}"#);
        assert_eq!(err.user_message("Please try again"), "Locked");
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(400);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.contains("truncated, 800 total bytes"));
        assert!(ApiError::truncate_body("short") == "short");
    }
}

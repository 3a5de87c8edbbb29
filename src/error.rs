use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by listing, preview and configuration operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowseError {
    /// The store refused the request (private bucket, missing policy)
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Bucket or prefix does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure, timeout or truncated body; safe to retry
    #[error("Network error: {0}")]
    Network(String),

    /// Body could not be decoded for preview
    #[error("Decode error: {0}")]
    Decode(String),

    /// Operation is not valid in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A newer navigation or selection replaced this request
    #[error("Request superseded by a newer one")]
    Superseded,

    /// Body exceeded the read limit
    #[error("Object exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or malformed request parameter
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl BrowseError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrowseError::Network(_) | BrowseError::Superseded)
    }

    fn kind(&self) -> &'static str {
        match self {
            BrowseError::AccessDenied(_) => "access_denied",
            BrowseError::NotFound(_) => "not_found",
            BrowseError::Network(_) => "network",
            BrowseError::Decode(_) => "decode",
            BrowseError::InvalidState(_) => "invalid_state",
            BrowseError::Superseded => "superseded",
            BrowseError::TooLarge { .. } => "too_large",
            BrowseError::Config(_) => "config",
            BrowseError::BadRequest(_) => "bad_request",
        }
    }

    /// What the user can do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            BrowseError::AccessDenied(_) => {
                "The bucket does not allow anonymous access. Check the endpoint URL and bucket name in the configuration."
            }
            BrowseError::NotFound(_) => {
                "The bucket or folder does not exist. Check the bucket name in the configuration."
            }
            BrowseError::Network(_) => "The object store could not be reached. Try again.",
            BrowseError::Decode(_) => "The file could not be previewed. Download it to view the contents.",
            BrowseError::InvalidState(_) => "Reload the listing and try again.",
            BrowseError::Superseded => "A newer request replaced this one.",
            BrowseError::TooLarge { .. } => "The file is too large to preview. Download it instead.",
            BrowseError::Config(_) => "Check the configuration file.",
            BrowseError::BadRequest(_) => "Check the request parameters.",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
    retryable: bool,
    hint: &'a str,
}

impl ResponseError for BrowseError {
    fn status_code(&self) -> StatusCode {
        match self {
            BrowseError::AccessDenied(_) => StatusCode::FORBIDDEN,
            BrowseError::NotFound(_) => StatusCode::NOT_FOUND,
            BrowseError::Network(_) => StatusCode::BAD_GATEWAY,
            BrowseError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BrowseError::InvalidState(_) | BrowseError::Superseded => StatusCode::CONFLICT,
            BrowseError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            BrowseError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BrowseError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            retryable: self.is_retryable(),
            hint: self.hint(),
        })
    }
}

impl From<reqwest::Error> for BrowseError {
    fn from(e: reqwest::Error) -> Self {
        BrowseError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BrowseError::Network("timeout".into()).is_retryable());
        assert!(!BrowseError::AccessDenied("x".into()).is_retryable());
        assert!(!BrowseError::NotFound("x".into()).is_retryable());
        assert!(!BrowseError::Decode("x".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            BrowseError::AccessDenied("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            BrowseError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(BrowseError::Superseded.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            BrowseError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BrowseError::TooLarge { limit: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}

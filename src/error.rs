/// Unified error types for Civic Desk
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// External collaborator that produced an upstream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collaborator {
    Tracker,
    Storage,
    Queue,
    Captcha,
}

impl Collaborator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collaborator::Tracker => "tracker",
            Collaborator::Storage => "storage",
            Collaborator::Queue => "queue",
            Collaborator::Captcha => "captcha",
        }
    }
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics returned by the CAPTCHA verifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptchaDiagnostics {
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub challenge_ts: Option<String>,
}

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AppError {
    /// Required setting absent or invalid
    #[error("Server misconfigured: {0}")]
    Configuration(String),

    /// Request body could not be parsed
    #[error("Invalid JSON body: {0}")]
    BadRequest(String),

    /// Client input violated one or more rules
    #[error("{}", .0.join(" "))]
    Validation(Vec<String>),

    /// Declared content type is not accepted
    #[error("Unsupported or missing mime: {got}")]
    UnsupportedMediaType { got: String, allowed: Vec<String> },

    /// Credential missing or mismatched
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Request origin is not on the allow-list
    #[error("Origin not allowed")]
    OriginDenied,

    /// Target entity absent upstream
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Duration },

    /// CAPTCHA verifier answered with a failure
    #[error("CAPTCHA verification failed")]
    CaptchaRejected(CaptchaDiagnostics),

    /// CAPTCHA verifier could not be reached
    #[error("CAPTCHA verify request failed: {0}")]
    CaptchaUnavailable(String),

    /// A collaborator returned a non-success response
    #[error("{service} error: {detail}")]
    Upstream {
        service: Collaborator,
        status: Option<u16>,
        detail: String,
    },

    /// Comment published but the queue row could not be removed
    #[error("Partial failure: {0}")]
    PartialFailure(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn upstream(service: Collaborator, status: Option<u16>, detail: impl Into<String>) -> Self {
        AppError::Upstream {
            service,
            status,
            detail: detail.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(vec![message.into()])
    }

    /// Status code the error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Configuration(_)
            | AppError::Upstream { .. }
            | AppError::PartialFailure(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::CaptchaRejected(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::OriginDenied => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::CaptchaUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable code for the response body
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "ServerMisconfigured",
            AppError::BadRequest(_) => "InvalidJson",
            AppError::Validation(_) => "InvalidRequest",
            AppError::UnsupportedMediaType { .. } => "UnsupportedMediaType",
            AppError::Authentication(_) => "AuthenticationRequired",
            AppError::OriginDenied => "OriginNotAllowed",
            AppError::NotFound(_) => "NotFound",
            AppError::RateLimitExceeded { .. } => "RateLimitExceeded",
            AppError::CaptchaRejected(_) => "CaptchaFailed",
            AppError::CaptchaUnavailable(_) => "CaptchaUnavailable",
            AppError::Upstream { .. } => "UpstreamError",
            AppError::PartialFailure(_) => "PartialFailure",
            AppError::Internal(_) => "InternalServerError",
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let (message, details, retry_after) = match &self {
            // Never say which setting is absent
            AppError::Configuration(_) => ("Server misconfigured".to_string(), None, None),
            AppError::Internal(_) => ("Internal server error".to_string(), None, None),
            AppError::UnsupportedMediaType { got, allowed } => (
                self.to_string(),
                Some(serde_json::json!({
                    "allowed": allowed,
                    "got": if got.is_empty() { None } else { Some(got) },
                })),
                None,
            ),
            AppError::CaptchaRejected(diagnostics) => (
                self.to_string(),
                serde_json::to_value(diagnostics).ok(),
                None,
            ),
            AppError::RateLimitExceeded { retry_after } => (
                "Too many requests, please try again later".to_string(),
                None,
                Some(retry_after.as_secs().max(1)),
            ),
            _ => (self.to_string(), None, None),
        };

        let body = Json(ErrorResponse {
            ok: false,
            error: code.to_string(),
            message,
            details,
            retry_after,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Configuration("ADMIN_HASH".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Validation(vec!["a".into()]).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::CaptchaUnavailable("timeout".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::RateLimitExceeded { retry_after: Duration::from_secs(3) }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AppError::OriginDenied.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_validation_message_joins_all_rules() {
        let err = AppError::Validation(vec![
            "Full name is required.".to_string(),
            "Comment is too short.".to_string(),
        ]);
        assert_eq!(err.to_string(), "Full name is required. Comment is too short.");
    }

    #[test]
    fn test_partial_failure_has_its_own_code() {
        let partial = AppError::PartialFailure("row 7".into());
        let upstream = AppError::upstream(Collaborator::Queue, Some(500), "boom");
        assert_eq!(partial.status_code(), upstream.status_code());
        assert_ne!(partial.code(), upstream.code());
    }

    #[tokio::test]
    async fn test_configuration_error_does_not_leak_setting() {
        let response = AppError::Configuration("ADMIN_HASH missing".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("ADMIN_HASH"));
    }

    #[test]
    fn test_rate_limit_sets_retry_after_header() {
        let response = AppError::RateLimitExceeded {
            retry_after: Duration::from_secs(42),
        }
        .into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }
}

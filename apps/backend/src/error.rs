//! Error handling for the backend API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid refresh token")]
    InvalidToken,

    #[error("Expired refresh token")]
    ExpiredToken,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Deck {0} not found")]
    DeckNotFound(Uuid),

    #[error("Flashcard {0} not found")]
    CardNotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Carries the window length in seconds for the Retry-After header.
    #[error("Rate limit exceeded")]
    RateLimited(u64),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::Authentication(_) => (StatusCode::UNAUTHORIZED, "authentication_failed"),
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            ApiError::ExpiredToken => (StatusCode::UNAUTHORIZED, "expired_token"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::DeckNotFound(_) => (StatusCode::NOT_FOUND, "deck_not_found"),
            ApiError::CardNotFound(_) => (StatusCode::NOT_FOUND, "card_not_found"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            ApiError::Migration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "migration_error"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let mut response = {
            let body = Json(ErrorResponse {
                error: error_type.to_string(),
                message: self.to_string(),
            });
            (status, body).into_response()
        };

        if let ApiError::RateLimited(window_secs) = self {
            // Fixed-window behaviour: clients may retry after the window.
            if let Ok(value) = axum::http::HeaderValue::from_str(&window_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_status() {
        let error = ApiError::Authentication("bad credentials".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_invalid_token_status() {
        let response = ApiError::InvalidToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_expired_token_status() {
        let response = ApiError::ExpiredToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_forbidden_status() {
        let error = ApiError::Forbidden("not your deck".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_deck_not_found_status() {
        let error = ApiError::DeckNotFound(Uuid::nil());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_card_not_found_status() {
        let error = ApiError::CardNotFound(Uuid::nil());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_status() {
        let error = ApiError::Validation("missing audio".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rate_limited_status_and_header() {
        let response = ApiError::RateLimited(60).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("Retry-After"));
    }

    #[test]
    fn test_rate_limited_retry_after_matches_window() {
        let response = ApiError::RateLimited(120).into_response();
        assert_eq!(response.headers().get("Retry-After").unwrap(), "120");
    }

    #[test]
    fn test_upstream_status() {
        let error = ApiError::Upstream("tts unreachable".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_migration_status() {
        let error = ApiError::Migration("checksum mismatch".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_display_expired_token() {
        assert_eq!(ApiError::ExpiredToken.to_string(), "Expired refresh token");
    }

    #[test]
    fn test_error_display_forbidden() {
        let error = ApiError::Forbidden("deck owned by someone else".to_string());
        assert_eq!(error.to_string(), "Forbidden: deck owned by someone else");
    }
}

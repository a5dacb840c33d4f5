use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The remote portal was unreachable or its response body could not be read.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// The remote portal answered with an unexpected HTML or JSON shape.
    #[error("portal protocol error: {0}")]
    Protocol(String),

    /// An authentication error. The message is surfaced to the user verbatim,
    /// it either originates from the portal itself or names the failed check.
    #[error("{0}")]
    Authentication(String),

    /// A subscription token failed its integrity check (tampered, truncated or
    /// encrypted under a different key).
    #[error("subscription token failed integrity check")]
    TokenIntegrity,

    /// A request validation error.
    #[error("{0}")]
    Validation(String),

    /// A rate limit exceeded error.
    #[error("rate limit exceeded")]
    RateLimited,

    /// An encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// An internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Connectivity(ref e) => {
                tracing::error!("Connectivity error: {}", e);
                (StatusCode::BAD_GATEWAY, "服务暂时不可用，请稍后再试".to_string())
            }

            AppError::Protocol(ref e) => {
                tracing::error!("Portal protocol error: {}", e);
                (StatusCode::BAD_GATEWAY, "服务暂时不可用，请稍后再试".to_string())
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::TokenIntegrity => {
                // Logged apart from login failures: the token itself is bad,
                // the embedded credentials were never even looked at.
                tracing::warn!("Subscription token failed integrity check");
                (StatusCode::UNAUTHORIZED, "订阅链接无效，请重新生成".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::RateLimited => {
                tracing::warn!("Rate limit exceeded");
                (StatusCode::TOO_MANY_REQUESTS, "请求过于频繁，请稍后再试".to_string())
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"internal server error"}"#.to_string());

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_message_is_surfaced_verbatim() {
        let err = AppError::Authentication("用户名或密码错误".to_string());
        assert_eq!(err.to_string(), "用户名或密码错误");
    }

    #[test]
    fn status_codes_match_error_kinds() {
        let cases = [
            (AppError::Connectivity("down".into()), StatusCode::BAD_GATEWAY),
            (AppError::Protocol("drift".into()), StatusCode::BAD_GATEWAY),
            (AppError::Authentication("no".into()), StatusCode::UNAUTHORIZED),
            (AppError::TokenIntegrity, StatusCode::UNAUTHORIZED),
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (AppError::Encryption("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}

use thiserror::Error;

pub type IssuerResult<T> = Result<T, IssuerError>;

pub type DecodeResult<T> = Result<T, DecodeFailure>;

#[derive(Debug, Error)]
pub enum IssuerError {
    #[error("issuer misconfigured: {0}")]
    Config(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("claims must serialize to a JSON object: {0}")]
    InvalidClaims(String),
    #[error("failed to register metrics: {0}")]
    Metrics(String),
    #[error("authentication required")]
    Unauthenticated,
}

/// Reason a token could not be turned into a claim set.
///
/// These are expected, routine outcomes (expired sessions, tampered or stale
/// tokens) and are always returned as values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("token is empty")]
    Empty,
    #[error("token is malformed: {0}")]
    Malformed(String),
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token expired at {expired_at}")]
    Expired { expired_at: i64 },
    #[error("token carries no exp claim")]
    MissingExpiry,
    #[error("malformed claim payload: {0}")]
    InvalidClaims(String),
}

impl From<jsonwebtoken::errors::Error> for DecodeFailure {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match value.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::Json(err) => Self::InvalidClaims(err.to_string()),
            _ => Self::Malformed(value.to_string()),
        }
    }
}

#[cfg(feature = "server")]
mod response {
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;
    use serde::Serialize;

    use super::IssuerError;

    #[derive(Debug, Serialize)]
    struct ErrorBody {
        code: &'static str,
        message: String,
    }

    impl IntoResponse for IssuerError {
        fn into_response(self) -> Response {
            let (status, code) = match &self {
                IssuerError::Unauthenticated => (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED"),
                IssuerError::InvalidClaims(_) => (StatusCode::BAD_REQUEST, "AUTH_CLAIMS"),
                IssuerError::Config(_) | IssuerError::Signing(_) | IssuerError::Metrics(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_ISSUER")
                }
            };

            let body = ErrorBody {
                code,
                message: self.to_string(),
            };
            (status, Json(body)).into_response()
        }
    }
}

use http::{HeaderMap, StatusCode};
use thiserror::Error;

pub type HolderResult<T> = Result<T, HolderError>;

#[derive(Debug, Error)]
pub enum HolderError {
    #[error("token store failure: {0}")]
    Storage(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with {status}")]
    Status { status: StatusCode, headers: HeaderMap },
}

impl From<std::io::Error> for HolderError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

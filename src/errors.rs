use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("listings service responded with HTTP {status}")]
    Transport { status: u16 },
    #[error("request could not complete: {0}")]
    Network(String),
    #[error("no geocoding results for {0:?}")]
    NotFound(String),
    #[error("geocoding provider failed: {0}")]
    Provider(String),
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => AppError::Transport {
                status: status.as_u16(),
            },
            None => AppError::Network(err.to_string()),
        }
    }
}

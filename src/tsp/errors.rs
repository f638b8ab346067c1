use thiserror::Error;

use crate::loader::LoaderError;
use crate::token::TokenError;

/// Time-stamping errors
#[derive(Error, Debug)]
pub enum TspError {
    #[error("Time-stamp request failed: {0}")]
    Loader(#[from] LoaderError),

    #[error("Invalid time-stamp response: {0}")]
    Der(#[from] der::Error),

    #[error("Invalid time-stamp token: {0}")]
    Token(#[from] TokenError),

    #[error("Time-stamp request rejected with status {0}")]
    Rejected(u8),

    #[error("Time-stamp response carries no token")]
    MissingToken,

    #[error("Time-stamp token does not cover the requested digest")]
    ImprintMismatch,

    #[error("Invalid time-stamp source configuration: {0}")]
    Configuration(String),
}

/// Convenient Result type alias
pub type TspResult<T> = Result<T, TspError>;

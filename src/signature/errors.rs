use thiserror::Error;

use crate::token::TokenError;
use crate::tsp::TspError;
use crate::validation::ValidationError;

/// Errors reported by a document format.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Unknown signature: {0}")]
    UnknownSignature(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DocumentResult<T> = Result<T, DocumentError>;

/// Signature extension errors. Any of these aborts the whole extension call.
#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("Document contains no signature")]
    NoSignatures,

    #[error("A time-stamp source is required to reach this level")]
    MissingTspSource,

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Time-stamping failed: {0}")]
    Tsp(#[from] TspError),

    #[error("Invalid embedded token: {0}")]
    Token(#[from] TokenError),

    #[error("Validation data collection failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Convenient Result type alias
pub type ExtensionResult<T> = Result<T, ExtensionError>;

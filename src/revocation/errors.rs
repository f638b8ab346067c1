use thiserror::Error;

use crate::loader::LoaderError;
use crate::token::TokenError;

/// Revocation source errors surfaced to callers.
///
/// Lookup problems (network, parsing, bad signatures) never show up here; they
/// end the lookup with "no token" instead.
#[derive(Error, Debug)]
pub enum RevocationError {
    #[error("Invalid revocation source configuration: {0}")]
    Configuration(String),
}

/// Convenient Result type alias
pub type RevocationResult<T> = Result<T, RevocationError>;

/// Failure to obtain a usable artifact from one distribution point.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(#[from] LoaderError),

    #[error("No data available")]
    NotAvailable,

    #[error("Parse error: {0}")]
    Parse(#[from] TokenError),

    #[error("Invalid artifact: {0}")]
    Invalid(String),
}

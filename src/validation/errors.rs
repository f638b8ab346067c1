use thiserror::Error;
use tokio::task::JoinError;

use crate::revocation::RevocationError;
use crate::token::TokenId;
use crate::trust::CertificateSourceError;

/// Failure raised by a collaborator while resolving one token.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error(transparent)]
    Revocation(#[from] RevocationError),

    #[error(transparent)]
    CertificateSource(#[from] CertificateSourceError),
}

/// Failure of one resolution task, as seen at the task boundary.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Resolution of token {token} failed")]
    Resolution {
        token: TokenId,
        #[source]
        source: ResolutionError,
    },

    #[error("Resolution task did not complete: {0}")]
    Join(#[from] JoinError),
}

/// Validation context errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid validation context configuration: {0}")]
    Configuration(String),

    #[error("Validation run failed")]
    TaskFailed(#[source] TaskError),
}

/// Convenient Result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

use thiserror::Error;
use x509_parser::error::PEMError;

use crate::token::TokenError;

/// Error type for certificate source operations.
#[derive(Debug, Error)]
pub enum CertificateSourceError {
    #[error("Certificate error: {0}")]
    Token(#[from] TokenError),

    #[error("PEM error: {0}")]
    Pem(#[from] PEMError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Certificate source error: {0}")]
    Custom(String),
}

impl From<walkdir::Error> for CertificateSourceError {
    fn from(e: walkdir::Error) -> Self {
        CertificateSourceError::Io(e.into())
    }
}

pub type CertificateSourceResult<T> = Result<T, CertificateSourceError>;

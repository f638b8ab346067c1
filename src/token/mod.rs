//! Validation tokens
//!
//! Certificates, revocation proofs and timestamps are all immutable tokens
//! identified by the SHA-256 of their encoding.

mod certificate;
mod revocation;
mod timestamp;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use x509_parser::prelude::X509Error;

pub use certificate::CertificateToken;
pub use revocation::{CertificateStatus, RevocationKind, RevocationToken};
pub use timestamp::{Accuracy, MessageImprint, TimestampToken, TstInfo};
#[cfg(test)]
pub(crate) use timestamp::{encode_unsigned_token, sample_tst_info};

/// Token construction errors
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("X.509 error: {0}")]
    X509(#[from] X509Error),

    #[error("DER decoding failed: {0}")]
    Der(#[from] der::Error),

    #[error("Invalid time value in {0}")]
    InvalidTime(&'static str),

    #[error("Malformed token: {0}")]
    Malformed(String),
}

pub type TokenResult<T> = Result<T, TokenError>;

/// Content hash of a token's encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId([u8; 32]);

impl TokenId {
    pub fn from_encoding(encoded: &[u8]) -> Self {
        Self(crate::crypto::sha256(encoded))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        write!(f, "TokenId({})", &hex::encode(self.0)[..16])
    }
}

/// Any token a validation run may need to resolve.
#[derive(Debug, Clone)]
pub enum Token {
    Certificate(Arc<CertificateToken>),
    Revocation(Arc<RevocationToken>),
    Timestamp(Arc<TimestampToken>),
}

impl Token {
    pub fn id(&self) -> TokenId {
        match self {
            Token::Certificate(token) => token.id(),
            Token::Revocation(token) => token.id(),
            Token::Timestamp(token) => token.id(),
        }
    }

    pub fn encoded(&self) -> &[u8] {
        match self {
            Token::Certificate(token) => token.encoded(),
            Token::Revocation(token) => token.encoded(),
            Token::Timestamp(token) => token.encoded(),
        }
    }
}

/// Convert x509-parser's ASN.1 time to chrono.
pub(crate) fn asn1_time_to_chrono(
    time: x509_parser::time::ASN1Time,
    field: &'static str,
) -> TokenResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(time.timestamp(), 0).ok_or(TokenError::InvalidTime(field))
}

/// Convert a DER GeneralizedTime to chrono.
pub(crate) fn generalized_time_to_chrono(
    time: &der::asn1::GeneralizedTime,
    field: &'static str,
) -> TokenResult<chrono::DateTime<chrono::Utc>> {
    let seconds = i64::try_from(time.to_unix_duration().as_secs())
        .map_err(|_| TokenError::InvalidTime(field))?;
    chrono::DateTime::from_timestamp(seconds, 0).ok_or(TokenError::InvalidTime(field))
}

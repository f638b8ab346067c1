use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CertificateToken, TokenId};

/// Which protocol produced a revocation proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevocationKind {
    Crl,
    Ocsp,
}

impl fmt::Display for RevocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevocationKind::Crl => f.write_str("CRL"),
            RevocationKind::Ocsp => f.write_str("OCSP"),
        }
    }
}

/// Status a revocation proof asserts for its certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStatus {
    Good,
    Revoked {
        revocation_time: DateTime<Utc>,
        reason: Option<u8>,
    },
    Unknown,
}

impl CertificateStatus {
    pub fn is_revoked(&self) -> bool {
        matches!(self, CertificateStatus::Revoked { .. })
    }
}

/// A CRL or OCSP response vouching for (or revoking) one certificate.
#[derive(Clone)]
pub struct RevocationToken {
    id: TokenId,
    kind: RevocationKind,
    encoded: Vec<u8>,
    issuing_time: DateTime<Utc>,
    this_update: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
    status: CertificateStatus,
    source_url: Option<String>,
    certificate_id: TokenId,
    signers: Vec<Arc<CertificateToken>>,
}

impl RevocationToken {
    /// A CRL proof: issuing time is the CRL's thisUpdate.
    pub fn crl(
        encoded: Vec<u8>,
        this_update: DateTime<Utc>,
        next_update: Option<DateTime<Utc>>,
        status: CertificateStatus,
        certificate_id: TokenId,
        issuer: Arc<CertificateToken>,
    ) -> Self {
        Self {
            id: TokenId::from_encoding(&encoded),
            kind: RevocationKind::Crl,
            encoded,
            issuing_time: this_update,
            this_update,
            next_update,
            status,
            source_url: None,
            certificate_id,
            signers: vec![issuer],
        }
    }

    /// An OCSP proof: issuing time is the response's producedAt.
    pub fn ocsp(
        encoded: Vec<u8>,
        produced_at: DateTime<Utc>,
        this_update: DateTime<Utc>,
        next_update: Option<DateTime<Utc>>,
        status: CertificateStatus,
        certificate_id: TokenId,
        signers: Vec<Arc<CertificateToken>>,
    ) -> Self {
        Self {
            id: TokenId::from_encoding(&encoded),
            kind: RevocationKind::Ocsp,
            encoded,
            issuing_time: produced_at,
            this_update,
            next_update,
            status,
            source_url: None,
            certificate_id,
            signers,
        }
    }

    /// Stamp the URL the proof was obtained from.
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn kind(&self) -> RevocationKind {
        self.kind
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn issuing_time(&self) -> DateTime<Utc> {
        self.issuing_time
    }

    pub fn this_update(&self) -> DateTime<Utc> {
        self.this_update
    }

    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.next_update
    }

    pub fn status(&self) -> &CertificateStatus {
        &self.status
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    /// Id of the certificate this proof is about.
    pub fn certificate_id(&self) -> TokenId {
        self.certificate_id
    }

    /// Certificates involved in signing the proof (CRL issuer, OCSP responder).
    pub fn signers(&self) -> &[Arc<CertificateToken>] {
        &self.signers
    }
}

impl fmt::Debug for RevocationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevocationToken")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("this_update", &self.this_update)
            .field("next_update", &self.next_update)
            .field("status", &self.status)
            .field("source_url", &self.source_url)
            .finish()
    }
}

//! Trust anchors and issuer lookup

mod errors;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::token::CertificateToken;

pub use errors::{CertificateSourceError, CertificateSourceResult};
pub use memory::{CommonCertificateSource, decode_certificates};

/// Supplies issuer certificates and decides which certificates are trust anchors.
#[async_trait]
pub trait CertificateSource: Send + Sync {
    /// Find a certificate that names and verifiably signed `certificate`.
    async fn get_issuer(
        &self,
        certificate: &CertificateToken,
    ) -> CertificateSourceResult<Option<Arc<CertificateToken>>>;

    /// Whether `certificate` is trusted a priori.
    fn is_trusted(&self, certificate: &CertificateToken) -> bool;
}

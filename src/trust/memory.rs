use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;
use tracing::{info, warn};
use walkdir::WalkDir;
use x509_parser::pem::Pem;

use super::errors::{CertificateSourceError, CertificateSourceResult};
use super::CertificateSource;
use crate::token::{CertificateToken, TokenId};

#[derive(Debug, Clone)]
struct SourceEntry {
    token: Arc<CertificateToken>,
    trusted: bool,
}

/// In-memory certificate source.
///
/// Holds both trust anchors and plain intermediates; only the former make
/// `is_trusted` answer true. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct CommonCertificateSource {
    cache: Arc<DashMap<TokenId, SourceEntry>>,
}

impl CommonCertificateSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a certificate and return the stored instance.
    ///
    /// Adding a known certificate keeps the existing instance, upgrading it to
    /// trusted if requested.
    pub fn add_certificate(&self, token: CertificateToken, trusted: bool) -> Arc<CertificateToken> {
        let mut entry = self.cache.entry(token.id()).or_insert_with(|| SourceEntry {
            token: Arc::new(token),
            trusted,
        });
        entry.trusted |= trusted;
        entry.token.clone()
    }

    /// Parse and add a DER encoded certificate.
    pub fn add_der(
        &self,
        der: impl AsRef<[u8]>,
        trusted: bool,
    ) -> CertificateSourceResult<Arc<CertificateToken>> {
        let token = CertificateToken::from_der(der)?;
        Ok(self.add_certificate(token, trusted))
    }

    /// Load every `.der`, `.crt` and `.pem` file below `path`.
    ///
    /// Unparsable files are skipped. Returns the number of certificates added.
    pub async fn load_directory(
        &self,
        path: impl AsRef<Path>,
        trusted: bool,
    ) -> CertificateSourceResult<usize> {
        let mut count = 0;

        for entry in WalkDir::new(path.as_ref()) {
            let entry = entry?;
            let path = entry.path();

            if !path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| {
                    ext.eq_ignore_ascii_case("der")
                        || ext.eq_ignore_ascii_case("pem")
                        || ext.eq_ignore_ascii_case("crt")
                })
            {
                continue;
            }

            let bytes = fs::read(path).await?;
            match decode_certificates(&bytes) {
                Ok(ders) => {
                    for der in ders {
                        match self.add_der(&der, trusted) {
                            Ok(_) => count += 1,
                            Err(e) => warn!("Skipping certificate in {:?}: {}", path, e),
                        }
                    }
                }
                Err(e) => warn!("Skipping {:?}: {}", path, e),
            }
        }
        info!("Loaded {count} certificates from {:?}", path.as_ref());
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn certificates(&self) -> Vec<Arc<CertificateToken>> {
        self.cache.iter().map(|e| e.value().token.clone()).collect()
    }
}

/// DER bytes as-is, or every certificate of a PEM bundle.
pub fn decode_certificates(bytes: &[u8]) -> CertificateSourceResult<Vec<Vec<u8>>> {
    if !bytes.trim_ascii_start().starts_with(b"-----BEGIN") {
        return Ok(vec![bytes.to_vec()]);
    }

    let mut ders = Vec::new();
    for pem in Pem::iter_from_buffer(bytes) {
        let pem = pem?;
        if pem.label == "CERTIFICATE" {
            ders.push(pem.contents);
        }
    }
    if ders.is_empty() {
        return Err(CertificateSourceError::Custom(
            "PEM file contains no certificate".to_string(),
        ));
    }
    Ok(ders)
}

#[async_trait]
impl CertificateSource for CommonCertificateSource {
    async fn get_issuer(
        &self,
        certificate: &CertificateToken,
    ) -> CertificateSourceResult<Option<Arc<CertificateToken>>> {
        for entry in self.cache.iter() {
            let candidate = &entry.value().token;
            // Verify the signature to ensure this is the correct issuer
            if candidate.subject_raw() == certificate.issuer_raw()
                && certificate.is_signed_by(candidate)
            {
                return Ok(Some(candidate.clone()));
            }
        }
        Ok(None)
    }

    fn is_trusted(&self, certificate: &CertificateToken) -> bool {
        self.cache
            .get(&certificate.id())
            .is_some_and(|entry| entry.trusted)
    }
}

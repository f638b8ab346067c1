//! Revocation data sources
//!
//! # Features
//! - CRL retrieval from the certificate's distribution points
//! - OCSP queries against the certificate's AIA responders
//! - Freshness-aware caching decorator
//!
//! Lookups fail softly: network and parse problems are logged and the next
//! candidate URL is tried, ending in `Ok(None)` when nothing usable is found.

mod cached;
mod crl;
mod errors;
mod freshness;
pub mod ocsp;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::loader::Protocol;
use crate::token::{CertificateToken, RevocationKind, RevocationToken};

pub use cached::CachedRevocationSource;
pub use crl::{OnlineCrlSource, OnlineCrlSourceBuilder};
pub use errors::{FetchError, RevocationError, RevocationResult};
pub use freshness::{FreshnessCache, FreshnessPolicy, FreshnessRecord, FreshnessUnit};
pub use ocsp::{CertId, OnlineOcspSource, OnlineOcspSourceBuilder, build_ocsp_request};

/// Produces a revocation proof for a certificate issued by `issuer`.
///
/// Callers resolve the issuer first; a certificate without a known issuer is
/// never looked up.
#[async_trait]
pub trait RevocationSource: Send + Sync {
    /// `Ok(None)` when no candidate URL yields a valid artifact.
    async fn get_revocation_token(
        &self,
        certificate: &CertificateToken,
        issuer: &Arc<CertificateToken>,
    ) -> RevocationResult<Option<RevocationToken>>;
}

/// A source that fetches artifacts from URLs named in the certificate.
#[async_trait]
pub trait OnlineRevocationSource: Send + Sync {
    fn kind(&self) -> RevocationKind;

    /// Candidate URLs in lookup order.
    fn candidate_urls(&self, certificate: &CertificateToken) -> Vec<String>;

    /// Fetch, parse and validate the artifact behind one URL.
    async fn fetch(
        &self,
        certificate: &CertificateToken,
        issuer: &Arc<CertificateToken>,
        url: &str,
        refresh: bool,
    ) -> Result<RevocationToken, FetchError>;
}

/// Stable reorder putting URLs of the preferred protocol first.
pub fn prioritize_urls(urls: &[String], preferred: Option<Protocol>) -> Vec<String> {
    let Some(preferred) = preferred else {
        return urls.to_vec();
    };
    let (mut first, rest): (Vec<_>, Vec<_>) = urls
        .iter()
        .cloned()
        .partition(|url| Protocol::from_url(url) == Some(preferred));
    first.extend(rest);
    first
}

/// Uncached lookup: every URL is fetched without forcing a refresh, and any
/// failure moves on to the next URL.
pub(crate) async fn lookup_direct<S>(
    source: &S,
    certificate: &CertificateToken,
    issuer: &Arc<CertificateToken>,
) -> RevocationResult<Option<RevocationToken>>
where
    S: OnlineRevocationSource + ?Sized,
{
    let urls = source.candidate_urls(certificate);
    if urls.is_empty() {
        debug!("No {} URL in {}", source.kind(), certificate.subject());
    }

    for url in urls {
        match source.fetch(certificate, issuer, &url, false).await {
            Ok(token) => return Ok(Some(token)),
            Err(e) => warn!("{} lookup failed for {}: {}", source.kind(), url, e),
        }
    }
    Ok(None)
}

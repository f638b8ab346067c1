use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::errors::{FetchError, RevocationResult};
use super::freshness::{FreshnessCache, FreshnessRecord};
use super::{OnlineRevocationSource, RevocationSource};
use crate::token::{CertificateToken, RevocationToken};

/// Decorates an online source with freshness-driven refresh decisions.
///
/// Differs from the direct lookup in two ways: the loader is asked to refresh
/// whenever the URL's record is missing or stale, and a parse failure ends the
/// whole lookup instead of moving on to the next URL.
pub struct CachedRevocationSource<S> {
    source: S,
    cache: Arc<FreshnessCache>,
}

impl<S: OnlineRevocationSource> CachedRevocationSource<S> {
    pub fn new(source: S, cache: Arc<FreshnessCache>) -> Self {
        Self { source, cache }
    }

    pub fn cache(&self) -> &Arc<FreshnessCache> {
        &self.cache
    }

    pub fn inner(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: OnlineRevocationSource> RevocationSource for CachedRevocationSource<S> {
    async fn get_revocation_token(
        &self,
        certificate: &CertificateToken,
        issuer: &Arc<CertificateToken>,
    ) -> RevocationResult<Option<RevocationToken>> {
        for url in self.source.candidate_urls(certificate) {
            let refresh = self.cache.should_refresh(&url);
            debug!("{} lookup at {} (refresh: {})", self.source.kind(), url, refresh);
            match self.source.fetch(certificate, issuer, &url, refresh).await {
                Ok(token) => {
                    // Reused artifacts keep their existing record
                    if refresh {
                        self.cache.record(
                            &url,
                            FreshnessRecord {
                                this_update: token.this_update(),
                                next_update: token.next_update(),
                            },
                        );
                    }
                    return Ok(Some(token));
                }
                Err(FetchError::Parse(e)) => {
                    warn!(
                        "Unparsable {} from {}, aborting lookup: {}",
                        self.source.kind(),
                        url,
                        e
                    );
                    return Ok(None);
                }
                Err(e) => warn!("{} lookup failed for {}: {}", self.source.kind(), url, e),
            }
        }
        Ok(None)
    }
}

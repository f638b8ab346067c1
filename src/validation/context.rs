use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::errors::{ResolutionError, TaskError, ValidationError, ValidationResult};
use crate::loader::DataLoader;
use crate::revocation::RevocationSource;
use crate::token::{CertificateToken, RevocationToken, TimestampToken, Token, TokenId};
use crate::trust::CertificateSource;

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Builder for `ValidationContext`.
///
/// Cloning is cheap; each `build()` yields an independent context.
#[derive(Clone, Default)]
pub struct ValidationContextBuilder {
    trusted: Option<Arc<dyn CertificateSource>>,
    ocsp_source: Option<Arc<dyn RevocationSource>>,
    crl_source: Option<Arc<dyn RevocationSource>>,
    aia_loader: Option<Arc<dyn DataLoader>>,
    max_concurrency: Option<usize>,
}

impl ValidationContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust anchors and known intermediates. Required.
    pub fn trusted_source(mut self, source: Arc<dyn CertificateSource>) -> Self {
        self.trusted = Some(source);
        self
    }

    pub fn ocsp_source(mut self, source: Arc<dyn RevocationSource>) -> Self {
        self.ocsp_source = Some(source);
        self
    }

    pub fn crl_source(mut self, source: Arc<dyn RevocationSource>) -> Self {
        self.crl_source = Some(source);
        self
    }

    /// Loader used to download missing issuers from AIA caIssuers URLs.
    pub fn aia_loader(mut self, loader: Arc<dyn DataLoader>) -> Self {
        self.aia_loader = Some(loader);
        self
    }

    /// Upper bound on resolution tasks running at once.
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    pub fn build(self) -> ValidationResult<ValidationContext> {
        let trusted = self.trusted.ok_or_else(|| {
            ValidationError::Configuration("a trusted certificate source is required".to_string())
        })?;
        let max_concurrency = self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY);
        if max_concurrency == 0 {
            return Err(ValidationError::Configuration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(ValidationContext {
            inner: Arc::new(ContextInner {
                trusted,
                ocsp_source: self.ocsp_source,
                crl_source: self.crl_source,
                aia_loader: self.aia_loader,
                max_concurrency,
                state: Mutex::new(ContextState::default()),
            }),
        })
    }
}

#[derive(Default)]
struct ContextState {
    pending: VecDeque<Token>,
    /// Every token ever registered; guards against re-queueing
    known: HashSet<TokenId>,
    certificates: HashMap<TokenId, Arc<CertificateToken>>,
    revocations: HashMap<TokenId, Arc<RevocationToken>>,
    timestamps: HashMap<TokenId, Arc<TimestampToken>>,
    revocations_by_certificate: HashMap<TokenId, Vec<TokenId>>,
    /// Issuer resolved for each certificate during this run
    issuers: HashMap<TokenId, Arc<CertificateToken>>,
}

struct ContextInner {
    trusted: Arc<dyn CertificateSource>,
    ocsp_source: Option<Arc<dyn RevocationSource>>,
    crl_source: Option<Arc<dyn RevocationSource>>,
    aia_loader: Option<Arc<dyn DataLoader>>,
    max_concurrency: usize,
    state: Mutex<ContextState>,
}

/// Resolves every certificate and revocation token a set of signatures needs.
///
/// Resolution of one token may register further tokens (issuers, OCSP
/// responders, timestamp certificates); `validate` keeps going until no
/// token is pending and no task is running.
pub struct ValidationContext {
    inner: Arc<ContextInner>,
}

impl ValidationContext {
    pub fn builder() -> ValidationContextBuilder {
        ValidationContextBuilder::new()
    }

    /// Register a certificate and return the context's canonical instance.
    /// Registering a known certificate is a no-op.
    pub fn add_certificate_token_for_verification(
        &self,
        token: Arc<CertificateToken>,
    ) -> Arc<CertificateToken> {
        self.inner.register_certificate(token)
    }

    pub fn add_revocation_token_for_verification(&self, token: Arc<RevocationToken>) {
        self.inner.register_revocation(token);
    }

    pub fn add_timestamp_token_for_verification(&self, token: Arc<TimestampToken>) {
        self.inner.register_timestamp(token);
    }

    /// Drain the pending set.
    ///
    /// When a task fails, no new task is started, already running tasks are
    /// awaited, and the first failure is returned.
    pub async fn validate(&self) -> ValidationResult<()> {
        let mut tasks: JoinSet<Result<(), TaskError>> = JoinSet::new();
        let mut failure: Option<TaskError> = None;
        let mut executed = 0usize;

        loop {
            if failure.is_none() {
                while tasks.len() < self.inner.max_concurrency {
                    let Some(token) = self.inner.next_pending() else {
                        break;
                    };
                    let inner = self.inner.clone();
                    executed += 1;
                    tasks.spawn(async move { inner.resolve(token).await });
                }
            }

            match tasks.join_next().await {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    error!("Token resolution failed: {}", e);
                    failure.get_or_insert(e);
                }
                Some(Err(e)) => {
                    error!("Resolution task failed to complete: {}", e);
                    failure.get_or_insert(TaskError::Join(e));
                }
                // Only this loop spawns tasks and only tasks add tokens, so
                // with no task left the pending check cannot race.
                None => {
                    if failure.is_some() || self.inner.lock().pending.is_empty() {
                        break;
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(ValidationError::TaskFailed(e)),
            None => {
                info!("Validation context settled after {} task(s)", executed);
                Ok(())
            }
        }
    }

    pub fn processed_certificates(&self) -> Vec<Arc<CertificateToken>> {
        self.inner.lock().certificates.values().cloned().collect()
    }

    pub fn processed_revocations(&self) -> Vec<Arc<RevocationToken>> {
        self.inner.lock().revocations.values().cloned().collect()
    }

    pub fn processed_timestamps(&self) -> Vec<Arc<TimestampToken>> {
        self.inner.lock().timestamps.values().cloned().collect()
    }

    /// `certificate` followed by the issuers resolved for it in this context,
    /// up to the first self-signed or unresolved one.
    pub fn certificate_chain(&self, certificate: &Arc<CertificateToken>) -> Vec<Arc<CertificateToken>> {
        let state = self.inner.lock();
        let mut chain = vec![certificate.clone()];
        let mut seen = HashSet::from([certificate.id()]);
        let mut current = certificate.id();

        while let Some(issuer) = state.issuers.get(&current) {
            if !seen.insert(issuer.id()) {
                break;
            }
            chain.push(issuer.clone());
            current = issuer.id();
        }
        chain
    }

    /// Revocation proofs found for `certificate`.
    pub fn revocations_for(&self, certificate: &CertificateToken) -> Vec<Arc<RevocationToken>> {
        let state = self.inner.lock();
        state
            .revocations_by_certificate
            .get(&certificate.id())
            .into_iter()
            .flatten()
            .filter_map(|id| state.revocations.get(id).cloned())
            .collect()
    }
}

impl ContextInner {
    fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_pending(&self) -> Option<Token> {
        self.lock().pending.pop_front()
    }

    fn register_certificate(&self, token: Arc<CertificateToken>) -> Arc<CertificateToken> {
        let mut state = self.lock();
        if let Some(existing) = state.certificates.get(&token.id()) {
            return existing.clone();
        }
        debug!("Registering certificate {}", token.subject());
        state.known.insert(token.id());
        state.certificates.insert(token.id(), token.clone());
        state.pending.push_back(Token::Certificate(token.clone()));
        token
    }

    fn register_revocation(&self, token: Arc<RevocationToken>) {
        let mut state = self.lock();
        if !state.known.insert(token.id()) {
            return;
        }
        state
            .revocations_by_certificate
            .entry(token.certificate_id())
            .or_default()
            .push(token.id());
        state.revocations.insert(token.id(), token.clone());
        state.pending.push_back(Token::Revocation(token));
    }

    fn register_timestamp(&self, token: Arc<TimestampToken>) {
        let mut state = self.lock();
        if !state.known.insert(token.id()) {
            return;
        }
        state.timestamps.insert(token.id(), token.clone());
        state.pending.push_back(Token::Timestamp(token));
    }

    async fn resolve(self: Arc<Self>, token: Token) -> Result<(), TaskError> {
        let id = token.id();
        let result = match token {
            Token::Certificate(certificate) => self.resolve_certificate(certificate).await,
            Token::Revocation(revocation) => {
                for signer in revocation.signers() {
                    self.register_certificate(signer.clone());
                }
                Ok(())
            }
            Token::Timestamp(timestamp) => {
                for certificate in timestamp.certificates() {
                    self.register_certificate(certificate.clone());
                }
                Ok(())
            }
        };
        result.map_err(|source| TaskError::Resolution { token: id, source })
    }

    async fn resolve_certificate(
        &self,
        certificate: Arc<CertificateToken>,
    ) -> Result<(), ResolutionError> {
        if certificate.is_self_signed() {
            debug!("{} is self-signed", certificate.subject());
            return Ok(());
        }

        // Without an issuer there is nothing to check revocation against
        let Some(issuer) = self.find_issuer(&certificate).await? else {
            warn!("No issuer found for {}", certificate.subject());
            return Ok(());
        };
        let issuer = self.register_certificate(issuer);
        self.lock().issuers.insert(certificate.id(), issuer.clone());

        if self.trusted.is_trusted(&certificate) {
            debug!("{} is a trust anchor, no revocation check", certificate.subject());
            return Ok(());
        }

        let mut revocation = None;
        if let Some(ocsp) = &self.ocsp_source {
            revocation = ocsp.get_revocation_token(&certificate, &issuer).await?;
        }
        if revocation.is_none()
            && let Some(crl) = &self.crl_source
        {
            revocation = crl.get_revocation_token(&certificate, &issuer).await?;
        }

        match revocation {
            Some(token) => {
                info!(
                    "Found {} for {} ({:?})",
                    token.kind(),
                    certificate.subject(),
                    token.status()
                );
                self.register_revocation(Arc::new(token));
            }
            None => warn!("No revocation data found for {}", certificate.subject()),
        }
        Ok(())
    }

    /// Look among registered certificates first, then the trusted source,
    /// then the AIA caIssuers URLs.
    async fn find_issuer(
        &self,
        certificate: &CertificateToken,
    ) -> Result<Option<Arc<CertificateToken>>, ResolutionError> {
        let candidates: Vec<_> = self
            .lock()
            .certificates
            .values()
            .filter(|c| c.subject_raw() == certificate.issuer_raw() && c.id() != certificate.id())
            .cloned()
            .collect();
        if let Some(issuer) = candidates.into_iter().find(|c| certificate.is_signed_by(c)) {
            return Ok(Some(issuer));
        }

        if let Some(issuer) = self.trusted.get_issuer(certificate).await? {
            return Ok(Some(issuer));
        }

        let Some(loader) = &self.aia_loader else {
            return Ok(None);
        };
        for url in certificate.ca_issuers_urls() {
            match loader.get(url, false).await {
                Ok(Some(der)) => match CertificateToken::from_der(&der) {
                    Ok(issuer) if certificate.is_signed_by(&issuer) => {
                        debug!("Downloaded issuer {} from {}", issuer.subject(), url);
                        return Ok(Some(Arc::new(issuer)));
                    }
                    Ok(_) => warn!("Certificate from {} did not issue {}", url, certificate.subject()),
                    Err(e) => warn!("Failed to parse issuer from {}: {}", url, e),
                },
                Ok(None) => {}
                Err(e) => warn!("Failed to download issuer from {}: {}", url, e),
            }
        }
        Ok(None)
    }
}

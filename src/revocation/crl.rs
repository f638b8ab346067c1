use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use x509_parser::prelude::*;

use super::errors::{FetchError, RevocationError, RevocationResult};
use super::{OnlineRevocationSource, RevocationSource, lookup_direct, prioritize_urls};
use crate::crypto;
use crate::loader::{DataLoader, Protocol};
use crate::token::{
    CertificateStatus, CertificateToken, RevocationKind, RevocationToken, TokenError,
    asn1_time_to_chrono,
};

/// CRL source reading the certificate's CRL distribution points.
#[derive(Clone)]
pub struct OnlineCrlSource {
    loader: Arc<dyn DataLoader>,
    preferred_protocol: Option<Protocol>,
}

impl OnlineCrlSource {
    pub fn builder() -> OnlineCrlSourceBuilder {
        OnlineCrlSourceBuilder::default()
    }
}

/// Builder for `OnlineCrlSource`.
#[derive(Default)]
pub struct OnlineCrlSourceBuilder {
    loader: Option<Arc<dyn DataLoader>>,
    preferred_protocol: Option<Protocol>,
}

impl OnlineCrlSourceBuilder {
    pub fn loader(mut self, loader: Arc<dyn DataLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Try URLs of this protocol first.
    pub fn preferred_protocol(mut self, protocol: Option<Protocol>) -> Self {
        self.preferred_protocol = protocol;
        self
    }

    /// Fails when no loader was supplied.
    pub fn build(self) -> RevocationResult<OnlineCrlSource> {
        let loader = self.loader.ok_or_else(|| {
            RevocationError::Configuration("CRL source requires a data loader".to_string())
        })?;
        Ok(OnlineCrlSource {
            loader,
            preferred_protocol: self.preferred_protocol,
        })
    }
}

/// Parse a CRL and check it against `certificate` and its `issuer`.
pub(crate) fn parse_crl(
    der: Vec<u8>,
    certificate: &CertificateToken,
    issuer: &Arc<CertificateToken>,
) -> Result<RevocationToken, FetchError> {
    let (_, crl) = CertificateRevocationList::from_der(&der)
        .map_err(|e| FetchError::Parse(TokenError::X509(e.into())))?;

    if crl.tbs_cert_list.issuer.as_raw() != issuer.subject_raw() {
        return Err(FetchError::Invalid(
            "CRL issuer does not match certificate issuer".to_string(),
        ));
    }
    if !issuer.can_sign_crl() {
        return Err(FetchError::Invalid(
            "Issuer not authorized for CRL signing".to_string(),
        ));
    }
    crypto::verify_signature(
        &crl.signature_algorithm.algorithm.to_id_string(),
        issuer.public_key(),
        crl.tbs_cert_list.as_ref(),
        &crl.signature_value.data,
    )
    .map_err(|e| FetchError::Invalid(format!("CRL signature: {e}")))?;

    let this_update = asn1_time_to_chrono(crl.tbs_cert_list.this_update, "thisUpdate")?;
    let next_update = crl
        .tbs_cert_list
        .next_update
        .map(|t| asn1_time_to_chrono(t, "nextUpdate"))
        .transpose()?;

    // DER integers are minimal, so equal serials have equal encodings
    let mut status = CertificateStatus::Good;
    for revoked in crl.iter_revoked_certificates() {
        if revoked.raw_serial() == certificate.serial() {
            info!(
                "Certificate with serial {} is revoked",
                hex::encode(certificate.serial())
            );
            status = CertificateStatus::Revoked {
                revocation_time: asn1_time_to_chrono(revoked.revocation_date, "revocationDate")?,
                reason: revoked.reason_code().map(|(_, code)| code.0),
            };
            break;
        }
    }

    Ok(RevocationToken::crl(
        der,
        this_update,
        next_update,
        status,
        certificate.id(),
        issuer.clone(),
    ))
}

#[async_trait]
impl OnlineRevocationSource for OnlineCrlSource {
    fn kind(&self) -> RevocationKind {
        RevocationKind::Crl
    }

    fn candidate_urls(&self, certificate: &CertificateToken) -> Vec<String> {
        prioritize_urls(certificate.crl_urls(), self.preferred_protocol)
    }

    async fn fetch(
        &self,
        certificate: &CertificateToken,
        issuer: &Arc<CertificateToken>,
        url: &str,
        refresh: bool,
    ) -> Result<RevocationToken, FetchError> {
        let der = self
            .loader
            .get(url, refresh)
            .await?
            .ok_or(FetchError::NotAvailable)?;
        debug!("Parsing {} byte CRL from {}", der.len(), url);
        Ok(parse_crl(der, certificate, issuer)?.with_source_url(url))
    }
}

#[async_trait]
impl RevocationSource for OnlineCrlSource {
    async fn get_revocation_token(
        &self,
        certificate: &CertificateToken,
        issuer: &Arc<CertificateToken>,
    ) -> RevocationResult<Option<RevocationToken>> {
        lookup_direct(self, certificate, issuer).await
    }
}

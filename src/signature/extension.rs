use std::sync::Arc;

use tracing::{debug, info};

use super::document::{Document, DocumentFormat, SignatureInfo, TimestampScope};
use super::embedder::{ValidationDataBundle, build_dss_dictionary};
use super::errors::{ExtensionError, ExtensionResult};
use super::level::SignatureLevel;
use crate::crypto::DigestAlgorithm;
use crate::token::CertificateToken;
use crate::tsp::TspSource;
use crate::validation::ValidationContextBuilder;

/// Raises the signatures of a document to a target baseline level.
///
/// Each level requires the data of every level below it. The input document
/// is never modified; on error the partially extended copy is dropped.
pub struct SignatureExtender {
    format: Arc<dyn DocumentFormat>,
    tsp_source: Option<Arc<dyn TspSource>>,
    validation: ValidationContextBuilder,
    digest_algorithm: DigestAlgorithm,
}

impl SignatureExtender {
    /// `validation` is used to build one fresh context per signature.
    pub fn new(format: Arc<dyn DocumentFormat>, validation: ValidationContextBuilder) -> Self {
        Self {
            format,
            tsp_source: None,
            validation,
            digest_algorithm: DigestAlgorithm::default(),
        }
    }

    pub fn with_tsp_source(mut self, tsp_source: Arc<dyn TspSource>) -> Self {
        self.tsp_source = Some(tsp_source);
        self
    }

    /// Digest algorithm of time-stamp message imprints.
    pub fn with_digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest_algorithm;
        self
    }

    pub async fn extend(&self, document: &Document, target: SignatureLevel) -> ExtensionResult<Document> {
        if self.format.signatures(document)?.is_empty() {
            return Err(ExtensionError::NoSignatures);
        }
        info!("Extending document {:?} to {}", document.name, target);

        match target {
            SignatureLevel::B => Ok(document.clone()),
            SignatureLevel::T => self.extend_to_t(document).await,
            SignatureLevel::LT => self.extend_to_lt(document).await,
            SignatureLevel::LTA => self.extend_to_lta(document).await,
        }
    }

    /// Time-stamp every signature that has none yet.
    async fn extend_to_t(&self, document: &Document) -> ExtensionResult<Document> {
        let mut current = document.clone();
        for signature in self.format.signatures(document)? {
            if self
                .format
                .is_data_for_signature_level_present(&current, &signature, SignatureLevel::T)
            {
                debug!("Signature {} already time-stamped", signature.id);
                continue;
            }
            current = self
                .embed_timestamp(&current, &TimestampScope::Signature(signature.id.clone()))
                .await?;
        }
        Ok(current)
    }

    /// Cascade to T if needed, then embed freshly collected validation data.
    ///
    /// The dictionary is rebuilt from scratch on every call and appended, so
    /// repeated calls accumulate proofs.
    async fn extend_to_lt(&self, document: &Document) -> ExtensionResult<Document> {
        let missing_t = self.format.signatures(document)?.iter().any(|signature| {
            !self
                .format
                .is_data_for_signature_level_present(document, signature, SignatureLevel::T)
        });
        let current = if missing_t {
            self.extend_to_t(document).await?
        } else {
            document.clone()
        };

        // Reload so the new time-stamps are part of the collected data
        let signatures = self.format.signatures(&current)?;
        let mut bundles = Vec::with_capacity(signatures.len());
        for signature in &signatures {
            bundles.push(self.collect_validation_data(signature).await?);
        }

        let dss = build_dss_dictionary(bundles);
        info!(
            "Embedding validation data for {} signature(s)",
            dss.vri.len()
        );
        Ok(self.format.add_validation_data(&current, dss)?)
    }

    /// Add an archive time-stamp, or only reach LT when some signature lacks it.
    async fn extend_to_lta(&self, document: &Document) -> ExtensionResult<Document> {
        let missing_lt = self.format.signatures(document)?.iter().any(|signature| {
            !self
                .format
                .is_data_for_signature_level_present(document, signature, SignatureLevel::LT)
        });
        if missing_lt {
            debug!("Not every signature is at LT, stopping at LT");
            return self.extend_to_lt(document).await;
        }

        // The archive time-stamp intentionally goes through the same embedding
        // as signature time-stamps, scoped to the whole document.
        self.embed_timestamp(document, &TimestampScope::Document).await
    }

    async fn embed_timestamp(
        &self,
        document: &Document,
        scope: &TimestampScope,
    ) -> ExtensionResult<Document> {
        let tsp_source = self
            .tsp_source
            .as_ref()
            .ok_or(ExtensionError::MissingTspSource)?;

        let data = self.format.timestamp_data(document, scope)?;
        let digest = self.digest_algorithm.digest(&data);
        let token = tsp_source
            .get_timestamp_response(self.digest_algorithm, &digest)
            .await?;
        debug!("Embedding time-stamp {:?} for {:?}", token.id(), scope);
        Ok(self.format.add_timestamp(document, scope, &token)?)
    }

    async fn collect_validation_data(
        &self,
        signature: &SignatureInfo,
    ) -> ExtensionResult<ValidationDataBundle> {
        let context = self.validation.clone().build()?;

        if let Some(der) = &signature.signing_certificate {
            context.add_certificate_token_for_verification(Arc::new(CertificateToken::from_der(der)?));
        }
        for der in &signature.certificates {
            context.add_certificate_token_for_verification(Arc::new(CertificateToken::from_der(der)?));
        }
        for timestamp in &signature.timestamps {
            context.add_timestamp_token_for_verification(Arc::new(timestamp.clone()));
        }

        context.validate().await?;
        Ok(ValidationDataBundle::from_context(
            &signature.signature_value,
            &context,
        ))
    }
}

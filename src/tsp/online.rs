use std::sync::Arc;

use async_trait::async_trait;
use der::asn1::{BitString, Int, ObjectIdentifier, OctetString};
use der::{AnyRef, Decode, Encode, Sequence};
use tracing::{debug, info};

use super::errors::{TspError, TspResult};
use super::TspSource;
use crate::crypto::DigestAlgorithm;
use crate::loader::DataLoader;
use crate::token::{MessageImprint, TimestampToken};

/// ```text
/// TimeStampReq ::= SEQUENCE {
///     version         INTEGER { v1(1) },
///     messageImprint  MessageImprint,
///     reqPolicy       TSAPolicyId OPTIONAL,
///     nonce           INTEGER OPTIONAL,
///     certReq         BOOLEAN DEFAULT FALSE,
///     extensions      [0] IMPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TimeStampReq {
    pub version: u8,
    pub message_imprint: MessageImprint,
    pub req_policy: Option<ObjectIdentifier>,
    pub nonce: Option<Int>,
    pub cert_req: Option<bool>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkiStatusInfo {
    pub status: u8,
    pub status_string: Option<Vec<String>>,
    pub fail_info: Option<BitString>,
}

/// The token is kept as raw DER so its encoding survives untouched.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TimeStampResp<'a> {
    pub status: PkiStatusInfo,
    pub time_stamp_token: Option<AnyRef<'a>>,
}

/// Encode a `TimeStampReq` asking for the TSA certificate.
pub fn build_timestamp_request(
    digest_algorithm: DigestAlgorithm,
    digest: &[u8],
    policy_oid: Option<&str>,
) -> TspResult<Vec<u8>> {
    let req_policy = policy_oid
        .map(|policy| {
            ObjectIdentifier::new(policy).map_err(|e| {
                TspError::Configuration(format!("invalid policy OID {policy}: {e}"))
            })
        })
        .transpose()?;

    let request = TimeStampReq {
        version: 1,
        message_imprint: MessageImprint {
            hash_algorithm: digest_algorithm.algorithm_identifier(),
            hashed_message: OctetString::new(digest)?,
        },
        req_policy,
        nonce: None,
        cert_req: Some(true),
    };
    Ok(request.to_der()?)
}

/// Extract the token from a `TimeStampResp`.
///
/// PKIStatus granted (0) and grantedWithMods (1) are accepted.
fn parse_timestamp_response(der: &[u8]) -> TspResult<TimestampToken> {
    let response = TimeStampResp::from_der(der)?;
    if response.status.status > 1 {
        return Err(TspError::Rejected(response.status.status));
    }
    let token = response.time_stamp_token.ok_or(TspError::MissingToken)?;
    Ok(TimestampToken::from_der(token.to_der()?)?)
}

/// RFC 3161 client posting requests through a `DataLoader`.
#[derive(Clone)]
pub struct OnlineTspSource {
    url: String,
    loader: Arc<dyn DataLoader>,
    policy_oid: Option<String>,
}

impl OnlineTspSource {
    /// The loader should send `application/timestamp-query` as content type.
    pub fn new(url: impl Into<String>, loader: Arc<dyn DataLoader>) -> Self {
        Self {
            url: url.into(),
            loader,
            policy_oid: None,
        }
    }

    pub fn with_policy_oid(mut self, policy_oid: impl Into<String>) -> Self {
        self.policy_oid = Some(policy_oid.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TspSource for OnlineTspSource {
    async fn get_timestamp_response(
        &self,
        digest_algorithm: DigestAlgorithm,
        digest: &[u8],
    ) -> TspResult<TimestampToken> {
        let request = build_timestamp_request(digest_algorithm, digest, self.policy_oid.as_deref())?;
        debug!(
            "Requesting {} time-stamp from {}",
            digest_algorithm.name(),
            self.url
        );

        // Time-stamp replies are unique per request
        let response = self.loader.post(&self.url, &request, true).await?;
        let token = parse_timestamp_response(&response)?;
        if token.message_imprint().is_some_and(|imprint| imprint != digest) {
            return Err(TspError::ImprintMismatch);
        }

        info!(
            "Obtained time-stamp from {} at {}",
            self.url,
            token.generation_time()
        );
        Ok(token)
    }
}

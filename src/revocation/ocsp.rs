//! OCSP (RFC 6960) source
//!
//! Requests carry a single SHA-1 `CertID`; the matching `SingleResponse` must
//! repeat that CertID exactly (algorithm, both issuer hashes and serial).

use std::sync::Arc;

use async_trait::async_trait;
use der::asn1::{BitString, GeneralizedTime, Int, Null, ObjectIdentifier, OctetString};
use der::{AnyRef, Choice, Decode, Encode, Enumerated, Sequence};
use spki::AlgorithmIdentifierOwned;
use tracing::{debug, warn};
use x509_cert::Certificate;
use x509_cert::ext::Extensions;
use x509_cert::ext::pkix::CrlReason;
use x509_cert::name::Name;

use super::errors::{FetchError, RevocationError, RevocationResult};
use super::{OnlineRevocationSource, RevocationSource, lookup_direct, prioritize_urls};
use crate::crypto::{self, DigestAlgorithm};
use crate::loader::{DataLoader, Protocol};
use crate::token::{
    CertificateStatus, CertificateToken, RevocationKind, RevocationToken, TokenError, TokenResult,
    generalized_time_to_chrono,
};

pub const OID_OCSP_BASIC: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.1");

/// Names the certificate a request or single response is about.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertId {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub issuer_name_hash: OctetString,
    pub issuer_key_hash: OctetString,
    pub serial_number: Int,
}

impl CertId {
    /// SHA-1 CertID of `certificate` as issued by `issuer`.
    pub fn new(certificate: &CertificateToken, issuer: &CertificateToken) -> der::Result<Self> {
        Ok(Self {
            hash_algorithm: DigestAlgorithm::Sha1.algorithm_identifier(),
            issuer_name_hash: OctetString::new(crypto::sha1(issuer.subject_raw()))?,
            issuer_key_hash: OctetString::new(crypto::sha1(issuer.public_key()))?,
            serial_number: Int::new(certificate.serial())?,
        })
    }

    /// Responders may drop the NULL hash parameters, so only the OID counts.
    pub fn matches(&self, other: &CertId) -> bool {
        self.hash_algorithm.oid == other.hash_algorithm.oid
            && self.issuer_name_hash == other.issuer_name_hash
            && self.issuer_key_hash == other.issuer_key_hash
            && self.serial_number == other.serial_number
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Request {
    pub req_cert: CertId,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TbsRequest {
    pub request_list: Vec<Request>,
}

/// Unsigned `OCSPRequest`.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct OcspRequest {
    pub tbs_request: TbsRequest,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Enumerated)]
#[repr(u8)]
pub enum OcspResponseStatus {
    Successful = 0,
    MalformedRequest = 1,
    InternalError = 2,
    TryLater = 3,
    SigRequired = 5,
    Unauthorized = 6,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ResponseBytes {
    pub response_type: ObjectIdentifier,
    pub response: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct OcspResponse {
    pub response_status: OcspResponseStatus,
    #[asn1(context_specific = "0", optional = "true")]
    pub response_bytes: Option<ResponseBytes>,
}

/// `tbsResponseData` stays raw: the signature covers its exact encoding.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct BasicOcspResponse<'a> {
    pub tbs_response_data: AnyRef<'a>,
    pub signature_algorithm: AlgorithmIdentifierOwned,
    pub signature: BitString,
    #[asn1(context_specific = "0", optional = "true")]
    pub certs: Option<Vec<Certificate>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub enum ResponderId {
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", constructed = "true")]
    ByName(Name),
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", constructed = "true")]
    ByKey(OctetString),
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ResponseData {
    #[asn1(context_specific = "0", optional = "true")]
    pub version: Option<u8>,
    pub responder_id: ResponderId,
    pub produced_at: GeneralizedTime,
    pub responses: Vec<SingleResponse>,
    #[asn1(context_specific = "1", optional = "true")]
    pub response_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct RevokedInfo {
    pub revocation_time: GeneralizedTime,
    #[asn1(context_specific = "0", optional = "true")]
    pub revocation_reason: Option<CrlReason>,
}

#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub enum CertStatus {
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    Good(Null),
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", constructed = "true")]
    Revoked(RevokedInfo),
    #[asn1(context_specific = "2", tag_mode = "IMPLICIT")]
    Unknown(Null),
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub cert_status: CertStatus,
    pub this_update: GeneralizedTime,
    #[asn1(context_specific = "0", optional = "true")]
    pub next_update: Option<GeneralizedTime>,
    #[asn1(context_specific = "1", optional = "true")]
    pub single_extensions: Option<Extensions>,
}

/// Encode an unsigned single-certificate `OCSPRequest`.
pub fn build_ocsp_request(cert_id: &CertId) -> der::Result<Vec<u8>> {
    OcspRequest {
        tbs_request: TbsRequest {
            request_list: vec![Request {
                req_cert: cert_id.clone(),
            }],
        },
    }
    .to_der()
}

struct BasicResponse {
    tbs: Vec<u8>,
    data: ResponseData,
    signature_algorithm: String,
    signature: Vec<u8>,
    certificates: Vec<Vec<u8>>,
}

enum OcspReply {
    Successful(BasicResponse),
    Unsuccessful(u8),
}

fn parse_response(der: &[u8]) -> TokenResult<OcspReply> {
    let response = OcspResponse::from_der(der)?;
    if response.response_status != OcspResponseStatus::Successful {
        return Ok(OcspReply::Unsuccessful(response.response_status as u8));
    }

    let bytes = response.response_bytes.ok_or_else(|| {
        TokenError::Malformed("successful OCSP response without body".to_string())
    })?;
    if bytes.response_type != OID_OCSP_BASIC {
        return Err(TokenError::Malformed(format!(
            "OCSP response type {} is not basic",
            bytes.response_type
        )));
    }

    let basic = BasicOcspResponse::from_der(bytes.response.as_bytes())?;
    let tbs = basic.tbs_response_data.to_der()?;
    let data = ResponseData::from_der(&tbs)?;
    let certificates = basic
        .certs
        .iter()
        .flatten()
        .map(|certificate| certificate.to_der())
        .collect::<der::Result<Vec<_>>>()?;

    Ok(OcspReply::Successful(BasicResponse {
        tbs,
        data,
        signature_algorithm: basic.signature_algorithm.oid.to_string(),
        signature: basic.signature.raw_bytes().to_vec(),
        certificates,
    }))
}

fn certificate_status(status: &CertStatus) -> TokenResult<CertificateStatus> {
    Ok(match status {
        CertStatus::Good(_) => CertificateStatus::Good,
        CertStatus::Revoked(info) => CertificateStatus::Revoked {
            revocation_time: generalized_time_to_chrono(&info.revocation_time, "revocationTime")?,
            reason: info.revocation_reason.map(|reason| reason as u8),
        },
        CertStatus::Unknown(_) => CertificateStatus::Unknown,
    })
}

/// Find who signed the response: the issuer itself, or a responder
/// certificate shipped in the response and issued by it.
fn find_signer(
    response: &BasicResponse,
    issuer: &Arc<CertificateToken>,
) -> Result<Arc<CertificateToken>, FetchError> {
    let signed_by = |key: &[u8]| {
        crypto::verify_signature(
            &response.signature_algorithm,
            key,
            &response.tbs,
            &response.signature,
        )
        .is_ok()
    };

    if signed_by(issuer.public_key()) {
        return Ok(issuer.clone());
    }

    for der in &response.certificates {
        let responder = match CertificateToken::from_der(der) {
            Ok(token) => token,
            Err(e) => {
                warn!("Skipping unparsable responder certificate: {e}");
                continue;
            }
        };
        if responder.is_signed_by(issuer) && signed_by(responder.public_key()) {
            return Ok(Arc::new(responder));
        }
    }

    Err(FetchError::Invalid(
        "OCSP response signature does not verify".to_string(),
    ))
}

/// OCSP source querying the responders named in the certificate's AIA.
#[derive(Clone)]
pub struct OnlineOcspSource {
    loader: Arc<dyn DataLoader>,
    preferred_protocol: Option<Protocol>,
}

impl OnlineOcspSource {
    pub fn builder() -> OnlineOcspSourceBuilder {
        OnlineOcspSourceBuilder::default()
    }
}

/// Builder for `OnlineOcspSource`.
#[derive(Default)]
pub struct OnlineOcspSourceBuilder {
    loader: Option<Arc<dyn DataLoader>>,
    preferred_protocol: Option<Protocol>,
}

impl OnlineOcspSourceBuilder {
    /// Loader used for POSTing requests; it should send
    /// `application/ocsp-request` as content type.
    pub fn loader(mut self, loader: Arc<dyn DataLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn preferred_protocol(mut self, protocol: Option<Protocol>) -> Self {
        self.preferred_protocol = protocol;
        self
    }

    /// Fails when no loader was supplied.
    pub fn build(self) -> RevocationResult<OnlineOcspSource> {
        let loader = self.loader.ok_or_else(|| {
            RevocationError::Configuration("OCSP source requires a data loader".to_string())
        })?;
        Ok(OnlineOcspSource {
            loader,
            preferred_protocol: self.preferred_protocol,
        })
    }
}

#[async_trait]
impl OnlineRevocationSource for OnlineOcspSource {
    fn kind(&self) -> RevocationKind {
        RevocationKind::Ocsp
    }

    fn candidate_urls(&self, certificate: &CertificateToken) -> Vec<String> {
        prioritize_urls(certificate.ocsp_urls(), self.preferred_protocol)
    }

    async fn fetch(
        &self,
        certificate: &CertificateToken,
        issuer: &Arc<CertificateToken>,
        url: &str,
        refresh: bool,
    ) -> Result<RevocationToken, FetchError> {
        let cert_id = CertId::new(certificate, issuer).map_err(TokenError::from)?;
        let request = build_ocsp_request(&cert_id).map_err(TokenError::from)?;
        let der = self.loader.post(url, &request, refresh).await?;
        if der.is_empty() {
            return Err(FetchError::NotAvailable);
        }

        let response = match parse_response(&der)? {
            OcspReply::Successful(response) => response,
            OcspReply::Unsuccessful(status) => {
                return Err(FetchError::Invalid(format!(
                    "responder returned status {status}"
                )));
            }
        };

        let single = response
            .data
            .responses
            .iter()
            .find(|single| single.cert_id.matches(&cert_id))
            .ok_or_else(|| {
                FetchError::Invalid("no response for the requested CertID".to_string())
            })?;
        let signer = find_signer(&response, issuer)?;
        let status = certificate_status(&single.cert_status)?;
        debug!(
            "OCSP status for {} from {}: {:?}",
            certificate.subject(),
            url,
            status
        );

        let token = RevocationToken::ocsp(
            der.clone(),
            generalized_time_to_chrono(&response.data.produced_at, "producedAt")?,
            generalized_time_to_chrono(&single.this_update, "thisUpdate")?,
            single
                .next_update
                .as_ref()
                .map(|time| generalized_time_to_chrono(time, "nextUpdate"))
                .transpose()?,
            status,
            certificate.id(),
            vec![signer],
        );
        Ok(token.with_source_url(url))
    }
}

#[async_trait]
impl RevocationSource for OnlineOcspSource {
    async fn get_revocation_token(
        &self,
        certificate: &CertificateToken,
        issuer: &Arc<CertificateToken>,
    ) -> RevocationResult<Option<RevocationToken>> {
        lookup_direct(self, certificate, issuer).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn cert_id(serial: &[u8], name_hash: u8) -> CertId {
        CertId {
            hash_algorithm: DigestAlgorithm::Sha1.algorithm_identifier(),
            issuer_name_hash: OctetString::new([name_hash; 20]).unwrap(),
            issuer_key_hash: OctetString::new([2u8; 20]).unwrap(),
            serial_number: Int::new(serial).unwrap(),
        }
    }

    fn time(secs: u64) -> GeneralizedTime {
        GeneralizedTime::from_unix_duration(Duration::from_secs(secs)).unwrap()
    }

    #[test]
    fn test_builder_requires_loader() {
        let result = OnlineOcspSource::builder().build();
        assert!(matches!(result, Err(RevocationError::Configuration(_))));
    }

    #[test]
    fn test_unsuccessful_status() {
        let der = OcspResponse {
            response_status: OcspResponseStatus::TryLater,
            response_bytes: None,
        }
        .to_der()
        .unwrap();
        assert!(matches!(
            parse_response(&der),
            Ok(OcspReply::Unsuccessful(3))
        ));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            parse_response(b"not der"),
            Err(TokenError::Der(_))
        ));
    }

    #[test]
    fn test_request_round_trips() {
        let id = cert_id(&[0x00, 0x9A], 1);
        let request = OcspRequest::from_der(&build_ocsp_request(&id).unwrap()).unwrap();
        assert_eq!(request.tbs_request.request_list.len(), 1);
        assert_eq!(request.tbs_request.request_list[0].req_cert, id);
    }

    #[test]
    fn test_cert_id_match_covers_issuer_hashes() {
        let requested = cert_id(&[0x2A], 1);

        let mut without_params = requested.clone();
        without_params.hash_algorithm.parameters = None;
        assert!(requested.matches(&without_params));

        assert!(!requested.matches(&cert_id(&[0x2A], 9)));
        assert!(!requested.matches(&cert_id(&[0x2B], 1)));

        let mut other_key = requested.clone();
        other_key.issuer_key_hash = OctetString::new([7u8; 20]).unwrap();
        assert!(!requested.matches(&other_key));

        let mut other_algorithm = requested.clone();
        other_algorithm.hash_algorithm = DigestAlgorithm::Sha256.algorithm_identifier();
        assert!(!requested.matches(&other_algorithm));
    }

    #[test]
    fn test_single_response_revoked() {
        let single = SingleResponse {
            cert_id: cert_id(&[0x00, 0x9A], 1),
            cert_status: CertStatus::Revoked(RevokedInfo {
                revocation_time: time(1_704_067_200),
                revocation_reason: Some(CrlReason::KeyCompromise),
            }),
            this_update: time(1_704_153_600),
            next_update: Some(time(1_704_758_400)),
            single_extensions: None,
        };
        let decoded = SingleResponse::from_der(&single.to_der().unwrap()).unwrap();
        assert_eq!(decoded, single);

        match certificate_status(&decoded.cert_status).unwrap() {
            CertificateStatus::Revoked {
                revocation_time,
                reason,
            } => {
                assert_eq!(revocation_time.to_rfc3339(), "2024-01-01T00:00:00+00:00");
                assert_eq!(reason, Some(1));
            }
            other => panic!("Expected revoked status, got {other:?}"),
        }
    }
}

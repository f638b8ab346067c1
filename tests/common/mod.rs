#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams, CrlDistributionPoint,
    CustomExtension, DistinguishedName, DnType, IsCa, Issuer, KeyIdMethod, KeyPair,
    KeyUsagePurpose, RevocationReason, RevokedCertParams, SerialNumber,
};
use der::asn1::{BitString, GeneralizedTime, Ia5String, Null, ObjectIdentifier, OctetString};
use der::{AnyRef, Decode, Encode};
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair};
use serde::{Deserialize, Serialize};
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{AccessDescription, AuthorityInfoAccessSyntax, CrlReason};

use ltv_engine::crypto::{self, DigestAlgorithm};
use ltv_engine::loader::{DataLoader, LoaderError, LoaderResult};
use ltv_engine::revocation::ocsp::{
    BasicOcspResponse, CertId, CertStatus, OID_OCSP_BASIC, OcspResponse, OcspResponseStatus,
    ResponderId, ResponseBytes, ResponseData, RevokedInfo, SingleResponse,
};
use ltv_engine::signature::{
    Document, DocumentError, DocumentFormat, DocumentResult, DssDictionary, SignatureInfo,
    SignatureLevel, TimestampScope, vri_key,
};
use ltv_engine::token::{CertificateToken, TimestampToken};
use ltv_engine::tsp::{TspResult, TspSource};

const OID_AUTHORITY_INFO_ACCESS: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 1];
const OID_ACCESS_OCSP: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1");
const OID_ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

// ---------------------------------------------------------------------------
// PKI fixture
// ---------------------------------------------------------------------------

/// A certificate authority able to issue certificates, CRLs and OCSP responses.
pub struct TestCa {
    pub issuer: Issuer<'static, KeyPair>,
    pub der: Vec<u8>,
    pkcs8: Vec<u8>,
}

/// Options for an issued certificate.
#[derive(Default)]
pub struct LeafOptions<'a> {
    pub serial: Option<u64>,
    pub crl_urls: &'a [&'a str],
    pub ocsp_urls: &'a [&'a str],
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn.push(DnType::OrganizationName, "Test Organization");
    dn
}

fn authority_info_access(ocsp_urls: &[&str]) -> CustomExtension {
    let aia = AuthorityInfoAccessSyntax(
        ocsp_urls
            .iter()
            .map(|url| AccessDescription {
                access_method: OID_ACCESS_OCSP,
                access_location: GeneralName::UniformResourceIdentifier(
                    Ia5String::new(url).unwrap(),
                ),
            })
            .collect(),
    );
    CustomExtension::from_oid_content(OID_AUTHORITY_INFO_ACCESS, aia.to_der().unwrap())
}

fn apply_options(params: &mut CertificateParams, options: &LeafOptions<'_>) {
    if let Some(serial) = options.serial {
        params.serial_number = Some(SerialNumber::from(serial));
    }
    if !options.crl_urls.is_empty() {
        params.crl_distribution_points = vec![CrlDistributionPoint {
            uris: options.crl_urls.iter().map(|u| u.to_string()).collect(),
        }];
    }
    if !options.ocsp_urls.is_empty() {
        params.custom_extensions = vec![authority_info_access(options.ocsp_urls)];
    }
}

fn ca_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params
}

impl TestCa {
    pub fn root(common_name: &str) -> Self {
        let params = ca_params(common_name);
        let key_pair = KeyPair::generate().unwrap();
        let pkcs8 = key_pair.serialize_der();
        let cert = params.self_signed(&key_pair).unwrap();
        Self {
            der: cert.der().to_vec(),
            issuer: Issuer::new(params, key_pair),
            pkcs8,
        }
    }

    /// An intermediate CA issued by `self`.
    pub fn intermediate(&self, common_name: &str, options: LeafOptions<'_>) -> TestCa {
        let mut params = ca_params(common_name);
        apply_options(&mut params, &options);
        let key_pair = KeyPair::generate().unwrap();
        let pkcs8 = key_pair.serialize_der();
        let cert = params.signed_by(&key_pair, &self.issuer).unwrap();
        TestCa {
            der: cert.der().to_vec(),
            issuer: Issuer::new(params, key_pair),
            pkcs8,
        }
    }

    /// An end-entity certificate issued by `self`.
    pub fn leaf(&self, common_name: &str, options: LeafOptions<'_>) -> Vec<u8> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name);
        params.is_ca = IsCa::NoCa;
        apply_options(&mut params, &options);
        let key_pair = KeyPair::generate().unwrap();
        params.signed_by(&key_pair, &self.issuer).unwrap().der().to_vec()
    }

    pub fn token(&self) -> Arc<CertificateToken> {
        Arc::new(CertificateToken::from_der(&self.der).unwrap())
    }

    /// A CRL valid from an hour ago for a week, revoking `revoked` serials.
    pub fn crl(&self, revoked: &[u64]) -> Vec<u8> {
        let now = time::OffsetDateTime::now_utc();
        let params = CertificateRevocationListParams {
            this_update: now - time::Duration::hours(1),
            next_update: now + time::Duration::days(7),
            crl_number: SerialNumber::from(1u64),
            issuing_distribution_point: None,
            revoked_certs: revoked
                .iter()
                .map(|serial| RevokedCertParams {
                    serial_number: SerialNumber::from(*serial),
                    revocation_time: now - time::Duration::hours(2),
                    reason_code: Some(RevocationReason::KeyCompromise),
                    invalidity_date: None,
                })
                .collect(),
            key_identifier_method: KeyIdMethod::Sha256,
        };
        params.signed_by(&self.issuer).unwrap().der().to_vec()
    }

    /// A successful OCSP response about `certificate`, signed with this CA's key.
    pub fn ocsp_response(&self, certificate: &CertificateToken, revoked: bool) -> Vec<u8> {
        let cert_id = CertId::new(certificate, &self.token()).unwrap();
        self.ocsp_response_for(cert_id, revoked)
    }

    /// A successful OCSP response answering for `cert_id`, signed with this
    /// CA's key whatever the CertID names.
    pub fn ocsp_response_for(&self, cert_id: CertId, revoked: bool) -> Vec<u8> {
        let now = Utc::now();
        let cert_status = if revoked {
            CertStatus::Revoked(RevokedInfo {
                revocation_time: generalized_time(now - TimeDelta::days(1)),
                revocation_reason: Some(CrlReason::KeyCompromise),
            })
        } else {
            CertStatus::Good(Null)
        };
        let data = ResponseData {
            version: None,
            responder_id: ResponderId::ByKey(
                OctetString::new(crypto::sha1(self.token().public_key())).unwrap(),
            ),
            produced_at: generalized_time(now),
            responses: vec![SingleResponse {
                cert_id,
                cert_status,
                this_update: generalized_time(now - TimeDelta::hours(1)),
                next_update: Some(generalized_time(now + TimeDelta::days(1))),
                single_extensions: None,
            }],
            response_extensions: None,
        };

        let tbs = data.to_der().unwrap();
        let signature = self.sign(&tbs);
        let basic = BasicOcspResponse {
            tbs_response_data: AnyRef::from_der(&tbs).unwrap(),
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: OID_ECDSA_WITH_SHA256,
                parameters: None,
            },
            signature: BitString::from_bytes(&signature).unwrap(),
            certs: None,
        };

        OcspResponse {
            response_status: OcspResponseStatus::Successful,
            response_bytes: Some(ResponseBytes {
                response_type: OID_OCSP_BASIC,
                response: OctetString::new(basic.to_der().unwrap()).unwrap(),
            }),
        }
        .to_der()
        .unwrap()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let rng = SystemRandom::new();
        let key = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &self.pkcs8, &rng).unwrap();
        key.sign(&rng, message).unwrap().as_ref().to_vec()
    }
}

fn generalized_time(time: DateTime<Utc>) -> GeneralizedTime {
    GeneralizedTime::from_unix_duration(Duration::from_secs(time.timestamp() as u64)).unwrap()
}

// ---------------------------------------------------------------------------
// In-memory loader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderCall {
    pub method: &'static str,
    pub url: String,
    pub refresh: bool,
}

/// Serves canned responses and records every call.
#[derive(Default)]
pub struct MemoryLoader {
    get_responses: Mutex<HashMap<String, Vec<u8>>>,
    post_responses: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<LoaderCall>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve_get(&self, url: &str, body: Vec<u8>) {
        self.get_responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body);
    }

    pub fn serve_post(&self, url: &str, body: Vec<u8>) {
        self.post_responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body);
    }

    pub fn calls(&self) -> Vec<LoaderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, method: &'static str, url: &str, refresh: bool) {
        self.calls.lock().unwrap().push(LoaderCall {
            method,
            url: url.to_string(),
            refresh,
        });
    }
}

#[async_trait]
impl DataLoader for MemoryLoader {
    async fn get(&self, url: &str, refresh: bool) -> LoaderResult<Option<Vec<u8>>> {
        self.record("GET", url, refresh);
        Ok(self.get_responses.lock().unwrap().get(url).cloned())
    }

    async fn post(&self, url: &str, _body: &[u8], refresh: bool) -> LoaderResult<Vec<u8>> {
        self.record("POST", url, refresh);
        self.post_responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| LoaderError::Status {
                status: 404,
                url: url.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Time-stamping authority double
// ---------------------------------------------------------------------------

/// Issues distinct opaque tokens and counts requests.
#[derive(Default)]
pub struct CountingTsp {
    issued: AtomicUsize,
}

impl CountingTsp {
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TspSource for CountingTsp {
    async fn get_timestamp_response(
        &self,
        _digest_algorithm: DigestAlgorithm,
        digest: &[u8],
    ) -> TspResult<TimestampToken> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let mut encoded = format!("tst-{n}:").into_bytes();
        encoded.extend_from_slice(digest);
        Ok(TimestampToken::new(encoded, Utc::now(), Vec::new()))
    }
}

// ---------------------------------------------------------------------------
// JSON document format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTimestamp {
    pub encoded: Vec<u8>,
    pub generation_time: DateTime<Utc>,
}

impl From<&TimestampToken> for StoredTimestamp {
    fn from(token: &TimestampToken) -> Self {
        Self {
            encoded: token.encoded().to_vec(),
            generation_time: token.generation_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSignature {
    pub id: String,
    pub signature_value: Vec<u8>,
    pub signing_certificate: Option<Vec<u8>>,
    pub certificates: Vec<Vec<u8>>,
    pub timestamps: Vec<StoredTimestamp>,
}

/// Document content understood by `JsonFormat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonDocument {
    pub signatures: Vec<StoredSignature>,
    pub dss_revisions: Vec<DssDictionary>,
    pub document_timestamps: Vec<StoredTimestamp>,
}

impl JsonDocument {
    pub fn parse(document: &Document) -> Self {
        serde_json::from_slice(&document.bytes).unwrap()
    }

    pub fn to_document(&self) -> Document {
        Document::new(serde_json::to_vec(self).unwrap()).with_name("test.json")
    }

    pub fn global_certificates(&self) -> usize {
        self.dss_revisions
            .iter()
            .map(|dss| dss.certificates.as_ref().map_or(0, Vec::len))
            .sum()
    }

    pub fn global_crls(&self) -> usize {
        self.dss_revisions
            .iter()
            .map(|dss| dss.crls.as_ref().map_or(0, Vec::len))
            .sum()
    }

    pub fn signature_timestamps(&self) -> Vec<Vec<u8>> {
        self.signatures
            .iter()
            .flat_map(|s| s.timestamps.iter().map(|t| t.encoded.clone()))
            .collect()
    }
}

pub fn signed_document(signing_certificate: &[u8], signature_count: usize) -> Document {
    JsonDocument {
        signatures: (0..signature_count)
            .map(|i| StoredSignature {
                id: format!("sig-{i}"),
                signature_value: format!("signature value {i}").into_bytes(),
                signing_certificate: Some(signing_certificate.to_vec()),
                certificates: Vec::new(),
                timestamps: Vec::new(),
            })
            .collect(),
        ..Default::default()
    }
    .to_document()
}

/// A document format storing everything as JSON.
pub struct JsonFormat;

fn load(document: &Document) -> DocumentResult<JsonDocument> {
    serde_json::from_slice(&document.bytes).map_err(|e| DocumentError::Malformed(e.to_string()))
}

fn store(document: &Document, content: &JsonDocument) -> DocumentResult<Document> {
    let bytes = serde_json::to_vec(content).map_err(|e| DocumentError::Malformed(e.to_string()))?;
    Ok(Document {
        name: document.name.clone(),
        bytes,
    })
}

impl DocumentFormat for JsonFormat {
    fn signatures(&self, document: &Document) -> DocumentResult<Vec<SignatureInfo>> {
        Ok(load(document)?
            .signatures
            .into_iter()
            .map(|s| SignatureInfo {
                id: s.id,
                signature_value: s.signature_value,
                signing_certificate: s.signing_certificate,
                certificates: s.certificates,
                timestamps: s
                    .timestamps
                    .into_iter()
                    .map(|t| TimestampToken::new(t.encoded, t.generation_time, Vec::new()))
                    .collect(),
            })
            .collect())
    }

    fn is_data_for_signature_level_present(
        &self,
        document: &Document,
        signature: &SignatureInfo,
        level: SignatureLevel,
    ) -> bool {
        let Ok(content) = load(document) else {
            return false;
        };
        match level {
            SignatureLevel::B => true,
            SignatureLevel::T => content
                .signatures
                .iter()
                .any(|s| s.id == signature.id && !s.timestamps.is_empty()),
            SignatureLevel::LT => {
                let key = vri_key(&signature.signature_value);
                content.dss_revisions.iter().any(|dss| dss.vri.contains_key(&key))
            }
            SignatureLevel::LTA => !content.document_timestamps.is_empty(),
        }
    }

    fn timestamp_data(&self, document: &Document, scope: &TimestampScope) -> DocumentResult<Vec<u8>> {
        match scope {
            TimestampScope::Signature(id) => load(document)?
                .signatures
                .into_iter()
                .find(|s| &s.id == id)
                .map(|s| s.signature_value)
                .ok_or_else(|| DocumentError::UnknownSignature(id.clone())),
            TimestampScope::Document => Ok(document.bytes.clone()),
        }
    }

    fn add_timestamp(
        &self,
        document: &Document,
        scope: &TimestampScope,
        token: &TimestampToken,
    ) -> DocumentResult<Document> {
        let mut content = load(document)?;
        match scope {
            TimestampScope::Signature(id) => content
                .signatures
                .iter_mut()
                .find(|s| &s.id == id)
                .ok_or_else(|| DocumentError::UnknownSignature(id.clone()))?
                .timestamps
                .push(token.into()),
            TimestampScope::Document => content.document_timestamps.push(token.into()),
        }
        store(document, &content)
    }

    fn add_validation_data(&self, document: &Document, dss: DssDictionary) -> DocumentResult<Document> {
        let mut content = load(document)?;
        content.dss_revisions.push(dss);
        store(document, &content)
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::prelude::*;

use super::{TokenError, TokenId, TokenResult, asn1_time_to_chrono};
use crate::crypto;

const OID_ACCESS_OCSP: &str = "1.3.6.1.5.5.7.48.1";
const OID_ACCESS_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";

/// An X.509 certificate, parsed once at construction.
///
/// Tokens are immutable and may be shared between validation runs; issuer
/// links live in the run that resolved them.
pub struct CertificateToken {
    id: TokenId,
    encoded: Vec<u8>,
    subject: String,
    subject_raw: Vec<u8>,
    issuer_raw: Vec<u8>,
    serial: Vec<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    public_key: Vec<u8>,
    tbs: Vec<u8>,
    signature_algorithm: String,
    signature: Vec<u8>,
    crl_urls: Vec<String>,
    ocsp_urls: Vec<String>,
    ca_issuers_urls: Vec<String>,
    crl_sign: bool,
}

impl CertificateToken {
    /// Create a certificate token from DER-encoded bytes
    pub fn from_der(der: impl AsRef<[u8]>) -> TokenResult<Self> {
        let der = der.as_ref();
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| TokenError::X509(e.into()))?;

        let mut crl_urls = Vec::new();
        let mut ocsp_urls = Vec::new();
        let mut ca_issuers_urls = Vec::new();
        // No key usage extension means no restriction
        let mut crl_sign = true;

        for ext in cert.tbs_certificate.extensions() {
            match ext.parsed_extension() {
                ParsedExtension::CRLDistributionPoints(points) => {
                    for point in points.iter() {
                        if let Some(DistributionPointName::FullName(names)) = &point.distribution_point
                        {
                            crl_urls.extend(names.iter().filter_map(uri_of));
                        }
                    }
                }
                ParsedExtension::AuthorityInfoAccess(aia) => {
                    for desc in &aia.accessdescs {
                        let method = desc.access_method.to_id_string();
                        let Some(url) = uri_of(&desc.access_location) else {
                            continue;
                        };
                        if method == OID_ACCESS_OCSP {
                            ocsp_urls.push(url);
                        } else if method == OID_ACCESS_CA_ISSUERS {
                            ca_issuers_urls.push(url);
                        }
                    }
                }
                ParsedExtension::KeyUsage(ku) => crl_sign = ku.crl_sign(),
                _ => {}
            }
        }

        let token = Self {
            id: TokenId::from_encoding(der),
            encoded: der.to_vec(),
            subject: cert.subject().to_string(),
            subject_raw: cert.subject().as_raw().to_vec(),
            issuer_raw: cert.issuer().as_raw().to_vec(),
            serial: cert.tbs_certificate.raw_serial().to_vec(),
            not_before: asn1_time_to_chrono(cert.validity().not_before, "notBefore")?,
            not_after: asn1_time_to_chrono(cert.validity().not_after, "notAfter")?,
            public_key: cert.public_key().subject_public_key.data.to_vec(),
            tbs: cert.tbs_certificate.as_ref().to_vec(),
            signature_algorithm: cert.signature_algorithm.algorithm.to_id_string(),
            signature: cert.signature_value.data.to_vec(),
            crl_urls,
            ocsp_urls,
            ca_issuers_urls,
            crl_sign,
        };
        debug!(subject = %token.subject, id = ?token.id, "Parsed certificate token");
        Ok(token)
    }

    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// Subject DN in RFC 4514 form, for display only.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn subject_raw(&self) -> &[u8] {
        &self.subject_raw
    }

    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer_raw
    }

    /// Serial number content octets as encoded in the certificate.
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Content of the subjectPublicKey BIT STRING.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn crl_urls(&self) -> &[String] {
        &self.crl_urls
    }

    pub fn ocsp_urls(&self) -> &[String] {
        &self.ocsp_urls
    }

    pub fn ca_issuers_urls(&self) -> &[String] {
        &self.ca_issuers_urls
    }

    /// Whether the certificate may sign CRLs (cRLSign bit, or no key usage at all).
    pub fn can_sign_crl(&self) -> bool {
        self.crl_sign
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject_raw == self.issuer_raw && self.is_signed_by(self)
    }

    pub fn is_valid_at(&self, time: DateTime<Utc>) -> bool {
        self.not_before <= time && time <= self.not_after
    }

    /// Check that `issuer` names this certificate's issuer and its key verifies
    /// this certificate's signature.
    pub fn is_signed_by(&self, issuer: &CertificateToken) -> bool {
        self.issuer_raw == issuer.subject_raw
            && crypto::verify_signature(
                &self.signature_algorithm,
                &issuer.public_key,
                &self.tbs,
                &self.signature,
            )
            .is_ok()
    }
}

fn uri_of(name: &GeneralName<'_>) -> Option<String> {
    match name {
        GeneralName::URI(uri) => Some(uri.to_string()),
        _ => None,
    }
}

impl PartialEq for CertificateToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CertificateToken {}

impl fmt::Debug for CertificateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateToken")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("serial", &hex::encode(&self.serial))
            .finish()
    }
}

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use der::asn1::{GeneralizedTime, Int, ObjectIdentifier, OctetString};
use der::{Decode, Encode, Sequence, Tag, Tagged};
use spki::AlgorithmIdentifierOwned;
use tracing::{debug, warn};
use x509_cert::ext::Extensions;
use x509_cert::ext::pkix::name::GeneralName;

use super::{
    CertificateToken, TokenError, TokenId, TokenResult, generalized_time_to_chrono,
};

pub(crate) const OID_SIGNED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
pub(crate) const OID_TST_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");

/// Digest of the time-stamped data.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct MessageImprint {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub hashed_message: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Accuracy {
    pub seconds: Option<u32>,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub millis: Option<u16>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub micros: Option<u16>,
}

/// RFC 3161 `TSTInfo`, the signed content of a time-stamp token.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TstInfo {
    pub version: u8,
    pub policy: ObjectIdentifier,
    pub message_imprint: MessageImprint,
    pub serial_number: Int,
    pub gen_time: GeneralizedTime,
    pub accuracy: Option<Accuracy>,
    pub ordering: Option<bool>,
    pub nonce: Option<Int>,
    #[asn1(context_specific = "0", optional = "true")]
    pub tsa: Option<GeneralName>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub extensions: Option<Extensions>,
}

/// An RFC 3161 time-stamp token.
#[derive(Clone)]
pub struct TimestampToken {
    id: TokenId,
    encoded: Vec<u8>,
    generation_time: DateTime<Utc>,
    message_imprint: Option<Vec<u8>>,
    certificates: Vec<Arc<CertificateToken>>,
}

impl TimestampToken {
    /// Build a token from already extracted parts.
    pub fn new(
        encoded: Vec<u8>,
        generation_time: DateTime<Utc>,
        certificates: Vec<Arc<CertificateToken>>,
    ) -> Self {
        Self {
            id: TokenId::from_encoding(&encoded),
            encoded,
            generation_time,
            message_imprint: None,
            certificates,
        }
    }

    /// Parse a DER `ContentInfo` wrapping CMS SignedData with TSTInfo content.
    pub fn from_der(der: impl AsRef<[u8]>) -> TokenResult<Self> {
        let der = der.as_ref();
        let content_info = ContentInfo::from_der(der)?;
        if content_info.content_type != OID_SIGNED_DATA {
            return Err(TokenError::Malformed(format!(
                "timestamp content type {} is not SignedData",
                content_info.content_type
            )));
        }
        let signed_data = SignedData::from_der(&content_info.content.to_der()?)?;

        let encap = &signed_data.encap_content_info;
        if encap.econtent_type != OID_TST_INFO {
            return Err(TokenError::Malformed(format!(
                "encapsulated content type {} is not TSTInfo",
                encap.econtent_type
            )));
        }
        let econtent = encap
            .econtent
            .as_ref()
            .filter(|content| content.tag() == Tag::OctetString)
            .ok_or_else(|| TokenError::Malformed("timestamp carries no TSTInfo".to_string()))?;
        let tst_info = TstInfo::from_der(econtent.value())?;
        let generation_time = generalized_time_to_chrono(&tst_info.gen_time, "genTime")?;

        let mut certificates = Vec::new();
        for choice in signed_data.certificates.iter().flat_map(|set| set.0.iter()) {
            let CertificateChoices::Certificate(certificate) = choice else {
                debug!("Skipping non X.509 certificate choice in timestamp");
                continue;
            };
            match certificate
                .to_der()
                .map_err(TokenError::from)
                .and_then(CertificateToken::from_der)
            {
                Ok(token) => certificates.push(Arc::new(token)),
                Err(e) => warn!("Skipping unparsable certificate in timestamp: {e}"),
            }
        }

        Ok(Self {
            id: TokenId::from_encoding(der),
            encoded: der.to_vec(),
            generation_time,
            message_imprint: Some(tst_info.message_imprint.hashed_message.as_bytes().to_vec()),
            certificates,
        })
    }

    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn generation_time(&self) -> DateTime<Utc> {
        self.generation_time
    }

    /// Hashed message from the TSTInfo, when the token was parsed.
    pub fn message_imprint(&self) -> Option<&[u8]> {
        self.message_imprint.as_deref()
    }

    /// Certificates shipped inside the token (usually the TSA chain).
    pub fn certificates(&self) -> &[Arc<CertificateToken>] {
        &self.certificates
    }
}

impl fmt::Debug for TimestampToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampToken")
            .field("id", &self.id)
            .field("generation_time", &self.generation_time)
            .field("certificates", &self.certificates.len())
            .finish()
    }
}

/// Wrap a TSTInfo in an unsigned SignedData, enough for parsing tests.
#[cfg(test)]
pub(crate) fn encode_unsigned_token(tst_info: &TstInfo) -> Vec<u8> {
    use cms::content_info::CmsVersion;
    use cms::signed_data::{EncapsulatedContentInfo, SignerInfos};
    use der::Any;
    use der::asn1::SetOfVec;

    let econtent = OctetString::new(tst_info.to_der().unwrap()).unwrap();
    let signed_data = SignedData {
        version: CmsVersion::V3,
        digest_algorithms: SetOfVec::new(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: OID_TST_INFO,
            econtent: Some(Any::from_der(&econtent.to_der().unwrap()).unwrap()),
        },
        certificates: None,
        crls: None,
        signer_infos: SignerInfos(SetOfVec::new()),
    };
    ContentInfo {
        content_type: OID_SIGNED_DATA,
        content: Any::from_der(&signed_data.to_der().unwrap()).unwrap(),
    }
    .to_der()
    .unwrap()
}

#[cfg(test)]
pub(crate) fn sample_tst_info(digest: &[u8], gen_time_secs: u64) -> TstInfo {
    use std::time::Duration;

    use crate::crypto::DigestAlgorithm;

    TstInfo {
        version: 1,
        policy: ObjectIdentifier::new_unwrap("1.3.6.1.4.1.4146.1.2"),
        message_imprint: MessageImprint {
            hash_algorithm: DigestAlgorithm::Sha256.algorithm_identifier(),
            hashed_message: OctetString::new(digest).unwrap(),
        },
        serial_number: Int::new(&[0x01, 0x2A]).unwrap(),
        gen_time: GeneralizedTime::from_unix_duration(Duration::from_secs(gen_time_secs)).unwrap(),
        accuracy: Some(Accuracy {
            seconds: Some(1),
            millis: None,
            micros: None,
        }),
        ordering: None,
        nonce: Some(Int::new(&[0x7F, 0x01]).unwrap()),
        tsa: None,
        extensions: None,
    }
}

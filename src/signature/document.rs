use super::embedder::DssDictionary;
use super::errors::DocumentResult;
use super::level::SignatureLevel;
use crate::token::TimestampToken;

/// An opaque signed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: Option<String>,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { name: None, bytes }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// What a format knows about one signature in a document.
#[derive(Debug, Clone)]
pub struct SignatureInfo {
    /// Identifier stable across extensions of the same document
    pub id: String,
    /// Encoded signature value; its SHA-1 addresses the VRI entry
    pub signature_value: Vec<u8>,
    pub signing_certificate: Option<Vec<u8>>,
    pub certificates: Vec<Vec<u8>>,
    pub timestamps: Vec<TimestampToken>,
}

/// What a time-stamp covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimestampScope {
    /// Signature time-stamp over one signature value
    Signature(String),
    /// Document time-stamp over the whole document
    Document,
}

/// Format-specific reading and writing of signed documents.
///
/// Implementations never modify their input; every mutation returns a new
/// `Document`.
pub trait DocumentFormat: Send + Sync {
    fn signatures(&self, document: &Document) -> DocumentResult<Vec<SignatureInfo>>;

    /// Whether the data specific to `level` is embedded for `signature`.
    /// Only the level itself is inspected, not the levels below.
    fn is_data_for_signature_level_present(
        &self,
        document: &Document,
        signature: &SignatureInfo,
        level: SignatureLevel,
    ) -> bool;

    /// Bytes a time-stamp of the given scope must cover.
    fn timestamp_data(&self, document: &Document, scope: &TimestampScope) -> DocumentResult<Vec<u8>>;

    fn add_timestamp(
        &self,
        document: &Document,
        scope: &TimestampScope,
        token: &TimestampToken,
    ) -> DocumentResult<Document>;

    /// Append a validation data dictionary. Existing dictionaries are kept.
    fn add_validation_data(&self, document: &Document, dss: DssDictionary) -> DocumentResult<Document>;

    /// Highest level whose data, and the data of every level below, is present.
    fn signature_level(&self, document: &Document, signature: &SignatureInfo) -> SignatureLevel {
        let mut reached = SignatureLevel::B;
        for level in [SignatureLevel::T, SignatureLevel::LT, SignatureLevel::LTA] {
            if !self.is_data_for_signature_level_present(document, signature, level) {
                break;
            }
            reached = level;
        }
        reached
    }
}

//! Validation data containers written back into documents
//!
//! Proofs are grouped twice: per signature (the VRI entry, keyed by the
//! uppercase hex SHA-1 of the signature value) and document-wide. The
//! document-wide pool is a plain append, so identical proofs used by two
//! signatures appear twice.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::token::{CertificateToken, RevocationKind, RevocationToken};
use crate::validation::ValidationContext;

/// VRI key for a signature value.
pub fn vri_key(signature_value: &[u8]) -> String {
    hex::encode_upper(crypto::sha1(signature_value))
}

/// Proofs gathered for one signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationDataBundle {
    pub vri_key: String,
    pub certificates: Vec<Vec<u8>>,
    pub crls: Vec<Vec<u8>>,
    pub ocsps: Vec<Vec<u8>>,
}

impl ValidationDataBundle {
    pub fn new(signature_value: &[u8]) -> Self {
        Self {
            vri_key: vri_key(signature_value),
            ..Default::default()
        }
    }

    /// Collect everything a settled context resolved.
    pub fn from_context(signature_value: &[u8], context: &ValidationContext) -> Self {
        let mut bundle = Self::new(signature_value);

        let mut certificates = context.processed_certificates();
        certificates.sort_by_key(|c| c.id());
        for certificate in &certificates {
            bundle.add_certificate(certificate);
        }

        let mut revocations = context.processed_revocations();
        revocations.sort_by_key(|r| r.id());
        for revocation in &revocations {
            bundle.add_revocation(revocation);
        }
        bundle
    }

    pub fn add_certificate(&mut self, certificate: &CertificateToken) {
        self.certificates.push(certificate.encoded().to_vec());
    }

    pub fn add_revocation(&mut self, revocation: &RevocationToken) {
        let target = match revocation.kind() {
            RevocationKind::Crl => &mut self.crls,
            RevocationKind::Ocsp => &mut self.ocsps,
        };
        target.push(revocation.encoded().to_vec());
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.crls.is_empty() && self.ocsps.is_empty()
    }
}

/// Document-wide accumulation of every bundle's proofs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalProofPool {
    pub certificates: Vec<Vec<u8>>,
    pub crls: Vec<Vec<u8>>,
    pub ocsps: Vec<Vec<u8>>,
}

impl GlobalProofPool {
    /// Append a bundle's proofs without deduplication.
    pub fn absorb(&mut self, bundle: &ValidationDataBundle) {
        self.certificates.extend(bundle.certificates.iter().cloned());
        self.crls.extend(bundle.crls.iter().cloned());
        self.ocsps.extend(bundle.ocsps.iter().cloned());
    }
}

/// Per-signature entry of the dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VriEntry {
    pub certificates: Vec<Vec<u8>>,
    pub crls: Vec<Vec<u8>>,
    pub ocsps: Vec<Vec<u8>>,
}

/// Document security store style dictionary handed to the document format.
///
/// Global arrays are `None` when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DssDictionary {
    pub certificates: Option<Vec<Vec<u8>>>,
    pub crls: Option<Vec<Vec<u8>>>,
    pub ocsps: Option<Vec<Vec<u8>>>,
    pub vri: BTreeMap<String, VriEntry>,
}

fn non_empty(items: Vec<Vec<u8>>) -> Option<Vec<Vec<u8>>> {
    (!items.is_empty()).then_some(items)
}

/// Build a fresh dictionary from this call's bundles.
pub fn build_dss_dictionary(bundles: Vec<ValidationDataBundle>) -> DssDictionary {
    let mut pool = GlobalProofPool::default();
    let mut vri = BTreeMap::new();

    for bundle in bundles {
        pool.absorb(&bundle);
        vri.insert(
            bundle.vri_key,
            VriEntry {
                certificates: bundle.certificates,
                crls: bundle.crls,
                ocsps: bundle.ocsps,
            },
        );
    }

    DssDictionary {
        certificates: non_empty(pool.certificates),
        crls: non_empty(pool.crls),
        ocsps: non_empty(pool.ocsps),
        vri,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(signature_value: &[u8], certificates: &[&[u8]], crls: &[&[u8]]) -> ValidationDataBundle {
        ValidationDataBundle {
            certificates: certificates.iter().map(|c| c.to_vec()).collect(),
            crls: crls.iter().map(|c| c.to_vec()).collect(),
            ..ValidationDataBundle::new(signature_value)
        }
    }

    #[test]
    fn test_vri_key_is_uppercase_sha1() {
        assert_eq!(vri_key(b"abc"), "A9993E364706816ABA3E25717850C26C9CD0D89D");
    }

    #[test]
    fn test_global_pool_keeps_duplicates() {
        let dss = build_dss_dictionary(vec![
            bundle(b"sig-1", &[b"ca", b"leaf-1"], &[b"crl"]),
            bundle(b"sig-2", &[b"ca", b"leaf-2"], &[b"crl"]),
        ]);

        assert_eq!(dss.certificates.as_ref().map(Vec::len), Some(4));
        assert_eq!(dss.crls.as_ref().map(Vec::len), Some(2));
        assert_eq!(dss.ocsps, None);
        assert_eq!(dss.vri.len(), 2);
        assert_eq!(dss.vri[&vri_key(b"sig-1")].certificates.len(), 2);
    }

    #[test]
    fn test_empty_bundles_still_get_vri_entries() {
        let dss = build_dss_dictionary(vec![ValidationDataBundle::new(b"sig")]);
        assert_eq!(dss.certificates, None);
        assert!(dss.vri.contains_key(&vri_key(b"sig")));
    }
}

//! Signature level extension
//!
//! # Features
//! - Baseline levels B, T, LT and LTA
//! - Cascading extension: each level first brings lower levels in place
//! - VRI-addressed validation data dictionaries

mod document;
mod embedder;
mod errors;
mod extension;
mod level;

pub use document::{Document, DocumentFormat, SignatureInfo, TimestampScope};
pub use embedder::{
    DssDictionary, GlobalProofPool, ValidationDataBundle, VriEntry, build_dss_dictionary, vri_key,
};
pub use errors::{DocumentError, DocumentResult, ExtensionError, ExtensionResult};
pub use extension::SignatureExtender;
pub use level::SignatureLevel;

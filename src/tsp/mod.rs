//! Time-stamping authority collaborator

mod errors;
mod online;

use async_trait::async_trait;

use crate::crypto::DigestAlgorithm;
use crate::token::TimestampToken;

pub use errors::{TspError, TspResult};
pub use online::{
    OnlineTspSource, PkiStatusInfo, TimeStampReq, TimeStampResp, build_timestamp_request,
};

/// Obtains a time-stamp token over a precomputed digest.
#[async_trait]
pub trait TspSource: Send + Sync {
    async fn get_timestamp_response(
        &self,
        digest_algorithm: DigestAlgorithm,
        digest: &[u8],
    ) -> TspResult<TimestampToken>;
}

//! Protocol-agnostic retrieval of revocation and time-stamp data
//!
//! # Features
//! - `DataLoader` trait shared by every online source
//! - HTTP/HTTPS (and `file://`) transport backed by reqwest
//! - On-disk cache keyed by a normalized form of the URL, with allow/deny filters

mod errors;
mod file_cache;
mod http;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use errors::{LoaderError, LoaderResult};
pub use file_cache::{FileCacheDataLoader, cache_file_name, normalize_file_name};
pub use http::{HttpDataLoader, OCSP_REQUEST_CONTENT_TYPE, TIMESTAMP_QUERY_CONTENT_TYPE};

/// Fetches bytes from a URL.
#[async_trait]
pub trait DataLoader: Send + Sync {
    /// GET the resource. `Ok(None)` means the URL was filtered out or the
    /// resource is empty; transport problems are errors.
    async fn get(&self, url: &str, refresh: bool) -> LoaderResult<Option<Vec<u8>>>;

    /// POST `body` to the URL and return the response body.
    async fn post(&self, url: &str, body: &[u8], refresh: bool) -> LoaderResult<Vec<u8>>;
}

/// Transport protocol of a distribution point URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Ldap,
    Ftp,
    File,
}

impl Protocol {
    /// Detect the protocol from the URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let (scheme, _) = url.split_once(':')?;
        scheme.parse().ok()
    }

    /// Whether fetching requires going over the network.
    pub fn is_network(&self) -> bool {
        !matches!(self, Protocol::File)
    }
}

impl FromStr for Protocol {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "ldap" => Ok(Protocol::Ldap),
            "ftp" => Ok(Protocol::Ftp),
            "file" => Ok(Protocol::File),
            other => Err(LoaderError::UnsupportedProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Ldap => "ldap",
            Protocol::Ftp => "ftp",
            Protocol::File => "file",
        };
        f.write_str(name)
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

use super::errors::{LoaderError, LoaderResult};
use super::{DataLoader, Protocol};

pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";
pub const TIMESTAMP_QUERY_CONTENT_TYPE: &str = "application/timestamp-query";

/// Loader speaking HTTP(S) through reqwest, plus local `file://` reads.
#[derive(Debug, Clone)]
pub struct HttpDataLoader {
    client: Client,
    request_timeout: Duration,
    content_type: Option<String>,
}

impl HttpDataLoader {
    /// Returns an error if the HTTP client cannot be initialized
    pub fn new(timeout_secs: u64) -> LoaderResult<Self> {
        let request_timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            request_timeout,
            content_type: None,
        })
    }

    /// Content type sent with POST bodies.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    async fn read_file(&self, url: &str) -> LoaderResult<Option<Vec<u8>>> {
        let parsed = Url::parse(url)?;
        let path = parsed
            .to_file_path()
            .map_err(|_| LoaderError::UnsupportedProtocol(url.to_string()))?;
        let bytes = tokio::fs::read(path).await?;
        Ok((!bytes.is_empty()).then_some(bytes))
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> LoaderResult<Vec<u8>> {
        let response = match timeout(self.request_timeout, request.send()).await {
            Ok(result) => result?,
            Err(_) => return Err(LoaderError::Timeout(url.to_string())),
        };

        if !response.status().is_success() {
            return Err(LoaderError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn check_transport(url: &str) -> LoaderResult<Protocol> {
        let protocol = Protocol::from_url(url)
            .ok_or_else(|| LoaderError::UnsupportedProtocol(url.to_string()))?;
        match protocol {
            Protocol::Http | Protocol::Https | Protocol::File => Ok(protocol),
            // No LDAP or FTP transport is wired in
            Protocol::Ldap | Protocol::Ftp => Err(LoaderError::UnsupportedProtocol(protocol.to_string())),
        }
    }
}

#[async_trait]
impl DataLoader for HttpDataLoader {
    async fn get(&self, url: &str, _refresh: bool) -> LoaderResult<Option<Vec<u8>>> {
        if Self::check_transport(url)? == Protocol::File {
            return self.read_file(url).await;
        }

        // Validate URL (uses #[from] url::ParseError)
        let _ = Url::parse(url)?;
        info!("Fetching {}", url);
        let bytes = self.send(self.client.get(url), url).await?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok((!bytes.is_empty()).then_some(bytes))
    }

    async fn post(&self, url: &str, body: &[u8], _refresh: bool) -> LoaderResult<Vec<u8>> {
        if Self::check_transport(url)? == Protocol::File {
            return Err(LoaderError::UnsupportedProtocol(url.to_string()));
        }

        let _ = Url::parse(url)?;
        let mut request = self.client.post(url).body(body.to_vec());
        if let Some(content_type) = &self.content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        info!("Posting {} bytes to {}", body.len(), url);
        self.send(request, url).await
    }
}

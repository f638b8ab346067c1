use thiserror::Error;

/// Data loader errors
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error {status}: failed to fetch {url}")]
    Status { status: u16, url: String },

    #[error("Timeout while fetching {0}")]
    Timeout(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient Result type alias
pub type LoaderResult<T> = Result<T, LoaderError>;

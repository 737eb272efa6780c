use reqwest::StatusCode;

/// Error type for cache operations.
///
/// `Clone` is required: a single download outcome fans out to every caller
/// waiting on the same key, so failures carry rendered messages rather than
/// the originating error values.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("server returned status code {0}")]
    Status(StatusCode),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("download timed out")]
    Timeout,

    #[error("invalid URL: {0}")]
    Url(String),

    #[error("download aborted before completion")]
    Aborted,
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CacheError::Timeout
        } else {
            CacheError::Http(err.to_string())
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";

/// Directory name used under the system temp dir when no explicit cache
/// directory is configured.
const DEFAULT_DIR_NAME: &str = "vidcache";

/// Configurable options for the cache manager.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding cached entries. `None` resolves to a `vidcache`
    /// folder under the system temp directory.
    pub cache_dir: Option<PathBuf>,

    /// Overall timeout for one download request (zero disables it).
    pub download_timeout: Duration,

    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// Whether to follow redirects.
    pub follow_redirects: bool,

    /// User agent string sent with every request.
    pub user_agent: String,

    /// Custom HTTP headers for requests.
    pub headers: HeaderMap,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            download_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: CacheConfig::default_headers(),
        }
    }
}

impl CacheConfig {
    pub fn builder() -> crate::builder::CacheConfigBuilder {
        crate::builder::CacheConfigBuilder::new()
    }

    /// Directory actually used for cache storage.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| env::temp_dir().join(DEFAULT_DIR_NAME))
    }

    pub fn default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );

        default_headers
    }
}

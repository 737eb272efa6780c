//! # Cache Manager
//!
//! The caller-facing facade. One `CacheManager` owns the cache directory,
//! the HTTP client, and the in-flight download table. Cloning is cheap and
//! every clone shares the same state, so a single instance can be handed to
//! any number of consumers; tests construct isolated instances over
//! temporary directories.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::client::create_client;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::flight::{Flight, FlightTable};
use crate::key::CacheKey;
use crate::store::{CacheStats, CacheStore};

/// Maps remote asset URLs to locally cached files, downloading each missing
/// asset at most once regardless of how many callers ask for it.
#[derive(Clone)]
pub struct CacheManager {
    store: CacheStore,
    client: Client,
    flights: Arc<FlightTable>,
    config: Arc<CacheConfig>,
}

impl CacheManager {
    /// Create a manager over the configured cache directory.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let client = create_client(&config)?;
        let store = CacheStore::new(config.resolved_cache_dir());

        Ok(Self {
            store,
            client,
            flights: Arc::new(FlightTable::default()),
            config: Arc::new(config),
        })
    }

    /// The local path a remote URL resolves to. Pure path composition, no
    /// filesystem access: the file may or may not exist yet.
    pub fn cached_path(&self, url: &str) -> PathBuf {
        self.store.resolved_path(&CacheKey::derive(url))
    }

    /// Whether a complete cached copy of `url` is on disk.
    pub async fn is_cached(&self, url: &str) -> Result<bool, CacheError> {
        Ok(self.store.exists(&CacheKey::derive(url)).await?)
    }

    /// Resolve `url` to a local file, downloading it if needed.
    ///
    /// Concurrent calls for the same URL share one network request: the
    /// first caller starts the download, later callers wait on it, and all
    /// of them receive the same path (or the same error). A failed download
    /// leaves nothing on disk and no in-flight record, so the next call
    /// retries from scratch. `file://` URLs resolve to their local path
    /// directly, without caching.
    pub async fn fetch(&self, url: &str) -> Result<PathBuf, CacheError> {
        if let Some(path) = file_url_path(url) {
            tokio::fs::metadata(&path).await?;
            return Ok(path);
        }

        let key = CacheKey::derive(url);

        // Fast path: a complete entry is already on disk.
        if self.store.exists(&key).await? {
            return Ok(self.store.resolved_path(&key));
        }

        let mut rx = match self.flights.join_or_lead(&key) {
            Flight::Leader { rx } => {
                self.spawn_download(url.to_owned(), key.clone());
                rx
            }
            Flight::Waiter { rx } => {
                debug!(key = key.hash(), "Joined in-flight download");
                rx
            }
        };

        match rx.recv().await {
            Ok(outcome) => outcome,
            // The sender went away without reporting: the download task died.
            Err(_) => Err(CacheError::Aborted),
        }
    }

    /// Run the download in its own task. Callers only hold broadcast
    /// receivers, so any of them (the initiator included) can withdraw
    /// without cancelling the fetch for the rest.
    fn spawn_download(&self, url: String, key: CacheKey) {
        let manager = self.clone();
        tokio::spawn(async move {
            let outcome = manager.download_and_store(&url, &key).await;
            if let Err(e) = &outcome {
                warn!(url = %url, error = %e, "Download failed");
            }
            manager.flights.finish(&key, outcome);
        });
    }

    /// One full download: GET, status check, atomic store write.
    async fn download_and_store(&self, url: &str, key: &CacheKey) -> Result<PathBuf, CacheError> {
        // A racing caller may have published the entry between our miss and
        // the flight registration.
        if self.store.exists(key).await? {
            return Ok(self.store.resolved_path(key));
        }

        let parsed = Url::parse(url).map_err(|e| CacheError::Url(format!("{url}: {e}")))?;
        debug!(url = %parsed, key = key.hash(), "Downloading remote asset");

        let response = self.client.get(parsed).send().await?;
        if !response.status().is_success() {
            return Err(CacheError::Status(response.status()));
        }

        let data: Bytes = response.bytes().await?;
        let path = self.store.write(key, data).await?;
        Ok(path)
    }

    /// Remove entries older than `max_age`; returns how many went away.
    pub async fn sweep_expired(&self, max_age: Duration) -> Result<usize, CacheError> {
        Ok(self.store.sweep_expired(max_age).await?)
    }

    /// Remove every cached entry.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        Ok(self.store.clear_all().await?)
    }

    /// Entry count and total size of the cache directory.
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(self.store.stats().await?)
    }

    /// Spawn a periodic expiry sweep.
    ///
    /// Nothing in the manager requires a background timer; hosts that want
    /// one keep the returned handle and abort it on shutdown.
    pub fn start_sweep_task(&self, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = manager.sweep_expired(max_age).await {
                    warn!(error = %e, "Cache sweep error");
                }
            }
        })
    }

    /// Get configuration reference
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

/// Path referenced by a `file://` URL, if `url` is one.
fn file_url_path(url: &str) -> Option<PathBuf> {
    let parsed = Url::parse(url).ok()?;
    if parsed.scheme() != "file" {
        return None;
    }
    parsed.to_file_path().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use axum::Router;
    use axum::http::StatusCode as HttpStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use futures::future::join_all;
    use tempfile::TempDir;

    const PAYLOAD: &[u8] = b"\x00\x00\x00\x20ftypisom fake clip payload";

    #[inline]
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    fn manager() -> (CacheManager, TempDir) {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = CacheConfig::builder()
            .with_cache_dir(dir.path().to_path_buf())
            .with_download_timeout(Duration::from_secs(5))
            .build();
        (CacheManager::new(config).expect("manager"), dir)
    }

    async fn start_server(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        addr
    }

    /// Serves `PAYLOAD` after `delay`, counting requests.
    fn counting_route(delay: Duration) -> (Router, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let handler_hits = hits.clone();
        let app = Router::new().route(
            "/clip.mov",
            get(move || {
                let hits = handler_hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    PAYLOAD
                }
            }),
        );
        (app, hits)
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_download() {
        init_tracing();
        let (app, hits) = counting_route(Duration::from_millis(200));
        let addr = start_server(app).await;
        let (manager, _dir) = manager();
        let url = format!("http://{addr}/clip.mov");

        let started = Instant::now();
        let results = join_all((0..4).map(|_| manager.fetch(&url))).await;
        let elapsed = started.elapsed();

        let paths: Vec<_> = results
            .into_iter()
            .map(|r| r.expect("fetch should succeed"))
            .collect();
        assert!(
            paths.windows(2).all(|pair| pair[0] == pair[1]),
            "every caller should resolve to the same path"
        );
        assert_eq!(
            hits.load(Ordering::SeqCst),
            1,
            "only one request should reach the server"
        );
        assert!(
            elapsed < Duration::from_millis(600),
            "waiters should ride the first download, not queue behind it ({elapsed:?})"
        );
        assert_eq!(tokio::fs::read(&paths[0]).await.unwrap(), PAYLOAD);
    }

    #[tokio::test]
    async fn cache_hit_skips_the_network() {
        init_tracing();
        let (app, hits) = counting_route(Duration::ZERO);
        let addr = start_server(app).await;
        let (manager, _dir) = manager();
        let url = format!("http://{addr}/clip.mov");

        let first = manager.fetch(&url).await.unwrap();
        let second = manager.fetch(&url).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(manager.is_cached(&url).await.unwrap());
        assert_eq!(manager.cached_path(&url), first);
    }

    #[tokio::test]
    async fn failed_download_notifies_every_waiter_then_permits_retry() {
        init_tracing();
        let hits = Arc::new(AtomicUsize::new(0));
        let handler_hits = hits.clone();
        // First request fails after a delay long enough for both callers to
        // pile onto one flight; the retry succeeds.
        let app = Router::new().route(
            "/clip.mov",
            get(move || {
                let hits = handler_hits.clone();
                async move {
                    let attempt = hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    if attempt == 0 {
                        (HttpStatus::INTERNAL_SERVER_ERROR, "boom").into_response()
                    } else {
                        PAYLOAD.into_response()
                    }
                }
            }),
        );
        let addr = start_server(app).await;
        let (manager, _dir) = manager();
        let url = format!("http://{addr}/clip.mov");

        let results = join_all((0..2).map(|_| manager.fetch(&url))).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        for result in results {
            match result {
                Err(CacheError::Status(code)) => assert_eq!(code.as_u16(), 500),
                other => panic!("expected a 500 failure, got {other:?}"),
            }
        }
        assert!(!manager.is_cached(&url).await.unwrap());

        // The failed flight is gone; a later call starts over and succeeds.
        let path = manager.fetch(&url).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), PAYLOAD);
    }

    #[tokio::test]
    async fn failure_on_one_key_leaves_others_alone() {
        init_tracing();
        let app = Router::new()
            .route(
                "/good.mov",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    PAYLOAD.into_response()
                }),
            )
            .route(
                "/bad.mov",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    (HttpStatus::NOT_FOUND, "gone").into_response()
                }),
            );
        let addr = start_server(app).await;
        let (manager, _dir) = manager();
        let good = format!("http://{addr}/good.mov");
        let bad = format!("http://{addr}/bad.mov");

        let (good_result, bad_result) =
            tokio::join!(manager.fetch(&good), manager.fetch(&bad));

        let path = good_result.expect("good asset should download");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), PAYLOAD);
        match bad_result {
            Err(CacheError::Status(code)) => assert_eq!(code.as_u16(), 404),
            other => panic!("expected a 404 failure, got {other:?}"),
        }
        assert!(manager.is_cached(&good).await.unwrap());
        assert!(!manager.is_cached(&bad).await.unwrap());
    }

    #[tokio::test]
    async fn clear_all_forgets_cached_entries() {
        init_tracing();
        let (app, hits) = counting_route(Duration::ZERO);
        let addr = start_server(app).await;
        let (manager, _dir) = manager();
        let url = format!("http://{addr}/clip.mov");

        manager.fetch(&url).await.unwrap();
        assert!(manager.is_cached(&url).await.unwrap());

        manager.clear_all().await.unwrap();
        assert!(!manager.is_cached(&url).await.unwrap());

        // A fresh fetch re-downloads.
        manager.fetch(&url).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        init_tracing();
        let app = Router::new().route(
            "/clip.mov",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                PAYLOAD
            }),
        );
        let addr = start_server(app).await;

        let dir = tempfile::tempdir().expect("temp dir");
        let config = CacheConfig::builder()
            .with_cache_dir(dir.path().to_path_buf())
            .with_download_timeout(Duration::from_millis(200))
            .build();
        let manager = CacheManager::new(config).expect("manager");
        let url = format!("http://{addr}/clip.mov");

        match manager.fetch(&url).await {
            Err(CacheError::Timeout) => {}
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert!(!manager.is_cached(&url).await.unwrap());
    }

    #[tokio::test]
    async fn file_urls_resolve_without_caching() {
        init_tracing();
        let (manager, _cache_dir) = manager();

        let media_dir = tempfile::tempdir().expect("temp dir");
        let local = media_dir.path().join("bundled.mov");
        tokio::fs::write(&local, b"bundled clip").await.unwrap();

        let url = Url::from_file_path(&local).unwrap().to_string();
        let path = manager.fetch(&url).await.unwrap();
        assert_eq!(path, local);
        assert_eq!(manager.stats().await.unwrap().entries, 0);

        let missing = Url::from_file_path(media_dir.path().join("nope.mov"))
            .unwrap()
            .to_string();
        assert!(matches!(manager.fetch(&missing).await, Err(CacheError::Io(_))));
    }

    #[tokio::test]
    async fn sweep_expired_is_reachable_through_the_manager() {
        init_tracing();
        let (app, _hits) = counting_route(Duration::ZERO);
        let addr = start_server(app).await;
        let (manager, _dir) = manager();
        let url = format!("http://{addr}/clip.mov");

        manager.fetch(&url).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1300)).await;

        let removed = manager.sweep_expired(Duration::from_secs(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!manager.is_cached(&url).await.unwrap());
    }
}

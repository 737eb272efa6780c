use reqwest::Client;
use rustls::{ClientConfig, crypto::ring};
use rustls_platform_verifier::BuilderVerifierExt;
use std::sync::Arc;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::CacheError;

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &CacheConfig) -> Result<Client, CacheError> {
    // Create the crypto provider
    let provider = Arc::new(ring::default_provider());

    // Build platform default TLS configuration
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("Failed to configure default TLS protocol versions")
        .with_platform_verifier()
        .map_err(|e| CacheError::Http(format!("platform TLS verifier unavailable: {e}")))?
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .use_preconfigured_tls(tls_config)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.download_timeout.is_zero() {
        client_builder = client_builder.timeout(config.download_timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    debug!(
        timeout = ?config.download_timeout,
        connect_timeout = ?config.connect_timeout,
        "HTTP client configured"
    );

    client_builder.build().map_err(CacheError::from)
}

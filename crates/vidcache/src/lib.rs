//! # Vidcache
//!
//! A library for caching remote video assets on local disk. Remote URLs map
//! to stable cache files, each missing asset is downloaded exactly once no
//! matter how many callers ask for it concurrently, and entries expire by
//! age.
//!
//! ## Features
//!
//! - Deterministic URL to cache-key derivation (SHA-256, hex file names)
//! - Atomic on-disk publishing: readers never observe a partial file
//! - Single-flight download coalescing per key
//! - Age-based expiry sweeps and full clears over the cache directory

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod key;
pub mod manager;
pub mod store;

mod flight;

pub use builder::CacheConfigBuilder;
pub use client::create_client;
pub use config::CacheConfig;
pub use error::CacheError;
pub use key::CacheKey;
pub use manager::CacheManager;
pub use store::{CacheStats, CacheStore};

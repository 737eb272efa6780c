use std::time::Duration;

use anyhow::Context;
use vidcache_engine::{CacheConfig, CacheManager};

use crate::cli::{Args, Commands};

/// Executes CLI commands against one cache manager instance.
pub struct CommandExecutor {
    manager: CacheManager,
}

impl CommandExecutor {
    pub fn new(args: &Args) -> anyhow::Result<Self> {
        let mut builder = CacheConfig::builder()
            .with_download_timeout(Duration::from_secs(args.timeout_secs));

        if let Some(dir) = &args.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }

        let manager = CacheManager::new(builder.build())
            .context("failed to initialize cache manager")?;

        Ok(Self { manager })
    }

    pub async fn execute(&self, command: &Commands) -> anyhow::Result<()> {
        match command {
            Commands::Get { url } => {
                let path = self
                    .manager
                    .fetch(url)
                    .await
                    .with_context(|| format!("failed to fetch {url}"))?;
                println!("{}", path.display());
            }
            Commands::Status { url } => {
                let cached = self.manager.is_cached(url).await?;
                println!("cached: {}", if cached { "yes" } else { "no" });
                println!("path:   {}", self.manager.cached_path(url).display());
            }
            Commands::Sweep { max_age_secs } => {
                let removed = self
                    .manager
                    .sweep_expired(Duration::from_secs(*max_age_secs))
                    .await?;
                println!("removed {removed} expired entries");
            }
            Commands::Clear => {
                self.manager.clear_all().await?;
                println!("cache cleared");
            }
            Commands::Stats => {
                let stats = self.manager.stats().await?;
                println!("entries: {}", stats.entries);
                println!("size:    {} bytes", stats.total_bytes);
            }
        }

        Ok(())
    }
}

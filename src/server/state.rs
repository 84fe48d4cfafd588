//! Shared application context

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::project::cache::ProjectCache;
use crate::project::forge::Forge;
use crate::project::forges::GitHubForge;
use crate::project::gate::ConcurrencyGate;
use crate::project::request_log::{RequestLog, SqliteRequestLog};
use crate::project::resolver::VersionResolver;
use crate::project::stats::StatsAggregator;
use crate::project::types::WeekBucket;

/// Everything a handler needs, built once at startup
pub struct AppContext {
    pub config: Config,
    pub gate: Arc<ConcurrencyGate>,
    pub resolver: Arc<VersionResolver<ProjectCache>>,
    pub stats: StatsAggregator<ProjectCache>,
    pub request_log: Arc<dyn RequestLog>,
}

impl AppContext {
    /// Opens the cache directory and request log and creates the GitHub client.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let cache = ProjectCache::new(&config.cache_dir, config.cache.stale_window())
            .with_context(|| format!("Failed to open cache directory {:?}", config.cache_dir))?;

        let gate = Arc::new(ConcurrencyGate::new(config.forge.concurrency_limit));
        let forge = GitHubForge::new(&config.forge, Arc::clone(&gate))?;

        let database_path = config.database_path();
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let request_log = SqliteRequestLog::new(&database_path)
            .with_context(|| format!("Failed to open request log {:?}", database_path))?;

        info!(
            "Forge concurrency limited to {} requests",
            gate.capacity()
        );

        Ok(Self::build(
            config,
            Arc::new(cache),
            Arc::new(forge),
            gate,
            Arc::new(request_log),
        ))
    }

    pub fn build(
        config: Config,
        cache: Arc<ProjectCache>,
        forge: Arc<dyn Forge>,
        gate: Arc<ConcurrencyGate>,
        request_log: Arc<dyn RequestLog>,
    ) -> Self {
        let resolver = Arc::new(VersionResolver::new(cache, forge));
        let epoch = config.cache.stats_epoch;
        let stats = StatsAggregator::new(
            Arc::clone(&resolver),
            Arc::clone(&request_log),
            config.cache.stats_stale_window(),
            WeekBucket::new(epoch.year, epoch.week),
        );

        Self {
            config,
            gate,
            resolver,
            stats,
            request_log,
        }
    }
}

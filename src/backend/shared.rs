//! State and bookkeeping shared by the SQL backends.
//!
//! Each backend keeps only what is specific to its driver: how a URL is
//! turned into a pool, and the sqlx calls themselves. Key namespacing,
//! lifetimes, the lazy pool slot, the statement cache, sweep sampling, logging
//! and metrics all live here so the engines cannot drift apart.

use super::CleanMode;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConnectionSource, SqlCacheConfig};
use crate::connection::ConnectionRegistry;
use crate::error::{Error, Result};
use crate::key::KeyNamespace;
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::pattern::KeyPattern;
use crate::statement::{Dialect, Operation, StatementCache};
use crate::sweep::CleaningPolicy;
use sqlx::{Database, Pool};
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Timestamps for one write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WriteTimes {
    pub lifetime: Duration,
    pub timeout: i64,
    pub now: i64,
}

pub(crate) struct CacheCore<DB: Database> {
    /// Engine name used in log lines.
    engine: &'static str,
    config: Arc<SqlCacheConfig>,
    /// `None` when the pool was injected directly.
    source: Option<ConnectionSource>,
    namespace: KeyNamespace,
    cleaning: CleaningPolicy,
    registry: Option<Arc<ConnectionRegistry<DB>>>,
    pool: Arc<RwLock<Option<Pool<DB>>>>,
    statements: Arc<StatementCache>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn CacheMetrics>,
}

impl<DB: Database> Clone for CacheCore<DB> {
    fn clone(&self) -> Self {
        CacheCore {
            engine: self.engine,
            config: Arc::clone(&self.config),
            source: self.source.clone(),
            namespace: self.namespace.clone(),
            cleaning: self.cleaning,
            registry: self.registry.clone(),
            pool: Arc::clone(&self.pool),
            statements: Arc::clone(&self.statements),
            clock: Arc::clone(&self.clock),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<DB: Database> CacheCore<DB> {
    pub fn new(
        engine: &'static str,
        dialect: Dialect,
        config: SqlCacheConfig,
        source: Option<ConnectionSource>,
        pool: Option<Pool<DB>>,
    ) -> Self {
        CacheCore {
            engine,
            source,
            namespace: KeyNamespace::new(config.prefix.clone()),
            cleaning: CleaningPolicy::new(config.cleaning_factor),
            registry: None,
            pool: Arc::new(RwLock::new(pool)),
            statements: Arc::new(StatementCache::new(dialect, config.table.clone())),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoOpMetrics),
            config: Arc::new(config),
        }
    }

    pub fn set_registry(&mut self, registry: Arc<ConnectionRegistry<DB>>) {
        self.registry = Some(registry);
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub fn set_metrics(&mut self, metrics: Arc<dyn CacheMetrics>) {
        self.metrics = metrics;
    }

    pub fn config(&self) -> &SqlCacheConfig {
        &self.config
    }

    pub fn statement(&self, op: Operation) -> Arc<str> {
        self.statements.get(op)
    }

    pub fn prepared(&self) -> usize {
        self.statements.len()
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Key or pattern as stored, with the namespace prefix.
    pub fn stored<'a>(&self, key: &'a str) -> Cow<'a, str> {
        self.namespace.apply(key)
    }

    /// Key as the caller knows it, without the namespace prefix.
    pub fn unprefixed(&self, stored: &str) -> String {
        self.namespace.strip(stored).to_string()
    }

    /// Translate a caller pattern, namespace included.
    pub fn pattern(&self, pattern: &str) -> KeyPattern {
        KeyPattern::new(&self.namespace.apply(pattern), self.config.separator)
    }

    pub fn write_times(&self, lifetime: Option<Duration>) -> WriteTimes {
        let lifetime = self.config.lifetime(lifetime);
        let now = self.clock.now();
        WriteTimes {
            lifetime,
            timeout: super::expiry(now, lifetime),
            now,
        }
    }

    /// Sample the inline sweep for a write on `key`.
    pub fn should_clean(&self, key: &str) -> bool {
        let fire = self.cleaning.should_clean();
        if fire {
            debug!("✓ {} SET {} triggered expired-row sweep", self.engine, key);
        }
        fire
    }

    /// The pool, awaiting `connect` only if none is stored yet.
    ///
    /// `connect` is a lazy future; it is dropped unpolled when a pool exists.
    pub async fn pool<F>(&self, connect: F) -> Result<Pool<DB>>
    where
        F: Future<Output = Result<Pool<DB>>>,
    {
        if let Some(pool) = self.pool.read().await.as_ref() {
            return Ok(pool.clone());
        }

        let mut guard = self.pool.write().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let pool = connect.await?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// Swap the pool and drop all prepared statements.
    pub async fn replace_pool(&self, pool: Pool<DB>) {
        let mut guard = self.pool.write().await;
        *guard = Some(pool);
        self.statements.clear();
        info!("✓ {} cache backend connection replaced", self.engine);
    }

    /// Where to connect from.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` when the backend was built without a source.
    pub fn source(&self) -> Result<&ConnectionSource> {
        self.source
            .as_ref()
            .ok_or_else(|| Error::ConfigError("No database connection configured".to_string()))
    }

    /// Resolve a named connection through the attached registry.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if no registry is attached or the name is unknown.
    pub fn named_pool(&self, name: &str) -> Result<Pool<DB>> {
        let registry = self.registry.as_ref().ok_or_else(|| {
            Error::ConfigError(format!(
                "Connection {} requested but no connection registry attached",
                name
            ))
        })?;
        let pool = registry.get(name)?;
        info!("✓ {} cache backend initialized on connection {}", self.engine, name);
        Ok(pool)
    }

    pub fn fail(&self, key: &str, e: sqlx::Error) -> Error {
        self.metrics.record_error(key, &e.to_string());
        Error::Database(e)
    }

    pub fn record_get(&self, key: &str, hit: bool, start: Instant) {
        if hit {
            debug!("✓ {} GET {} -> HIT", self.engine, key);
            self.metrics.record_hit(key, start.elapsed());
        } else {
            debug!("✓ {} GET {} -> MISS", self.engine, key);
            self.metrics.record_miss(key, start.elapsed());
        }
    }

    pub fn record_set(&self, key: &str, lifetime: Duration, start: Instant) {
        debug!("✓ {} SET {} (TTL: {:?})", self.engine, key, lifetime);
        self.metrics.record_set(key, start.elapsed());
    }

    pub fn record_remove(&self, key: &str, rows: u64, start: Instant) {
        debug!("✓ {} DELETE {}", self.engine, key);
        self.metrics.record_delete(key, rows, start.elapsed());
    }

    pub fn record_remove_pattern(&self, pattern: &str, rows: u64, start: Instant) {
        debug!("✓ {} DELETE PATTERN {} ({} rows)", self.engine, pattern, rows);
        self.metrics.record_delete(pattern, rows, start.elapsed());
    }

    pub fn record_clean(&self, mode: CleanMode, rows: u64, start: Instant) {
        match mode {
            CleanMode::All => warn!(
                "⚠ {} CLEAN ALL executed - {} rows removed",
                self.engine, rows
            ),
            CleanMode::Old => debug!("✓ {} CLEAN OLD ({} rows)", self.engine, rows),
        }
        self.metrics.record_clean(rows, start.elapsed());
    }

    pub fn record_many(&self, requested: usize, hits: usize) {
        debug!("✓ {} MGET {} keys ({} hits)", self.engine, requested, hits);
    }
}

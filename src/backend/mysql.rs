//! MySQL cache backend implementation.

use super::shared::CacheCore;
use super::{CacheBackend, CacheStats, CleanMode};
use crate::clock::Clock;
use crate::config::{ConnectionSource, SqlCacheConfig};
use crate::connection::ConnectionRegistry;
use crate::error::Result;
use crate::observability::CacheMetrics;
use crate::statement::{Dialect, Operation};
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{MySql, Row};
use std::borrow::Cow;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// MySQL backend with lazy connection and per-operation prepared statements.
///
/// Upserts use `INSERT ... ON DUPLICATE KEY UPDATE`, so `key` must carry a
/// `PRIMARY KEY` or `UNIQUE` index. Indexing `timeout` keeps sweeps cheap.
///
/// # Example
///
/// ```no_run
/// # use sql_cache::backend::{MySqlBackend, CacheBackend};
/// # use sql_cache::config::SqlCacheConfig;
/// # use sql_cache::error::Result;
/// # async fn example() -> Result<()> {
/// let config = SqlCacheConfig::from_url("mysql://localhost:3306/app")
///     .with_credentials("cache", "secret");
/// let backend = MySqlBackend::new(config)?;
///
/// backend.set("user:1", b"alice".to_vec(), None).await?;
/// backend.remove_pattern("user:*").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MySqlBackend {
    core: CacheCore<MySql>,
}

impl MySqlBackend {
    /// Create a backend that connects lazily, by name or by URL.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if neither a connection name nor a URL is
    /// configured, or if other options are invalid. No connection is attempted.
    pub fn new(config: SqlCacheConfig) -> Result<Self> {
        let source = config.source()?;
        Ok(Self::build(config, Some(source), None))
    }

    /// Create a backend on an existing pool.
    ///
    /// `connection` and `url` are ignored.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the table, prefix or separator is invalid.
    pub fn from_pool(pool: MySqlPool, config: SqlCacheConfig) -> Result<Self> {
        config.validate_options()?;
        Ok(Self::build(config, None, Some(pool)))
    }

    fn build(
        config: SqlCacheConfig,
        source: Option<ConnectionSource>,
        pool: Option<MySqlPool>,
    ) -> Self {
        MySqlBackend {
            core: CacheCore::new("MySQL", Dialect::MySql, config, source, pool),
        }
    }

    /// Resolve named connections through `registry`.
    pub fn with_registry(mut self, registry: Arc<ConnectionRegistry<MySql>>) -> Self {
        self.core.set_registry(registry);
        self
    }

    /// Use a custom time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.core.set_clock(Arc::new(clock));
        self
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.core.set_metrics(metrics);
        self
    }

    pub fn config(&self) -> &SqlCacheConfig {
        self.core.config()
    }

    /// Number of statements prepared so far.
    pub fn prepared_statements(&self) -> usize {
        self.core.prepared()
    }

    /// The underlying pool, connecting on first call.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if a named connection cannot be resolved,
    /// or `Error::Database` if connecting fails.
    pub async fn backend(&self) -> Result<MySqlPool> {
        self.core.pool(self.connect()).await
    }

    /// Swap the underlying pool and drop all prepared statements.
    pub async fn replace_pool(&self, pool: MySqlPool) {
        self.core.replace_pool(pool).await;
    }

    async fn connect(&self) -> Result<MySqlPool> {
        let url = match self.core.source()? {
            ConnectionSource::Named(name) => return self.core.named_pool(name),
            ConnectionSource::Url(url) => url,
        };

        let max_connections = self.core.config().max_connections;
        let options = MySqlConnectOptions::from_str(url)?;
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        info!(
            "✓ MySQL cache backend initialized (table: {}, pool size: {})",
            self.core.config().table, max_connections
        );
        Ok(pool)
    }

    /// Physical row statistics, expired rows included.
    pub async fn stats(&self) -> Result<CacheStats> {
        let pool = self.backend().await?;
        let sql = self.core.statement(Operation::Stats);

        let row = sqlx::query(&sql)
            .bind(self.core.now())
            .fetch_one(&pool)
            .await?;

        Ok(CacheStats::from_counts(
            row.try_get(0)?,
            row.try_get(1)?,
            row.try_get(2)?,
        ))
    }

    /// Print table statistics to debug log.
    pub async fn log_stats(&self) -> Result<()> {
        let stats = self.stats().await?;
        debug!(
            "Cache Stats: {} entries ({} expired), {} bytes",
            stats.total_entries, stats.expired_entries, stats.total_bytes
        );
        Ok(())
    }

    /// Shared body of the single-column lookups on a live record.
    async fn fetch_live_i64(&self, op: Operation, key: &str) -> Result<i64> {
        let stored = self.core.stored(key);
        let pool = self.backend().await?;
        let sql = self.core.statement(op);

        let value: Option<i64> = sqlx::query_scalar(&sql)
            .bind(&*stored)
            .bind(self.core.now())
            .fetch_optional(&pool)
            .await
            .map_err(|e| self.core.fail(key, e))?;

        Ok(value.unwrap_or(0))
    }
}

impl CacheBackend for MySqlBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();
        let stored = self.core.stored(key);
        let pool = self.backend().await?;
        let sql = self.core.statement(Operation::Get);

        let data: Option<Vec<u8>> = sqlx::query_scalar(&sql)
            .bind(&*stored)
            .bind(self.core.now())
            .fetch_optional(&pool)
            .await
            .map_err(|e| self.core.fail(key, e))?;

        self.core.record_get(key, data.is_some(), start);
        Ok(data)
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let stored = self.core.stored(key);
        let pool = self.backend().await?;
        let sql = self.core.statement(Operation::Has);

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(&*stored)
            .bind(self.core.now())
            .fetch_one(&pool)
            .await
            .map_err(|e| self.core.fail(key, e))?;

        Ok(count > 0)
    }

    async fn set(&self, key: &str, data: Vec<u8>, lifetime: Option<Duration>) -> Result<()> {
        if self.core.should_clean(key) {
            self.clean(CleanMode::Old).await?;
        }

        let start = Instant::now();
        let stored = self.core.stored(key);
        let pool = self.backend().await?;
        let sql = self.core.statement(Operation::Set);
        let times = self.core.write_times(lifetime);

        sqlx::query(&sql)
            .bind(&*stored)
            .bind(data)
            .bind(times.timeout)
            .bind(times.now)
            .execute(&pool)
            .await
            .map_err(|e| self.core.fail(key, e))?;

        self.core.record_set(key, times.lifetime, start);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let start = Instant::now();
        let stored = self.core.stored(key);
        let pool = self.backend().await?;
        let sql = self.core.statement(Operation::Remove);

        let result = sqlx::query(&sql)
            .bind(&*stored)
            .execute(&pool)
            .await
            .map_err(|e| self.core.fail(key, e))?;

        self.core.record_remove(key, result.rows_affected(), start);
        Ok(())
    }

    async fn remove_pattern(&self, pattern: &str) -> Result<u64> {
        let start = Instant::now();
        let translated = self.core.pattern(pattern);
        let pool = self.backend().await?;
        let sql = self.core.statement(Operation::RemovePattern);

        let result = sqlx::query(&sql)
            .bind(translated.like())
            .bind(translated.regex())
            .execute(&pool)
            .await
            .map_err(|e| self.core.fail(pattern, e))?;

        let removed = result.rows_affected();
        self.core.record_remove_pattern(pattern, removed, start);
        Ok(removed)
    }

    async fn clean(&self, mode: CleanMode) -> Result<u64> {
        let start = Instant::now();
        let pool = self.backend().await?;

        let result = match mode {
            CleanMode::All => {
                let sql = self.core.statement(Operation::CleanAll);
                sqlx::query(&sql).execute(&pool).await
            }
            CleanMode::Old => {
                let sql = self.core.statement(Operation::CleanOld);
                sqlx::query(&sql)
                    .bind(self.core.now())
                    .execute(&pool)
                    .await
            }
        }
        .map_err(|e| self.core.fail("*", e))?;

        let removed = result.rows_affected();
        self.core.record_clean(mode, removed, start);
        Ok(removed)
    }

    async fn get_timeout(&self, key: &str) -> Result<i64> {
        self.fetch_live_i64(Operation::GetTimeout, key).await
    }

    async fn get_last_modified(&self, key: &str) -> Result<i64> {
        self.fetch_live_i64(Operation::GetLastModified, key).await
    }

    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let stored: Vec<Cow<'_, str>> = keys.iter().map(|k| self.core.stored(k)).collect();
        let pool = self.backend().await?;
        let sql = self.core.statement(Operation::GetMany(stored.len()));

        let mut query = sqlx::query(&sql);
        for key in &stored {
            query = query.bind(&**key);
        }
        query = query.bind(self.core.now());

        let mut found = HashMap::with_capacity(keys.len());
        let mut rows = query.fetch(&pool);
        while let Some(row) = rows.try_next().await.map_err(|e| self.core.fail("*", e))? {
            let key: String = row.try_get(0)?;
            let data: Vec<u8> = row.try_get(1)?;
            found.insert(self.core.unprefixed(&key), data);
        }

        self.core.record_many(keys.len(), found.len());
        Ok(found)
    }

    async fn health_check(&self) -> Result<bool> {
        let pool = self.backend().await?;
        let sql = self.core.statement(Operation::Ping);

        let pong: i64 = sqlx::query_scalar(&sql).fetch_one(&pool).await?;
        Ok(pong == 1)
    }
}

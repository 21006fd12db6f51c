//! SQLite cache backend implementation.
//!
//! Pattern removal relies on SQL `REGEXP`, which SQLite does not ship by
//! default. Pools opened from a URL enable sqlx's `REGEXP` function
//! automatically; pools handed in through [`SqliteBackend::from_pool`] or a
//! [`ConnectionRegistry`] must be opened with
//! [`SqliteConnectOptions::with_regexp`].

use super::shared::CacheCore;
use super::{CacheBackend, CacheStats, CleanMode};
use crate::clock::Clock;
use crate::config::{ConnectionSource, SqlCacheConfig};
use crate::connection::ConnectionRegistry;
use crate::error::Result;
use crate::observability::CacheMetrics;
use crate::statement::{Dialect, Operation};
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite};
use std::borrow::Cow;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// SQLite backend storing entries in a `key`/`data`/`timeout`/`last_modified` table.
///
/// The connection is resolved on first use and shared by all clones.
///
/// # Example
///
/// ```no_run
/// # use sql_cache::backend::{SqliteBackend, CacheBackend};
/// # use sql_cache::config::SqlCacheConfig;
/// # use sql_cache::error::Result;
/// # async fn example() -> Result<()> {
/// let config = SqlCacheConfig::from_url("sqlite://cache.db").with_prefix("app1:");
/// let backend = SqliteBackend::new(config)?;
///
/// backend.set("user:1", b"alice".to_vec(), None).await?;
/// let value = backend.get("user:1").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SqliteBackend {
    core: CacheCore<Sqlite>,
}

impl SqliteBackend {
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
    pub fn from_pool(pool: SqlitePool, config: SqlCacheConfig) -> Result<Self> {
        config.validate_options()?;
        Ok(Self::build(config, None, Some(pool)))
    }

    fn build(
        config: SqlCacheConfig,
        source: Option<ConnectionSource>,
        pool: Option<SqlitePool>,
    ) -> Self {
        SqliteBackend {
            core: CacheCore::new("Sqlite", Dialect::Sqlite, config, source, pool),
        }
    }

    /// Resolve named connections through `registry`.
    pub fn with_registry(mut self, registry: Arc<ConnectionRegistry<Sqlite>>) -> Self {
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
    pub async fn backend(&self) -> Result<SqlitePool> {
        self.core.pool(self.connect()).await
    }

    /// Swap the underlying pool and drop all prepared statements.
    pub async fn replace_pool(&self, pool: SqlitePool) {
        self.core.replace_pool(pool).await;
    }

    async fn connect(&self) -> Result<SqlitePool> {
        let url = match self.core.source()? {
            ConnectionSource::Named(name) => return self.core.named_pool(name),
            ConnectionSource::Url(url) => url,
        };

        let options = SqliteConnectOptions::from_str(url)?.with_regexp();

        // Every connection to an in-memory database sees its own empty
        // database, so keep exactly one alive for the pool's lifetime.
        let pool_options = if is_memory_url(url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(self.core.config().max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        info!(
            "✓ Sqlite cache backend initialized (table: {})",
            self.core.config().table
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

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

impl CacheBackend for SqliteBackend {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::Error;

    const NOW: i64 = 1_700_000_000;

    async fn memory_pool() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .expect("Invalid sqlite url")
            .with_regexp();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .expect("Failed to connect");

        sqlx::query(
            r#"CREATE TABLE "cache" (
                "key" TEXT NOT NULL PRIMARY KEY,
                "data" BLOB NOT NULL,
                "timeout" INTEGER NOT NULL,
                "last_modified" INTEGER NOT NULL
            )"#,
        )
        .execute(&pool)
        .await
        .expect("Failed to create table");

        pool
    }

    async fn setup(config: SqlCacheConfig) -> (SqliteBackend, ManualClock) {
        let clock = ManualClock::new(NOW);
        let backend = SqliteBackend::from_pool(memory_pool().await, config.with_cleaning_factor(0))
            .expect("Failed to create backend")
            .with_clock(clock.clone());
        (backend, clock)
    }

    #[test]
    fn test_new_requires_connection() {
        let err = SqliteBackend::new(SqlCacheConfig::default()).err().unwrap();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_memory_url_detection() {
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite:file:shared?mode=memory&cache=shared"));
        assert!(!is_memory_url("sqlite://cache.db"));
    }

    #[tokio::test]
    async fn test_sqlite_backend_set_get() {
        let (backend, _) = setup(SqlCacheConfig::default()).await;

        backend
            .set("key1", b"value1".to_vec(), None)
            .await
            .expect("Failed to set");

        let result = backend.get("key1").await.expect("Failed to get");
        assert_eq!(result, Some(b"value1".to_vec()));
    }

    #[tokio::test]
    async fn test_sqlite_backend_miss() {
        let (backend, _) = setup(SqlCacheConfig::default()).await;

        assert_eq!(backend.get("nonexistent").await.expect("Failed to get"), None);
        assert!(!backend.has("nonexistent").await.expect("Failed to check"));
        assert_eq!(
            backend
                .get_or("nonexistent", b"DEFAULT".to_vec())
                .await
                .expect("Failed to get"),
            b"DEFAULT".to_vec()
        );
    }

    #[tokio::test]
    async fn test_sqlite_backend_prefix_is_applied() {
        let (backend, _) = setup(SqlCacheConfig::default().with_prefix("app1:")).await;

        backend
            .set("user", b"v".to_vec(), None)
            .await
            .expect("Failed to set");

        let pool = backend.backend().await.expect("No pool");
        let stored: String = sqlx::query_scalar(r#"SELECT "key" FROM "cache""#)
            .fetch_one(&pool)
            .await
            .expect("Failed to read raw row");
        assert_eq!(stored, "app1:user");
    }

    #[tokio::test]
    async fn test_sqlite_backend_timestamps() {
        let (backend, _) = setup(SqlCacheConfig::default()).await;

        backend
            .set("key", b"v".to_vec(), Some(Duration::from_secs(30)))
            .await
            .expect("Failed to set");

        assert_eq!(backend.get_timeout("key").await.unwrap(), NOW + 30);
        assert_eq!(backend.get_last_modified("key").await.unwrap(), NOW);
        assert_eq!(backend.get_timeout("missing").await.unwrap(), 0);
        assert_eq!(backend.get_last_modified("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_backend_default_lifetime() {
        let config = SqlCacheConfig::default().with_default_lifetime(Duration::from_secs(600));
        let (backend, _) = setup(config).await;

        backend.set("a", b"v".to_vec(), None).await.unwrap();
        backend
            .set("b", b"v".to_vec(), Some(Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(backend.get_timeout("a").await.unwrap(), NOW + 600);
        assert_eq!(backend.get_timeout("b").await.unwrap(), NOW + 600);
    }

    #[tokio::test]
    async fn test_sqlite_backend_statements_reused() {
        let (backend, _) = setup(SqlCacheConfig::default()).await;

        backend.get("a").await.unwrap();
        backend.get("b").await.unwrap();
        backend.has("a").await.unwrap();
        assert_eq!(backend.prepared_statements(), 2);

        let pool = backend.backend().await.unwrap();
        backend.replace_pool(pool).await;
        assert_eq!(backend.prepared_statements(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_backend_stats() {
        let (backend, clock) = setup(SqlCacheConfig::default()).await;

        backend
            .set("short", b"1234".to_vec(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        backend
            .set("long", b"12".to_vec(), Some(Duration::from_secs(500)))
            .await
            .unwrap();
        clock.advance(10);

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.total_bytes, 6);
        backend.log_stats().await.unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_backend_health_check() {
        let (backend, _) = setup(SqlCacheConfig::default()).await;
        assert!(backend.health_check().await.expect("Failed to check health"));
    }

    #[tokio::test]
    async fn test_sqlite_backend_connects_from_url() {
        let backend = SqliteBackend::new(
            SqlCacheConfig::from_url("sqlite::memory:").with_cleaning_factor(0),
        )
        .expect("Failed to create backend");

        let pool = backend.backend().await.expect("Failed to connect");
        sqlx::query(
            r#"CREATE TABLE "cache" ("key" TEXT PRIMARY KEY, "data" BLOB NOT NULL,
               "timeout" INTEGER NOT NULL, "last_modified" INTEGER NOT NULL)"#,
        )
        .execute(&pool)
        .await
        .expect("Failed to create table");

        backend.set("k", b"v".to_vec(), None).await.unwrap();
        assert!(backend.has("k").await.unwrap());
        assert_eq!(backend.remove_pattern("*").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_backend_named_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        registry.register("main", memory_pool().await);

        let backend = SqliteBackend::new(SqlCacheConfig::from_connection("main"))
            .unwrap()
            .with_registry(registry);

        backend.set("k", b"v".to_vec(), None).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_sqlite_backend_unknown_named_connection() {
        let backend = SqliteBackend::new(SqlCacheConfig::from_connection("nope"))
            .unwrap()
            .with_registry(Arc::new(ConnectionRegistry::new()));

        let err = backend.get("k").await.unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));

        let backend = SqliteBackend::new(SqlCacheConfig::from_connection("nope")).unwrap();
        assert!(matches!(backend.get("k").await, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_sqlite_backend_missing_table_propagates() {
        let (backend, _) =
            setup(SqlCacheConfig::default().with_table("no_such_table")).await;

        let err = backend.get("k").await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}

//! Named connection provider.
//!
//! Host applications usually own their database pools. A [`ConnectionRegistry`]
//! lets them register pools under a name so cache backends configured with
//! `connection = "<name>"` can share them instead of opening their own.

use crate::error::{Error, Result};
use dashmap::DashMap;
use sqlx::{Database, Pool};

/// Thread-safe registry of named database pools.
///
/// # Example
///
/// ```ignore
/// use sql_cache::connection::ConnectionRegistry;
/// use std::sync::Arc;
///
/// let registry = Arc::new(ConnectionRegistry::new());
/// registry.register("main", pool.clone());
///
/// let backend = SqliteBackend::new(SqlCacheConfig::from_connection("main"))?
///     .with_registry(registry);
/// ```
pub struct ConnectionRegistry<DB: Database> {
    pools: DashMap<String, Pool<DB>>,
}

impl<DB: Database> ConnectionRegistry<DB> {
    pub fn new() -> Self {
        ConnectionRegistry {
            pools: DashMap::new(),
        }
    }

    /// Register a pool under `name`, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, pool: Pool<DB>) {
        let name = name.into();
        debug!("✓ Registered connection {}", name);
        self.pools.insert(name, pool);
    }

    /// Remove the pool registered under `name`.
    pub fn unregister(&self, name: &str) -> Option<Pool<DB>> {
        self.pools.remove(name).map(|(_, pool)| pool)
    }

    /// Look up a pool by name.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Pool<DB>> {
        self.pools
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::ConfigError(format!("Unknown database connection: {}", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl<DB: Database> Default for ConnectionRegistry<DB> {
    fn default() -> Self {
        Self::new()
    }
}

//! # sql-cache
//!
//! A cache backend that persists entries in a relational table, with
//! time-based expiry and pattern-based invalidation.
//!
//! ## Features
//!
//! - **Table-backed:** One row per key in a `key`/`data`/`timeout`/`last_modified` table
//! - **Lazy expiry:** Reads ignore expired rows; sweeps delete them inline or in the background
//! - **Pattern invalidation:** `user:*` and `user:**` translated into `LIKE` + `REGEXP` predicates
//! - **Race-free upserts:** Replacement relies on the table's unique key, never check-then-act
//! - **Namespaced:** Several logical caches can share one table through key prefixes
//! - **Opaque payloads:** Values are stored and returned byte-for-byte
//!
//! ## Quick Start
//!
//! The table is expected to exist:
//!
//! ```sql
//! CREATE TABLE cache (
//!     key           VARCHAR(255) NOT NULL PRIMARY KEY,
//!     data          BLOB         NOT NULL,
//!     timeout       BIGINT       NOT NULL,
//!     last_modified BIGINT       NOT NULL
//! );
//! CREATE INDEX cache_timeout ON cache (timeout);
//! ```
//!
//! ```ignore
//! use sql_cache::{CacheBackend, CleanMode, SqlCacheConfig};
//! use sql_cache::backend::SqliteBackend;
//! use std::time::Duration;
//!
//! let config = SqlCacheConfig::from_url("sqlite://cache.db")
//!     .with_prefix("app1:")
//!     .with_default_lifetime(Duration::from_secs(3600));
//! let cache = SqliteBackend::new(config)?;
//!
//! cache.set("user:1", b"alice".to_vec(), None).await?;
//! cache.set("user:1:profile", b"...".to_vec(), Some(Duration::from_secs(60))).await?;
//!
//! assert!(cache.has("user:1").await?);
//!
//! // Removes "user:1" but not "user:1:profile"
//! cache.remove_pattern("user:*").await?;
//!
//! // Drop rows that already expired
//! cache.clean(CleanMode::Old).await?;
//! ```
//!
//! ## Sweeping
//!
//! By default roughly one write in 1000 sweeps expired rows first. For a
//! background sweep instead, disable the inline one and spawn a sweeper:
//!
//! ```ignore
//! let cache = SqliteBackend::new(config.with_cleaning_factor(0))?;
//! let handle = sql_cache::sweep::spawn_sweeper(cache.clone(), Duration::from_secs(60));
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod key;
pub mod observability;
pub mod pattern;
pub mod statement;
pub mod sweep;

// Re-exports for convenience
pub use backend::{CacheBackend, CacheStats, CleanMode};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SqlCacheConfig;
pub use connection::ConnectionRegistry;
pub use error::{Error, Result};
pub use key::KeyNamespace;
pub use pattern::KeyPattern;

#[cfg(feature = "mysql")]
pub use backend::MySqlBackend;
#[cfg(feature = "sqlite")]
pub use backend::SqliteBackend;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

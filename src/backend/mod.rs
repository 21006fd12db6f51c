//! Cache backend contract and SQL implementations.

use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(any(feature = "sqlite", feature = "mysql"))]
mod shared;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mysql")]
pub use mysql::MySqlBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

/// Which rows a `clean` call removes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CleanMode {
    /// Every row, live or not.
    #[default]
    All,
    /// Rows whose timeout is strictly before now.
    ///
    /// A row whose timeout equals now is already invisible to reads but is
    /// kept by this sweep; the next one removes it.
    Old,
}

/// Physical table statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Rows stored, expired ones included.
    pub total_entries: u64,
    /// Rows no longer live but not yet swept.
    pub expired_entries: u64,
    /// Sum of payload sizes.
    pub total_bytes: u64,
}

impl CacheStats {
    /// Build from the signed aggregates SQL returns.
    pub(crate) fn from_counts(total: i64, expired: i64, bytes: i64) -> Self {
        let unsigned = |n: i64| u64::try_from(n).unwrap_or(0);
        CacheStats {
            total_entries: unsigned(total),
            expired_entries: unsigned(expired),
            total_bytes: unsigned(bytes),
        }
    }
}

/// Contract shared by cache backends.
///
/// Keys and patterns are given without the namespace prefix; backends apply
/// it themselves. Payloads are opaque bytes and are never interpreted.
///
/// A miss is never an error. Every `Err` is a configuration or storage
/// failure, propagated as-is.
///
/// **IMPORTANT:** All methods use `&self`. Backends share their connection
/// handle internally and are cheap to clone.
///
/// **ASYNC:** All methods return `Send` futures so backends can be driven
/// from spawned tasks (see [`crate::sweep::spawn_sweeper`]).
pub trait CacheBackend: Send + Sync + Clone {
    /// Retrieve the payload of a live record.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))` - Live record found
    /// - `Ok(None)` - Key absent or expired
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Retrieve the payload of a live record, or `default` on a miss.
    fn get_or(&self, key: &str, default: Vec<u8>) -> impl Future<Output = Result<Vec<u8>>> + Send {
        async move { Ok(self.get(key).await?.unwrap_or(default)) }
    }

    /// Whether a live record exists. Agrees with [`CacheBackend::get`].
    fn has(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Insert or replace a record.
    ///
    /// # Arguments
    /// - `key`: Cache key
    /// - `data`: Opaque payload
    /// - `lifetime`: Time-to-live. `None` or zero falls back to the backend default.
    fn set(
        &self,
        key: &str,
        data: Vec<u8>,
        lifetime: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove one record, live or expired. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove every record matching a key pattern.
    ///
    /// `*` matches one key segment, `**` matches across segments.
    ///
    /// # Returns
    /// Number of rows deleted.
    fn remove_pattern(&self, pattern: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Sweep the table.
    ///
    /// # Returns
    /// Number of rows deleted.
    fn clean(&self, mode: CleanMode) -> impl Future<Output = Result<u64>> + Send;

    /// Expiry instant (epoch seconds) of a live record, `0` on a miss.
    fn get_timeout(&self, key: &str) -> impl Future<Output = Result<i64>> + Send;

    /// Last write instant (epoch seconds) of a live record, `0` on a miss.
    fn get_last_modified(&self, key: &str) -> impl Future<Output = Result<i64>> + Send;

    /// Bulk read in one round trip.
    ///
    /// Only live records appear in the map; missing keys are simply absent.
    /// An empty `keys` slice returns an empty map without touching storage.
    fn get_many(
        &self,
        keys: &[&str],
    ) -> impl Future<Output = Result<HashMap<String, Vec<u8>>>> + Send;

    /// Health check - verify storage is reachable.
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(true) }
    }
}

/// Expiry instant for a write at `now`, saturating on absurd lifetimes.
pub(crate) fn expiry(now: i64, lifetime: Duration) -> i64 {
    now.saturating_add(i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX))
}

//! Metrics hooks for cache operations.
//!
//! Implement [`CacheMetrics`] to feed cache statistics into your monitoring
//! system, then attach it to a backend:
//!
//! ```ignore
//! use sql_cache::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("cache_hits").inc();
//!     }
//! }
//!
//! let backend = SqliteBackend::new(config)?
//!     .with_metrics(Arc::new(PrometheusMetrics));
//! ```
//!
//! Unless overridden, every hook logs through the `log` crate. Backends use
//! [`NoOpMetrics`] when nothing is attached.
//!
//! Keys passed to the hooks are the caller's keys, without the namespace prefix.

use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a read that found a live record.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// Record a read that found nothing live.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// Record a write.
    fn record_set(&self, key: &str, duration: Duration) {
        debug!("Cache SET: {} took {:?}", key, duration);
    }

    /// Record a key or pattern deletion.
    fn record_delete(&self, key: &str, rows: u64, duration: Duration) {
        debug!("Cache DELETE: {} ({} rows) took {:?}", key, rows, duration);
    }

    /// Record a sweep.
    fn record_clean(&self, rows: u64, duration: Duration) {
        debug!("Cache CLEAN: {} rows took {:?}", rows, duration);
    }

    /// Record an error.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _duration: Duration) {}
    fn record_delete(&self, _key: &str, _rows: u64, _duration: Duration) {}
    fn record_clean(&self, _rows: u64, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

//! Backend pool
//!
//! Fixed set of backend descriptors built once at startup. Entries are never
//! added or removed at runtime; their in-flight counters and health flags are
//! the only mutable state, and both are plain atomics, so selection needs no
//! locking.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// One upstream backend
#[derive(Debug)]
pub struct Backend {
    /// Backend address (host:port)
    address: String,

    /// Requests currently being proxied to this backend
    inflight: AtomicI64,

    /// Result of the latest liveness probe; false until the first probe
    healthy: AtomicBool,
}

impl Backend {
    /// Create a backend descriptor; unhealthy until probed
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            inflight: AtomicI64::new(0),
            healthy: AtomicBool::new(false),
        }
    }

    /// Backend address (host:port)
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current in-flight request count
    pub fn inflight(&self) -> i64 {
        self.inflight.load(Ordering::Relaxed)
    }

    /// Latest probe result
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Record a probe result
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    /// Account for one proxied request
    ///
    /// The returned guard decrements the counter when dropped, so every exit
    /// path of the request pairs the increment with its decrement.
    pub fn begin_request(self: &Arc<Self>) -> InflightGuard {
        self.inflight.fetch_add(1, Ordering::Relaxed);
        InflightGuard {
            backend: Arc::clone(self),
        }
    }
}

/// RAII handle for one in-flight request
pub struct InflightGuard {
    backend: Arc<Backend>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.backend.inflight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// The set of configured backends
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
}

impl BackendPool {
    /// Build the pool from a configured address list
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backends: addresses
                .into_iter()
                .map(|addr| Arc::new(Backend::new(addr)))
                .collect(),
        }
    }

    /// All backends, in configuration order
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Pick the healthy backend with the fewest in-flight requests
    ///
    /// Ties break in configuration order (first wins). The counter reads are
    /// unsynchronized snapshots, so the winner may be stale by one request;
    /// that is acceptable for dispatch. Returns `None` when no backend is
    /// healthy.
    pub fn select_least_connected(&self) -> Option<Arc<Backend>> {
        let mut selected: Option<&Arc<Backend>> = None;
        let mut min_inflight = i64::MAX;

        for backend in &self.backends {
            if !backend.is_healthy() {
                continue;
            }

            let current = backend.inflight();
            if current < min_inflight {
                min_inflight = current;
                selected = Some(backend);
            }
        }

        selected.cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(entries: &[(&str, i64, bool)]) -> BackendPool {
        let pool = BackendPool::new(entries.iter().map(|(addr, _, _)| *addr));
        for (backend, (_, inflight, healthy)) in pool.backends().iter().zip(entries) {
            backend.inflight.store(*inflight, Ordering::Relaxed);
            backend.set_healthy(*healthy);
        }
        pool
    }

    #[test]
    fn test_select_lowest_inflight() {
        let pool = pool_with(&[("a", 5, true), ("b", 3, true), ("c", 10, true)]);

        let selected = pool.select_least_connected().unwrap();
        assert_eq!(selected.address(), "b");
    }

    #[test]
    fn test_select_skips_unhealthy() {
        let pool = pool_with(&[("a", 1, false), ("b", 0, true)]);

        let selected = pool.select_least_connected().unwrap();
        assert_eq!(selected.address(), "b");
    }

    #[test]
    fn test_select_none_healthy() {
        let pool = pool_with(&[("a", 0, false), ("b", 0, false)]);

        assert!(pool.select_least_connected().is_none());
    }

    #[test]
    fn test_select_tie_breaks_first() {
        let pool = pool_with(&[("a", 2, true), ("b", 2, true)]);

        let selected = pool.select_least_connected().unwrap();
        assert_eq!(selected.address(), "a");
    }

    #[test]
    fn test_inflight_guard_balances_counter() {
        let pool = pool_with(&[("a", 0, true)]);
        let backend = pool.select_least_connected().unwrap();

        let before = backend.inflight();
        {
            let _guard = backend.begin_request();
            assert_eq!(backend.inflight(), before + 1);

            let _second = backend.begin_request();
            assert_eq!(backend.inflight(), before + 2);
        }
        assert_eq!(backend.inflight(), before);
    }
}

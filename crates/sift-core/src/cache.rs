//! Time-to-live cache service.
//!
//! Holds one shared value behind an `Arc` that is swapped whole on refresh,
//! so readers never observe a half-built value. Refreshes run the loader
//! without holding the lock; two callers racing past an expired TTL may both
//! refresh, and the last swap wins.

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::warn;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.lock().map(|n| *n).unwrap_or_else(|p| *p.into_inner())
    }
}

struct Entry<T> {
    value: Arc<T>,
    loaded_at: Instant,
    invalidated: bool,
}

/// A single cached value with a time-to-live.
pub struct TtlCache<T> {
    slot: RwLock<Option<Entry<T>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    name: &'static str,
}

impl<T> TtlCache<T> {
    pub fn new(name: &'static str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
            clock,
            name,
        }
    }

    /// Current value if present and fresh.
    pub fn peek(&self) -> Option<Arc<T>> {
        let now = self.clock.now();
        let slot = self.slot.read().ok()?;
        slot.as_ref()
            .filter(|e| !e.invalidated && now.duration_since(e.loaded_at) < self.ttl)
            .map(|e| Arc::clone(&e.value))
    }

    /// Return the cached value, running `loader` when empty or stale.
    ///
    /// If the loader fails while a previous value exists, the previous value
    /// is served and the failure is logged.
    pub fn get_or_refresh<E, F>(&self, loader: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::fmt::Display,
    {
        if let Some(fresh) = self.peek() {
            return Ok(fresh);
        }

        match loader() {
            Ok(value) => {
                let value = Arc::new(value);
                let entry = Entry {
                    value: Arc::clone(&value),
                    loaded_at: self.clock.now(),
                    invalidated: false,
                };
                if let Ok(mut slot) = self.slot.write() {
                    *slot = Some(entry);
                }
                Ok(value)
            }
            Err(err) => {
                let stale = self
                    .slot
                    .read()
                    .ok()
                    .and_then(|slot| slot.as_ref().map(|e| Arc::clone(&e.value)));
                match stale {
                    Some(previous) => {
                        warn!(cache = self.name, error = %err, "Refresh failed, serving stale value");
                        Ok(previous)
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Mark the cached value stale; the next access reloads.
    ///
    /// The old value is kept only as a fallback for a failing reload.
    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.slot.write() {
            if let Some(entry) = slot.as_mut() {
                entry.invalidated = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(clock: Arc<ManualClock>) -> TtlCache<usize> {
        TtlCache::new("test", Duration::from_secs(60), clock)
    }

    #[test]
    fn test_hit_within_ttl_returns_same_arc() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache(clock.clone());
        let loads = AtomicUsize::new(0);
        let load = || -> Result<usize, String> { Ok(loads.fetch_add(1, Ordering::SeqCst)) };

        let a = cache.get_or_refresh(load).unwrap();
        clock.advance(Duration::from_secs(59));
        let b = cache.get_or_refresh(|| -> Result<usize, String> { Ok(99) }).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expiry_reloads() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache(clock.clone());
        cache.get_or_refresh(|| -> Result<usize, String> { Ok(1) }).unwrap();
        clock.advance(Duration::from_secs(61));
        assert!(cache.peek().is_none());
        let v = cache.get_or_refresh(|| -> Result<usize, String> { Ok(2) }).unwrap();
        assert_eq!(*v, 2);
    }

    #[test]
    fn test_failed_refresh_serves_stale() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache(clock.clone());
        cache.get_or_refresh(|| -> Result<usize, String> { Ok(7) }).unwrap();
        clock.advance(Duration::from_secs(120));
        let v = cache
            .get_or_refresh(|| -> Result<usize, String> { Err("db down".into()) })
            .unwrap();
        assert_eq!(*v, 7);
    }

    #[test]
    fn test_failed_first_load_propagates() {
        let cache = cache(Arc::new(ManualClock::new()));
        let err = cache
            .get_or_refresh(|| -> Result<usize, String> { Err("db down".into()) })
            .unwrap_err();
        assert_eq!(err, "db down");
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let cache = cache(Arc::new(ManualClock::new()));
        cache.get_or_refresh(|| -> Result<usize, String> { Ok(1) }).unwrap();
        cache.invalidate();
        let v = cache.get_or_refresh(|| -> Result<usize, String> { Ok(2) }).unwrap();
        assert_eq!(*v, 2);
    }
}

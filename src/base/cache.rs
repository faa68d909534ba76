//! A small time-to-live cache for backend responses.
//!
//! Entries expire lazily: nothing sweeps the map, but a read of an expired
//! entry removes it and reports a miss.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

/// TTL applied by [`TtlCache::set_default`].
pub const DEFAULT_TTL_SECS: u64 = 60;

// Traits.

/// Source of the current time, so that expiry can be tested without sleeping.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// Structs.

struct CacheEntry<V> {
    value: V,
    /// `None` when the TTL is too large to represent.
    expires_at: Option<DateTime<Utc>>,
}

/// Key/value store with per-key expiry.
///
/// Not synchronized; see [`ResponseCache`] for the shared variant.
pub struct TtlCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { entries: HashMap::new(), clock }
    }

    /// Returns the value for `key` if present and unexpired.
    ///
    /// An expired entry is removed.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => entry.expires_at.is_some_and(|expires_at| now >= expires_at),
        };

        if expired {
            self.entries.remove(key);
            return None;
        }

        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Stores `value` under `key` for `ttl_secs`, replacing any previous entry.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl_secs: u64) {
        let expires_at = TimeDelta::from_std(Duration::from_secs(ttl_secs))
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl));

        self.entries.insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Stores `value` with [`DEFAULT_TTL_SECS`].
    pub fn set_default(&mut self, key: impl Into<String>, value: V) {
        self.set(key, value, DEFAULT_TTL_SECS);
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared cache of decoded JSON responses, keyed by request URL.
///
/// This is trivially cloneable; every clone sees the same entries.
#[derive(Clone, Default)]
pub struct ResponseCache {
    inner: Arc<Mutex<TtlCache<Value>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TtlCache::with_clock(clock))),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).get(key)
    }

    pub fn set(&self, key: &str, value: Value, ttl_secs: u64) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).set(key, value, ttl_secs);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Tests.

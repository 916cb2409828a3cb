// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Tipvault

//! # Cache Service
//!
//! In-process LRU + TTL cache, constructed once at startup and passed by
//! reference to every component that needs one. Hot read-side lookups
//! (record balances on the API surface) go through it and are invalidated
//! on mutation.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Cached value + insertion timestamp.
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// LRU cache with per-entry TTL.
pub struct CacheService<K, V> {
    cache: Mutex<LruCache<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> CacheService<K, V> {
    /// Create a cache holding up to `capacity` entries for at most `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
            ttl,
        }
    }

    /// Get a live entry, dropping it if expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
            cache.pop(key);
        }
        None
    }

    /// Insert or refresh an entry.
    pub fn set(&self, key: K, value: V) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                key,
                CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Drop an entry, if present.
    pub fn invalidate(&self, key: &K) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(key);
        }
    }
}

// In-Memory Tile Cache
// Purpose: bounded LRU over already-serialized tile responses
// Policy: byte budget with LRU eviction, per-entry TTL, periodic sweep

use lru::LruCache;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use utoipa::ToSchema;

use crate::config::TileCacheConfig;
use crate::utils::ScheduledTask;

struct TileEntry {
    body: String,
    size: usize,
    inserted: Instant,
}

struct Inner {
    lru: LruCache<String, TileEntry>,
    total_bytes: usize,
}

/// Counters served by the introspection endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TileCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub sets: u64,
    pub entries: usize,
    pub size_mb: f64,
}

pub struct TileCache {
    inner: Mutex<Inner>,
    budget_bytes: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    sets: AtomicU64,
}

impl TileCache {
    pub fn new(config: &TileCacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner { lru: LruCache::unbounded(), total_bytes: 0 }),
            budget_bytes: config.max_size_mb * 1024 * 1024,
            ttl: Duration::from_secs(config.ttl_secs),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    /// Serialized response for the key, or a miss. Expired entries behave
    /// like misses and are deleted on the way out.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().expect("tile cache poisoned");

        let expired = match inner.lru.get(key) {
            Some(entry) if entry.inserted.elapsed() >= self.ttl => true,
            Some(entry) => {
                let body = entry.body.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(body);
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            },
        };

        if expired
            && let Some(entry) = inner.lru.pop(key)
        {
            inner.total_bytes -= entry.size;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a serialized response, evicting least-recently-accessed entries
    /// until the byte budget holds again. The newest entry itself always
    /// stays, so the cache may briefly exceed the budget by one insert.
    pub fn set(&self, key: impl Into<String>, body: impl Into<String>) {
        let key = key.into();
        let body = body.into();
        // serialized byte count x2 approximates the in-memory footprint
        let size = body.len() * 2;

        let mut inner = self.inner.lock().expect("tile cache poisoned");

        if let Some(old) = inner.lru.pop(&key) {
            inner.total_bytes -= old.size;
        }

        inner.lru.push(key, TileEntry { body, size, inserted: Instant::now() });
        inner.total_bytes += size;
        self.sets.fetch_add(1, Ordering::Relaxed);

        while inner.total_bytes > self.budget_bytes && inner.lru.len() > 1 {
            if let Some((_, evicted)) = inner.lru.pop_lru() {
                inner.total_bytes -= evicted.size;
                self.evictions.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }

    /// Drop every expired entry; runs on the sweep interval
    pub fn sweep(&self) {
        let mut inner = self.inner.lock().expect("tile cache poisoned");

        let expired: Vec<String> = inner
            .lru
            .iter()
            .filter(|(_, entry)| entry.inserted.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = inner.lru.pop(key) {
                inner.total_bytes -= entry.size;
            }
        }

        if !expired.is_empty() {
            tracing::debug!("Tile cache sweep removed {} expired entries", expired.len());
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("tile cache poisoned");
        inner.lru.clear();
        inner.total_bytes = 0;
        tracing::info!("Tile cache cleared");
    }

    pub fn stats(&self) -> TileCacheStats {
        let inner = self.inner.lock().expect("tile cache poisoned");
        TileCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            entries: inner.lru.len(),
            size_mb: inner.total_bytes as f64 / (1024.0 * 1024.0),
        }
    }
}

impl ScheduledTask for TileCache {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move {
            self.sweep();
            Ok(())
        })
    }
}

//! Keyed TTL cache with LRU eviction and single-flight fills.
//!
//! Used to fan out quote and holdings lookups without hammering the
//! upstream gateway: concurrent `get_or_fill` calls for the same key share
//! one loader execution, and its result (or failure) reaches every waiter.
//! Failures are never cached.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub evictions: u64,
    pub size: usize,
}

struct Entry<V> {
    value: V,
    /// None means the entry never expires (ttl == 0).
    expires_at: Option<Instant>,
    last_used: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|t| now > t).unwrap_or(false)
    }
}

type FillResult<V> = Option<std::result::Result<V, String>>;

enum BeginFill<V> {
    Hit(V),
    Join(watch::Receiver<FillResult<V>>),
    Start(watch::Sender<FillResult<V>>),
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    /// One watch channel per key with a load in flight; waiters subscribe.
    inflight: HashMap<String, watch::Receiver<FillResult<V>>>,
    tick: u64,
    stats: CacheStats,
}

pub struct TtlCache<V> {
    name: &'static str,
    max_entries: usize,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(name: &'static str, max_entries: usize) -> Self {
        Self {
            name,
            max_entries: max_entries.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                inflight: HashMap::new(),
                tick: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Non-async so the `parking_lot::MutexGuard` it holds never appears in
    /// an `async fn`'s generated state machine (parking_lot's guard is
    /// `!Send`, which would make futures built on top of this cache `!Send`
    /// even though the guard is always released before any `.await`).
    fn begin_fill(&self, key: &str) -> BeginFill<V> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if let Some(entry) = inner.entries.get(key) {
            if !entry.is_expired(now) {
                let value = entry.value.clone();
                inner.tick += 1;
                let tick = inner.tick;
                inner.entries.get_mut(key).unwrap().last_used = tick;
                inner.stats.hits += 1;
                return BeginFill::Hit(value);
            }
            inner.entries.remove(key);
            inner.stats.evictions += 1;
        }

        if let Some(rx) = inner.inflight.get(key) {
            // Another task owns the load; join it.
            let rx = rx.clone();
            inner.stats.hits += 1;
            return BeginFill::Join(rx);
        }

        let (tx, rx) = watch::channel(None);
        inner.inflight.insert(key.to_string(), rx);
        inner.stats.misses += 1;
        BeginFill::Start(tx)
    }

    /// Look up `key`; on a miss run `loader` once, with every concurrent
    /// caller for the same key awaiting that single execution. Returns the
    /// value and whether this call performed the load.
    pub async fn get_or_fill<F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<(V, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let tx = match self.begin_fill(key) {
            BeginFill::Hit(value) => return Ok((value, false)),
            BeginFill::Join(mut rx) => {
                return Self::await_inflight(&mut rx).await.map(|v| (v, false));
            }
            BeginFill::Start(tx) => tx,
        };

        let outcome = loader().await;

        let mut inner = self.inner.lock();
        inner.inflight.remove(key);
        match outcome {
            Ok(value) => {
                inner.stats.loads += 1;
                self.insert_locked(&mut inner, key, value.clone(), ttl);
                let _ = tx.send(Some(Ok(value.clone())));
                Ok((value, true))
            }
            Err(e) => {
                debug!(cache = self.name, key, error = %e, "loader failed; not cached");
                let _ = tx.send(Some(Err(e.to_string())));
                Err(e)
            }
        }
    }

    async fn await_inflight(rx: &mut watch::Receiver<FillResult<V>>) -> Result<V> {
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result.map_err(|e| anyhow!(e));
            }
            if rx.changed().await.is_err() {
                return Err(anyhow!("cache loader dropped without a result"));
            }
        }
    }

    /// Insert a value directly, bypassing single-flight.
    pub fn put(&self, key: &str, value: V, ttl: Duration) {
        let mut inner = self.inner.lock();
        self.insert_locked(&mut inner, key, value, ttl);
    }

    fn insert_locked(&self, inner: &mut Inner<V>, key: &str, value: V, ttl: Duration) {
        let now = Instant::now();

        // Expiry is eager on write: drop anything already dead.
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now));
        inner.stats.evictions += (before - inner.entries.len()) as u64;

        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: (!ttl.is_zero()).then(|| now + ttl),
                last_used: tick,
            },
        );

        while inner.entries.len() > self.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    inner.entries.remove(&k);
                    inner.stats.evictions += 1;
                    debug!(cache = self.name, key = %k, "evicted LRU entry");
                }
                None => break,
            }
        }
    }

    /// Peek without counting stats or triggering a load.
    pub fn peek(&self, key: &str) -> Option<V> {
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .filter(|e| !e.is_expired(Instant::now()))
            .map(|e| e.value.clone())
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.lock().entries.remove(key);
    }

    pub fn invalidate_all(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.entries.len(),
            ..inner.stats
        }
    }
}

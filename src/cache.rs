//! The shared key/value cache that backs lock state.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;

pub type CacheFuture<'a, T> = BoxFuture<'a, T>;

/// A shared cache with TTL semantics.
///
/// The lock manager keys lock entries by request URI in one of these;
/// with a distributed implementation every worker sees the same lock
/// view. `set_if_absent` must be atomic: concurrent calls for one key
/// succeed exactly once.
///
/// A `ttl` of 0 means "no expiry".
pub trait LockCache: Debug + Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>>;
    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: u64) -> CacheFuture<'a, ()>;
    fn set_if_absent<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: u64) -> CacheFuture<'a, bool>;
    fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires.map(|t| Instant::now() >= t).unwrap_or(false)
    }
}

/// Process-local `LockCache`, a mutexed map with lazy expiry.
///
/// Fine for a single-process deployment or for tests; a multi-worker
/// deployment plugs a shared cache in behind the same trait.
#[derive(Debug, Clone)]
pub struct MemCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemCache {
    pub fn new() -> Arc<MemCache> {
        Arc::new(MemCache {
            entries: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

fn expires_at(ttl: u64) -> Option<Instant> {
    if ttl == 0 {
        None
    } else {
        Some(Instant::now() + Duration::from_secs(ttl))
    }
}

impl LockCache for MemCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>> {
        async move {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(e) if e.expired() => {
                    entries.remove(key);
                    None
                }
                Some(e) => Some(e.value.clone()),
                None => None,
            }
        }
        .boxed()
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: u64) -> CacheFuture<'a, ()> {
        async move {
            self.entries.lock().insert(
                key.to_string(),
                Entry {
                    value,
                    expires: expires_at(ttl),
                },
            );
        }
        .boxed()
    }

    fn set_if_absent<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: u64) -> CacheFuture<'a, bool> {
        async move {
            let mut entries = self.entries.lock();
            if let Some(e) = entries.get(key) {
                if !e.expired() {
                    return false;
                }
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value,
                    expires: expires_at(ttl),
                },
            );
            true
        }
        .boxed()
    }

    fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
        async move {
            self.entries.lock().remove(key);
        }
        .boxed()
    }
}

//! The advisory lock registry.
//!
//! Locks are keyed by the fully qualified request URI (scheme, host,
//! path), so the same filesystem resource seen through two virtual
//! hosts is two independent locks. State lives in the shared cache;
//! the cache's TTL is the lock timeout, so an expired lock is simply
//! absent.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::LockCache;

/// Lock depth: the target only, or the whole subtree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LockDepth {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "infinity")]
    Infinity,
}

/// One granted lock, as persisted under its URI key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub token: String,
    /// The `D:owner` element from the LOCK body, serialised verbatim.
    pub owner: Option<String>,
    pub depth: LockDepth,
    /// Validity in seconds from `created_at`.
    pub timeout: u64,
    /// Unix timestamp of the grant or last refresh.
    pub created_at: u64,
}

#[derive(Debug, PartialEq)]
pub enum LockError {
    /// An unexpired lock with a different token covers the URI.
    Conflict,
    /// No (unexpired) lock under the URI, or the token does not match.
    NotFound,
    /// The lock record in the cache did not decode.
    Corrupt,
}

pub type LockResult<T> = Result<T, LockError>;

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Grants, refreshes, validates and releases locks on top of a shared
/// cache. Cheap to clone; all clones share the backing cache.
#[derive(Debug, Clone)]
pub struct LockManager {
    cache: Arc<dyn LockCache>,
}

impl LockManager {
    pub fn new(cache: Arc<dyn LockCache>) -> LockManager {
        LockManager { cache }
    }

    async fn fetch(&self, uri: &str) -> LockResult<LockRecord> {
        let raw = self.cache.get(uri).await.ok_or(LockError::NotFound)?;
        serde_json::from_slice(&raw).map_err(|_| LockError::Corrupt)
    }

    /// Grant a new lock. Fails with `Conflict` if an unexpired entry
    /// already holds the URI; the set-if-absent primitive of the cache
    /// makes two concurrent acquires race safely (exactly one wins).
    pub async fn acquire(
        &self,
        uri: &str,
        owner: Option<String>,
        depth: LockDepth,
        timeout: u64,
    ) -> LockResult<LockRecord> {
        let record = LockRecord {
            token: Uuid::new_v4().urn().to_string(),
            owner,
            depth,
            timeout,
            created_at: now_unix(),
        };
        let raw = serde_json::to_vec(&record).map_err(|_| LockError::Corrupt)?;
        if !self.cache.set_if_absent(uri, raw, timeout).await {
            debug!("acquire: {} already locked", uri);
            return Err(LockError::Conflict);
        }
        trace!("acquire: {} -> {}", uri, record.token);
        Ok(record)
    }

    /// Extend a held lock's validity. The token must match.
    pub async fn refresh(&self, uri: &str, token: &str, timeout: u64) -> LockResult<LockRecord> {
        let mut record = self.fetch(uri).await?;
        if record.token != token {
            return Err(LockError::NotFound);
        }
        record.timeout = timeout;
        record.created_at = now_unix();
        let raw = serde_json::to_vec(&record).map_err(|_| LockError::Corrupt)?;
        self.cache.set(uri, raw, timeout).await;
        trace!("refresh: {} -> {}", uri, record.token);
        Ok(record)
    }

    /// Check that `token` currently holds the lock on `uri`.
    pub async fn validate(&self, uri: &str, token: &str) -> LockResult<LockRecord> {
        let record = self.fetch(uri).await?;
        if record.token != token {
            return Err(LockError::NotFound);
        }
        Ok(record)
    }

    /// Release a held lock. The token must match.
    pub async fn release(&self, uri: &str, token: &str) -> LockResult<()> {
        let record = self.fetch(uri).await?;
        if record.token != token {
            return Err(LockError::NotFound);
        }
        self.cache.delete(uri).await;
        trace!("release: {} -> {}", uri, token);
        Ok(())
    }

    /// Drop whatever lock covers `uri`, token unseen. Used after the
    /// resource itself went away (MOVE, DELETE).
    pub async fn forget(&self, uri: &str) {
        self.cache.delete(uri).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemCache;

    fn manager() -> LockManager {
        LockManager::new(MemCache::new())
    }

    #[tokio::test]
    async fn acquire_is_exclusive() {
        let lm = manager();
        let lock = lm.acquire("http://h/a", None, LockDepth::Zero, 600).await.unwrap();
        assert!(lock.token.starts_with("urn:uuid:"));
        let err = lm.acquire("http://h/a", None, LockDepth::Zero, 600).await.unwrap_err();
        assert_eq!(err, LockError::Conflict);
        // a different virtual host is a different lock
        lm.acquire("http://other/a", None, LockDepth::Zero, 600).await.unwrap();
    }

    #[tokio::test]
    async fn release_then_reacquire() {
        let lm = manager();
        let lock = lm.acquire("http://h/a", None, LockDepth::Infinity, 600).await.unwrap();
        assert!(lm.release("http://h/a", "urn:uuid:wrong").await.is_err());
        lm.release("http://h/a", &lock.token).await.unwrap();
        lm.acquire("http://h/a", None, LockDepth::Zero, 600).await.unwrap();
    }

    #[tokio::test]
    async fn refresh_and_validate() {
        let lm = manager();
        let lock = lm
            .acquire("http://h/a", Some("<D:owner/>".to_string()), LockDepth::Zero, 600)
            .await
            .unwrap();
        lm.validate("http://h/a", &lock.token).await.unwrap();
        let refreshed = lm.refresh("http://h/a", &lock.token, 1200).await.unwrap();
        assert_eq!(refreshed.token, lock.token);
        assert_eq!(refreshed.timeout, 1200);
        assert!(lm.refresh("http://h/a", "urn:uuid:wrong", 60).await.is_err());
        assert!(lm.validate("http://h/b", &lock.token).await.is_err());
    }

    #[tokio::test]
    async fn record_roundtrips_through_cache() {
        let lm = manager();
        let lock = lm
            .acquire("http://h/a", Some("<D:owner>me</D:owner>".to_string()), LockDepth::Infinity, 60)
            .await
            .unwrap();
        let fetched = lm.validate("http://h/a", &lock.token).await.unwrap();
        assert_eq!(fetched.owner.as_deref(), Some("<D:owner>me</D:owner>"));
        assert_eq!(fetched.depth, LockDepth::Infinity);
    }
}

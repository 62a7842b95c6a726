//! Ephemeral string-to-string cache with per-key TTL.
//!
//! Backs three concerns that share one namespace: session dedup keys
//! (`<session_id>`), verification codes (`verification_code_<pub>`), and
//! resend cooldowns (`resend_<pub>`). The trait boundary exists so the
//! admission surface and worker can be tested against [`InMemoryCache`]
//! without a running Redis.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod keys;
mod memory;
mod redis_cache;

pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// A get/set/expire/delete key-value store with per-key TTL.
///
/// `set` always overwrites and (re)arms the TTL; there is no separate
/// "touch" operation because every caller in this service sets a value and
/// a TTL together.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Shorten or extend an existing key's TTL without touching its value.
    /// A no-op if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// `true` iff `key` is present (used for the admission dedup check, which
/// only cares about presence, not the stored value).
pub async fn exists(cache: &dyn Cache, key: &str) -> Result<bool, CacheError> {
    Ok(cache.get(key).await?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exists_reflects_get() {
        let cache = InMemoryCache::new();
        assert!(!exists(&cache, "session-1").await.unwrap());
        cache
            .set("session-1", "session-1", Duration::from_secs(300))
            .await
            .unwrap();
        assert!(exists(&cache, "session-1").await.unwrap());
    }
}

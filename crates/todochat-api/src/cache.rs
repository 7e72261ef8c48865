//! Best-effort cache for todo detail lookups.
//!
//! Nothing in here ever fails a request: an unreachable or misbehaving
//! backend reads as a miss and writes are skipped.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(20);

/// Upper bound on any single cache round trip.
const CACHE_OP_TIMEOUT: Duration = Duration::from_millis(500);

pub enum CacheBackend {
    /// Reconnects on its own after the server drops the connection.
    Redis(ConnectionManager),
    /// In-process map of key -> (value, expiry).
    Memory(Mutex<HashMap<String, (String, Instant)>>),
    Disabled,
}

impl CacheBackend {
    pub async fn connect_redis(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(
            Duration::from_secs(5),
            client.get_connection_manager(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("timed out connecting to Redis"))??;
        info!("Connected to Redis cache");
        Ok(Self::Redis(conn))
    }

    pub fn memory() -> Self {
        Self::Memory(Mutex::new(HashMap::new()))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::Memory(_) => "memory",
            Self::Disabled => "disabled",
        }
    }
}

pub struct DetailCache {
    backend: CacheBackend,
    ttl: Duration,
}

impl DetailCache {
    pub fn new(backend: CacheBackend, ttl: Duration) -> Self {
        info!("Detail cache: {} (ttl {}s)", backend.name(), ttl.as_secs());
        Self { backend, ttl }
    }

    pub fn disabled() -> Self {
        Self::new(CacheBackend::Disabled, DEFAULT_TTL)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match &self.backend {
            CacheBackend::Redis(conn) => {
                let mut conn = conn.clone();
                match tokio::time::timeout(CACHE_OP_TIMEOUT, conn.get::<_, Option<String>>(key)).await {
                    Ok(Ok(value)) => value,
                    Ok(Err(e)) => {
                        warn!("Cache read for {} failed: {}", key, e);
                        None
                    }
                    Err(_) => {
                        warn!("Cache read for {} timed out", key);
                        None
                    }
                }
            }
            CacheBackend::Memory(map) => {
                let Ok(mut map) = map.lock() else {
                    warn!("Memory cache lock poisoned, treating {} as a miss", key);
                    return None;
                };
                match map.get(key) {
                    Some((value, expires)) if *expires > Instant::now() => Some(value.clone()),
                    Some(_) => {
                        map.remove(key);
                        None
                    }
                    None => None,
                }
            }
            CacheBackend::Disabled => None,
        }
    }

    pub async fn put(&self, key: &str, value: &str) {
        match &self.backend {
            CacheBackend::Redis(conn) => {
                let mut conn = conn.clone();
                let ttl_secs = self.ttl.as_secs().max(1);
                match tokio::time::timeout(
                    CACHE_OP_TIMEOUT,
                    conn.set_ex::<_, _, ()>(key, value, ttl_secs),
                )
                .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Cache write for {} failed: {}", key, e),
                    Err(_) => warn!("Cache write for {} timed out", key),
                }
            }
            CacheBackend::Memory(map) => match map.lock() {
                Ok(mut map) => {
                    // Expired keys that are never read again are dropped here
                    let now = Instant::now();
                    map.retain(|_, (_, expires)| *expires > now);
                    map.insert(key.to_owned(), (value.to_owned(), now + self.ttl));
                }
                Err(_) => warn!("Memory cache lock poisoned, skipping write for {}", key),
            },
            CacheBackend::Disabled => {}
        }
    }
}

pub fn todo_key(id: i64) -> String {
    format!("todo:{}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_entries_expire() {
        let cache = DetailCache::new(CacheBackend::memory(), Duration::from_millis(50));
        cache.put("todo:1", "{}").await;
        assert_eq!(cache.get("todo:1").await.as_deref(), Some("{}"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get("todo:1").await, None);
    }

    #[tokio::test]
    async fn writes_prune_expired_entries() {
        let cache = DetailCache::new(CacheBackend::memory(), Duration::from_millis(50));
        cache.put("todo:1", "{}").await;
        cache.put("todo:2", "{}").await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.put("todo:3", "{}").await;

        let CacheBackend::Memory(map) = &cache.backend else {
            panic!("expected the memory backend");
        };
        let keys: Vec<String> = map.lock().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["todo:3"]);
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = DetailCache::disabled();
        cache.put("todo:1", "{}").await;
        assert_eq!(cache.get("todo:1").await, None);
    }

    #[tokio::test]
    async fn unreachable_redis_fails_to_connect() {
        // Port 1 is reserved and never has a Redis server behind it.
        assert!(CacheBackend::connect_redis("redis://127.0.0.1:1/").await.is_err());
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(todo_key(42), "todo:42");
    }
}

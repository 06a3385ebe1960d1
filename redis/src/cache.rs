//! Redis string cache.

use crate::{RedisConnection, ttl_secs};
use redis::AsyncCommands;
use std::time::Duration;
use storefront_core::error::Result;
use storefront_core::providers::CacheBackend;

/// Keys fetched per `SCAN` iteration.
const SCAN_BATCH: usize = 100;

/// Redis-backed [`CacheBackend`].
#[derive(Clone)]
pub struct RedisCacheBackend {
    conn: RedisConnection,
}

impl RedisCacheBackend {
    /// Wrap a connection.
    #[must_use]
    pub const fn new(conn: RedisConnection) -> Self {
        Self { conn }
    }
}

impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.handle();
        self.conn.run("GET", async move { conn.get(key).await }).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.handle();
        self.conn
            .run("MGET", async move {
                let values: Vec<Option<String>> =
                    redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
                Ok::<_, redis::RedisError>(values)
            })
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.handle();
        self.conn
            .run("SET", async move {
                let _: () = conn.set_ex(key, value, ttl_secs(ttl)).await?;
                Ok::<_, redis::RedisError>(())
            })
            .await
    }

    async fn set_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.handle();
        let secs = ttl_secs(ttl);
        self.conn
            .run("pipelined SET", async move {
                let mut pipe = redis::pipe();
                pipe.atomic();
                for (key, value) in entries {
                    pipe.set_ex(key, value, secs).ignore();
                }
                let _: () = pipe.query_async(&mut conn).await?;
                Ok::<_, redis::RedisError>(())
            })
            .await
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.handle();
        self.conn
            .run("DEL", async move {
                let _: () = conn.del(keys).await?;
                Ok::<_, redis::RedisError>(())
            })
            .await
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let mut cursor: u64 = 0;
        let mut deleted = 0;

        // Incremental SCAN so a large keyspace never blocks the server the way
        // KEYS would. Each iteration gets its own deadline.
        loop {
            let mut conn = self.conn.handle();
            let (next, keys): (u64, Vec<String>) = self
                .conn
                .run("SCAN", async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            if !keys.is_empty() {
                deleted += keys.len();
                self.delete(&keys).await?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(pattern, deleted, "Deleted matching cache keys");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    #[allow(clippy::unwrap_used)]
    async fn backend() -> RedisCacheBackend {
        let conn = RedisConnection::connect("redis://127.0.0.1:6379", Duration::from_secs(1))
            .await
            .unwrap();
        RedisCacheBackend::new(conn)
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_get_many_is_positional() {
        let cache = backend().await;
        let prefix = uuid::Uuid::new_v4();
        let a = format!("test:{prefix}:a");
        let b = format!("test:{prefix}:b");

        cache.set(&a, "1", Duration::from_secs(30)).await.unwrap();
        let values = cache.get_many(&[b.clone(), a.clone()]).await.unwrap();
        assert_eq!(values, vec![None, Some("1".to_string())]);

        cache.delete(&[a, b]).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_delete_matching_scans_all_keys() {
        let cache = backend().await;
        let prefix = uuid::Uuid::new_v4();
        let entries: Vec<(String, String)> = (0..250)
            .map(|i| (format!("test:{prefix}:{i}"), i.to_string()))
            .collect();

        cache.set_many(&entries, Duration::from_secs(30)).await.unwrap();
        let deleted = cache.delete_matching(&format!("test:{prefix}:*")).await.unwrap();
        assert_eq!(deleted, 250);
        assert_eq!(cache.get(&entries[0].0).await.unwrap(), None);
    }
}

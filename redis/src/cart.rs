//! Redis cart hashes.

use crate::{RedisConnection, ttl_secs};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use storefront_core::error::Result;
use storefront_core::providers::CartBackend;

/// Redis-backed [`CartBackend`].
///
/// Mutations are sent as `MULTI`/`EXEC` pipelines so the field write and the
/// expiry refresh land together.
#[derive(Clone)]
pub struct RedisCartBackend {
    conn: RedisConnection,
}

impl RedisCartBackend {
    /// Wrap a connection.
    #[must_use]
    pub const fn new(conn: RedisConnection) -> Self {
        Self { conn }
    }
}

/// Compare-and-set on one hash field plus the expiry refresh, run server-side
/// so no other client can write between the read and the write.
///
/// `ARGV`: field, expected-present flag, expected value, value-present flag,
/// value, expiry seconds. A missing field reads as `false` in Lua.
static SWAP_FIELD: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local current = redis.call('HGET', KEYS[1], ARGV[1])
        local expected = false
        if ARGV[2] == '1' then
            expected = ARGV[3]
        end
        if current ~= expected then
            return 0
        end
        if ARGV[4] == '1' then
            redis.call('HSET', KEYS[1], ARGV[1], ARGV[5])
        else
            redis.call('HDEL', KEYS[1], ARGV[1])
        end
        redis.call('EXPIRE', KEYS[1], ARGV[6])
        return 1
        ",
    )
});

fn flag(present: bool) -> &'static str {
    if present { "1" } else { "0" }
}

/// `EXPIRE` takes signed seconds.
fn expire_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX)
}

impl CartBackend for RedisCartBackend {
    async fn field(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.handle();
        self.conn
            .run("HGET", async move { conn.hget(key, field).await })
            .await
    }

    async fn fields(&self, key: &str) -> Result<Vec<(String, String)>> {
        let mut conn = self.conn.handle();
        let map: HashMap<String, String> = self
            .conn
            .run("HGETALL", async move { conn.hgetall(key).await })
            .await?;
        Ok(map.into_iter().collect())
    }

    async fn put_field(&self, key: &str, field: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.handle();
        self.conn
            .run("HSET", async move {
                let _: () = redis::pipe()
                    .atomic()
                    .hset(key, field, value)
                    .ignore()
                    .expire(key, expire_secs(ttl))
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                Ok::<_, redis::RedisError>(())
            })
            .await
    }

    async fn put_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.handle();
        self.conn
            .run("HSET (multiple)", async move {
                let _: () = redis::pipe()
                    .atomic()
                    .hset_multiple(key, fields)
                    .ignore()
                    .expire(key, expire_secs(ttl))
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                Ok::<_, redis::RedisError>(())
            })
            .await
    }

    async fn remove_field(&self, key: &str, field: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.handle();
        self.conn
            .run("HDEL", async move {
                let _: () = redis::pipe()
                    .atomic()
                    .hdel(key, field)
                    .ignore()
                    .expire(key, expire_secs(ttl))
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                Ok::<_, redis::RedisError>(())
            })
            .await
    }

    async fn swap_field(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        value: Option<&str>,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.conn.handle();
        let swapped: i64 = self
            .conn
            .run("EVALSHA (swap field)", async move {
                SWAP_FIELD
                    .key(key)
                    .arg(field)
                    .arg(flag(expected.is_some()))
                    .arg(expected.unwrap_or_default())
                    .arg(flag(value.is_some()))
                    .arg(value.unwrap_or_default())
                    .arg(expire_secs(ttl))
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        Ok(swapped == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_cart_hash_lifecycle() {
        let conn = RedisConnection::connect("redis://127.0.0.1:6379", Duration::from_secs(1))
            .await
            .unwrap();
        let carts = RedisCartBackend::new(conn);
        let key = format!("cart:{}", uuid::Uuid::new_v4());
        let ttl = Duration::from_secs(60);

        carts.put_field(&key, "p1", "{\"quantity\":1}", ttl).await.unwrap();
        carts
            .put_fields(&key, &[("p2".to_string(), "{\"quantity\":2}".to_string())], ttl)
            .await
            .unwrap();
        assert_eq!(carts.fields(&key).await.unwrap().len(), 2);

        carts.remove_field(&key, "p1", ttl).await.unwrap();
        carts.remove_field(&key, "missing", ttl).await.unwrap();
        assert_eq!(carts.field(&key, "p1").await.unwrap(), None);
        assert!(carts.field(&key, "p2").await.unwrap().is_some());

        carts.remove_field(&key, "p2", ttl).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_swap_field_compares_before_writing() {
        let conn = RedisConnection::connect("redis://127.0.0.1:6379", Duration::from_secs(1))
            .await
            .unwrap();
        let carts = RedisCartBackend::new(conn);
        let key = format!("cart:{}", uuid::Uuid::new_v4());
        let ttl = Duration::from_secs(60);

        assert!(carts.swap_field(&key, "p1", None, Some("a"), ttl).await.unwrap());
        assert!(!carts.swap_field(&key, "p1", None, Some("b"), ttl).await.unwrap());
        assert!(!carts.swap_field(&key, "p1", Some("x"), Some("b"), ttl).await.unwrap());
        assert_eq!(carts.field(&key, "p1").await.unwrap().as_deref(), Some("a"));

        assert!(carts.swap_field(&key, "p1", Some("a"), None, ttl).await.unwrap());
        assert_eq!(carts.field(&key, "p1").await.unwrap(), None);
    }
}

//! Redis-backed key-value store, used by the rate limiter's sliding-window
//! counters.

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{CoreError, CoreResult};

use super::KeyValueStore;

pub struct RedisStore {
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    url: String,
}

impl RedisStore {
    pub fn new(url: &str) -> Self {
        RedisStore {
            connection: Arc::new(RwLock::new(None)),
            url: url.to_string(),
        }
    }

    async fn get_connection(&self) -> CoreResult<ConnectionManager> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let client = redis::Client::open(self.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;

        {
            let mut conn = self.connection.write().await;
            *conn = Some(manager.clone());
        }

        info!(url = %self.url, "connected to redis");
        Ok(manager)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn save(&self, key: &str, value: &str) -> CoreResult<()> {
        let mut conn = self.get_connection().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> CoreResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        let mut conn = self.get_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> CoreResult<bool> {
        let mut conn = self.get_connection().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn save_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> CoreResult<()> {
        let mut conn = self.get_connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn sliding_window_incr(
        &self,
        key: &str,
        member: &str,
        now_ms: i64,
        window_secs: u64,
        key_ttl_secs: u64,
        limit: u32,
    ) -> CoreResult<(bool, u32)> {
        let mut conn = self.get_connection().await?;
        let window_start = now_ms - (window_secs as i64 * 1000);

        let _: () = redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(window_start)
            .query_async(&mut conn)
            .await?;

        let current: u32 = redis::cmd("ZCARD").arg(key).query_async(&mut conn).await?;

        if current >= limit {
            return Ok((false, current));
        }

        let _: () = redis::cmd("ZADD")
            .arg(key)
            .arg(now_ms)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        let _: () = redis::cmd("EXPIRE")
            .arg(key)
            .arg(key_ttl_secs.max(1))
            .query_async(&mut conn)
            .await?;

        Ok((true, current + 1))
    }

    async fn incr_window(&self, key: &str, amount: u64, ttl_secs: u64) -> CoreResult<u64> {
        let mut conn = self.get_connection().await?;
        let new_total: i64 = conn.incr(key, amount as i64).await?;
        if new_total == amount as i64 {
            let _: () = conn.expire(key, ttl_secs.max(1) as i64).await?;
        }
        Ok(new_total as u64)
    }

    async fn health_check(&self) -> CoreResult<()> {
        let mut conn = self.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Sliding-window semantics are exercised against a live Redis in the
    // ratelimit module's fail-open tests instead of here, since this crate
    // carries no embedded Redis server for unit tests.
    #[test]
    fn placeholder_keeps_module_compiling_without_network() {}
}

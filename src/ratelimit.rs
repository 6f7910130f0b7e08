//! Per-tenant sliding-window rate limiting (spec.md §5). The limiter is
//! defense-in-depth and fails open on cache unavailability — it bounds raw
//! request volume, not cost. Weighted nutrient-broadcast quota enforcement
//! (see `quota`) is the correctness boundary and fails closed.

use tracing::warn;

use crate::error::CoreResult;
use crate::store::KeyValueStore;

pub const WINDOW_SECS: u64 = 60;
pub const KEY_TTL_SECS: u64 = 120;

pub struct RateLimiter {
    backend: std::sync::Arc<dyn KeyValueStore>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// `None` when the cache was unreachable and the limiter failed open.
    pub cache_available: bool,
}

impl RateLimiter {
    pub fn new(backend: std::sync::Arc<dyn KeyValueStore>) -> Self {
        RateLimiter { backend }
    }

    /// Check and record one request for `tenant_id` against `limit` per
    /// minute. On cache error, logs a warning and allows the request.
    pub async fn check(&self, tenant_id: &str, limit: u32) -> CoreResult<RateLimitOutcome> {
        let key = format!("rate:{tenant_id}");
        let member = format!("{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let now_ms = chrono::Utc::now().timestamp_millis();

        match self
            .backend
            .sliding_window_incr(&key, &member, now_ms, WINDOW_SECS, KEY_TTL_SECS, limit)
            .await
        {
            Ok((allowed, current)) => Ok(RateLimitOutcome {
                allowed,
                limit,
                remaining: limit.saturating_sub(current),
                cache_available: true,
            }),
            Err(e) => {
                warn!(tenant = %tenant_id, error = %e, "rate limit cache unavailable, failing open");
                Ok(RateLimitOutcome { allowed: true, limit, remaining: limit, cache_available: false })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FlakyStore {
        fail: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn save(&self, _key: &str, _value: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn load(&self, _key: &str) -> CoreResult<Option<String>> {
            Ok(None)
        }
        async fn delete(&self, _key: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn exists(&self, _key: &str) -> CoreResult<bool> {
            Ok(false)
        }
        async fn save_with_ttl(&self, _key: &str, _value: &str, _ttl_secs: u64) -> CoreResult<()> {
            Ok(())
        }
        async fn sliding_window_incr(
            &self,
            _key: &str,
            _member: &str,
            _now_ms: i64,
            _window_secs: u64,
            _key_ttl_secs: u64,
            _limit: u32,
        ) -> CoreResult<(bool, u32)> {
            if self.fail.load(Ordering::SeqCst) {
                Err(crate::error::CoreError::Unavailable("down for the test".into()))
            } else {
                Ok((true, 1))
            }
        }

        async fn incr_window(&self, _key: &str, _amount: u64, _ttl_secs: u64) -> CoreResult<u64> {
            Ok(0)
        }
        async fn health_check(&self) -> CoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fails_open_when_cache_unreachable() {
        let backend = Arc::new(FlakyStore { fail: AtomicBool::new(true) });
        let limiter = RateLimiter::new(backend);
        let outcome = limiter.check("tenant-a", 10).await.unwrap();
        assert!(outcome.allowed);
        assert!(!outcome.cache_available);
    }

    #[tokio::test]
    async fn allows_under_limit_when_cache_healthy() {
        let backend = Arc::new(FlakyStore { fail: AtomicBool::new(false) });
        let limiter = RateLimiter::new(backend);
        let outcome = limiter.check("tenant-a", 10).await.unwrap();
        assert!(outcome.allowed);
        assert!(outcome.cache_available);
    }
}

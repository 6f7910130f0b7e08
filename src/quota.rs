//! Per-tenant nutrient-broadcast quota (spec.md §4.A, §5): a weighted
//! minute/hour budget, separate from and stricter than the request-count
//! rate limiter. Fails closed — a cache miss on the quota path rejects the
//! broadcast outright.

use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::store::KeyValueStore;

pub const QUOTA_WINDOW_MINUTE_SECS: u64 = 60;
pub const QUOTA_WINDOW_HOUR_SECS: u64 = 3600;

/// Per-tenant quota ceilings, resolved from the caller's API key record.
#[derive(Debug, Clone, Copy)]
pub struct QuotaLimits {
    pub per_min: u32,
    pub per_hour: u32,
}

pub struct QuotaTracker {
    backend: std::sync::Arc<dyn KeyValueStore>,
}

impl QuotaTracker {
    pub fn new(backend: std::sync::Arc<dyn KeyValueStore>) -> Self {
        QuotaTracker { backend }
    }

    /// Charge `cost` against both the minute and hour windows for
    /// `tenant_id`. Rejects with [`CoreError::QuotaExceeded`] if either
    /// window's ceiling is exceeded.
    pub async fn charge(&self, tenant_id: &str, cost: u32, limits: QuotaLimits) -> CoreResult<()> {
        let now_secs = chrono::Utc::now().timestamp().max(0) as u64;
        self.charge_window(
            tenant_id,
            cost,
            "min",
            now_secs / QUOTA_WINDOW_MINUTE_SECS,
            QUOTA_WINDOW_MINUTE_SECS,
            limits.per_min,
        )
        .await?;
        self.charge_window(
            tenant_id,
            cost,
            "hour",
            now_secs / QUOTA_WINDOW_HOUR_SECS,
            QUOTA_WINDOW_HOUR_SECS,
            limits.per_hour,
        )
        .await
    }

    async fn charge_window(
        &self,
        tenant_id: &str,
        cost: u32,
        window_name: &str,
        bucket: u64,
        ttl_secs: u64,
        limit: u32,
    ) -> CoreResult<()> {
        let key = format!("quota:{window_name}:{tenant_id}:{bucket}");
        match self.backend.incr_window(&key, cost as u64, ttl_secs).await {
            Ok(total) if total > limit as u64 => Err(CoreError::QuotaExceeded(format!(
                "tenant {tenant_id} exhausted its {window_name} nutrient quota ({total} > {limit})"
            ))),
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(tenant = %tenant_id, window = window_name, error = %e, "quota cache unreachable, rejecting broadcast");
                Err(CoreError::Unavailable(format!("quota cache unreachable: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct CounterStore {
        total: AtomicU64,
    }

    #[async_trait]
    impl KeyValueStore for CounterStore {
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
            Ok((true, 0))
        }
        async fn incr_window(&self, _key: &str, amount: u64, _ttl_secs: u64) -> CoreResult<u64> {
            Ok(self.total.fetch_add(amount, Ordering::SeqCst) + amount)
        }
        async fn health_check(&self) -> CoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn allows_charges_under_the_limit() {
        let tracker = QuotaTracker::new(Arc::new(CounterStore { total: AtomicU64::new(0) }));
        let limits = QuotaLimits { per_min: 100, per_hour: 1000 };
        assert!(tracker.charge("tenant-a", 10, limits).await.is_ok());
        assert!(tracker.charge("tenant-a", 10, limits).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_once_the_minute_ceiling_is_exceeded() {
        let tracker = QuotaTracker::new(Arc::new(CounterStore { total: AtomicU64::new(0) }));
        let limits = QuotaLimits { per_min: 15, per_hour: 1000 };
        assert!(tracker.charge("tenant-a", 10, limits).await.is_ok());
        let err = tracker.charge("tenant-a", 10, limits).await.unwrap_err();
        assert!(matches!(err, CoreError::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn fails_closed_when_the_cache_errors() {
        struct BrokenStore;
        #[async_trait]
        impl KeyValueStore for BrokenStore {
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
                Ok((true, 0))
            }
            async fn incr_window(&self, _key: &str, _amount: u64, _ttl_secs: u64) -> CoreResult<u64> {
                Err(CoreError::Unavailable("down for the test".into()))
            }
            async fn health_check(&self) -> CoreResult<()> {
                Ok(())
            }
        }

        let tracker = QuotaTracker::new(Arc::new(BrokenStore));
        let limits = QuotaLimits { per_min: 100, per_hour: 1000 };
        let err = tracker.charge("tenant-a", 10, limits).await.unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)));
    }
}

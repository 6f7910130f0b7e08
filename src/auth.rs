//! API key validation (SPEC_FULL.md §11.1): resolving `X-API-Key` to a
//! tenant, scope set, and rate limit. Issuance and rotation are owned by
//! the out-of-scope identity service; this module only reads.

use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};
use crate::store::{ApiKeyRecord, GraphStore};

pub const SCOPE_READ: &str = "read";
pub const SCOPE_WRITE: &str = "write";
pub const SCOPE_ADMIN: &str = "admin";

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub tenant_id: String,
    pub scopes: Vec<String>,
    pub rate_limit_per_min: u32,
    pub quota_per_min: u32,
    pub quota_per_hour: u32,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope || s == SCOPE_ADMIN)
    }

    pub fn require_admin(&self) -> CoreResult<()> {
        if self.has_scope(SCOPE_ADMIN) {
            Ok(())
        } else {
            Err(CoreError::Forbidden("admin scope required".into()))
        }
    }
}

fn hash_key(raw_key: &str) -> String {
    hex::encode(Sha256::digest(raw_key.as_bytes()))
}

/// Resolve a raw `X-API-Key` header value to an [`AuthContext`]. Missing
/// or unknown keys surface as `Unauthorized` (401).
pub async fn authenticate(store: &dyn GraphStore, raw_key: &str) -> CoreResult<AuthContext> {
    if raw_key.trim().is_empty() {
        return Err(CoreError::Unauthorized("missing X-API-Key header".into()));
    }

    let key_hash = hash_key(raw_key);
    let record: Option<ApiKeyRecord> = store.lookup_api_key(&key_hash).await?;

    match record {
        Some(rec) => Ok(AuthContext {
            tenant_id: rec.tenant_id,
            scopes: rec.scopes,
            rate_limit_per_min: rec.rate_limit_per_min,
            quota_per_min: rec.quota_per_min,
            quota_per_hour: rec.quota_per_hour,
        }),
        None => Err(CoreError::Unauthorized("invalid API key".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_scope_satisfies_any_requirement() {
        let ctx = AuthContext {
            tenant_id: "t".into(),
            scopes: vec![SCOPE_ADMIN.to_string()],
            rate_limit_per_min: 60,
            quota_per_min: 1000,
            quota_per_hour: 20000,
        };
        assert!(ctx.has_scope(SCOPE_WRITE));
        assert!(ctx.require_admin().is_ok());
    }

    #[test]
    fn non_admin_scope_is_rejected_for_admin_ops() {
        let ctx = AuthContext {
            tenant_id: "t".into(),
            scopes: vec![SCOPE_WRITE.to_string()],
            rate_limit_per_min: 60,
            quota_per_min: 1000,
            quota_per_hour: 20000,
        };
        assert!(ctx.require_admin().is_err());
    }
}

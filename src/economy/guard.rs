use core::fmt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use redis::Script;
use tracing::instrument;

use crate::constants::GUARD_TTL_MS;
use crate::db::prelude::AccountId;
use crate::db::redis::{RedisKey, RedisPool};
use crate::economy::error::EconomyResult;

/// Per-account mutual exclusion for reward issuance.
///
/// Holding a permit only keeps two issuances for one account from racing through the same
/// process (or, with Redis, the same deployment). The store's conditional writes decide the
/// outcome either way.
#[async_trait]
pub trait IssueGuard: Send + Sync + fmt::Debug {
    /// `None` when another issuance for `account` already holds the guard.
    async fn acquire(&self, account: &AccountId) -> EconomyResult<Option<IssuePermit>>;
}

/// Releases its guard entry when dropped, on every exit path.
pub struct IssuePermit {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl IssuePermit {
    fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for IssuePermit {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for IssuePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuePermit")
            .field("held", &self.release.is_some())
            .finish()
    }
}

#[derive(Debug, Default, Clone)]
pub struct LocalGuard {
    issuing: Arc<Mutex<HashSet<AccountId>>>,
}

impl LocalGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(issuing: &Mutex<HashSet<AccountId>>) -> std::sync::MutexGuard<'_, HashSet<AccountId>> {
        issuing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IssueGuard for LocalGuard {
    async fn acquire(&self, account: &AccountId) -> EconomyResult<Option<IssuePermit>> {
        if !Self::lock(&self.issuing).insert(account.clone()) {
            return Ok(None);
        }

        let issuing = Arc::clone(&self.issuing);
        let account = account.clone();
        Ok(Some(IssuePermit::new(move || {
            Self::lock(&issuing).remove(&account);
        })))
    }
}

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Shares the issuing set across instances with `SET NX PX`. A crashed holder's entry expires
/// after `GUARD_TTL_MS`.
#[derive(Clone)]
pub struct RedisGuard {
    pool: &'static RedisPool,
}

impl fmt::Debug for RedisGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisGuard").finish_non_exhaustive()
    }
}

impl RedisGuard {
    pub fn new(pool: &'static RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IssueGuard for RedisGuard {
    #[instrument(skip(self))]
    async fn acquire(&self, account: &AccountId) -> EconomyResult<Option<IssuePermit>> {
        let key = RedisKey::Issuing(account.clone()).name();
        let token = uuid::Uuid::new_v4().to_string();
        let mut conn = self.pool.manager.clone();

        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(GUARD_TTL_MS)
            .query_async(&mut conn)
            .await
            .map_err(crate::db::redis::RedisErr::from)?;
        if set.is_none() {
            return Ok(None);
        }

        let pool = self.pool;
        Ok(Some(IssuePermit::new(move || {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                tracing::warn!(key = %key, "no runtime to release issuing guard, left to expire");
                return;
            };
            handle.spawn(async move {
                let mut conn = pool.manager.clone();
                let released: redis::RedisResult<i64> = Script::new(RELEASE_SCRIPT)
                    .key(&key)
                    .arg(&token)
                    .invoke_async(&mut conn)
                    .await;
                if let Err(e) = released {
                    tracing::warn!(error = ?e, key = %key, "failed to release issuing guard");
                }
            });
        })))
    }
}

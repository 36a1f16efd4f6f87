use std::sync::LazyLock;

use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::db::models::account::AccountId;
use crate::util::env::{self, EnvErr};

static REDIS_POOL: LazyLock<OnceCell<RedisPool>> = LazyLock::new(OnceCell::new);
pub async fn redis_pool() -> RedisResult<&'static RedisPool> {
    REDIS_POOL
        .get_or_try_init(|| async { RedisPool::new().await })
        .await
}

#[derive(Debug, Clone)]
pub enum RedisKey {
    /// Marks an account whose reward issuance is in flight on some instance.
    Issuing(AccountId),
}

impl RedisKey {
    pub fn name(&self) -> String {
        match self {
            RedisKey::Issuing(account) => format!("kanae:issuing:{account}"),
        }
    }
}

pub struct RedisPool {
    pub manager: ConnectionManager,
}

impl RedisPool {
    #[instrument]
    pub async fn new() -> RedisResult<Self> {
        let redis_url = env::env()
            .await?
            .redis_url
            .as_deref()
            .ok_or(RedisErr::NotConfigured)?;
        tracing::debug!("connecting to redis server");

        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self { manager })
    }
}

pub type RedisResult<T> = core::result::Result<T, RedisErr>;

#[derive(Debug, Error)]
pub enum RedisErr {
    #[error(transparent)]
    EnvErr(#[from] EnvErr),

    #[error(transparent)]
    RedisClientError(#[from] redis::RedisError),

    #[error("REDIS_URL is not set")]
    NotConfigured,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_issuing_key_name() {
        let key = RedisKey::Issuing(AccountId::from("42"));
        assert_eq!(key.name(), "kanae:issuing:42");
    }
}

use std::sync::LazyLock;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::util::env::{self, Var};
use crate::var;

#[cfg(test)]
pub mod memory;
pub mod models;
pub mod redis;
pub mod repositories;
pub mod store;

pub mod prelude {
    pub use crate::db::db_pool;
    pub use crate::db::StoreError;

    pub use crate::db::models::account::{AccountId, Balances, Counter, LeaderboardEntry};
    pub use crate::db::models::exchange::{Payout, SaleOutcome, WagerSettlement};
    pub use crate::db::models::item::{Holding, ItemCopy, ItemType, ItemTypeId, Rarity};
    pub use crate::db::models::reward::{
        ActivityKind, CooldownMark, DrawnItem, Platform, RewardEffects, RewardKind,
    };

    pub use crate::db::repositories::Repository;
    pub use crate::db::repositories::Tx;
    pub use crate::db::repositories::account::AccountRepository;
    pub use crate::db::repositories::catalog::CatalogRepository;
    pub use crate::db::repositories::inventory::InventoryRepository;
    pub use crate::db::store::{EconomyStore, PgStore};
}

static DB_POOL: LazyLock<OnceCell<Db>> = LazyLock::new(OnceCell::new);
pub async fn db_pool() -> StoreResult<&'static PgPool> {
    Ok(&DB_POOL
        .get_or_try_init(|| async { Db::new_pool().await })
        .await?
        .pool)
}

struct Db {
    pool: PgPool,
}

impl Db {
    #[instrument]
    pub async fn new_pool() -> StoreResult<Self> {
        let db_url = var!(Var::DatabaseUrl).await?;
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(db_url)
            .await?;

        tracing::info!("connected to postgres");
        Ok(Self { pool })
    }
}

/// Brings the schema up to date; run once at startup before anything is served.
#[instrument(skip(pool))]
pub async fn migrate(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("schema migrations applied");

    Ok(())
}

pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    EnvError(#[from] env::EnvErr),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

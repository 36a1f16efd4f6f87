use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;

use crate::constants::{PERIOD_CHECK_SECS, VERIFIER_CACHE_TTL_SECS};
use crate::db::prelude::*;
use crate::economy::Economy;
use crate::economy::catalog::seed_items;
use crate::economy::config::EconomyConfig;
use crate::economy::guard::{IssueGuard, LocalGuard, RedisGuard};
use crate::util::helix::{CachedVerifier, Helix};
use crate::util::telemetry;

mod api;
mod constants;
mod db;
mod economy;
mod irc;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Env(#[from] util::env::EnvErr),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Redis(#[from] db::redis::RedisErr),

    #[error(transparent)]
    Economy(#[from] economy::error::EconomyError),

    #[error(transparent)]
    Route(#[from] api::server::RouteError),

    #[error(transparent)]
    Irc(#[from] irc::client::IrcClientErr),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry_registry = telemetry::Telemetry::new().await?.register();

    tracing::info!("starting economy server");

    // no store, no server
    let pool = db_pool().await?;
    db::migrate(pool).await?;

    let store: Arc<dyn EconomyStore> = Arc::new(PgStore::new(pool));
    store.upsert_catalog(&seed_items()).await?;

    let guard: Arc<dyn IssueGuard> = match util::env::env().await?.redis_url {
        Some(_) => {
            tracing::info!("using redis issuing guard");
            Arc::new(RedisGuard::new(db::redis::redis_pool().await?))
        }
        None => Arc::new(LocalGuard::new()),
    };
    let verifier = Arc::new(CachedVerifier::new(
        Helix,
        Duration::from_secs(VERIFIER_CACHE_TTL_SECS),
    ));

    let economy = Arc::new(
        Economy::new(Arc::clone(&store), guard, verifier, EconomyConfig::default()).await?,
    );

    let mut handles = Vec::new();
    handles.push(economy::period::spawn_period_task(
        economy.store(),
        Duration::from_secs(PERIOD_CHECK_SECS),
    ));
    handles.extend(api::server::start_server(Arc::clone(&economy)).await?);
    handles.extend(irc::client::irc_runner(economy).await?);

    _ = join_all(handles).await;

    telemetry_registry.shutdown();
    Ok(())
}

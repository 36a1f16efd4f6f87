use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::instrument;
use uuid::Uuid;

use crate::constants::WAGER_MIN_PLAYERS;
use crate::db::prelude::*;
use crate::economy::error::{EconomyError, EconomyResult};

/// Picks the loser among `qualified` with `pick(len)` and splits the stake between the rest.
///
/// Each winner gets `stake / winners`; the remainder is reported and not paid out. Settling
/// stores pass [`crate::economy::draw::index`], so the loser is only drawn once qualification
/// is known.
pub fn resolve_pool(
    qualified: Vec<AccountId>,
    dropped: Vec<AccountId>,
    stake: i64,
    pick: impl FnOnce(usize) -> usize,
) -> WagerSettlement {
    if qualified.len() < WAGER_MIN_PLAYERS {
        return WagerSettlement::Cancelled { dropped };
    }

    let loser_idx = pick(qualified.len()) % qualified.len();
    let mut winners = qualified;
    let loser = winners.remove(loser_idx);

    let count = winners.len() as i64;
    let share = stake / count;
    let payouts = winners
        .into_iter()
        .map(|account_id| Payout {
            account_id,
            amount: share,
        })
        .collect();

    WagerSettlement::Settled {
        loser,
        payouts,
        remainder: stake % count,
        dropped,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PoolStatus {
    Open {
        stake: i64,
        participants: Vec<AccountId>,
    },
    Resolved {
        settlement: WagerSettlement,
    },
    Failed {
        reason: String,
    },
}

impl PoolStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, PoolStatus::Open { .. })
    }
}

/// Returned to whoever opened the pool; `settled` waits for the resolver.
#[derive(Debug, Clone)]
pub struct PoolHandle {
    pub id: Uuid,
    status: watch::Receiver<PoolStatus>,
}

impl PoolHandle {
    pub async fn settled(&mut self) -> PoolStatus {
        match self.status.wait_for(|status| !status.is_open()).await {
            Ok(status) => status.clone(),
            Err(_) => PoolStatus::Failed {
                reason: "pool resolver stopped".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Joined {
    pub pool_id: Uuid,
    pub participants: usize,
    pub full: bool,
}

#[derive(Debug)]
struct PoolEntry {
    stake: i64,
    participants: Vec<AccountId>,
    closed: bool,
    full: Arc<Notify>,
    status: watch::Sender<PoolStatus>,
}

impl PoolEntry {
    fn publish(&self) {
        self.status.send_replace(PoolStatus::Open {
            stake: self.stake,
            participants: self.participants.clone(),
        });
    }
}

type Pools = Arc<Mutex<HashMap<Uuid, PoolEntry>>>;

/// Open elimination pools. Each pool has a resolver task that closes it when the join window
/// ends or the pool fills, whichever comes first.
#[derive(Debug)]
pub struct WagerBook {
    store: Arc<dyn EconomyStore>,
    pools: Pools,
    window: Duration,
    max_players: usize,
}

impl WagerBook {
    pub fn new(store: Arc<dyn EconomyStore>, window: Duration, max_players: usize) -> Self {
        Self {
            store,
            pools: Arc::default(),
            window,
            max_players,
        }
    }

    fn lock(pools: &Mutex<HashMap<Uuid, PoolEntry>>) -> MutexGuard<'_, HashMap<Uuid, PoolEntry>> {
        pools.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[instrument(skip(self))]
    pub async fn open(&self, initiator: &AccountId, stake: i64) -> EconomyResult<PoolHandle> {
        if stake <= 0 {
            return Err(EconomyError::Invalid("stake must be positive".to_string()));
        }
        let balances = self.store.balances(initiator).await?;
        if balances.spendable() < stake {
            return Err(EconomyError::Insufficient(format!(
                "stake of {stake} exceeds spendable balance of {}",
                balances.spendable()
            )));
        }

        let id = Uuid::new_v4();
        let full = Arc::new(Notify::new());
        let (status, rx) = watch::channel(PoolStatus::Open {
            stake,
            participants: vec![initiator.clone()],
        });

        Self::lock(&self.pools).insert(
            id,
            PoolEntry {
                stake,
                participants: vec![initiator.clone()],
                closed: false,
                full: Arc::clone(&full),
                status,
            },
        );

        let deadline = Instant::now() + self.window;
        tokio::spawn(resolve(
            Arc::clone(&self.store),
            Arc::clone(&self.pools),
            id,
            deadline,
            full,
            self.window,
        ));

        tracing::info!(pool = %id, initiator = %initiator, stake, "wager pool opened");
        Ok(PoolHandle { id, status: rx })
    }

    #[instrument(skip(self))]
    pub async fn join(&self, pool_id: Uuid, account: &AccountId) -> EconomyResult<Joined> {
        let stake = self.open_entry(pool_id, |entry| Ok(entry.stake))?;

        let spendable = self.store.balances(account).await?.spendable();
        if spendable < stake {
            return Err(EconomyError::Insufficient(format!(
                "stake of {stake} exceeds spendable balance of {spendable}"
            )));
        }

        let max_players = self.max_players;
        let joined = self.open_entry(pool_id, |entry| {
            if entry.participants.contains(account) {
                return Err(EconomyError::Invalid("already in this pool".to_string()));
            }
            if entry.participants.len() >= max_players {
                return Err(EconomyError::NotEligible("pool is full".to_string()));
            }

            entry.participants.push(account.clone());
            entry.publish();

            let full = entry.participants.len() >= max_players;
            if full {
                entry.full.notify_one();
            }
            Ok(Joined {
                pool_id,
                participants: entry.participants.len(),
                full,
            })
        })?;

        tracing::debug!(pool = %pool_id, account = %account, players = joined.participants, "joined wager pool");
        Ok(joined)
    }

    pub fn status(&self, pool_id: Uuid) -> EconomyResult<PoolStatus> {
        Self::lock(&self.pools)
            .get(&pool_id)
            .map(|entry| entry.status.borrow().clone())
            .ok_or_else(|| EconomyError::NotFound(format!("wager pool {pool_id}")))
    }

    fn open_entry<T>(
        &self,
        pool_id: Uuid,
        f: impl FnOnce(&mut PoolEntry) -> EconomyResult<T>,
    ) -> EconomyResult<T> {
        let mut pools = Self::lock(&self.pools);
        let entry = pools
            .get_mut(&pool_id)
            .ok_or_else(|| EconomyError::NotFound(format!("wager pool {pool_id}")))?;
        if entry.closed {
            return Err(EconomyError::Expired);
        }

        f(entry)
    }
}

#[instrument(skip(store, pools, full))]
async fn resolve(
    store: Arc<dyn EconomyStore>,
    pools: Pools,
    pool_id: Uuid,
    deadline: Instant,
    full: Arc<Notify>,
    linger: Duration,
) {
    tokio::select! {
        _ = sleep_until(deadline) => {}
        _ = full.notified() => {}
    }

    let Some((participants, stake)) = WagerBook::lock(&pools).get_mut(&pool_id).map(|entry| {
        entry.closed = true;
        (entry.participants.clone(), entry.stake)
    }) else {
        return;
    };

    let status = match store.settle_wager(&participants, stake).await {
        Ok(settlement) => {
            tracing::info!(pool = %pool_id, settlement = ?settlement, "wager pool resolved");
            PoolStatus::Resolved { settlement }
        }
        Err(e) => {
            tracing::error!(pool = %pool_id, error = ?e, "wager settlement failed");
            PoolStatus::Failed {
                reason: e.to_string(),
            }
        }
    };

    if let Some(entry) = WagerBook::lock(&pools).get(&pool_id) {
        entry.status.send_replace(status);
    }

    // resolved pools stay queryable for one more window
    sleep(linger).await;
    WagerBook::lock(&pools).remove(&pool_id);
}

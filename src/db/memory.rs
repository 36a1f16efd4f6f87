//! In-memory [`EconomyStore`] for tests.
//!
//! Every method holds one lock for its whole body, which gives it the same all-or-nothing
//! behavior as the transactions in the Postgres repositories.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::StoreResult;
use crate::db::prelude::*;
use crate::economy::draw;
use crate::economy::wager::resolve_pool;

#[derive(Debug, Clone)]
struct MemAccount {
    balances: Balances,
    tier: Option<i16>,
    seq: u64,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, MemAccount>,
    next_seq: u64,
    catalog: BTreeMap<ItemTypeId, ItemType>,
    copies: Vec<ItemCopy>,
    next_copy_id: i64,
    cooldowns: HashMap<(AccountId, RewardKind), CooldownMark>,
    reward_claims: HashSet<(AccountId, Platform)>,
    identity_claims: HashSet<(Platform, String)>,
    links: HashMap<(AccountId, Platform), String>,
    activity: HashSet<(ActivityKind, String)>,
    sales: Vec<(AccountId, DateTime<Utc>)>,
    period: Option<String>,
}

impl State {
    fn account(&mut self, id: &AccountId) -> &mut MemAccount {
        let seq = self.next_seq;
        self.accounts.entry(id.clone()).or_insert_with(|| {
            self.next_seq += 1;
            MemAccount {
                balances: Balances::default(),
                tier: None,
                seq,
            }
        })
    }

    fn credit(&mut self, id: &AccountId, delta: i64) -> Balances {
        let account = self.account(id);
        account.balances = account.balances.apply(delta);
        account.balances
    }

    fn grant(&mut self, owner: &AccountId, item: ItemTypeId) -> ItemCopy {
        self.next_copy_id += 1;
        let copy = ItemCopy {
            id: self.next_copy_id,
            owner_id: owner.clone(),
            item_type_id: item,
            acquired_at: Utc::now(),
        };
        self.copies.push(copy.clone());
        copy
    }

    fn find_copy(&self, owner: &AccountId, item: ItemTypeId) -> Option<usize> {
        self.copies
            .iter()
            .position(|c| &c.owner_id == owner && c.item_type_id == item)
    }

    fn ranked(&self) -> Vec<(&AccountId, &MemAccount)> {
        let mut ranked: Vec<_> = self.accounts.iter().collect();
        ranked.sort_by(|(_, a), (_, b)| {
            b.balances
                .monthly
                .cmp(&a.balances.monthly)
                .then(a.seq.cmp(&b.seq))
        });
        ranked
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_next_swap: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(items: Vec<ItemType>) -> Self {
        let state = State {
            catalog: items.into_iter().map(|i| (i.id, i)).collect(),
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            ..Default::default()
        }
    }

    /// Makes the next `swap` fail as if the pool had timed out.
    pub fn fail_next_swap(&self) {
        self.fail_next_swap.store(true, Ordering::SeqCst);
    }

    /// Backdates a cooldown mark, standing in for time having passed.
    pub async fn set_cooldown(&self, account: &AccountId, kind: RewardKind, mark: CooldownMark) {
        self.state
            .lock()
            .await
            .cooldowns
            .insert((account.clone(), kind), mark);
    }

    pub async fn copy_count(&self) -> usize {
        self.state.lock().await.copies.len()
    }
}

#[async_trait]
impl EconomyStore for MemoryStore {
    async fn balances(&self, account: &AccountId) -> StoreResult<Balances> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .get(account)
            .map(|a| a.balances)
            .unwrap_or_default())
    }

    async fn credit(&self, account: &AccountId, delta: i64) -> StoreResult<Balances> {
        Ok(self.state.lock().await.credit(account, delta))
    }

    async fn set_balance(
        &self,
        account: &AccountId,
        counter: Counter,
        value: i64,
    ) -> StoreResult<Balances> {
        let mut state = self.state.lock().await;
        let entry = state.account(account);
        match counter {
            Counter::Lifetime => entry.balances.lifetime = value.max(0),
            Counter::Monthly => entry.balances.monthly = value.max(0),
        }
        Ok(entry.balances)
    }

    async fn recorded_tier(&self, account: &AccountId) -> StoreResult<Option<i16>> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .get(account)
            .and_then(|a| a.tier))
    }

    async fn record_tier(&self, account: &AccountId, tier: i16) -> StoreResult<()> {
        self.state.lock().await.account(account).tier = Some(tier);
        Ok(())
    }

    async fn leaderboard(&self, limit: i64) -> StoreResult<Vec<LeaderboardEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .ranked()
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .enumerate()
            .map(|(idx, (id, account))| LeaderboardEntry {
                account_id: id.clone(),
                lifetime_points: account.balances.lifetime,
                monthly_points: account.balances.monthly,
                ranking: idx as i64 + 1,
            })
            .collect())
    }

    async fn rank(&self, account: &AccountId) -> StoreResult<Option<i64>> {
        let state = self.state.lock().await;
        Ok(state
            .ranked()
            .into_iter()
            .position(|(id, _)| id == account)
            .map(|idx| idx as i64 + 1))
    }

    async fn reset_period(&self, period: &str) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.period.as_deref() {
            None => {
                state.period = Some(period.to_string());
                Ok(false)
            }
            Some(stored) if stored == period => Ok(false),
            Some(_) => {
                state.period = Some(period.to_string());
                for account in state.accounts.values_mut() {
                    account.balances.monthly = 0;
                }
                Ok(true)
            }
        }
    }

    async fn upsert_catalog(&self, items: &[ItemType]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for item in items {
            state.catalog.insert(item.id, item.clone());
        }
        Ok(())
    }

    async fn catalog(&self) -> StoreResult<Vec<ItemType>> {
        Ok(self.state.lock().await.catalog.values().cloned().collect())
    }

    async fn grant(&self, owner: &AccountId, item: ItemTypeId) -> StoreResult<ItemCopy> {
        Ok(self.state.lock().await.grant(owner, item))
    }

    async fn holding_count(&self, owner: &AccountId, item: ItemTypeId) -> StoreResult<i64> {
        Ok(self
            .state
            .lock()
            .await
            .copies
            .iter()
            .filter(|c| &c.owner_id == owner && c.item_type_id == item)
            .count() as i64)
    }

    async fn remove_one(&self, owner: &AccountId, item: ItemTypeId) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.find_copy(owner, item) {
            Some(idx) => {
                state.copies.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn holdings(&self, owner: &AccountId) -> StoreResult<Vec<Holding>> {
        let state = self.state.lock().await;
        let mut grouped: BTreeMap<ItemTypeId, Holding> = BTreeMap::new();

        for copy in state.copies.iter().filter(|c| &c.owner_id == owner) {
            let Some(item) = state.catalog.get(&copy.item_type_id) else {
                continue;
            };
            let holding = grouped.entry(copy.item_type_id).or_insert_with(|| Holding {
                item_type_id: copy.item_type_id,
                name: item.name.clone(),
                rarity: item.rarity.as_str().to_string(),
                count: 0,
                last_acquired: copy.acquired_at,
            });
            holding.count += 1;
            holding.last_acquired = holding.last_acquired.max(copy.acquired_at);
        }

        Ok(grouped.into_values().collect())
    }

    async fn cooldown(
        &self,
        account: &AccountId,
        kind: RewardKind,
    ) -> StoreResult<Option<CooldownMark>> {
        Ok(self
            .state
            .lock()
            .await
            .cooldowns
            .get(&(account.clone(), kind))
            .copied())
    }

    async fn apply_reward(
        &self,
        account: &AccountId,
        effects: &RewardEffects,
        issued_at: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Option<Balances>> {
        let mut state = self.state.lock().await;
        let key = (account.clone(), effects.kind);

        if let Some(mark) = state.cooldowns.get(&key)
            && mark.last_issued > cutoff
        {
            return Ok(None);
        }
        state.cooldowns.insert(
            key,
            CooldownMark {
                last_issued: issued_at,
                streak: effects.streak,
            },
        );

        for drawn in &effects.items {
            state.grant(account, drawn.item_type_id);
        }
        Ok(Some(state.credit(account, effects.total_points())))
    }

    async fn claim_link_bonus(
        &self,
        account: &AccountId,
        platform: Platform,
        username: &str,
        points: i64,
    ) -> StoreResult<Option<Balances>> {
        let mut state = self.state.lock().await;
        let account_key = (account.clone(), platform);
        let identity_key = (platform, username.to_string());

        if state.reward_claims.contains(&account_key)
            || state.identity_claims.contains(&identity_key)
        {
            return Ok(None);
        }
        state.reward_claims.insert(account_key);
        state.identity_claims.insert(identity_key);

        Ok(Some(state.credit(account, points)))
    }

    async fn claim_activity(
        &self,
        kind: ActivityKind,
        key: &str,
        account: &AccountId,
        points: i64,
    ) -> StoreResult<Option<Balances>> {
        let mut state = self.state.lock().await;
        if !state.activity.insert((kind, key.to_string())) {
            return Ok(None);
        }

        Ok(Some(state.credit(account, points)))
    }

    async fn swap(
        &self,
        a: &AccountId,
        item_a: ItemTypeId,
        b: &AccountId,
        item_b: ItemTypeId,
    ) -> StoreResult<bool> {
        if self.fail_next_swap.swap(false, Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut.into());
        }

        let mut state = self.state.lock().await;
        let (Some(copy_a), Some(copy_b)) = (state.find_copy(a, item_a), state.find_copy(b, item_b))
        else {
            return Ok(false);
        };

        state.copies[copy_a].owner_id = b.clone();
        state.copies[copy_a].acquired_at = Utc::now();
        state.copies[copy_b].owner_id = a.clone();
        state.copies[copy_b].acquired_at = Utc::now();
        Ok(true)
    }

    async fn settle_wager(
        &self,
        participants: &[AccountId],
        stake: i64,
    ) -> StoreResult<WagerSettlement> {
        let mut state = self.state.lock().await;
        let (qualified, dropped): (Vec<AccountId>, Vec<AccountId>) =
            participants.iter().cloned().partition(|p| {
                state
                    .accounts
                    .get(p)
                    .is_some_and(|a| a.balances.spendable() >= stake)
            });

        let settlement = resolve_pool(qualified, dropped, stake, draw::index);
        if let WagerSettlement::Settled { loser, payouts, .. } = &settlement {
            state.credit(loser, -stake);
            for payout in payouts {
                state.credit(&payout.account_id, payout.amount);
            }
        }

        Ok(settlement)
    }

    async fn sell_one(
        &self,
        account: &AccountId,
        item: ItemTypeId,
        value: i64,
        now: DateTime<Utc>,
        since: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<SaleOutcome> {
        let mut state = self.state.lock().await;

        let recent = state
            .sales
            .iter()
            .filter(|(id, at)| id == account && *at > since)
            .count() as i64;
        if recent >= limit {
            return Ok(SaleOutcome::RateLimited { recent });
        }

        let Some(idx) = state.find_copy(account, item) else {
            return Ok(SaleOutcome::NoCopy);
        };
        state.copies.remove(idx);
        state.sales.push((account.clone(), now));

        Ok(SaleOutcome::Sold {
            value,
            balances: state.credit(account, value),
        })
    }

    async fn link_identity(
        &self,
        account: &AccountId,
        platform: Platform,
        username: &str,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let taken = state
            .links
            .iter()
            .any(|((owner, p), name)| *p == platform && name == username && owner != account);
        if taken {
            return Ok(false);
        }

        state
            .links
            .insert((account.clone(), platform), username.to_string());
        Ok(true)
    }

    async fn unlink_identity(&self, account: &AccountId, platform: Platform) -> StoreResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .links
            .remove(&(account.clone(), platform))
            .is_some())
    }

    async fn account_for_identity(
        &self,
        platform: Platform,
        username: &str,
    ) -> StoreResult<Option<AccountId>> {
        Ok(self
            .state
            .lock()
            .await
            .links
            .iter()
            .find(|((_, p), name)| *p == platform && name.as_str() == username)
            .map(|((owner, _), _)| owner.clone()))
    }

    async fn identity_for_account(
        &self,
        account: &AccountId,
        platform: Platform,
    ) -> StoreResult<Option<String>> {
        Ok(self
            .state
            .lock()
            .await
            .links
            .get(&(account.clone(), platform))
            .cloned())
    }
}

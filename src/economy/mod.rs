//! The virtual economy: balances, item copies, rewards and exchanges.
//!
//! [`Economy`] is the single entry point used by the HTTP API and the chat client. Everything
//! durable goes through an [`EconomyStore`]; everything time-boxed (trade proposals, wager
//! pools, the chat cooldown) lives in memory and leaves nothing behind when it lapses.

pub mod activity;
pub mod catalog;
pub mod config;
pub mod draw;
pub mod error;
pub mod guard;
pub mod inventory;
pub mod ledger;
pub mod period;
pub mod progression;
pub mod reward;
pub mod sale;
pub mod trade;
pub mod wager;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::db::prelude::*;
use crate::economy::activity::Activity;
use crate::economy::catalog::Catalog;
use crate::economy::config::EconomyConfig;
use crate::economy::error::{EconomyError, EconomyResult};
use crate::economy::guard::IssueGuard;
use crate::economy::inventory::Inventory;
use crate::economy::ledger::Ledger;
use crate::economy::progression::{Progression, TierReport};
use crate::economy::reward::{IssuedReward, RewardGate, RewardGrant};
use crate::economy::sale::{SaleReceipt, Sales};
use crate::economy::trade::{TradeBook, TradeHandle, TradeReceipt};
use crate::economy::wager::{Joined, PoolHandle, PoolStatus, WagerBook};
use crate::util::helix::LinkVerifier;

#[derive(Debug)]
pub struct Economy {
    store: Arc<dyn EconomyStore>,
    catalog: Arc<Catalog>,
    ledger: Ledger,
    inventory: Inventory,
    progression: Progression,
    gate: RewardGate,
    trades: TradeBook,
    wagers: WagerBook,
    sales: Sales,
    activity: Activity,
}

impl Economy {
    /// Builds the economy over `store`, reading the item catalog from it.
    pub async fn new(
        store: Arc<dyn EconomyStore>,
        guard: Arc<dyn IssueGuard>,
        verifier: Arc<dyn LinkVerifier>,
        config: EconomyConfig,
    ) -> EconomyResult<Self> {
        let catalog = Arc::new(Catalog::load(store.as_ref()).await?);
        if catalog.is_empty() {
            return Err(EconomyError::NotFound("the item catalog is empty".to_string()));
        }

        let config = Arc::new(config);
        Ok(Self {
            ledger: Ledger::new(Arc::clone(&store)),
            inventory: Inventory::new(Arc::clone(&store), Arc::clone(&catalog)),
            progression: Progression::new(Arc::clone(&store)),
            gate: RewardGate::new(
                Arc::clone(&store),
                guard,
                verifier,
                Arc::clone(&catalog),
                Arc::clone(&config),
            ),
            trades: TradeBook::new(Arc::clone(&store), config.trade_ttl),
            wagers: WagerBook::new(
                Arc::clone(&store),
                config.wager_join_window,
                config.wager_max_players,
            ),
            sales: Sales::new(
                Arc::clone(&store),
                Arc::clone(&catalog),
                config.sale_limit,
                config.sale_window,
            ),
            activity: Activity::new(Arc::clone(&store), config),
            catalog,
            store,
        })
    }

    pub fn store(&self) -> Arc<dyn EconomyStore> {
        Arc::clone(&self.store)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // --- rewards

    pub async fn try_issue_reward(
        &self,
        account: &AccountId,
        kind: RewardKind,
    ) -> EconomyResult<RewardGrant> {
        self.gate.try_issue(account, kind).await
    }

    pub async fn claim_link_bonus(
        &self,
        account: &AccountId,
        platform: Platform,
    ) -> EconomyResult<IssuedReward> {
        self.gate.claim_link_bonus(account, platform).await
    }

    // --- exchange

    pub async fn propose_trade(
        &self,
        proposer: &AccountId,
        offered: ItemTypeId,
        counterpart: &AccountId,
        requested: ItemTypeId,
    ) -> EconomyResult<TradeHandle> {
        self.catalog.get(offered)?;
        self.catalog.get(requested)?;
        self.trades
            .propose(proposer, offered, counterpart, requested)
            .await
    }

    pub async fn confirm_trade(&self, id: Uuid, by: &AccountId) -> EconomyResult<TradeReceipt> {
        self.trades.confirm(id, by).await
    }

    pub fn cancel_trade(&self, id: Uuid, by: &AccountId) -> EconomyResult<()> {
        self.trades.cancel(id, by)
    }

    pub async fn open_wager_pool(
        &self,
        initiator: &AccountId,
        stake: i64,
    ) -> EconomyResult<PoolHandle> {
        self.wagers.open(initiator, stake).await
    }

    pub async fn join_wager_pool(&self, id: Uuid, account: &AccountId) -> EconomyResult<Joined> {
        self.wagers.join(id, account).await
    }

    pub fn wager_status(&self, id: Uuid) -> EconomyResult<PoolStatus> {
        self.wagers.status(id)
    }

    pub async fn sell_one_copy(
        &self,
        account: &AccountId,
        item: ItemTypeId,
    ) -> EconomyResult<SaleReceipt> {
        self.sales.sell_one_copy(account, item).await
    }

    // --- ledger, inventory, progression

    pub async fn balances(&self, account: &AccountId) -> EconomyResult<Balances> {
        self.ledger.balances(account).await
    }

    pub async fn credit(&self, account: &AccountId, delta: i64) -> EconomyResult<Balances> {
        self.ledger.credit(account, delta).await
    }

    pub async fn set_balance(
        &self,
        account: &AccountId,
        counter: Counter,
        value: i64,
    ) -> EconomyResult<Balances> {
        self.ledger.set_balance(account, counter, value).await
    }

    pub async fn leaderboard(&self, limit: i64) -> EconomyResult<Vec<LeaderboardEntry>> {
        self.ledger.leaderboard(limit).await
    }

    pub async fn rank(&self, account: &AccountId) -> EconomyResult<Option<i64>> {
        self.ledger.rank(account).await
    }

    pub async fn holdings(&self, account: &AccountId) -> EconomyResult<Vec<Holding>> {
        self.inventory.holdings(account).await
    }

    pub async fn grant_item(&self, owner: &AccountId, item: ItemTypeId) -> EconomyResult<ItemCopy> {
        self.inventory.grant(owner, item).await
    }

    pub async fn holding_count(&self, owner: &AccountId, item: ItemTypeId) -> EconomyResult<i64> {
        self.catalog.get(item)?;
        self.inventory.holding_count(owner, item).await
    }

    /// `false` when `owner` held no copy of `item`.
    pub async fn remove_item(&self, owner: &AccountId, item: ItemTypeId) -> EconomyResult<bool> {
        self.catalog.get(item)?;
        self.inventory.remove_one(owner, item).await
    }

    pub async fn progression(&self, account: &AccountId) -> EconomyResult<TierReport> {
        self.progression.report(account).await
    }

    pub async fn record_tier(&self, account: &AccountId) -> EconomyResult<TierReport> {
        self.progression.record(account).await
    }

    // --- social links

    /// `false` when another account already owns `username` on `platform`.
    #[instrument(skip(self))]
    pub async fn link_identity(
        &self,
        account: &AccountId,
        platform: Platform,
        username: &str,
    ) -> EconomyResult<bool> {
        let username = username.trim().to_lowercase();
        if username.is_empty() {
            return Err(EconomyError::Invalid("username is empty".to_string()));
        }

        Ok(self
            .store
            .link_identity(account, platform, &username)
            .await?)
    }

    pub async fn unlink_identity(
        &self,
        account: &AccountId,
        platform: Platform,
    ) -> EconomyResult<bool> {
        Ok(self.store.unlink_identity(account, platform).await?)
    }

    pub async fn account_for_identity(
        &self,
        platform: Platform,
        username: &str,
    ) -> EconomyResult<Option<AccountId>> {
        Ok(self
            .store
            .account_for_identity(platform, &username.to_lowercase())
            .await?)
    }

    // --- activity

    pub async fn media_post(
        &self,
        account: &AccountId,
        channel: &str,
        posted_at: DateTime<Utc>,
    ) -> EconomyResult<Option<Balances>> {
        self.activity.media_post(account, channel, posted_at).await
    }

    pub async fn reaction(
        &self,
        author: &AccountId,
        reactor: &AccountId,
        message_id: &str,
    ) -> EconomyResult<Option<Balances>> {
        self.activity.reaction(author, reactor, message_id).await
    }

    pub async fn chat_message(&self, login: &str) -> EconomyResult<Option<Balances>> {
        self.activity.chat_message(login).await
    }
}

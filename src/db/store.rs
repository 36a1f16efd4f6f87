use core::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::db::StoreResult;
use crate::db::prelude::*;
use crate::db::repositories::exchange::ExchangeRepository;
use crate::db::repositories::reward::RewardRepository;
use crate::db::repositories::social::SocialRepository;

/// Every durable read and write the economy performs. Each method is atomic on its own.
#[async_trait]
pub trait EconomyStore: Send + Sync + fmt::Debug {
    async fn balances(&self, account: &AccountId) -> StoreResult<Balances>;
    async fn credit(&self, account: &AccountId, delta: i64) -> StoreResult<Balances>;
    async fn set_balance(
        &self,
        account: &AccountId,
        counter: Counter,
        value: i64,
    ) -> StoreResult<Balances>;
    async fn recorded_tier(&self, account: &AccountId) -> StoreResult<Option<i16>>;
    async fn record_tier(&self, account: &AccountId, tier: i16) -> StoreResult<()>;
    async fn leaderboard(&self, limit: i64) -> StoreResult<Vec<LeaderboardEntry>>;
    async fn rank(&self, account: &AccountId) -> StoreResult<Option<i64>>;
    async fn reset_period(&self, period: &str) -> StoreResult<bool>;

    async fn upsert_catalog(&self, items: &[ItemType]) -> StoreResult<()>;
    async fn catalog(&self) -> StoreResult<Vec<ItemType>>;
    async fn grant(&self, owner: &AccountId, item: ItemTypeId) -> StoreResult<ItemCopy>;
    async fn holding_count(&self, owner: &AccountId, item: ItemTypeId) -> StoreResult<i64>;
    async fn remove_one(&self, owner: &AccountId, item: ItemTypeId) -> StoreResult<bool>;
    async fn holdings(&self, owner: &AccountId) -> StoreResult<Vec<Holding>>;

    async fn cooldown(
        &self,
        account: &AccountId,
        kind: RewardKind,
    ) -> StoreResult<Option<CooldownMark>>;
    /// `None` when the stored mark moved past `cutoff` in the meantime.
    async fn apply_reward(
        &self,
        account: &AccountId,
        effects: &RewardEffects,
        issued_at: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Option<Balances>>;
    async fn claim_link_bonus(
        &self,
        account: &AccountId,
        platform: Platform,
        username: &str,
        points: i64,
    ) -> StoreResult<Option<Balances>>;
    async fn claim_activity(
        &self,
        kind: ActivityKind,
        key: &str,
        account: &AccountId,
        points: i64,
    ) -> StoreResult<Option<Balances>>;

    async fn swap(
        &self,
        a: &AccountId,
        item_a: ItemTypeId,
        b: &AccountId,
        item_b: ItemTypeId,
    ) -> StoreResult<bool>;
    async fn settle_wager(
        &self,
        participants: &[AccountId],
        stake: i64,
    ) -> StoreResult<WagerSettlement>;
    async fn sell_one(
        &self,
        account: &AccountId,
        item: ItemTypeId,
        value: i64,
        now: DateTime<Utc>,
        since: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<SaleOutcome>;

    async fn link_identity(
        &self,
        account: &AccountId,
        platform: Platform,
        username: &str,
    ) -> StoreResult<bool>;
    async fn unlink_identity(&self, account: &AccountId, platform: Platform) -> StoreResult<bool>;
    async fn account_for_identity(
        &self,
        platform: Platform,
        username: &str,
    ) -> StoreResult<Option<AccountId>>;
    async fn identity_for_account(
        &self,
        account: &AccountId,
        platform: Platform,
    ) -> StoreResult<Option<String>>;
}

#[derive(Debug)]
pub struct PgStore {
    accounts: AccountRepository,
    catalog: CatalogRepository,
    inventory: InventoryRepository,
    rewards: RewardRepository,
    exchange: ExchangeRepository,
    social: SocialRepository,
}

impl PgStore {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self {
            accounts: AccountRepository::new(pool),
            catalog: CatalogRepository::new(pool),
            inventory: InventoryRepository::new(pool),
            rewards: RewardRepository::new(pool),
            exchange: ExchangeRepository::new(pool),
            social: SocialRepository::new(pool),
        }
    }
}

#[async_trait]
impl EconomyStore for PgStore {
    async fn balances(&self, account: &AccountId) -> StoreResult<Balances> {
        Ok(self.accounts.balances(account).await?)
    }

    async fn credit(&self, account: &AccountId, delta: i64) -> StoreResult<Balances> {
        Ok(self.accounts.credit(account, delta).await?)
    }

    async fn set_balance(
        &self,
        account: &AccountId,
        counter: Counter,
        value: i64,
    ) -> StoreResult<Balances> {
        Ok(self.accounts.set_balance(account, counter, value).await?)
    }

    async fn recorded_tier(&self, account: &AccountId) -> StoreResult<Option<i16>> {
        Ok(self.accounts.recorded_tier(account).await?)
    }

    async fn record_tier(&self, account: &AccountId, tier: i16) -> StoreResult<()> {
        Ok(self.accounts.record_tier(account, tier).await?)
    }

    async fn leaderboard(&self, limit: i64) -> StoreResult<Vec<LeaderboardEntry>> {
        Ok(self.accounts.leaderboard(limit).await?)
    }

    async fn rank(&self, account: &AccountId) -> StoreResult<Option<i64>> {
        Ok(self.accounts.rank(account).await?)
    }

    async fn reset_period(&self, period: &str) -> StoreResult<bool> {
        Ok(self.accounts.reset_period(period).await?)
    }

    async fn upsert_catalog(&self, items: &[ItemType]) -> StoreResult<()> {
        Ok(self.catalog.upsert_many(items).await?)
    }

    async fn catalog(&self) -> StoreResult<Vec<ItemType>> {
        self.catalog
            .all()
            .await?
            .into_iter()
            .map(ItemType::try_from)
            .collect()
    }

    async fn grant(&self, owner: &AccountId, item: ItemTypeId) -> StoreResult<ItemCopy> {
        Ok(self.inventory.grant(owner, item).await?)
    }

    async fn holding_count(&self, owner: &AccountId, item: ItemTypeId) -> StoreResult<i64> {
        Ok(self.inventory.holding_count(owner, item).await?)
    }

    async fn remove_one(&self, owner: &AccountId, item: ItemTypeId) -> StoreResult<bool> {
        Ok(self.inventory.remove_one(owner, item).await?)
    }

    async fn holdings(&self, owner: &AccountId) -> StoreResult<Vec<Holding>> {
        Ok(self.inventory.holdings(owner).await?)
    }

    async fn cooldown(
        &self,
        account: &AccountId,
        kind: RewardKind,
    ) -> StoreResult<Option<CooldownMark>> {
        Ok(self.rewards.cooldown(account, kind).await?)
    }

    async fn apply_reward(
        &self,
        account: &AccountId,
        effects: &RewardEffects,
        issued_at: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Option<Balances>> {
        Ok(self
            .rewards
            .apply(account, effects, issued_at, cutoff)
            .await?)
    }

    async fn claim_link_bonus(
        &self,
        account: &AccountId,
        platform: Platform,
        username: &str,
        points: i64,
    ) -> StoreResult<Option<Balances>> {
        Ok(self
            .rewards
            .claim_link_bonus(account, platform, username, points)
            .await?)
    }

    async fn claim_activity(
        &self,
        kind: ActivityKind,
        key: &str,
        account: &AccountId,
        points: i64,
    ) -> StoreResult<Option<Balances>> {
        Ok(self
            .rewards
            .claim_activity(kind, key, account, points)
            .await?)
    }

    async fn swap(
        &self,
        a: &AccountId,
        item_a: ItemTypeId,
        b: &AccountId,
        item_b: ItemTypeId,
    ) -> StoreResult<bool> {
        Ok(self.exchange.swap(a, item_a, b, item_b).await?)
    }

    async fn settle_wager(
        &self,
        participants: &[AccountId],
        stake: i64,
    ) -> StoreResult<WagerSettlement> {
        Ok(self.exchange.settle_wager(participants, stake).await?)
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
        Ok(self
            .exchange
            .sell_one(account, item, value, now, since, limit)
            .await?)
    }

    async fn link_identity(
        &self,
        account: &AccountId,
        platform: Platform,
        username: &str,
    ) -> StoreResult<bool> {
        Ok(self.social.link(account, platform, username).await?)
    }

    async fn unlink_identity(&self, account: &AccountId, platform: Platform) -> StoreResult<bool> {
        Ok(self.social.unlink(account, platform).await?)
    }

    async fn account_for_identity(
        &self,
        platform: Platform,
        username: &str,
    ) -> StoreResult<Option<AccountId>> {
        Ok(self.social.account_for(platform, username).await?)
    }

    async fn identity_for_account(
        &self,
        account: &AccountId,
        platform: Platform,
    ) -> StoreResult<Option<String>> {
        Ok(self.social.username_for(account, platform).await?)
    }
}

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use crate::db::models::account::AccountId;
use crate::db::models::exchange::{SaleOutcome, WagerSettlement};
use crate::db::models::item::ItemTypeId;
use crate::db::prelude::Tx;
use crate::economy::draw;
use crate::economy::wager::resolve_pool;

#[derive(Debug, sqlx::FromRow)]
struct StakeRow {
    id: AccountId,
    lifetime: i64,
    monthly: i64,
}

#[derive(Debug)]
pub struct ExchangeRepository {
    pool: &'static Pool<Postgres>,
}

impl ExchangeRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Moves one copy of `item_a` from `a` to `b` and one copy of `item_b` from `b` to `a`, or
    /// nothing at all.
    #[instrument(skip(self))]
    pub async fn swap(
        &self,
        a: &AccountId,
        item_a: ItemTypeId,
        b: &AccountId,
        item_b: ItemTypeId,
    ) -> SqlxResult<bool> {
        let mut tx = Tx::begin(self.pool).await?;

        let Some(copy_a) = tx.lock_one_copy(a, item_a).await? else {
            tx.rollback().await?;
            return Ok(false);
        };
        let Some(copy_b) = tx.lock_one_copy(b, item_b).await? else {
            tx.rollback().await?;
            return Ok(false);
        };

        if !(tx.delete_copy(copy_a).await? && tx.delete_copy(copy_b).await?) {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.grant(b, item_a).await?;
        tx.grant(a, item_b).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Locks every participant, drops those who can no longer cover `stake`, then picks and
    /// applies the outcome.
    #[instrument(skip(self, participants), fields(players = participants.len()))]
    pub async fn settle_wager(
        &self,
        participants: &[AccountId],
        stake: i64,
    ) -> SqlxResult<WagerSettlement> {
        let ids: Vec<String> = participants.iter().map(|p| p.0.clone()).collect();
        let mut tx = Tx::begin(self.pool).await?;

        let rows = tx.lock_stakes(&ids).await?;
        let (qualified, dropped): (Vec<AccountId>, Vec<AccountId>) =
            participants.iter().cloned().partition(|p| {
                rows.iter()
                    .find(|row| &row.id == p)
                    .is_some_and(|row| row.lifetime.min(row.monthly) >= stake)
            });

        let settlement = resolve_pool(qualified, dropped, stake, draw::index);
        match &settlement {
            WagerSettlement::Cancelled { .. } => {
                tx.rollback().await?;
            }
            WagerSettlement::Settled { loser, payouts, .. } => {
                tx.credit(loser, -stake).await?;
                for payout in payouts {
                    tx.credit(&payout.account_id, payout.amount).await?;
                }
                tx.commit().await?;
            }
        }

        Ok(settlement)
    }

    /// Rate limit check, copy removal, sale record and credit, serialized per account by the
    /// account row lock.
    #[instrument(skip(self))]
    pub async fn sell_one(
        &self,
        account: &AccountId,
        item: ItemTypeId,
        value: i64,
        now: DateTime<Utc>,
        since: DateTime<Utc>,
        limit: i64,
    ) -> SqlxResult<SaleOutcome> {
        let mut tx = Tx::begin(self.pool).await?;

        tx.ensure_account(account).await?;
        tx.lock_account(account).await?;

        let recent = tx.count_sales_since(account, since).await?;
        if recent >= limit {
            tx.rollback().await?;
            return Ok(SaleOutcome::RateLimited { recent });
        }

        let Some(copy) = tx.lock_one_copy(account, item).await? else {
            tx.rollback().await?;
            return Ok(SaleOutcome::NoCopy);
        };
        if !tx.delete_copy(copy).await? {
            tx.rollback().await?;
            return Ok(SaleOutcome::NoCopy);
        }
        tx.record_sale(account, item, value, now).await?;
        let balances = tx.credit(account, value).await?;

        tx.commit().await?;
        Ok(SaleOutcome::Sold { value, balances })
    }
}

impl Tx<'_> {
    /// Locks in id order so two settlements over overlapping players cannot deadlock.
    async fn lock_stakes(&mut self, ids: &[String]) -> SqlxResult<Vec<StakeRow>> {
        sqlx::query_as::<_, StakeRow>(
            r#"
            SELECT
                id,
                lifetime_points AS lifetime,
                monthly_points AS monthly
            FROM account
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(ids)
        .fetch_all(&mut **self.inner_mut()?)
        .await
    }
}

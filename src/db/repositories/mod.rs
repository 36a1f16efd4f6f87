use core::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Result as SqlxResult, Transaction};
use tracing::instrument;

use crate::db::prelude::{AccountId, Balances, ItemCopy, ItemTypeId};

pub mod account;
pub mod catalog;
pub mod exchange;
pub mod inventory;
pub mod reward;
pub mod social;

pub struct Tx<'a> {
    inner: Option<Transaction<'a, Postgres>>,
}

impl<'a> Tx<'a> {
    /// "Automatic" transaction handler
    ///
    /// Commits when `f` hands back `Ok`; on `Err` the transaction is dropped, which rolls it
    /// back.
    #[instrument(skip(pool, f))]
    pub async fn with_tx<F, Fut, T>(pool: &'static Pool<Postgres>, f: F) -> SqlxResult<T>
    where
        F: FnOnce(Tx<'a>) -> Fut,
        Fut: Future<Output = (Tx<'a>, SqlxResult<T>)>,
    {
        let tx = Self::begin(pool).await?;
        let (mut tx, result) = f(tx).await;

        match result {
            Ok(val) => {
                tx.commit().await?;
                Ok(val)
            }
            Err(e) => {
                tracing::trace!(error = ?e, "transacted query failure");
                Err(e)
            }
        }
    }

    #[instrument(skip(pool))]
    pub async fn begin(pool: &'static Pool<Postgres>) -> SqlxResult<Self> {
        let inner = pool.begin().await?;
        Ok(Self { inner: Some(inner) })
    }

    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> SqlxResult<()> {
        if let Some(tx) = self.inner.take() {
            tx.commit().await
        } else {
            Err(sqlx::Error::Protocol("Transaction already completed".into()))
        }
    }

    #[instrument(skip(self))]
    pub async fn rollback(&mut self) -> SqlxResult<()> {
        if let Some(tx) = self.inner.take() {
            tx.rollback().await
        } else {
            Err(sqlx::Error::Protocol("Transaction already completed".into()))
        }
    }

    fn inner_mut(&mut self) -> SqlxResult<&mut Transaction<'a, Postgres>> {
        self.inner
            .as_mut()
            .ok_or_else(|| sqlx::Error::Protocol("Transaction already completed".into()))
    }

    #[instrument(skip(self))]
    pub async fn ensure_account(&mut self, account: &AccountId) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO account (id)
            VALUES ($1)
            ON CONFLICT (id)
            DO NOTHING
            "#,
        )
        .bind(account)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(())
    }

    /// Row-locks the account until the transaction ends.
    #[instrument(skip(self))]
    pub async fn lock_account(&mut self, account: &AccountId) -> SqlxResult<Balances> {
        sqlx::query_as::<_, Balances>(
            r#"
            SELECT
                lifetime_points AS lifetime,
                monthly_points AS monthly
            FROM account
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(account)
        .fetch_one(&mut **self.inner_mut()?)
        .await
    }

    /// Applies `delta` to both counters, each floored at zero, creating the account if needed.
    #[instrument(skip(self))]
    pub async fn credit(&mut self, account: &AccountId, delta: i64) -> SqlxResult<Balances> {
        sqlx::query_as::<_, Balances>(sql_fragment::CREDIT)
            .bind(account)
            .bind(delta)
            .fetch_one(&mut **self.inner_mut()?)
            .await
    }

    #[instrument(skip(self))]
    pub async fn grant(&mut self, owner: &AccountId, item: ItemTypeId) -> SqlxResult<ItemCopy> {
        sqlx::query_as::<_, ItemCopy>(
            r#"
            INSERT INTO item_copy (owner_id, item_type_id, acquired_at)
            VALUES ($1, $2, NOW())
            RETURNING
                id,
                owner_id,
                item_type_id,
                acquired_at
            "#,
        )
        .bind(owner)
        .bind(item)
        .fetch_one(&mut **self.inner_mut()?)
        .await
    }

    /// Locks the oldest copy not already locked by a concurrent transaction.
    #[instrument(skip(self))]
    pub async fn lock_one_copy(
        &mut self,
        owner: &AccountId,
        item: ItemTypeId,
    ) -> SqlxResult<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id
            FROM item_copy
            WHERE owner_id = $1 AND item_type_id = $2
            ORDER BY acquired_at ASC, id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(owner)
        .bind(item)
        .fetch_optional(&mut **self.inner_mut()?)
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_copy(&mut self, copy_id: i64) -> SqlxResult<bool> {
        let res = sqlx::query("DELETE FROM item_copy WHERE id = $1")
            .bind(copy_id)
            .execute(&mut **self.inner_mut()?)
            .await?;

        Ok(res.rows_affected() == 1)
    }

    /// Stamps the cooldown only if the stored mark is at or before `cutoff`; returns whether the
    /// stamp landed.
    #[instrument(skip(self))]
    pub async fn stamp_cooldown(
        &mut self,
        account: &AccountId,
        kind: &str,
        issued_at: DateTime<Utc>,
        streak: i32,
        cutoff: DateTime<Utc>,
    ) -> SqlxResult<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO cooldown_mark (
                account_id,
                kind,
                last_issued,
                streak
            )
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (account_id, kind)
            DO UPDATE SET
                last_issued = EXCLUDED.last_issued,
                streak = EXCLUDED.streak
            WHERE cooldown_mark.last_issued <= $5
            "#,
        )
        .bind(account)
        .bind(kind)
        .bind(issued_at)
        .bind(streak)
        .bind(cutoff)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    /// `false` when the account was already paid the one-time bonus for `platform`.
    #[instrument(skip(self))]
    pub async fn claim_account_reward(
        &mut self,
        account: &AccountId,
        platform: &str,
    ) -> SqlxResult<bool> {
        let res = sqlx::query(sql_fragment::CLAIM_ACCOUNT_REWARD)
            .bind(account)
            .bind(platform)
            .execute(&mut **self.inner_mut()?)
            .await?;

        Ok(res.rows_affected() == 1)
    }

    /// `false` when the external identity already funded a bonus.
    #[instrument(skip(self))]
    pub async fn claim_identity_reward(&mut self, platform: &str, username: &str) -> SqlxResult<bool> {
        let res = sqlx::query(sql_fragment::CLAIM_IDENTITY_REWARD)
            .bind(platform)
            .bind(username)
            .execute(&mut **self.inner_mut()?)
            .await?;

        Ok(res.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    pub async fn mark_activity(
        &mut self,
        kind: &str,
        key: &str,
        account: &AccountId,
    ) -> SqlxResult<bool> {
        let res = sqlx::query(sql_fragment::MARK_ACTIVITY)
            .bind(kind)
            .bind(key)
            .bind(account)
            .execute(&mut **self.inner_mut()?)
            .await?;

        Ok(res.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    pub async fn count_sales_since(
        &mut self,
        account: &AccountId,
        since: DateTime<Utc>,
    ) -> SqlxResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM sale_event
            WHERE account_id = $1 AND sold_at > $2
            "#,
        )
        .bind(account)
        .bind(since)
        .fetch_one(&mut **self.inner_mut()?)
        .await
    }

    #[instrument(skip(self))]
    pub async fn record_sale(
        &mut self,
        account: &AccountId,
        item: ItemTypeId,
        value: i64,
        sold_at: DateTime<Utc>,
    ) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sale_event (account_id, item_type_id, value, sold_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(account)
        .bind(item)
        .bind(value)
        .bind(sold_at)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(())
    }
}

pub mod sql_fragment {
    pub const ACCOUNT_FIELDS: &str = r#"
        id,
        lifetime_points,
        monthly_points,
        tier,
        created_at,
        updated_at
    "#;

    pub const ITEM_TYPE_FIELDS: &str = r#"
        id,
        name,
        rarity,
        sale_value,
        capture_points,
        hp,
        power,
        drop_rate
    "#;

    /// `$1` account, `$2` delta. Arithmetic runs in `numeric` so extreme deltas clamp to the
    /// bigint range instead of overflowing.
    pub const CREDIT: &str = r#"
        INSERT INTO account (
            id,
            lifetime_points,
            monthly_points,
            created_at,
            updated_at
        )
        VALUES (
            $1,
            LEAST(GREATEST($2::numeric, 0), 9223372036854775807)::bigint,
            LEAST(GREATEST($2::numeric, 0), 9223372036854775807)::bigint,
            NOW(),
            NOW()
        )
        ON CONFLICT (id)
        DO UPDATE SET
            lifetime_points = LEAST(GREATEST(account.lifetime_points::numeric + $2, 0), 9223372036854775807)::bigint,
            monthly_points = LEAST(GREATEST(account.monthly_points::numeric + $2, 0), 9223372036854775807)::bigint,
            updated_at = NOW()
        RETURNING
            lifetime_points AS lifetime,
            monthly_points AS monthly
    "#;

    pub const CLAIM_ACCOUNT_REWARD: &str = r#"
        INSERT INTO reward_claim (account_id, platform)
        VALUES ($1, $2)
        ON CONFLICT (account_id, platform)
        DO NOTHING
    "#;

    pub const CLAIM_IDENTITY_REWARD: &str = r#"
        INSERT INTO identity_claim (platform, username)
        VALUES ($1, $2)
        ON CONFLICT (platform, username)
        DO NOTHING
    "#;

    pub const MARK_ACTIVITY: &str = r#"
        INSERT INTO activity_mark (kind, key, account_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (kind, key)
        DO NOTHING
    "#;
}

#[async_trait]
pub trait Repository {
    type Ident: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + Sync + fmt::Debug;
    type Output: for<'r> sqlx::FromRow<'r, <Postgres as sqlx::Database>::Row>
        + Sized
        + Unpin
        + Send
        + fmt::Debug;

    const BASE_FIELDS: &'static str;
    const TABLE_NAME: &'static str;
    const ORDER_BY: &'static str;

    fn new(pool: &'static Pool<Postgres>) -> Self
    where
        Self: Sized;

    fn pool(&self) -> &'static Pool<Postgres>;

    #[instrument(skip(self, id))]
    async fn get_by_id(&self, id: &Self::Ident) -> SqlxResult<Option<Self::Output>> {
        sqlx::query_as::<_, Self::Output>(&format!(
            "SELECT {} FROM {} WHERE id = $1",
            Self::BASE_FIELDS,
            Self::TABLE_NAME
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
    }
}

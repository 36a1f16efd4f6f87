use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use super::sql_fragment;
use crate::db::models::account::{Account, AccountId, Balances, Counter, LeaderboardEntry};
use crate::db::prelude::Tx;
use crate::db::repositories::Repository;

#[derive(Debug)]
pub struct AccountRepository {
    pool: &'static Pool<Postgres>,
}

#[async_trait::async_trait]
impl Repository for AccountRepository {
    type Ident = AccountId;
    type Output = Account;

    const BASE_FIELDS: &'static str = sql_fragment::ACCOUNT_FIELDS;
    const TABLE_NAME: &'static str = "account";
    const ORDER_BY: &'static str = "monthly_points DESC, created_at ASC";

    fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &'static Pool<Postgres> {
        self.pool
    }
}

impl AccountRepository {
    /// Zeros for an account that has never been credited.
    #[instrument(skip(self))]
    pub async fn balances(&self, account: &AccountId) -> SqlxResult<Balances> {
        Ok(self
            .get_by_id(account)
            .await?
            .map(Balances::from)
            .unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn credit(&self, account: &AccountId, delta: i64) -> SqlxResult<Balances> {
        sqlx::query_as::<_, Balances>(sql_fragment::CREDIT)
            .bind(account)
            .bind(delta)
            .fetch_one(self.pool)
            .await
    }

    /// Overwrites one counter and leaves the other as it was.
    #[instrument(skip(self))]
    pub async fn set_balance(
        &self,
        account: &AccountId,
        counter: Counter,
        value: i64,
    ) -> SqlxResult<Balances> {
        let column = match counter {
            Counter::Lifetime => "lifetime_points",
            Counter::Monthly => "monthly_points",
        };

        sqlx::query_as::<_, Balances>(&format!(
            r#"
            INSERT INTO account (id, {column}, created_at, updated_at)
            VALUES ($1, GREATEST($2, 0), NOW(), NOW())
            ON CONFLICT (id)
            DO UPDATE SET
                {column} = GREATEST($2, 0),
                updated_at = NOW()
            RETURNING
                lifetime_points AS lifetime,
                monthly_points AS monthly
            "#
        ))
        .bind(account)
        .bind(value)
        .fetch_one(self.pool)
        .await
    }

    #[instrument(skip(self))]
    pub async fn recorded_tier(&self, account: &AccountId) -> SqlxResult<Option<i16>> {
        Ok(sqlx::query_scalar::<_, Option<i16>>("SELECT tier FROM account WHERE id = $1")
            .bind(account)
            .fetch_optional(self.pool)
            .await?
            .flatten())
    }

    #[instrument(skip(self))]
    pub async fn record_tier(&self, account: &AccountId, tier: i16) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO account (id, tier, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (id)
            DO UPDATE SET
                tier = $2,
                updated_at = NOW()
            "#,
        )
        .bind(account)
        .bind(tier)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn leaderboard(&self, limit: i64) -> SqlxResult<Vec<LeaderboardEntry>> {
        sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT
                id AS account_id,
                lifetime_points,
                monthly_points,
                ROW_NUMBER() OVER (ORDER BY monthly_points DESC, created_at ASC) AS ranking
            FROM account
            ORDER BY ranking
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }

    #[instrument(skip(self))]
    pub async fn rank(&self, account: &AccountId) -> SqlxResult<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT ranking
            FROM (
                SELECT
                    id,
                    ROW_NUMBER() OVER (ORDER BY monthly_points DESC, created_at ASC) AS ranking
                FROM account
            ) ranked
            WHERE id = $1
            "#,
        )
        .bind(account)
        .fetch_optional(self.pool)
        .await
    }

    /// Zeros every monthly balance if `period` differs from the stored one. The first period ever
    /// seen is only recorded. Returns whether a reset happened.
    #[instrument(skip(self))]
    pub async fn reset_period(&self, period: &str) -> SqlxResult<bool> {
        let mut tx = Tx::begin(self.pool).await?;

        let reset = match tx.lock_period().await? {
            None => {
                tx.insert_period(period).await?;
                false
            }
            Some(stored) if stored == period => false,
            Some(stored) => {
                tx.update_period(period).await?;
                let cleared = tx.clear_monthly().await?;
                tracing::info!(from = %stored, to = %period, accounts = cleared, "monthly balances reset");
                true
            }
        };

        tx.commit().await?;
        Ok(reset)
    }
}

impl Tx<'_> {
    async fn lock_period(&mut self) -> SqlxResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT period FROM economy_period WHERE id = 1 FOR UPDATE")
            .fetch_optional(&mut **self.inner_mut()?)
            .await
    }

    async fn insert_period(&mut self, period: &str) -> SqlxResult<()> {
        sqlx::query("INSERT INTO economy_period (id, period) VALUES (1, $1) ON CONFLICT (id) DO NOTHING")
            .bind(period)
            .execute(&mut **self.inner_mut()?)
            .await?;

        Ok(())
    }

    async fn update_period(&mut self, period: &str) -> SqlxResult<()> {
        sqlx::query("UPDATE economy_period SET period = $1 WHERE id = 1")
            .bind(period)
            .execute(&mut **self.inner_mut()?)
            .await?;

        Ok(())
    }

    async fn clear_monthly(&mut self) -> SqlxResult<u64> {
        let res = sqlx::query(
            "UPDATE account SET monthly_points = 0, updated_at = NOW() WHERE monthly_points <> 0",
        )
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(res.rows_affected())
    }
}

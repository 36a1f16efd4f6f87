use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use crate::db::models::account::{AccountId, Balances};
use crate::db::models::reward::{ActivityKind, CooldownMark, Platform, RewardEffects, RewardKind};
use crate::db::prelude::Tx;

#[derive(Debug)]
pub struct RewardRepository {
    pool: &'static Pool<Postgres>,
}

impl RewardRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn cooldown(
        &self,
        account: &AccountId,
        kind: RewardKind,
    ) -> SqlxResult<Option<CooldownMark>> {
        sqlx::query_as::<_, CooldownMark>(
            r#"
            SELECT last_issued, streak
            FROM cooldown_mark
            WHERE account_id = $1 AND kind = $2
            "#,
        )
        .bind(account)
        .bind(kind.as_str())
        .fetch_optional(self.pool)
        .await
    }

    /// Stamps the cooldown, grants every drawn item and credits the total in one transaction.
    /// `None` when a concurrent issuance stamped the mark first.
    #[instrument(skip(self, effects), fields(kind = %effects.kind, items = effects.items.len()))]
    pub async fn apply(
        &self,
        account: &AccountId,
        effects: &RewardEffects,
        issued_at: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> SqlxResult<Option<Balances>> {
        let mut tx = Tx::begin(self.pool).await?;

        let stamped = tx
            .stamp_cooldown(
                account,
                effects.kind.as_str(),
                issued_at,
                effects.streak,
                cutoff,
            )
            .await?;
        if !stamped {
            tx.rollback().await?;
            tracing::debug!(account = %account, "cooldown stamp lost to a concurrent issuance");
            return Ok(None);
        }

        for drawn in &effects.items {
            tx.grant(account, drawn.item_type_id).await?;
        }
        let balances = tx.credit(account, effects.total_points()).await?;

        tx.commit().await?;
        Ok(Some(balances))
    }

    /// Pays the one-time link bonus only if neither the account nor the identity was paid before.
    #[instrument(skip(self))]
    pub async fn claim_link_bonus(
        &self,
        account: &AccountId,
        platform: Platform,
        username: &str,
        points: i64,
    ) -> SqlxResult<Option<Balances>> {
        let mut tx = Tx::begin(self.pool).await?;

        if !tx.claim_account_reward(account, platform.as_str()).await?
            || !tx.claim_identity_reward(platform.as_str(), username).await?
        {
            tx.rollback().await?;
            return Ok(None);
        }
        let balances = tx.credit(account, points).await?;

        tx.commit().await?;
        Ok(Some(balances))
    }

    #[instrument(skip(self))]
    pub async fn claim_activity(
        &self,
        kind: ActivityKind,
        key: &str,
        account: &AccountId,
        points: i64,
    ) -> SqlxResult<Option<Balances>> {
        let mut tx = Tx::begin(self.pool).await?;

        if !tx.mark_activity(kind.as_str(), key, account).await? {
            tx.rollback().await?;
            return Ok(None);
        }
        let balances = tx.credit(account, points).await?;

        tx.commit().await?;
        Ok(Some(balances))
    }
}

use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use crate::db::models::account::AccountId;
use crate::db::models::reward::Platform;

#[derive(Debug)]
pub struct SocialRepository {
    pool: &'static Pool<Postgres>,
}

impl SocialRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// `false` if another account already owns `username` on `platform`.
    #[instrument(skip(self))]
    pub async fn link(
        &self,
        account: &AccountId,
        platform: Platform,
        username: &str,
    ) -> SqlxResult<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO social_link (account_id, platform, username)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_id, platform)
            DO UPDATE SET
                username = EXCLUDED.username
            "#,
        )
        .bind(account)
        .bind(platform.as_str())
        .bind(username)
        .execute(self.pool)
        .await;

        match res {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::debug!(%username, "identity already linked to another account");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    pub async fn unlink(&self, account: &AccountId, platform: Platform) -> SqlxResult<bool> {
        let res = sqlx::query("DELETE FROM social_link WHERE account_id = $1 AND platform = $2")
            .bind(account)
            .bind(platform.as_str())
            .execute(self.pool)
            .await?;

        Ok(res.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    pub async fn account_for(
        &self,
        platform: Platform,
        username: &str,
    ) -> SqlxResult<Option<AccountId>> {
        sqlx::query_scalar::<_, AccountId>(
            "SELECT account_id FROM social_link WHERE platform = $1 AND username = $2",
        )
        .bind(platform.as_str())
        .bind(username)
        .fetch_optional(self.pool)
        .await
    }

    #[instrument(skip(self))]
    pub async fn username_for(
        &self,
        account: &AccountId,
        platform: Platform,
    ) -> SqlxResult<Option<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT username FROM social_link WHERE account_id = $1 AND platform = $2",
        )
        .bind(account)
        .bind(platform.as_str())
        .fetch_optional(self.pool)
        .await
    }
}

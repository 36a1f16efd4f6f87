use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use crate::db::models::account::AccountId;
use crate::db::models::item::{Holding, ItemCopy, ItemTypeId};

#[derive(Debug)]
pub struct InventoryRepository {
    pool: &'static Pool<Postgres>,
}

impl InventoryRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn grant(&self, owner: &AccountId, item: ItemTypeId) -> SqlxResult<ItemCopy> {
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
        .fetch_one(self.pool)
        .await
    }

    #[instrument(skip(self))]
    pub async fn holding_count(&self, owner: &AccountId, item: ItemTypeId) -> SqlxResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM item_copy WHERE owner_id = $1 AND item_type_id = $2",
        )
        .bind(owner)
        .bind(item)
        .fetch_one(self.pool)
        .await
    }

    /// Deletes one copy. Concurrent callers skip each other's locked rows, so K copies satisfy at
    /// most K removals.
    #[instrument(skip(self))]
    pub async fn remove_one(&self, owner: &AccountId, item: ItemTypeId) -> SqlxResult<bool> {
        let removed = sqlx::query_scalar::<_, i64>(
            r#"
            DELETE FROM item_copy
            WHERE id = (
                SELECT id
                FROM item_copy
                WHERE owner_id = $1 AND item_type_id = $2
                ORDER BY acquired_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id
            "#,
        )
        .bind(owner)
        .bind(item)
        .fetch_optional(self.pool)
        .await?;

        Ok(removed.is_some())
    }

    #[instrument(skip(self))]
    pub async fn holdings(&self, owner: &AccountId) -> SqlxResult<Vec<Holding>> {
        sqlx::query_as::<_, Holding>(
            r#"
            SELECT
                c.item_type_id,
                t.name,
                t.rarity,
                COUNT(*) AS count,
                MAX(c.acquired_at) AS last_acquired
            FROM item_copy c
            JOIN item_type t ON t.id = c.item_type_id
            WHERE c.owner_id = $1
            GROUP BY c.item_type_id, t.name, t.rarity
            ORDER BY c.item_type_id
            "#,
        )
        .bind(owner)
        .fetch_all(self.pool)
        .await
    }
}

use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use super::sql_fragment;
use crate::db::models::item::{ItemType, ItemTypeId, ItemTypeRow};
use crate::db::prelude::Tx;
use crate::db::repositories::Repository;

#[derive(Debug)]
pub struct CatalogRepository {
    pool: &'static Pool<Postgres>,
}

#[async_trait::async_trait]
impl Repository for CatalogRepository {
    type Ident = ItemTypeId;
    type Output = ItemTypeRow;

    const BASE_FIELDS: &'static str = sql_fragment::ITEM_TYPE_FIELDS;
    const TABLE_NAME: &'static str = "item_type";
    const ORDER_BY: &'static str = "id ASC";

    fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &'static Pool<Postgres> {
        self.pool
    }
}

impl CatalogRepository {
    /// Idempotent; re-running with the same items leaves the table unchanged.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn upsert_many(&self, items: &[ItemType]) -> SqlxResult<()> {
        Tx::with_tx(self.pool, |mut tx| async move {
            let result = async {
                for item in items {
                    if let Err(e) = tx.upsert_item_type(item).await {
                        tracing::error!(error = ?e, item = %item.name, "catalog upsert failure");
                        return Err(e);
                    }
                }
                Ok(())
            }
            .await;

            (tx, result)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn all(&self) -> SqlxResult<Vec<ItemTypeRow>> {
        sqlx::query_as::<_, ItemTypeRow>(&format!(
            "SELECT {} FROM {} ORDER BY {}",
            Self::BASE_FIELDS,
            Self::TABLE_NAME,
            Self::ORDER_BY
        ))
        .fetch_all(self.pool)
        .await
    }
}

impl Tx<'_> {
    async fn upsert_item_type(&mut self, item: &ItemType) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO item_type (
                id,
                name,
                rarity,
                sale_value,
                capture_points,
                hp,
                power,
                drop_rate
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id)
            DO UPDATE SET
                name = EXCLUDED.name,
                rarity = EXCLUDED.rarity,
                sale_value = EXCLUDED.sale_value,
                capture_points = EXCLUDED.capture_points,
                hp = EXCLUDED.hp,
                power = EXCLUDED.power,
                drop_rate = EXCLUDED.drop_rate
            "#,
        )
        .bind(item.id)
        .bind(&item.name)
        .bind(item.rarity.as_str())
        .bind(item.sale_value)
        .bind(item.capture_points)
        .bind(item.hp)
        .bind(item.power)
        .bind(item.drop_rate)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(())
    }
}

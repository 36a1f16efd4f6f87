use std::sync::Arc;

use tracing::instrument;

use crate::db::prelude::*;
use crate::economy::catalog::Catalog;
use crate::economy::error::EconomyResult;

/// Owned item copies. Every copy is its own row, so removing one never touches another.
#[derive(Debug, Clone)]
pub struct Inventory {
    store: Arc<dyn EconomyStore>,
    catalog: Arc<Catalog>,
}

impl Inventory {
    pub fn new(store: Arc<dyn EconomyStore>, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }

    #[instrument(skip(self))]
    pub async fn grant(&self, owner: &AccountId, item: ItemTypeId) -> EconomyResult<ItemCopy> {
        self.catalog.get(item)?;
        Ok(self.store.grant(owner, item).await?)
    }

    pub async fn holding_count(&self, owner: &AccountId, item: ItemTypeId) -> EconomyResult<i64> {
        Ok(self.store.holding_count(owner, item).await?)
    }

    /// `false` when there was no copy to remove.
    #[instrument(skip(self))]
    pub async fn remove_one(&self, owner: &AccountId, item: ItemTypeId) -> EconomyResult<bool> {
        Ok(self.store.remove_one(owner, item).await?)
    }

    pub async fn holdings(&self, owner: &AccountId) -> EconomyResult<Vec<Holding>> {
        Ok(self.store.holdings(owner).await?)
    }
}

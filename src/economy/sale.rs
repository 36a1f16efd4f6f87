use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::db::prelude::*;
use crate::economy::catalog::Catalog;
use crate::economy::error::{EconomyError, EconomyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaleReceipt {
    pub item_type_id: ItemTypeId,
    pub credited: i64,
    pub balances: Balances,
}

/// Sells copies back for their catalog value, rate limited per account over a trailing window.
#[derive(Debug, Clone)]
pub struct Sales {
    store: Arc<dyn EconomyStore>,
    catalog: Arc<Catalog>,
    limit: i64,
    window: TimeDelta,
}

impl Sales {
    pub fn new(
        store: Arc<dyn EconomyStore>,
        catalog: Arc<Catalog>,
        limit: i64,
        window: TimeDelta,
    ) -> Self {
        Self {
            store,
            catalog,
            limit,
            window,
        }
    }

    pub async fn sell_one_copy(
        &self,
        account: &AccountId,
        item: ItemTypeId,
    ) -> EconomyResult<SaleReceipt> {
        self.sell_one_copy_at(account, item, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn sell_one_copy_at(
        &self,
        account: &AccountId,
        item: ItemTypeId,
        now: DateTime<Utc>,
    ) -> EconomyResult<SaleReceipt> {
        let value = self.catalog.get(item)?.sale_value;
        let since = now - self.window;

        match self
            .store
            .sell_one(account, item, value, now, since, self.limit)
            .await?
        {
            SaleOutcome::Sold { value, balances } => {
                tracing::info!(account = %account, item = %item, value, "copy sold");
                Ok(SaleReceipt {
                    item_type_id: item,
                    credited: value,
                    balances,
                })
            }
            SaleOutcome::RateLimited { recent } => Err(EconomyError::NotEligible(format!(
                "{recent} sales in the last {} minutes, limit is {}",
                self.window.num_minutes(),
                self.limit
            ))),
            SaleOutcome::NoCopy => Err(EconomyError::Insufficient(format!(
                "{account} holds no copy of item {item}"
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use futures::future::join_all;

    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::economy::catalog::seed_items;

    fn sales(store: Arc<MemoryStore>, limit: i64) -> Sales {
        Sales::new(
            store,
            Arc::new(Catalog::new(seed_items())),
            limit,
            TimeDelta::minutes(60),
        )
    }

    #[tokio::test]
    async fn test_concurrent_sales_of_one_copy_credit_once() {
        let store = Arc::new(MemoryStore::with_catalog(seed_items()));
        let sales = sales(store.clone(), 10);
        let account = AccountId::from("1");
        store.grant(&account, ItemTypeId(10)).await.unwrap();

        let attempts = (0..2).map(|_| {
            let sales = sales.clone();
            let account = account.clone();
            tokio::spawn(async move { sales.sell_one_copy(&account, ItemTypeId(10)).await })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|res| res.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(EconomyError::Insufficient(_)))));
        assert_eq!(store.balances(&account).await.unwrap(), Balances::new(35, 35));
    }

    #[tokio::test]
    async fn test_rate_limit_uses_trailing_window() {
        let store = Arc::new(MemoryStore::with_catalog(seed_items()));
        let sales = sales(store.clone(), 2);
        let account = AccountId::from("1");
        for _ in 0..4 {
            store.grant(&account, ItemTypeId(1)).await.unwrap();
        }

        let t = Utc::now();
        sales.sell_one_copy_at(&account, ItemTypeId(1), t).await.unwrap();
        sales
            .sell_one_copy_at(&account, ItemTypeId(1), t + TimeDelta::minutes(10))
            .await
            .unwrap();
        assert!(matches!(
            sales
                .sell_one_copy_at(&account, ItemTypeId(1), t + TimeDelta::minutes(20))
                .await,
            Err(EconomyError::NotEligible(_))
        ));
        assert_eq!(store.holding_count(&account, ItemTypeId(1)).await.unwrap(), 2);

        // the first sale has left the window
        sales
            .sell_one_copy_at(&account, ItemTypeId(1), t + TimeDelta::minutes(61))
            .await
            .unwrap();
        assert_eq!(store.holding_count(&account, ItemTypeId(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_item_is_not_found() {
        let sales = sales(Arc::new(MemoryStore::new()), 10);
        assert!(matches!(
            sales.sell_one_copy(&AccountId::from("1"), ItemTypeId(99)).await,
            Err(EconomyError::NotFound(_))
        ));
    }
}

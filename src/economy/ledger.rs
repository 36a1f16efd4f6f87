use std::sync::Arc;

use tracing::instrument;

use crate::db::prelude::*;
use crate::economy::error::EconomyResult;

/// Points balances. Both counters move together on `credit`; each floors at zero on its own.
#[derive(Debug, Clone)]
pub struct Ledger {
    store: Arc<dyn EconomyStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn EconomyStore>) -> Self {
        Self { store }
    }

    pub async fn balances(&self, account: &AccountId) -> EconomyResult<Balances> {
        Ok(self.store.balances(account).await?)
    }

    #[instrument(skip(self))]
    pub async fn credit(&self, account: &AccountId, delta: i64) -> EconomyResult<Balances> {
        let balances = self.store.credit(account, delta).await?;
        tracing::debug!(account = %account, delta, ?balances, "ledger credit");

        Ok(balances)
    }

    /// Administrative override of exactly one counter.
    #[instrument(skip(self))]
    pub async fn set_balance(
        &self,
        account: &AccountId,
        counter: Counter,
        value: i64,
    ) -> EconomyResult<Balances> {
        let balances = self.store.set_balance(account, counter, value).await?;
        tracing::info!(account = %account, ?counter, value, "balance overridden");

        Ok(balances)
    }

    pub async fn leaderboard(&self, limit: i64) -> EconomyResult<Vec<LeaderboardEntry>> {
        Ok(self.store.leaderboard(limit.clamp(1, 100)).await?)
    }

    pub async fn rank(&self, account: &AccountId) -> EconomyResult<Option<i64>> {
        Ok(self.store.rank(account).await?)
    }
}

#[cfg(test)]
mod test {
    use futures::future::join_all;

    use super::*;
    use crate::db::memory::MemoryStore;

    #[tokio::test]
    async fn test_debit_clamps_monthly_and_keeps_lifetime() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let account = AccountId::from("1");

        ledger.credit(&account, 100).await.unwrap();
        ledger
            .set_balance(&account, Counter::Monthly, 40)
            .await
            .unwrap();
        assert_eq!(
            ledger.balances(&account).await.unwrap(),
            Balances::new(100, 40)
        );

        let after = ledger.credit(&account, -60).await.unwrap();
        assert_eq!(after, Balances::new(40, 0));
    }

    #[tokio::test]
    async fn test_unknown_account_reads_as_zero() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        assert_eq!(
            ledger.balances(&AccountId::from("ghost")).await.unwrap(),
            Balances::default()
        );
    }

    #[tokio::test]
    async fn test_override_targets_one_counter_and_clamps() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let account = AccountId::from("1");
        ledger.credit(&account, 30).await.unwrap();

        let after = ledger
            .set_balance(&account, Counter::Lifetime, -5)
            .await
            .unwrap();
        assert_eq!(after, Balances::new(0, 30));
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_go_negative() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let account = AccountId::from("1");
        ledger.credit(&account, 50).await.unwrap();

        let debits = (0..20).map(|_| {
            let ledger = ledger.clone();
            let account = account.clone();
            tokio::spawn(async move { ledger.credit(&account, -7).await })
        });
        for res in join_all(debits).await {
            let balances = res.unwrap().unwrap();
            assert!(balances.lifetime >= 0 && balances.monthly >= 0);
        }

        assert_eq!(
            ledger.balances(&account).await.unwrap(),
            Balances::default()
        );
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_monthly() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        for (id, points) in [("a", 10), ("b", 30), ("c", 20)] {
            ledger.credit(&AccountId::from(id), points).await.unwrap();
        }

        let board = ledger.leaderboard(2).await.unwrap();
        let order: Vec<_> = board.iter().map(|e| e.account_id.0.as_str()).collect();
        assert_eq!(order, ["b", "c"]);
        assert_eq!(board[0].ranking, 1);
        assert_eq!(ledger.rank(&AccountId::from("a")).await.unwrap(), Some(3));
    }
}

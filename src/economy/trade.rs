use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::instrument;
use uuid::Uuid;

use crate::db::prelude::*;
use crate::economy::error::{EconomyError, EconomyResult};

#[derive(Debug, Clone)]
struct Proposal {
    proposer: AccountId,
    offered: ItemTypeId,
    counterpart: AccountId,
    requested: ItemTypeId,
    expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeHandle {
    pub id: Uuid,
    pub expires_in_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeReceipt {
    pub id: Uuid,
    pub proposer: AccountId,
    pub offered: ItemTypeId,
    pub counterpart: AccountId,
    pub requested: ItemTypeId,
}

/// Pending one-for-one swaps, held only in memory.
#[derive(Debug)]
pub struct TradeBook {
    store: Arc<dyn EconomyStore>,
    proposals: Mutex<HashMap<Uuid, Proposal>>,
    ttl: Duration,
}

impl TradeBook {
    pub fn new(store: Arc<dyn EconomyStore>, ttl: Duration) -> Self {
        Self {
            store,
            proposals: Mutex::default(),
            ttl,
        }
    }

    fn proposals(&self) -> MutexGuard<'_, HashMap<Uuid, Proposal>> {
        self.proposals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[instrument(skip(self))]
    pub async fn propose(
        &self,
        proposer: &AccountId,
        offered: ItemTypeId,
        counterpart: &AccountId,
        requested: ItemTypeId,
    ) -> EconomyResult<TradeHandle> {
        if proposer == counterpart {
            return Err(EconomyError::Invalid("cannot trade with yourself".to_string()));
        }
        if self.store.holding_count(proposer, offered).await? < 1 {
            return Err(EconomyError::Insufficient(format!(
                "{proposer} holds no copy of item {offered}"
            )));
        }
        if self.store.holding_count(counterpart, requested).await? < 1 {
            return Err(EconomyError::Insufficient(format!(
                "{counterpart} holds no copy of item {requested}"
            )));
        }

        let id = Uuid::new_v4();
        let now = Instant::now();
        let mut proposals = self.proposals();

        // long-expired proposals have nobody left to report `Expired` to
        let ttl = self.ttl;
        proposals.retain(|_, p| p.expires_at + ttl > now);
        proposals.insert(
            id,
            Proposal {
                proposer: proposer.clone(),
                offered,
                counterpart: counterpart.clone(),
                requested,
                expires_at: now + ttl,
            },
        );

        tracing::info!(trade = %id, "trade proposed");
        Ok(TradeHandle {
            id,
            expires_in_secs: ttl.as_secs(),
        })
    }

    /// Executes the swap; only the counterpart may confirm. The proposal is consumed unless the
    /// store fails.
    #[instrument(skip(self))]
    pub async fn confirm(&self, id: Uuid, by: &AccountId) -> EconomyResult<TradeReceipt> {
        let proposal = {
            let mut proposals = self.proposals();
            let proposal = proposals
                .get(&id)
                .ok_or_else(|| EconomyError::NotFound(format!("trade {id}")))?;
            if &proposal.counterpart != by {
                return Err(EconomyError::NotEligible(
                    "only the counterpart can confirm a trade".to_string(),
                ));
            }

            proposals
                .remove(&id)
                .ok_or_else(|| EconomyError::NotFound(format!("trade {id}")))?
        };

        if Instant::now() >= proposal.expires_at {
            tracing::debug!(trade = %id, "confirmation after expiry");
            return Err(EconomyError::Expired);
        }

        let swapped = match self
            .store
            .swap(
                &proposal.proposer,
                proposal.offered,
                &proposal.counterpart,
                proposal.requested,
            )
            .await
        {
            Ok(swapped) => swapped,
            Err(e) => {
                // nothing moved, so the counterpart may confirm again
                tracing::warn!(trade = %id, error = ?e, "swap failed, proposal kept");
                self.proposals().insert(id, proposal);
                return Err(e.into());
            }
        };
        if !swapped {
            return Err(EconomyError::Insufficient(
                "one of the traded items is no longer held".to_string(),
            ));
        }

        tracing::info!(trade = %id, "trade executed");
        Ok(TradeReceipt {
            id,
            proposer: proposal.proposer,
            offered: proposal.offered,
            counterpart: proposal.counterpart,
            requested: proposal.requested,
        })
    }

    /// Either party may withdraw a pending proposal.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: Uuid, by: &AccountId) -> EconomyResult<()> {
        let mut proposals = self.proposals();
        let proposal = proposals
            .get(&id)
            .ok_or_else(|| EconomyError::NotFound(format!("trade {id}")))?;
        if &proposal.proposer != by && &proposal.counterpart != by {
            return Err(EconomyError::NotEligible(
                "not a party to this trade".to_string(),
            ));
        }

        proposals.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::memory::MemoryStore;

    const A: ItemTypeId = ItemTypeId(1);
    const B: ItemTypeId = ItemTypeId(2);

    async fn setup() -> (Arc<MemoryStore>, TradeBook, AccountId, AccountId) {
        let store = Arc::new(MemoryStore::with_catalog(
            crate::economy::catalog::seed_items(),
        ));
        let alice = AccountId::from("alice");
        let bob = AccountId::from("bob");
        store.grant(&alice, A).await.unwrap();
        store.grant(&bob, B).await.unwrap();

        let book = TradeBook::new(store.clone(), Duration::from_secs(60));
        (store, book, alice, bob)
    }

    #[tokio::test]
    async fn test_confirmed_trade_swaps_both_copies() {
        let (store, book, alice, bob) = setup().await;

        let handle = book.propose(&alice, A, &bob, B).await.unwrap();
        assert!(matches!(
            book.confirm(handle.id, &alice).await,
            Err(EconomyError::NotEligible(_))
        ));
        book.confirm(handle.id, &bob).await.unwrap();

        assert_eq!(store.holding_count(&alice, A).await.unwrap(), 0);
        assert_eq!(store.holding_count(&alice, B).await.unwrap(), 1);
        assert_eq!(store.holding_count(&bob, A).await.unwrap(), 1);
        assert_eq!(store.holding_count(&bob, B).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_trade_changes_nothing() {
        let (store, book, alice, bob) = setup().await;

        let handle = book.propose(&alice, A, &bob, B).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(matches!(
            book.confirm(handle.id, &bob).await,
            Err(EconomyError::Expired)
        ));
        assert_eq!(store.holding_count(&alice, A).await.unwrap(), 1);
        assert_eq!(store.holding_count(&bob, B).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_trade_exchanges_both_or_neither() {
        let (store, book, alice, bob) = setup().await;

        let handle = book.propose(&alice, A, &bob, B).await.unwrap();
        // bob gives his copy away before confirming
        assert!(store.remove_one(&bob, B).await.unwrap());

        assert!(matches!(
            book.confirm(handle.id, &bob).await,
            Err(EconomyError::Insufficient(_))
        ));
        assert_eq!(store.holding_count(&alice, A).await.unwrap(), 1);
        assert_eq!(store.holding_count(&bob, A).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_proposals_are_validated_and_cancellable() {
        let (_store, book, alice, bob) = setup().await;

        assert!(matches!(
            book.propose(&alice, B, &bob, B).await,
            Err(EconomyError::Insufficient(_))
        ));
        assert!(matches!(
            book.propose(&alice, A, &alice, A).await,
            Err(EconomyError::Invalid(_))
        ));

        let handle = book.propose(&alice, A, &bob, B).await.unwrap();
        assert!(matches!(
            book.cancel(handle.id, &AccountId::from("mallory")),
            Err(EconomyError::NotEligible(_))
        ));
        book.cancel(handle.id, &bob).unwrap();
        assert!(matches!(
            book.confirm(handle.id, &bob).await,
            Err(EconomyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_keeps_the_proposal() {
        let (store, book, alice, bob) = setup().await;

        let handle = book.propose(&alice, A, &bob, B).await.unwrap();
        store.fail_next_swap();
        assert!(matches!(
            book.confirm(handle.id, &bob).await,
            Err(EconomyError::Store(_))
        ));
        assert_eq!(store.holding_count(&alice, A).await.unwrap(), 1);

        book.confirm(handle.id, &bob).await.unwrap();
        assert_eq!(store.holding_count(&bob, A).await.unwrap(), 1);
        assert_eq!(store.holding_count(&alice, B).await.unwrap(), 1);
    }
}

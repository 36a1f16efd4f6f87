use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::constants::TIER_THRESHOLDS;
use crate::db::prelude::*;
use crate::economy::error::EconomyResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tier {
    pub index: i16,
    pub name: &'static str,
    pub threshold: i64,
}

/// Highest tier whose threshold the balance has reached.
pub fn tier_for(lifetime: i64) -> Tier {
    TIER_THRESHOLDS
        .iter()
        .enumerate()
        .rev()
        .find(|(_, (threshold, _))| lifetime >= *threshold)
        .map(|(idx, &(threshold, name))| Tier {
            index: idx as i16,
            name,
            threshold,
        })
        .unwrap_or(Tier {
            index: 0,
            name: TIER_THRESHOLDS[0].1,
            threshold: TIER_THRESHOLDS[0].0,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierReport {
    pub tier: Tier,
    pub previous: Option<i16>,
    pub changed: bool,
    pub promoted: bool,
}

impl TierReport {
    fn new(tier: Tier, previous: Option<i16>) -> Self {
        let changed = previous != Some(tier.index);
        Self {
            tier,
            previous,
            changed,
            promoted: changed && previous.is_none_or(|prev| tier.index > prev),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Progression {
    store: Arc<dyn EconomyStore>,
}

impl Progression {
    pub fn new(store: Arc<dyn EconomyStore>) -> Self {
        Self { store }
    }

    /// Compares the current tier to the recorded one. Nothing is written.
    pub async fn report(&self, account: &AccountId) -> EconomyResult<TierReport> {
        let balances = self.store.balances(account).await?;
        let previous = self.store.recorded_tier(account).await?;

        Ok(TierReport::new(tier_for(balances.lifetime), previous))
    }

    /// Stores the current tier so the next report compares against it.
    #[instrument(skip(self))]
    pub async fn record(&self, account: &AccountId) -> EconomyResult<TierReport> {
        let report = self.report(account).await?;
        if report.changed {
            self.store.record_tier(account, report.tier.index).await?;
            tracing::info!(account = %account, tier = report.tier.name, "tier recorded");
        }

        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::memory::MemoryStore;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(tier_for(0).index, 0);
        assert_eq!(tier_for(9).index, 0);
        assert_eq!(tier_for(10).index, 1);
        assert_eq!(tier_for(99).index, 2);
        assert_eq!(tier_for(100).name, "Légende vivante");
        assert_eq!(tier_for(i64::MAX).index, 3);
    }

    #[tokio::test]
    async fn test_report_tracks_promotion_and_demotion() {
        let store = Arc::new(MemoryStore::new());
        let progression = Progression::new(store.clone());
        let account = AccountId::from("1");

        store.credit(&account, 12).await.unwrap();
        let first = progression.record(&account).await.unwrap();
        assert!(first.changed && first.promoted);
        assert_eq!(first.tier.index, 1);

        let again = progression.report(&account).await.unwrap();
        assert!(!again.changed);

        store.credit(&account, 50).await.unwrap();
        let up = progression.report(&account).await.unwrap();
        assert_eq!((up.previous, up.tier.index, up.promoted), (Some(1), 2, true));
        // reporting alone does not move the recorded tier
        assert_eq!(store.recorded_tier(&account).await.unwrap(), Some(1));

        store
            .set_balance(&account, Counter::Lifetime, 3)
            .await
            .unwrap();
        let down = progression.report(&account).await.unwrap();
        assert!(down.changed && !down.promoted);
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::db::prelude::*;
use crate::economy::error::EconomyResult;

/// Calendar month in UTC, e.g. `2025-03`.
pub fn period_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// Resets monthly balances if the month changed since the stored period. `true` if this
/// call performed the reset.
pub async fn check_period(store: &dyn EconomyStore, now: DateTime<Utc>) -> EconomyResult<bool> {
    let period = period_key(now);
    let reset = store.reset_period(&period).await?;
    if reset {
        tracing::info!(%period, "monthly balances reset");
    }

    Ok(reset)
}

/// Checks the period once per `every`, for as long as the process runs.
pub fn spawn_period_task(store: Arc<dyn EconomyStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = check_period(store.as_ref(), Utc::now()).await {
                tracing::error!(error = %e, "period check failed");
            }
        }
    })
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;
    use crate::db::memory::MemoryStore;

    #[test]
    fn test_period_key_is_utc_month() {
        let at = Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap();
        assert_eq!(period_key(at), "2025-01");
    }

    #[tokio::test]
    async fn test_month_change_resets_monthly_only() {
        let store = MemoryStore::new();
        let account = AccountId::from("1");
        let march = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();

        // first check only records the period
        assert!(!check_period(&store, march).await.unwrap());
        store.credit(&account, 80).await.unwrap();
        assert!(!check_period(&store, march).await.unwrap());

        let april = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 1).unwrap();
        assert!(check_period(&store, april).await.unwrap());
        assert!(!check_period(&store, april).await.unwrap());
        assert_eq!(store.balances(&account).await.unwrap(), Balances::new(80, 0));
    }
}

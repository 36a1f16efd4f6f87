use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::db::prelude::*;
use crate::economy::catalog::Catalog;
use crate::economy::config::EconomyConfig;
use crate::economy::draw;
use crate::economy::error::{EconomyError, EconomyResult};
use crate::economy::guard::{IssueGuard, IssuePermit};
use crate::util::helix::LinkVerifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RewardSource {
    Recurring(RewardKind),
    LinkBonus(Platform),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedReward {
    pub account_id: AccountId,
    pub source: RewardSource,
    pub items: Vec<DrawnItem>,
    pub points: i64,
    pub streak: i32,
    pub balances: Balances,
}

/// A reward whose effects are decided but not yet written.
///
/// Holds the issuing guard until it is committed or dropped; dropping it writes nothing.
#[derive(Debug)]
pub struct RewardGrant {
    account: AccountId,
    effects: RewardEffects,
    issued_at: DateTime<Utc>,
    cutoff: DateTime<Utc>,
    window: Window,
    store: Arc<dyn EconomyStore>,
    _permit: IssuePermit,
}

impl RewardGrant {
    pub fn effects(&self) -> &RewardEffects {
        &self.effects
    }

    /// Persists the grant. Reports too-soon if another issuance stamped the cooldown first.
    #[instrument(skip(self), fields(account = %self.account, kind = %self.effects.kind))]
    pub async fn commit(self) -> EconomyResult<IssuedReward> {
        let applied = self
            .store
            .apply_reward(&self.account, &self.effects, self.issued_at, self.cutoff)
            .await?;

        let Some(balances) = applied else {
            let mark = self.store.cooldown(&self.account, self.effects.kind).await?;
            let remaining = mark
                .and_then(|mark| self.window.remaining(&mark, self.issued_at))
                .unwrap_or_default();
            return Err(EconomyError::TooSoon(remaining));
        };

        tracing::info!(points = self.effects.total_points(), items = self.effects.items.len(), "reward issued");
        Ok(IssuedReward {
            account_id: self.account,
            source: RewardSource::Recurring(self.effects.kind),
            points: self.effects.total_points(),
            streak: self.effects.streak,
            items: self.effects.items,
            balances,
        })
    }
}

/// How a kind's cooldown is measured.
#[derive(Debug, Clone, Copy)]
enum Window {
    /// Fixed span since the last issuance.
    Interval(TimeDelta),
    /// Once per UTC calendar day.
    CalendarDay,
}

impl Window {
    /// `None` once the kind is eligible again.
    fn remaining(&self, mark: &CooldownMark, now: DateTime<Utc>) -> Option<Duration> {
        let reopens = match self {
            Window::Interval(span) => mark.last_issued + *span,
            Window::CalendarDay => start_of_next_day(mark.last_issued),
        };

        (now < reopens).then(|| (reopens - now).to_std().unwrap_or_default())
    }

    /// Latest stored `last_issued` that still allows an issuance at `now`.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Window::Interval(span) => now - *span,
            Window::CalendarDay => start_of_day(now) - TimeDelta::microseconds(1),
        }
    }
}

fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn start_of_next_day(at: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(at) + TimeDelta::days(1)
}

/// Cooldown-gated and one-time rewards.
#[derive(Debug, Clone)]
pub struct RewardGate {
    store: Arc<dyn EconomyStore>,
    guard: Arc<dyn IssueGuard>,
    verifier: Arc<dyn LinkVerifier>,
    catalog: Arc<Catalog>,
    config: Arc<EconomyConfig>,
}

impl RewardGate {
    pub fn new(
        store: Arc<dyn EconomyStore>,
        guard: Arc<dyn IssueGuard>,
        verifier: Arc<dyn LinkVerifier>,
        catalog: Arc<Catalog>,
        config: Arc<EconomyConfig>,
    ) -> Self {
        Self {
            store,
            guard,
            verifier,
            catalog,
            config,
        }
    }

    fn window(&self, kind: RewardKind) -> Window {
        match kind {
            RewardKind::Booster => Window::Interval(self.config.booster_cooldown),
            RewardKind::Daily => Window::CalendarDay,
            RewardKind::Subscription => Window::Interval(self.config.subscription_cooldown),
        }
    }

    pub async fn try_issue(&self, account: &AccountId, kind: RewardKind) -> EconomyResult<RewardGrant> {
        self.try_issue_at(account, kind, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn try_issue_at(
        &self,
        account: &AccountId,
        kind: RewardKind,
        now: DateTime<Utc>,
    ) -> EconomyResult<RewardGrant> {
        let permit = self
            .guard
            .acquire(account)
            .await?
            .ok_or(EconomyError::Busy)?;

        let window = self.window(kind);
        let mark = self.store.cooldown(account, kind).await?;
        if let Some(remaining) = mark.as_ref().and_then(|m| window.remaining(m, now)) {
            return Err(EconomyError::TooSoon(remaining));
        }

        let effects = match kind {
            RewardKind::Booster => self.booster(account).await?,
            RewardKind::Daily => self.daily(mark.as_ref(), now),
            RewardKind::Subscription => self.subscription(account).await?,
        };

        Ok(RewardGrant {
            account: account.clone(),
            effects,
            issued_at: now,
            cutoff: window.cutoff(now),
            window,
            store: Arc::clone(&self.store),
            _permit: permit,
        })
    }

    /// Draws the pack. First-copy bonuses come from holdings read before anything is granted.
    async fn booster(&self, account: &AccountId) -> EconomyResult<RewardEffects> {
        let pool: Vec<&ItemType> = self.catalog.items().collect();
        let drawn = draw::pack(&pool, self.config.booster_size)
            .ok_or_else(|| EconomyError::NotFound("the item catalog is empty".to_string()))?;
        let mut owned: HashMap<ItemTypeId, i64> = HashMap::new();
        let mut items = Vec::with_capacity(drawn.len());

        for item in drawn {
            let count = match owned.get(&item.id) {
                Some(count) => *count,
                None => self.store.holding_count(account, item.id).await?,
            };
            let first_copy = count == 0;
            owned.insert(item.id, count + 1);

            let bonus = if first_copy {
                self.config.first_copy_bonus
            } else {
                0
            };
            items.push(DrawnItem {
                item_type_id: item.id,
                points: item.capture_points + bonus,
                first_copy,
            });
        }

        Ok(RewardEffects {
            kind: RewardKind::Booster,
            items,
            flat_points: 0,
            streak: 0,
        })
    }

    fn daily(&self, mark: Option<&CooldownMark>, now: DateTime<Utc>) -> RewardEffects {
        let yesterday = now.date_naive().pred_opt();
        let streak = match mark {
            Some(mark) if Some(mark.last_issued.date_naive()) == yesterday => {
                mark.streak.saturating_add(1)
            }
            _ => 1,
        };

        RewardEffects {
            kind: RewardKind::Daily,
            items: Vec::new(),
            flat_points: self.config.daily_base_points
                * i64::from(streak.min(self.config.daily_streak_cap)),
            streak,
        }
    }

    async fn subscription(&self, account: &AccountId) -> EconomyResult<RewardEffects> {
        let login = self.linked_login(account, Platform::Twitch).await?;
        if !self.verifier.is_subscribed(&login).await? {
            return Err(EconomyError::NotEligible(format!(
                "{login} is not subscribed"
            )));
        }

        Ok(RewardEffects {
            kind: RewardKind::Subscription,
            items: Vec::new(),
            flat_points: self.config.subscription_points,
            streak: 0,
        })
    }

    async fn linked_login(&self, account: &AccountId, platform: Platform) -> EconomyResult<String> {
        self.store
            .identity_for_account(account, platform)
            .await?
            .ok_or_else(|| EconomyError::NotEligible(format!("no linked {platform} account")))
    }

    /// One-time bonus for linking (and following on) an external platform. Paid once per
    /// account and once per external identity.
    #[instrument(skip(self))]
    pub async fn claim_link_bonus(
        &self,
        account: &AccountId,
        platform: Platform,
    ) -> EconomyResult<IssuedReward> {
        let _permit = self
            .guard
            .acquire(account)
            .await?
            .ok_or(EconomyError::Busy)?;

        let login = self.linked_login(account, platform).await?;
        if !self.verifier.is_following(&login).await? {
            return Err(EconomyError::NotEligible(format!("{login} does not follow")));
        }

        let points = self.config.link_bonus_points;
        let balances = self
            .store
            .claim_link_bonus(account, platform, &login, points)
            .await?
            .ok_or_else(|| {
                EconomyError::NotEligible("link bonus already claimed".to_string())
            })?;

        tracing::info!(account = %account, %platform, points, "link bonus issued");
        Ok(IssuedReward {
            account_id: account.clone(),
            source: RewardSource::LinkBonus(platform),
            items: Vec::new(),
            points,
            streak: 0,
            balances,
        })
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use futures::future::join_all;

    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::economy::catalog::seed_items;
    use crate::economy::guard::LocalGuard;
    use crate::util::helix::mock::MockVerifier;

    fn gate_with(store: Arc<MemoryStore>, verifier: MockVerifier) -> RewardGate {
        RewardGate::new(
            store,
            Arc::new(LocalGuard::new()),
            Arc::new(verifier),
            Arc::new(Catalog::new(seed_items())),
            Arc::new(EconomyConfig::default()),
        )
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_booster_cooldown_boundary() {
        let store = Arc::new(MemoryStore::with_catalog(seed_items()));
        let gate = gate_with(store.clone(), MockVerifier::default());
        let account = AccountId::from("1");
        let t = at(8, 0);

        let issued = gate
            .try_issue_at(&account, RewardKind::Booster, t)
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert_eq!(issued.items.len(), 4);
        assert_eq!(store.copy_count().await, 4);

        let early = gate
            .try_issue_at(&account, RewardKind::Booster, t + TimeDelta::minutes(11 * 60 + 59))
            .await;
        match early {
            Err(EconomyError::TooSoon(remaining)) => assert_eq!(remaining, Duration::from_secs(60)),
            other => panic!("expected too-soon, got {other:?}"),
        }

        gate.try_issue_at(&account, RewardKind::Booster, t + TimeDelta::hours(12))
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert_eq!(store.copy_count().await, 8);
    }

    #[tokio::test]
    async fn test_booster_points_include_first_copy_bonus() {
        let store = Arc::new(MemoryStore::with_catalog(seed_items()));
        let gate = gate_with(store.clone(), MockVerifier::default());
        let account = AccountId::from("1");

        let grant = gate.try_issue(&account, RewardKind::Booster).await.unwrap();
        let effects = grant.effects().clone();
        let catalog = Catalog::new(seed_items());

        let mut seen = std::collections::HashSet::new();
        for drawn in &effects.items {
            let item = catalog.get(drawn.item_type_id).unwrap();
            let first = seen.insert(drawn.item_type_id);
            assert_eq!(drawn.first_copy, first);
            let bonus = if first { 5 } else { 0 };
            assert_eq!(drawn.points, item.capture_points + bonus);
        }

        let issued = grant.commit().await.unwrap();
        assert_eq!(issued.balances.lifetime, effects.total_points());
    }

    #[tokio::test]
    async fn test_concurrent_issuance_grants_once() {
        let store = Arc::new(MemoryStore::with_catalog(seed_items()));
        let gate = gate_with(store.clone(), MockVerifier::default());
        let account = AccountId::from("1");

        let attempts = (0..8).map(|_| {
            let gate = gate.clone();
            let account = account.clone();
            tokio::spawn(async move {
                gate.try_issue(&account, RewardKind::Booster)
                    .await?
                    .commit()
                    .await
            })
        });
        let granted = join_all(attempts)
            .await
            .into_iter()
            .filter(|res| matches!(res, Ok(Ok(_))))
            .count();

        assert_eq!(granted, 1);
        assert_eq!(store.copy_count().await, 4);
    }

    #[tokio::test]
    async fn test_store_stamp_decides_between_processes() {
        // two gates with their own guards stand in for two server instances
        let store = Arc::new(MemoryStore::with_catalog(seed_items()));
        let first = gate_with(store.clone(), MockVerifier::default());
        let second = gate_with(store.clone(), MockVerifier::default());
        let account = AccountId::from("1");

        let a = first.try_issue(&account, RewardKind::Booster).await.unwrap();
        let b = second.try_issue(&account, RewardKind::Booster).await.unwrap();

        a.commit().await.unwrap();
        assert!(matches!(b.commit().await, Err(EconomyError::TooSoon(_))));
        assert_eq!(store.copy_count().await, 4);
    }

    #[tokio::test]
    async fn test_dropped_grant_writes_nothing_and_releases_guard() {
        let store = Arc::new(MemoryStore::with_catalog(seed_items()));
        let gate = gate_with(store.clone(), MockVerifier::default());
        let account = AccountId::from("1");

        let grant = gate.try_issue(&account, RewardKind::Booster).await.unwrap();
        assert!(matches!(
            gate.try_issue(&account, RewardKind::Daily).await,
            Err(EconomyError::Busy)
        ));
        drop(grant);

        assert_eq!(store.copy_count().await, 0);
        assert_eq!(store.balances(&account).await.unwrap(), Balances::default());
        assert!(gate.try_issue(&account, RewardKind::Booster).await.is_ok());
    }

    #[tokio::test]
    async fn test_daily_streak_follows_calendar_days() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(store.clone(), MockVerifier::default());
        let account = AccountId::from("1");

        let day1 = gate
            .try_issue_at(&account, RewardKind::Daily, at(23, 50))
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert_eq!((day1.streak, day1.points), (1, 10));

        match gate
            .try_issue_at(&account, RewardKind::Daily, at(23, 59))
            .await
        {
            Err(EconomyError::TooSoon(remaining)) => assert_eq!(remaining, Duration::from_secs(60)),
            other => panic!("expected too-soon, got {other:?}"),
        }

        let day2 = gate
            .try_issue_at(&account, RewardKind::Daily, at(23, 50) + TimeDelta::minutes(15))
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert_eq!((day2.streak, day2.points), (2, 20));

        // a skipped day resets the streak
        let day4 = gate
            .try_issue_at(&account, RewardKind::Daily, at(9, 0) + TimeDelta::days(3))
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert_eq!((day4.streak, day4.points), (1, 10));
    }

    #[tokio::test]
    async fn test_daily_points_are_capped() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(store.clone(), MockVerifier::default());
        let account = AccountId::from("1");
        store
            .set_cooldown(
                &account,
                RewardKind::Daily,
                CooldownMark {
                    last_issued: at(12, 0) - TimeDelta::days(1),
                    streak: 30,
                },
            )
            .await;

        let issued = gate
            .try_issue_at(&account, RewardKind::Daily, at(12, 0))
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert_eq!((issued.streak, issued.points), (31, 70));
    }

    #[tokio::test]
    async fn test_subscription_requires_linked_subscriber() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(store.clone(), MockVerifier::subscribed(&["plss"]));
        let account = AccountId::from("1");

        assert!(matches!(
            gate.try_issue(&account, RewardKind::Subscription).await,
            Err(EconomyError::NotEligible(_))
        ));

        store
            .link_identity(&account, Platform::Twitch, "plss")
            .await
            .unwrap();
        let issued = gate
            .try_issue(&account, RewardKind::Subscription)
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert_eq!(issued.points, 250);
        assert!(matches!(
            gate.try_issue(&account, RewardKind::Subscription).await,
            Err(EconomyError::TooSoon(_))
        ));
    }

    #[tokio::test]
    async fn test_link_bonus_is_paid_once_per_account_and_identity() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(store.clone(), MockVerifier::following(&["plss", "other"]));
        let first = AccountId::from("1");
        let second = AccountId::from("2");

        store
            .link_identity(&first, Platform::Twitch, "plss")
            .await
            .unwrap();
        let issued = gate
            .claim_link_bonus(&first, Platform::Twitch)
            .await
            .unwrap();
        assert_eq!(issued.balances, Balances::new(100, 100));
        assert!(matches!(
            gate.claim_link_bonus(&first, Platform::Twitch).await,
            Err(EconomyError::NotEligible(_))
        ));

        // the identity moves to another account: still already rewarded
        store.unlink_identity(&first, Platform::Twitch).await.unwrap();
        store
            .link_identity(&second, Platform::Twitch, "plss")
            .await
            .unwrap();
        assert!(matches!(
            gate.claim_link_bonus(&second, Platform::Twitch).await,
            Err(EconomyError::NotEligible(_))
        ));
        assert_eq!(store.balances(&second).await.unwrap(), Balances::default());
    }

    #[tokio::test]
    async fn test_link_bonus_requires_follow() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(store.clone(), MockVerifier::default());
        let account = AccountId::from("1");
        store
            .link_identity(&account, Platform::Twitch, "lurker")
            .await
            .unwrap();

        assert!(matches!(
            gate.claim_link_bonus(&account, Platform::Twitch).await,
            Err(EconomyError::NotEligible(_))
        ));
    }
}

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct AccountId(pub String);

/// Base account table model
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: AccountId,
    pub lifetime_points: i64,
    pub monthly_points: i64,
    pub tier: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Balances {
    pub lifetime: i64,
    pub monthly: i64,
}

impl Balances {
    pub fn new(lifetime: i64, monthly: i64) -> Self {
        Self { lifetime, monthly }
    }

    /// Applies `delta` to both counters, flooring each one at zero on its own.
    pub fn apply(self, delta: i64) -> Self {
        Self {
            lifetime: self.lifetime.saturating_add(delta).max(0),
            monthly: self.monthly.saturating_add(delta).max(0),
        }
    }

    /// A stake has to be payable from both counters at once.
    pub fn spendable(&self) -> i64 {
        self.lifetime.min(self.monthly)
    }
}

/// Selects which balance an administrative override writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Counter {
    Lifetime,
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub account_id: AccountId,
    pub lifetime_points: i64,
    pub monthly_points: i64,
    pub ranking: i64,
}

impl From<Account> for Balances {
    fn from(value: Account) -> Self {
        Self {
            lifetime: value.lifetime_points,
            monthly: value.monthly_points,
        }
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        AccountId(value)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        AccountId(value.to_string())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_debit_clamps_each_counter_independently() {
        let after = Balances::new(100, 40).apply(-60);
        assert_eq!(after, Balances::new(40, 0));

        let after = Balances::new(10, 70).apply(-30);
        assert_eq!(after, Balances::new(0, 40));
    }

    #[test]
    fn test_extreme_deltas_never_underflow() {
        let after = Balances::new(5, 5).apply(i64::MIN);
        assert_eq!(after, Balances::default());

        let after = Balances::new(i64::MAX, 1).apply(1);
        assert_eq!(after.lifetime, i64::MAX);
        assert_eq!(after.monthly, 2);
    }

    #[test]
    fn test_spendable_is_smaller_counter() {
        assert_eq!(Balances::new(100, 40).spendable(), 40);
        assert_eq!(Balances::new(3, 40).spendable(), 3);
    }
}

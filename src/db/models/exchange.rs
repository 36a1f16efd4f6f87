use serde::{Deserialize, Serialize};

use crate::db::models::account::{AccountId, Balances};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub account_id: AccountId,
    pub amount: i64,
}

/// How a closed wager pool ended. Accounts in `dropped` no longer qualified at settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WagerSettlement {
    Settled {
        loser: AccountId,
        payouts: Vec<Payout>,
        remainder: i64,
        dropped: Vec<AccountId>,
    },
    Cancelled {
        dropped: Vec<AccountId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaleOutcome {
    Sold { value: i64, balances: Balances },
    RateLimited { recent: i64 },
    NoCopy,
}

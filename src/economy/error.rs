use std::time::Duration;

use thiserror::Error;

use crate::db::StoreError;
use crate::db::redis::RedisErr;
use crate::util::helix::HelixErr;

pub type EconomyResult<T> = core::result::Result<T, EconomyError>;

/// Every variant means "nothing happened"; none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum EconomyError {
    #[error("another reward is already being issued for this account")]
    Busy,

    #[error("too soon, try again in {}s", .0.as_secs())]
    TooSoon(Duration),

    #[error("insufficient resource: {0}")]
    Insufficient(String),

    #[error("expired")]
    Expired,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not eligible: {0}")]
    NotEligible(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("while verifying with helix: {0}")]
    Verifier(#[from] HelixErr),

    #[error("issuing guard unavailable: {0}")]
    Guard(#[from] RedisErr),
}

impl EconomyError {
    /// Short machine-readable label, used in logs and API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            EconomyError::Busy => "busy",
            EconomyError::TooSoon(_) => "too_soon",
            EconomyError::Insufficient(_) => "insufficient",
            EconomyError::Expired => "expired",
            EconomyError::NotFound(_) => "not_found",
            EconomyError::NotEligible(_) => "not_eligible",
            EconomyError::Invalid(_) => "invalid",
            EconomyError::Store(_) | EconomyError::Verifier(_) | EconomyError::Guard(_) => {
                "unavailable"
            }
        }
    }
}

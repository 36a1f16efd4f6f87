use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TWITCH_PLATFORM;
use crate::db::models::item::ItemTypeId;

/// Recurring rewards gated by a cooldown window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    Booster,
    Daily,
    Subscription,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Booster => "booster",
            RewardKind::Daily => "daily",
            RewardKind::Subscription => "subscription",
        }
    }
}

impl FromStr for RewardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "booster" => Ok(RewardKind::Booster),
            "daily" => Ok(RewardKind::Daily),
            "subscription" | "sub" => Ok(RewardKind::Subscription),
            other => Err(format!("unknown reward kind '{other}'")),
        }
    }
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External platforms an account can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitch => TWITCH_PLATFORM,
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            TWITCH_PLATFORM => Ok(Platform::Twitch),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Activities credited at most once per dedupe key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    MediaPost,
    Reaction,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::MediaPost => "media_post",
            ActivityKind::Reaction => "reaction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CooldownMark {
    pub last_issued: DateTime<Utc>,
    pub streak: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawnItem {
    pub item_type_id: ItemTypeId,
    pub points: i64,
    pub first_copy: bool,
}

/// Everything one issuance writes, computed before any write happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEffects {
    pub kind: RewardKind,
    pub items: Vec<DrawnItem>,
    pub flat_points: i64,
    pub streak: i32,
}

impl RewardEffects {
    pub fn total_points(&self) -> i64 {
        self.flat_points + self.items.iter().map(|i| i.points).sum::<i64>()
    }
}

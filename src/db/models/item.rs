use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{COMMON_POINTS, LEGENDARY_POINTS, RARE_POINTS, UNCOMMON_POINTS};
use crate::db::StoreError;
use crate::db::models::account::AccountId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct ItemTypeId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Legendary,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Legendary => "legendary",
        }
    }

    /// Points credited when a copy of this rarity is drawn.
    pub fn capture_points(&self) -> i64 {
        match self {
            Rarity::Common => COMMON_POINTS,
            Rarity::Uncommon => UNCOMMON_POINTS,
            Rarity::Rare => RARE_POINTS,
            Rarity::Legendary => LEGENDARY_POINTS,
        }
    }
}

impl FromStr for Rarity {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "common" => Ok(Rarity::Common),
            "uncommon" => Ok(Rarity::Uncommon),
            "rare" => Ok(Rarity::Rare),
            "legendary" => Ok(Rarity::Legendary),
            other => Err(StoreError::CorruptRow(format!("unknown rarity '{other}'"))),
        }
    }
}

/// Catalog entry; seeded once and never touched by gameplay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemType {
    pub id: ItemTypeId,
    pub name: String,
    pub rarity: Rarity,
    pub sale_value: i64,
    pub capture_points: i64,
    pub hp: i32,
    pub power: i32,
    pub drop_rate: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemTypeRow {
    pub id: ItemTypeId,
    pub name: String,
    pub rarity: String,
    pub sale_value: i64,
    pub capture_points: i64,
    pub hp: i32,
    pub power: i32,
    pub drop_rate: f64,
}

impl TryFrom<ItemTypeRow> for ItemType {
    type Error = StoreError;

    fn try_from(row: ItemTypeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            rarity: row.rarity.parse()?,
            sale_value: row.sale_value,
            capture_points: row.capture_points,
            hp: row.hp,
            power: row.power,
            drop_rate: row.drop_rate,
        })
    }
}

/// One physical copy of an item; `id` tells apart copies acquired in the same instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ItemCopy {
    pub id: i64,
    pub owner_id: AccountId,
    pub item_type_id: ItemTypeId,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Holding {
    pub item_type_id: ItemTypeId,
    pub name: String,
    pub rarity: String,
    pub count: i64,
    pub last_acquired: DateTime<Utc>,
}

impl From<i32> for ItemTypeId {
    fn from(value: i32) -> Self {
        ItemTypeId(value)
    }
}

impl fmt::Display for ItemTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

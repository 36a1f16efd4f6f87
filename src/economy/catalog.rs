use std::collections::BTreeMap;

use crate::db::prelude::*;
use crate::economy::error::{EconomyError, EconomyResult};

/// `(id, name, rarity, sale_value, hp, power, drop_rate)`
const SEED: [(i32, &str, Rarity, i64, i32, i32, f64); 16] = [
    (1, "Chlorophylle", Rarity::Common, 5, 40, 12, 0.14),
    (2, "Brindille", Rarity::Common, 5, 35, 15, 0.14),
    (3, "Pousse-Tiède", Rarity::Common, 6, 45, 10, 0.12),
    (4, "Feuillu", Rarity::Common, 6, 50, 9, 0.12),
    (5, "Herbo", Rarity::Common, 7, 42, 14, 0.10),
    (6, "Racinette", Rarity::Uncommon, 12, 60, 20, 0.07),
    (7, "Fumivolt", Rarity::Uncommon, 14, 55, 24, 0.06),
    (8, "Bourgeonix", Rarity::Uncommon, 15, 65, 22, 0.06),
    (9, "Trichomane", Rarity::Uncommon, 16, 58, 27, 0.05),
    (10, "Kushinator", Rarity::Rare, 35, 80, 38, 0.035),
    (11, "Résinator", Rarity::Rare, 38, 85, 35, 0.03),
    (12, "Haze-Ombre", Rarity::Rare, 40, 78, 42, 0.025),
    (13, "Purple Dragon", Rarity::Rare, 42, 90, 40, 0.02),
    (14, "Mamie Kush", Rarity::Legendary, 90, 120, 60, 0.008),
    (15, "Sensei Skunk", Rarity::Legendary, 100, 130, 65, 0.006),
    (16, "Kanaé Prime", Rarity::Legendary, 150, 150, 80, 0.004),
];

/// The built-in item catalog, upserted at startup.
pub fn seed_items() -> Vec<ItemType> {
    SEED.iter()
        .map(
            |&(id, name, rarity, sale_value, hp, power, drop_rate)| ItemType {
                id: ItemTypeId(id),
                name: name.to_string(),
                rarity,
                sale_value,
                capture_points: rarity.capture_points(),
                hp,
                power,
                drop_rate,
            },
        )
        .collect()
}

/// In-memory view of the catalog; it never changes while the process runs.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: BTreeMap<ItemTypeId, ItemType>,
}

impl Catalog {
    pub fn new(items: Vec<ItemType>) -> Self {
        Self {
            items: items.into_iter().map(|item| (item.id, item)).collect(),
        }
    }

    pub async fn load(store: &dyn EconomyStore) -> EconomyResult<Self> {
        let items = store.catalog().await?;
        tracing::info!(count = items.len(), "catalog loaded");

        Ok(Self::new(items))
    }

    pub fn get(&self, id: ItemTypeId) -> EconomyResult<&ItemType> {
        self.items
            .get(&id)
            .ok_or_else(|| EconomyError::NotFound(format!("item type {id}")))
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemType> {
        self.items.values()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_seed_is_consistent() {
        let items = seed_items();
        let ids: HashSet<_> = items.iter().map(|i| i.id).collect();
        let names: HashSet<_> = items.iter().map(|i| i.name.as_str()).collect();

        assert_eq!(ids.len(), items.len());
        assert_eq!(names.len(), items.len());
        assert!(items.iter().all(|i| i.drop_rate > 0.0));
        assert!(
            items
                .iter()
                .all(|i| i.capture_points == i.rarity.capture_points())
        );
    }

    #[test]
    fn test_lookup_unknown_item() {
        let catalog = Catalog::new(seed_items());

        assert_eq!(catalog.get(ItemTypeId(16)).unwrap().name, "Kanaé Prime");
        assert!(matches!(
            catalog.get(ItemTypeId(999)),
            Err(EconomyError::NotFound(_))
        ));
    }
}

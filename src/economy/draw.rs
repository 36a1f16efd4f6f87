use rand::Rng;
use rand::seq::IndexedRandom;

use crate::db::prelude::ItemType;

/// Uniform index in `0..len` from the thread-local, OS-seeded generator. `len` must be non-zero.
pub fn index(len: usize) -> usize {
    rand::rng().random_range(0..len)
}

/// Picks one item weighted by `drop_rate`. Items with a non-positive rate never drop, unless no
/// item has a positive rate, in which case the pick is uniform.
pub fn weighted<'a, R>(rng: &mut R, items: &[&'a ItemType]) -> Option<&'a ItemType>
where
    R: Rng + ?Sized,
{
    let droppable: Vec<&'a ItemType> = items
        .iter()
        .copied()
        .filter(|item| item.drop_rate > 0.0)
        .collect();

    match droppable.choose_weighted(rng, |item| item.drop_rate) {
        Ok(item) => Some(*item),
        Err(_) => items.choose(rng).copied(),
    }
}

/// `size` independent weighted picks. `None` only for an empty `items`.
pub fn pack<'a>(items: &[&'a ItemType], size: usize) -> Option<Vec<&'a ItemType>> {
    let mut rng = rand::rng();
    (0..size).map(|_| weighted(&mut rng, items)).collect()
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::db::prelude::{ItemTypeId, Rarity};

    fn item(id: i32, drop_rate: f64) -> ItemType {
        ItemType {
            id: ItemTypeId(id),
            name: format!("item-{id}"),
            rarity: Rarity::Common,
            sale_value: 1,
            capture_points: 5,
            hp: 1,
            power: 1,
            drop_rate,
        }
    }

    #[test]
    fn test_zero_rate_items_never_drop() {
        let a = item(1, 1.0);
        let b = item(2, 0.0);
        let c = item(3, -2.0);
        let items = vec![&a, &b, &c];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..500 {
            assert_eq!(weighted(&mut rng, &items).unwrap().id, ItemTypeId(1));
        }
    }

    #[test]
    fn test_weights_shape_the_distribution() {
        let heavy = item(1, 9.0);
        let light = item(2, 1.0);
        let items = vec![&heavy, &light];
        let mut rng = StdRng::seed_from_u64(42);

        let heavy_hits = (0..10_000)
            .filter(|_| weighted(&mut rng, &items).unwrap().id == ItemTypeId(1))
            .count();

        assert!((8_500..9_500).contains(&heavy_hits), "{heavy_hits}");
    }

    #[test]
    fn test_all_zero_rates_fall_back_to_uniform() {
        let a = item(1, 0.0);
        let b = item(2, 0.0);
        let items = vec![&a, &b];
        let mut rng = StdRng::seed_from_u64(3);

        let picked: HashSet<_> = (0..200)
            .map(|_| weighted(&mut rng, &items).unwrap().id)
            .collect();
        assert_eq!(picked.len(), 2);
        assert!(weighted(&mut rng, &[]).is_none());
    }

    #[test]
    fn test_pack_size_and_empty_catalog() {
        let a = item(1, 1.0);
        let b = item(2, 3.0);

        assert_eq!(pack(&[&a, &b], 4).map(|p| p.len()), Some(4));
        assert!(pack(&[], 4).is_none());
    }

    #[test]
    fn test_index_covers_the_whole_range() {
        let seen: HashSet<usize> = (0..500).map(|_| index(3)).collect();
        assert_eq!(seen, HashSet::from([0, 1, 2]));
    }
}

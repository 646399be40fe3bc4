//! # Delete / Rebalance Integration Tests
//!
//! Underflow repair through borrows and merges, height shrink back to a
//! single leaf, and a randomized model check against `std::BTreeMap`.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use mvbtree::{BTree, BTreeBuilder, LongSerializer, StringSerializer};

fn small_tree() -> BTree<i64, String> {
    // page_size 4 keeps pages tiny so every delete order hits borrows and
    // merges within a few dozen keys.
    BTreeBuilder::new(Arc::new(LongSerializer), Arc::new(StringSerializer))
        .page_size(4)
        .build()
        .unwrap()
}

fn assert_matches_model(tree: &BTree<i64, String>, model: &BTreeMap<i64, String>) {
    assert_eq!(tree.len(), model.len() as u64);
    let mut cursor = tree.browse().unwrap();
    for (key, value) in model {
        let tuple = cursor.next().unwrap();
        assert_eq!(&tuple.key, key);
        assert_eq!(&tuple.value, value);
    }
    assert!(!cursor.has_next().unwrap());
}

#[test]
fn test_tree_shrinks_back_to_a_single_leaf() {
    let tree = small_tree();
    for k in 0..64 {
        tree.insert(k, k.to_string()).unwrap();
    }
    assert!(tree.height() > 1);

    for k in 0..63 {
        assert!(tree.delete(&k).unwrap().is_some());
    }
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.get(&63).unwrap(), Some("63".to_string()));
}

#[test]
fn test_ascending_deletes_keep_the_tree_consistent() {
    let tree = small_tree();
    let keys: Vec<i64> = (0..48).collect();
    for &k in &keys {
        tree.insert(k, k.to_string()).unwrap();
    }

    let mut model: BTreeMap<i64, String> =
        keys.iter().map(|&k| (k, k.to_string())).collect();
    for &k in &keys {
        tree.delete(&k).unwrap().unwrap();
        model.remove(&k);
        assert_matches_model(&tree, &model);
    }
    assert!(tree.is_empty());
}

#[test]
fn test_descending_deletes_keep_the_tree_consistent() {
    let tree = small_tree();
    let keys: Vec<i64> = (0..48).collect();
    for &k in &keys {
        tree.insert(k, k.to_string()).unwrap();
    }

    let mut model: BTreeMap<i64, String> =
        keys.iter().map(|&k| (k, k.to_string())).collect();
    for &k in keys.iter().rev() {
        tree.delete(&k).unwrap().unwrap();
        model.remove(&k);
        assert_matches_model(&tree, &model);
    }
    assert!(tree.is_empty());
}

#[test]
fn test_inner_deletes_exercise_both_borrow_directions() {
    let tree = small_tree();
    for k in 0..32 {
        tree.insert(k, k.to_string()).unwrap();
    }

    // Alternate ends moving inward so underflows land next to full and
    // half-empty siblings in both directions.
    let mut model: BTreeMap<i64, String> = (0..32).map(|k| (k, k.to_string())).collect();
    let mut lo = 0;
    let mut hi = 31;
    while lo < hi {
        tree.delete(&lo).unwrap().unwrap();
        model.remove(&lo);
        tree.delete(&hi).unwrap().unwrap();
        model.remove(&hi);
        assert_matches_model(&tree, &model);
        lo += 1;
        hi -= 1;
    }
}

#[test]
fn test_randomized_operations_match_a_reference_map() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let tree = small_tree();
    let mut model = BTreeMap::new();

    for step in 0..2000 {
        let key = rng.gen_range(0..200i64);
        if rng.gen_bool(0.6) {
            let value = format!("v{step}");
            let prior = tree.insert(key, value.clone()).unwrap();
            assert_eq!(prior, model.insert(key, value));
        } else {
            let removed = tree.delete(&key).unwrap();
            match model.remove(&key) {
                Some(value) => {
                    let tuple = removed.unwrap();
                    assert_eq!(tuple.key, key);
                    assert_eq!(tuple.value, value);
                }
                None => assert!(removed.is_none()),
            }
        }
        if step % 100 == 0 {
            assert_matches_model(&tree, &model);
        }
    }
    assert_matches_model(&tree, &model);
}

#[test]
fn test_shuffled_full_delete_empties_the_tree() {
    let mut rng = StdRng::seed_from_u64(42);
    let tree = small_tree();
    let mut keys: Vec<i64> = (0..128).collect();
    keys.shuffle(&mut rng);
    for &k in &keys {
        tree.insert(k, k.to_string()).unwrap();
    }

    keys.shuffle(&mut rng);
    for &k in &keys {
        assert!(tree.delete(&k).unwrap().is_some());
    }
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);

    let mut cursor = tree.browse().unwrap();
    assert!(!cursor.has_next().unwrap());
}

#[test]
fn test_delete_is_idempotent_on_absent_keys() {
    let tree = small_tree();
    for k in 0..16 {
        tree.insert(k, k.to_string()).unwrap();
    }
    tree.delete(&5).unwrap().unwrap();
    assert!(tree.delete(&5).unwrap().is_none());
    assert_eq!(tree.len(), 15);
}

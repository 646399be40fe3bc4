//! # Cursor Traversal Integration Tests
//!
//! Forward/backward walks, browse-from positioning, bound-relative resets,
//! and the end-of-traversal contract, all through the public API.

use std::sync::Arc;

use mvbtree::{BTree, BTreeBuilder, LongSerializer, StringSerializer};

fn tree_with(keys: &[i64]) -> BTree<i64, String> {
    let tree = BTreeBuilder::new(Arc::new(LongSerializer), Arc::new(StringSerializer))
        .page_size(4)
        .build()
        .unwrap();
    for &k in keys {
        tree.insert(k, k.to_string()).unwrap();
    }
    tree
}

fn collect_forward(tree: &BTree<i64, String>) -> Vec<i64> {
    let mut cursor = tree.browse().unwrap();
    let mut keys = Vec::new();
    while cursor.has_next().unwrap() {
        keys.push(cursor.next().unwrap().key);
    }
    keys
}

#[test]
fn test_forward_traversal_is_sorted() {
    let mut keys: Vec<i64> = (1..=100).collect();
    // Insert out of order; the walk must still come back sorted.
    keys.reverse();
    let tree = tree_with(&keys);
    let expected: Vec<i64> = (1..=100).collect();
    assert_eq!(collect_forward(&tree), expected);
}

#[test]
fn test_backward_traversal_mirrors_forward() {
    let keys: Vec<i64> = (1..=100).collect();
    let tree = tree_with(&keys);

    let mut cursor = tree.browse().unwrap();
    cursor.after_last().unwrap();
    let mut seen = Vec::new();
    while cursor.has_prev().unwrap() {
        seen.push(cursor.prev().unwrap().key);
    }
    let expected: Vec<i64> = (1..=100).rev().collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_next_prev_symmetry() {
    let tree = tree_with(&[1, 2, 3, 4, 5]);
    let mut cursor = tree.browse().unwrap();
    cursor.before_first().unwrap();

    let mut landed = 0;
    for _ in 0..3 {
        landed = cursor.next().unwrap().key;
    }
    assert_eq!(landed, 3);
    assert_eq!(cursor.prev().unwrap().key, 2);
    assert_eq!(cursor.next().unwrap().key, 3);
}

#[test]
fn test_browse_from_between_keys() {
    let tree = tree_with(&[1, 3, 5, 7, 9]);

    let mut cursor = tree.browse_from(4).unwrap();
    assert_eq!(cursor.next().unwrap().key, 5);

    // Same starting state, other direction.
    let mut cursor = tree.browse_from(4).unwrap();
    assert_eq!(cursor.prev().unwrap().key, 3);
}

#[test]
fn test_browse_from_present_key_yields_it() {
    let tree = tree_with(&[1, 3, 5, 7, 9]);
    let mut cursor = tree.browse_from(5).unwrap();
    assert!(cursor.has_prev().unwrap());
    assert_eq!(cursor.next().unwrap().key, 5);
}

#[test]
fn test_browse_from_below_smallest_equals_before_first() {
    let tree = tree_with(&[1, 3, 5, 7, 9]);
    let mut cursor = tree.browse_from(0).unwrap();
    assert!(!cursor.has_prev().unwrap());
    assert_eq!(cursor.next().unwrap().key, 1);
}

#[test]
fn test_browse_from_above_largest_equals_after_last() {
    let tree = tree_with(&[1, 3, 5, 7, 9]);
    let mut cursor = tree.browse_from(10).unwrap();
    assert!(!cursor.has_next().unwrap());
    assert!(cursor.next().is_err());
    assert_eq!(cursor.prev().unwrap().key, 9);
}

#[test]
fn test_reset_is_relative_to_the_creation_bound() {
    let tree = tree_with(&[1, 3, 5, 7, 9]);
    let mut cursor = tree.browse_from(5).unwrap();

    // Walk to the end, then reset: back to just before 5, not to key 1.
    while cursor.has_next().unwrap() {
        cursor.next().unwrap();
    }
    cursor.before_first().unwrap();
    assert_eq!(cursor.next().unwrap().key, 5);

    // after_last on the same bound parks just past 5.
    cursor.after_last().unwrap();
    assert_eq!(cursor.prev().unwrap().key, 5);

    // A whole-tree cursor resets to the structural ends.
    let mut cursor = tree.browse().unwrap();
    cursor.next().unwrap();
    cursor.next().unwrap();
    cursor.before_first().unwrap();
    assert_eq!(cursor.next().unwrap().key, 1);
    cursor.after_last().unwrap();
    assert_eq!(cursor.prev().unwrap().key, 9);
}

#[test]
fn test_end_of_traversal_is_an_error_and_moves_nothing() {
    let tree = tree_with(&[1, 2]);
    let mut cursor = tree.browse().unwrap();

    assert!(cursor.prev().is_err());
    assert_eq!(cursor.next().unwrap().key, 1);
    assert_eq!(cursor.next().unwrap().key, 2);
    assert!(!cursor.has_next().unwrap());
    assert!(cursor.next().is_err());
    // The failed step left the cursor on 2.
    assert_eq!(cursor.prev().unwrap().key, 1);
}

#[test]
fn test_empty_tree_cursor() {
    let tree = tree_with(&[]);
    let mut cursor = tree.browse().unwrap();
    assert!(!cursor.has_next().unwrap());
    assert!(!cursor.has_prev().unwrap());
    assert!(cursor.next().is_err());
    assert!(cursor.prev().is_err());
}

#[test]
fn test_closed_cursor_rejects_every_operation() {
    let tree = tree_with(&[1, 2, 3]);
    let mut cursor = tree.browse().unwrap();
    cursor.next().unwrap();
    cursor.close();

    assert!(cursor.next().is_err());
    assert!(cursor.prev().is_err());
    assert!(cursor.has_next().is_err());
    assert!(cursor.has_prev().is_err());
    assert!(cursor.before_first().is_err());
    assert!(cursor.after_last().is_err());
    cursor.close();
}

#[test]
fn test_cursor_revision_matches_creation_time() {
    let tree = tree_with(&[1, 2, 3]);
    let at_creation = tree.revision();
    let cursor = tree.browse().unwrap();

    tree.insert(4, "4".into()).unwrap();
    assert_eq!(cursor.revision(), at_creation);
    assert!(tree.revision() > at_creation);
}

//! Read-side descents. Everything here follows links with acquire loads and never allocates, so
//! it may run alongside the writer.
//!
//! A rotation rewires three links one store at a time, and a descent that overlaps it can bounce
//! between the two rotating nodes until the writer finishes. Every walk therefore counts its
//! steps and gives up with `Restart` past `MAX_DESCENT_DEPTH`; callers go through
//! `AvlTree::read_optimistic`, which also discards any result that overlapped a rotation and
//! retries from the root.

use std::cmp::Ordering;

use crate::comparator::Comparator;
use crate::node::MAX_DESCENT_DEPTH;
use crate::pointers::NodePtr;

/// The walk went deeper than any tree of this size can be tall.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Restart;

pub(crate) type SearchResult<T> = Result<T, Restart>;

#[inline]
fn step(depth: &mut usize) -> SearchResult<()> {
    *depth += 1;
    if *depth > MAX_DESCENT_DEPTH {
        debug_println!("search: gave up after {} steps", depth);
        return Err(Restart);
    }
    Ok(())
}

pub(crate) fn contains<K, C: Comparator<K>>(
    root: Option<NodePtr<K>>,
    comparator: &C,
    key: &K,
) -> SearchResult<bool> {
    Ok(find_equal(root, comparator, key)?.is_some())
}

pub(crate) fn find_equal<K, C: Comparator<K>>(
    root: Option<NodePtr<K>>,
    comparator: &C,
    key: &K,
) -> SearchResult<Option<NodePtr<K>>> {
    let mut depth = 0;
    let mut next = root;
    while let Some(node) = next {
        step(&mut depth)?;
        if comparator.equal(node.key(), key) {
            return Ok(Some(node));
        }
        next = if comparator.less_than(key, node.key()) {
            node.left()
        } else {
            node.right()
        };
    }
    Ok(None)
}

/// The leftmost node with a key >= `key`.
pub(crate) fn find_greater_or_equal<K, C: Comparator<K>>(
    root: Option<NodePtr<K>>,
    comparator: &C,
    key: &K,
) -> SearchResult<Option<NodePtr<K>>> {
    let mut depth = 0;
    let mut candidate = None;
    let mut next = root;
    while let Some(node) = next {
        step(&mut depth)?;
        match comparator.compare(node.key(), key) {
            Ordering::Equal => return Ok(Some(node)),
            Ordering::Less => next = node.right(),
            Ordering::Greater => {
                candidate = Some(node);
                next = node.left();
            }
        }
    }
    Ok(candidate)
}

/// The leftmost node with a key > `key`.
pub(crate) fn find_greater_than<K, C: Comparator<K>>(
    root: Option<NodePtr<K>>,
    comparator: &C,
    key: &K,
) -> SearchResult<Option<NodePtr<K>>> {
    let mut depth = 0;
    let mut candidate = None;
    let mut next = root;
    while let Some(node) = next {
        step(&mut depth)?;
        if comparator.less_than(key, node.key()) {
            candidate = Some(node);
            next = node.left();
        } else {
            next = node.right();
        }
    }
    Ok(candidate)
}

/// The rightmost node with a key <= `key`.
pub(crate) fn find_less_or_equal<K, C: Comparator<K>>(
    root: Option<NodePtr<K>>,
    comparator: &C,
    key: &K,
) -> SearchResult<Option<NodePtr<K>>> {
    let mut depth = 0;
    let mut candidate = None;
    let mut next = root;
    while let Some(node) = next {
        step(&mut depth)?;
        match comparator.compare(node.key(), key) {
            Ordering::Equal => return Ok(Some(node)),
            Ordering::Greater => next = node.left(),
            Ordering::Less => {
                candidate = Some(node);
                next = node.right();
            }
        }
    }
    Ok(candidate)
}

/// The rightmost node with a key < `key`.
pub(crate) fn find_less_than<K, C: Comparator<K>>(
    root: Option<NodePtr<K>>,
    comparator: &C,
    key: &K,
) -> SearchResult<Option<NodePtr<K>>> {
    let mut depth = 0;
    let mut candidate = None;
    let mut next = root;
    while let Some(node) = next {
        step(&mut depth)?;
        if comparator.less_than(node.key(), key) {
            candidate = Some(node);
            next = node.right();
        } else {
            next = node.left();
        }
    }
    Ok(candidate)
}

pub(crate) fn find_first<K>(root: Option<NodePtr<K>>) -> SearchResult<Option<NodePtr<K>>> {
    let mut depth = 0;
    let Some(mut node) = root else {
        return Ok(None);
    };
    while let Some(left) = node.left() {
        step(&mut depth)?;
        node = left;
    }
    Ok(Some(node))
}

pub(crate) fn find_last<K>(root: Option<NodePtr<K>>) -> SearchResult<Option<NodePtr<K>>> {
    let mut depth = 0;
    let Some(mut node) = root else {
        return Ok(None);
    };
    while let Some(right) = node.right() {
        step(&mut depth)?;
        node = right;
    }
    Ok(Some(node))
}

/// In-order successor from links alone: the leftmost node of the right subtree, or else the
/// first ancestor reached from its left child.
pub(crate) fn successor<K>(node: NodePtr<K>) -> SearchResult<Option<NodePtr<K>>> {
    if let Some(right) = node.right() {
        return find_first(Some(right));
    }
    let mut depth = 0;
    let mut child = node;
    let mut parent = node.parent();
    while let Some(ancestor) = parent {
        step(&mut depth)?;
        if ancestor.right() != Some(child) {
            return Ok(Some(ancestor));
        }
        child = ancestor;
        parent = ancestor.parent();
    }
    Ok(None)
}

/// Mirror image of `successor`.
pub(crate) fn predecessor<K>(node: NodePtr<K>) -> SearchResult<Option<NodePtr<K>>> {
    if let Some(left) = node.left() {
        return find_last(Some(left));
    }
    let mut depth = 0;
    let mut child = node;
    let mut parent = node.parent();
    while let Some(ancestor) = parent {
        step(&mut depth)?;
        if ancestor.left() != Some(child) {
            return Ok(Some(ancestor));
        }
        child = ancestor;
        parent = ancestor.parent();
    }
    Ok(None)
}

/// Estimated number of keys strictly less than `key`.
///
/// A node whose key is below `key` counts itself plus everything beneath it that the estimate
/// reaches on both sides, so keys in its right subtree that are >= `key` are counted too. The
/// result is never below the exact rank. Like every other walk it gives up past
/// `MAX_DESCENT_DEPTH` levels.
pub(crate) fn estimate_count<K, C: Comparator<K>>(
    root: Option<NodePtr<K>>,
    comparator: &C,
    key: &K,
) -> SearchResult<u64> {
    estimate_count_at_depth(root, comparator, key, 0)
}

fn estimate_count_at_depth<K, C: Comparator<K>>(
    node: Option<NodePtr<K>>,
    comparator: &C,
    key: &K,
    mut depth: usize,
) -> SearchResult<u64> {
    let Some(node) = node else {
        return Ok(0);
    };
    step(&mut depth)?;
    if comparator.less_than(node.key(), key) {
        Ok(1 + estimate_count_at_depth(node.left(), comparator, key, depth)?
            + estimate_count_at_depth(node.right(), comparator, key, depth)?)
    } else {
        estimate_count_at_depth(node.left(), comparator, key, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Direction;
    use crate::{AvlTree, NaturalOrder};

    fn tree_of(keys: &[i32]) -> AvlTree<i32> {
        let mut tree = AvlTree::default();
        for &key in keys {
            tree.insert(key).unwrap();
        }
        tree
    }

    fn key_of(node: SearchResult<Option<NodePtr<i32>>>) -> Option<i32> {
        node.unwrap().map(|node| *node.key())
    }

    #[test]
    fn test_bounds_on_gapped_keys() {
        let tree = tree_of(&[5, 3, 8, 1, 4, 7, 9]);
        let root = tree.root();
        let cmp = NaturalOrder;

        assert_eq!(key_of(find_greater_or_equal(root, &cmp, &6)), Some(7));
        assert_eq!(key_of(find_greater_or_equal(root, &cmp, &7)), Some(7));
        assert_eq!(key_of(find_greater_or_equal(root, &cmp, &10)), None);
        assert_eq!(key_of(find_greater_or_equal(root, &cmp, &0)), Some(1));

        assert_eq!(key_of(find_greater_than(root, &cmp, &7)), Some(8));
        assert_eq!(key_of(find_greater_than(root, &cmp, &9)), None);

        assert_eq!(key_of(find_less_or_equal(root, &cmp, &6)), Some(5));
        assert_eq!(key_of(find_less_or_equal(root, &cmp, &0)), None);
        assert_eq!(key_of(find_less_or_equal(root, &cmp, &100)), Some(9));

        assert_eq!(key_of(find_less_than(root, &cmp, &5)), Some(4));
        assert_eq!(key_of(find_less_than(root, &cmp, &1)), None);

        assert_eq!(key_of(find_first(root)), Some(1));
        assert_eq!(key_of(find_last(root)), Some(9));
    }

    #[test]
    fn test_successor_and_predecessor_walk_every_key() {
        let keys: Vec<i32> = (0..200).map(|i| (i * 37) % 200).collect();
        let tree = tree_of(&keys);

        let mut node = find_first(tree.root()).unwrap();
        let mut expected = 0;
        while let Some(current) = node {
            assert_eq!(*current.key(), expected);
            expected += 1;
            node = successor(current).unwrap();
        }
        assert_eq!(expected, 200);

        let mut node = find_last(tree.root()).unwrap();
        while let Some(current) = node {
            expected -= 1;
            assert_eq!(*current.key(), expected);
            node = predecessor(current).unwrap();
        }
        assert_eq!(expected, 0);
    }

    #[test]
    fn test_empty_tree_searches() {
        let cmp = NaturalOrder;
        assert_eq!(contains::<i32, _>(None, &cmp, &1), Ok(false));
        assert_eq!(key_of(find_first(None)), None);
        assert_eq!(key_of(find_greater_or_equal(None, &cmp, &1)), None);
        assert_eq!(estimate_count::<i32, _>(None, &cmp, &1), Ok(0));
    }

    #[test]
    fn test_estimate_count_never_undercounts() {
        let tree = tree_of(&[1, 2, 3, 4, 5]);
        let cmp = NaturalOrder;
        assert!(estimate_count(tree.root(), &cmp, &4).unwrap() >= 3);
        assert_eq!(estimate_count(tree.root(), &cmp, &1), Ok(0));
        assert_eq!(estimate_count(tree.root(), &cmp, &6), Ok(5));

        let keys: Vec<i32> = (0..500).map(|i| (i * 7919) % 500).collect();
        let tree = tree_of(&keys);
        for target in [0, 1, 17, 250, 499, 500, 1000] {
            let exact = target.clamp(0, 500) as u64;
            let estimate = estimate_count(tree.root(), &cmp, &target).unwrap();
            assert!(estimate >= exact, "estimate {} < exact {}", estimate, exact);
            assert!(estimate <= 500);
        }
    }

    #[test]
    fn test_walks_through_a_link_cycle_give_up() {
        // 2 -> (1, 3); pointing 3's left back at 2 makes a cycle that keys between 2 and 3
        // never leave
        let tree = tree_of(&[2, 1, 3]);
        let cmp = NaturalOrder;
        let root = tree.root();
        let two = root.unwrap();
        let three = two.right().unwrap();
        three.set_child(Direction::Left, Some(two));

        assert_eq!(key_of(find_equal(root, &cmp, &2)), Some(2));
        assert_eq!(contains(root, &cmp, &5), Ok(false));
        assert_eq!(find_greater_than(root, &cmp, &2).err(), Some(Restart));
        assert_eq!(find_less_than(root, &cmp, &3).err(), Some(Restart));
        assert_eq!(estimate_count(root, &cmp, &100), Err(Restart));

        three.set_child(Direction::Left, None);
        assert_eq!(key_of(find_greater_than(root, &cmp, &2)), Some(3));
        tree.check_invariants();
    }
}

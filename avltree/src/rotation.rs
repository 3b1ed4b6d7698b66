use crate::node::Direction;
use crate::pointers::{AtomicNodePtr, NodePtr};
use crate::sync::{Ordering, VersionLatch};

/// The shape of the imbalance an insert repaired, named by the path from the unbalanced node
/// down to the inserted key.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum RotationKind {
    /// Right rotation at the unbalanced node.
    LeftLeft,
    /// Left rotation at its left child, then right rotation at the node.
    LeftRight,
    /// Left rotation at the unbalanced node.
    RightRight,
    /// Right rotation at its right child, then left rotation at the node.
    RightLeft,
}

/// Walks from the parent of a freshly linked node toward the root, refreshing cached heights,
/// and repairs the first node found out of balance. One (single or double) rotation restores the
/// subtree's pre-insert height, so nothing above it changes and the walk ends there. The walk
/// also ends at the first node whose height didn't change.
///
/// `rotations` is held odd for the duration of the rotation so readers retry rather than trust a
/// walk through half-rewired links.
///
/// # Safety
///
/// Must only be called by the tree's single writer, right after linking a node under `start`.
pub(crate) unsafe fn rebalance_after_insert<K>(
    root: &AtomicNodePtr<K>,
    rotations: &VersionLatch,
    start: NodePtr<K>,
) -> Option<RotationKind> {
    let mut next = Some(start);
    while let Some(node) = next {
        let balance = node.balance_factor_relaxed();
        if !(-1..=1).contains(&balance) {
            rotations.begin_write();
            let kind = unsafe { rebalance_node(root, node, balance) };
            rotations.end_write();
            return Some(kind);
        }
        let height = node.computed_height_relaxed();
        if height == node.height_relaxed() {
            return None;
        }
        node.set_height(height);
        next = node.parent_relaxed();
    }
    None
}

unsafe fn rebalance_node<K>(
    root: &AtomicNodePtr<K>,
    node: NodePtr<K>,
    balance: i64,
) -> RotationKind {
    debug_assert!(balance.abs() == 2, "balance factor {} out of range", balance);
    let (heavy, single, double) = if balance > 0 {
        (Direction::Left, RotationKind::LeftLeft, RotationKind::LeftRight)
    } else {
        (Direction::Right, RotationKind::RightRight, RotationKind::RightLeft)
    };
    let child = node
        .child_relaxed(heavy)
        .expect("the heavy side of an unbalanced node has a child");
    let child_balance = child.balance_factor_relaxed();
    let outer_heavy = match heavy {
        Direction::Left => child_balance >= 0,
        Direction::Right => child_balance <= 0,
    };

    let kind = if outer_heavy {
        unsafe { rotate(root, node, heavy.opposite()) };
        single
    } else {
        unsafe {
            rotate(root, child, heavy);
            rotate(root, node, heavy.opposite());
        }
        double
    };
    debug_println!("rebalanced {:?} with a {:?} rotation", node, kind);
    kind
}

/// Rotates the subtree rooted at `top` toward `dir`: the child on the opposite side (the pivot)
/// takes `top`'s place and `top` becomes the pivot's `dir` child. Returns the pivot.
///
/// The pivot adopts `top` before anything points at the pivot, so nothing above the subtree is
/// lost, but until `top` takes the pivot's inner subtree over in the last link store that subtree
/// is unreachable and a search for one of its keys bounces between the two nodes. Readers rely on
/// the rotation version to throw such walks away. Parent links are updated top-down so they
/// never form a cycle.
///
/// # Safety
///
/// Writer only; `top` must have a child on the side opposite `dir`.
pub(crate) unsafe fn rotate<K>(
    root: &AtomicNodePtr<K>,
    top: NodePtr<K>,
    dir: Direction,
) -> NodePtr<K> {
    let pivot = top
        .child_relaxed(dir.opposite())
        .expect("rotation requires a pivot child");
    let inner = pivot.child_relaxed(dir);
    let parent = top.parent_relaxed();

    pivot.set_child(dir, Some(top));
    replace_child(root, parent, top, pivot);
    top.set_child(dir.opposite(), inner);

    pivot.set_parent(parent);
    top.set_parent(Some(pivot));
    if let Some(inner) = inner {
        inner.set_parent(Some(top));
    }

    top.set_height(top.computed_height_relaxed());
    pivot.set_height(pivot.computed_height_relaxed());
    pivot
}

fn replace_child<K>(
    root: &AtomicNodePtr<K>,
    parent: Option<NodePtr<K>>,
    old: NodePtr<K>,
    new: NodePtr<K>,
) {
    match parent {
        None => root.store(Some(new), Ordering::Release),
        Some(parent) => {
            if parent.left_relaxed() == Some(old) {
                parent.set_left(Some(new));
            } else {
                debug_assert_eq!(parent.right_relaxed(), Some(old));
                parent.set_right(Some(new));
            }
        }
    }
}

use std::ptr;

use crate::pointers::{AtomicNodePtr, NodePtr};
use crate::sync::{AtomicU32, Ordering};

/// Upper bound on the number of levels any descent walks. An AVL tree is at most ~1.44 log2(n)
/// tall, so no tree addressable in 64 bits comes close; a reader that walks further is bouncing
/// between two nodes mid-rotation.
pub const MAX_DESCENT_DEPTH: usize = 96;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Direction {
    Left,
    Right,
}

impl Direction {
    pub(crate) fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

/// A tree node: the key plus its links and the cached height of its subtree.
///
/// Readers follow links with the acquire accessors (`left`, `right`, `parent`, `height`); any
/// store that makes a node or a link reachable from the root goes through the release setters.
/// The `*_relaxed` accessors belong to the writer: it uses them to initialize a node before it
/// is published and to read links and heights only it ever stores.
pub(crate) struct Node<K> {
    key: K,
    left: AtomicNodePtr<K>,
    right: AtomicNodePtr<K>,
    parent: AtomicNodePtr<K>,
    height: AtomicU32,
}

impl<K> Node<K> {
    pub(crate) fn new(key: K) -> Self {
        Node {
            key,
            left: AtomicNodePtr::null(),
            right: AtomicNodePtr::null(),
            parent: AtomicNodePtr::null(),
            height: AtomicU32::new(1),
        }
    }

    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    /// Drops the key of a node the tree is done with. Links and height are plain atomics and
    /// need no drop.
    ///
    /// # Safety
    ///
    /// `this` must point to a live node that no reader can reach anymore, and its key must not be
    /// used or dropped again.
    pub(crate) unsafe fn drop_key_in_place(this: *mut Node<K>) {
        unsafe { ptr::drop_in_place(ptr::addr_of_mut!((*this).key)) }
    }

    pub(crate) fn left(&self) -> Option<NodePtr<K>> {
        self.left.load(Ordering::Acquire)
    }
    pub(crate) fn set_left(&self, node: Option<NodePtr<K>>) {
        self.left.store(node, Ordering::Release);
    }
    pub(crate) fn right(&self) -> Option<NodePtr<K>> {
        self.right.load(Ordering::Acquire)
    }
    pub(crate) fn set_right(&self, node: Option<NodePtr<K>>) {
        self.right.store(node, Ordering::Release);
    }
    pub(crate) fn parent(&self) -> Option<NodePtr<K>> {
        self.parent.load(Ordering::Acquire)
    }
    pub(crate) fn set_parent(&self, node: Option<NodePtr<K>>) {
        self.parent.store(node, Ordering::Release);
    }
    pub(crate) fn height(&self) -> u32 {
        self.height.load(Ordering::Acquire)
    }
    pub(crate) fn set_height(&self, height: u32) {
        self.height.store(height, Ordering::Release);
    }

    pub(crate) fn set_child(&self, dir: Direction, node: Option<NodePtr<K>>) {
        match dir {
            Direction::Left => self.set_left(node),
            Direction::Right => self.set_right(node),
        }
    }

    pub(crate) fn left_relaxed(&self) -> Option<NodePtr<K>> {
        self.left.load(Ordering::Relaxed)
    }
    pub(crate) fn right_relaxed(&self) -> Option<NodePtr<K>> {
        self.right.load(Ordering::Relaxed)
    }
    pub(crate) fn parent_relaxed(&self) -> Option<NodePtr<K>> {
        self.parent.load(Ordering::Relaxed)
    }
    pub(crate) fn set_parent_relaxed(&self, node: Option<NodePtr<K>>) {
        self.parent.store(node, Ordering::Relaxed);
    }
    pub(crate) fn height_relaxed(&self) -> u32 {
        self.height.load(Ordering::Relaxed)
    }
    pub(crate) fn child_relaxed(&self, dir: Direction) -> Option<NodePtr<K>> {
        match dir {
            Direction::Left => self.left_relaxed(),
            Direction::Right => self.right_relaxed(),
        }
    }

    /// Height of the taller child plus one, from the writer's view.
    pub(crate) fn computed_height_relaxed(&self) -> u32 {
        1 + height_relaxed(self.left_relaxed()).max(height_relaxed(self.right_relaxed()))
    }

    /// height(left) - height(right), from the writer's view.
    pub(crate) fn balance_factor_relaxed(&self) -> i64 {
        height_relaxed(self.left_relaxed()) as i64 - height_relaxed(self.right_relaxed()) as i64
    }
}

/// Height of a possibly-empty subtree, for the writer.
pub(crate) fn height_relaxed<K>(node: Option<NodePtr<K>>) -> u32 {
    node.map_or(0, |node| node.height_relaxed())
}

/// Height of a possibly-empty subtree, for readers.
pub(crate) fn height<K>(node: Option<NodePtr<K>>) -> u32 {
    node.map_or(0, |node| node.height())
}

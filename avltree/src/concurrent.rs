use std::fmt;
use std::ops::Deref;

use crate::allocator::{AllocError, Allocator, Arena};
use crate::comparator::{Comparator, NaturalOrder};
use crate::sync::{ExclusiveGuard, RawRwLock, RwLock};
use crate::tree::AvlTree;

/// An `AvlTree` whose inserts go through a writer latch, so it can be shared across threads
/// (e.g. in an `Arc`) with any number of inserting and reading threads.
///
/// Reads are reached through `Deref` and never touch the latch.
pub struct ConcurrentAvlTree<K, C = NaturalOrder, A = Arena> {
    tree: AvlTree<K, C, A>,
    writer: RwLock,
}

impl<K, C: Comparator<K>, A: Allocator> ConcurrentAvlTree<K, C, A> {
    pub fn new(comparator: C, allocator: A) -> Self {
        Self::from(AvlTree::new(comparator, allocator))
    }

    /// Inserts `key`, waiting for any insert running on another thread to finish first.
    pub fn insert(&self, key: K) -> Result<(), AllocError> {
        let _guard = ExclusiveGuard::lock(&self.writer);
        unsafe { self.tree.insert_shared(key) }
    }

    /// Inserts `key` only if no other thread is inserting right now; hands the key back otherwise.
    pub fn try_insert(&self, key: K) -> Result<Result<(), AllocError>, K> {
        match ExclusiveGuard::try_lock(&self.writer) {
            Some(_guard) => Ok(unsafe { self.tree.insert_shared(key) }),
            None => Err(key),
        }
    }

    pub fn into_inner(self) -> AvlTree<K, C, A> {
        self.tree
    }
}

impl<K, C: Comparator<K>, A: Allocator> From<AvlTree<K, C, A>> for ConcurrentAvlTree<K, C, A> {
    fn from(tree: AvlTree<K, C, A>) -> Self {
        ConcurrentAvlTree {
            tree,
            writer: RwLock::new(),
        }
    }
}

impl<K: Ord> Default for ConcurrentAvlTree<K, NaturalOrder, Arena> {
    fn default() -> Self {
        Self::from(AvlTree::default())
    }
}

impl<K, C, A> Deref for ConcurrentAvlTree<K, C, A> {
    type Target = AvlTree<K, C, A>;

    fn deref(&self) -> &AvlTree<K, C, A> {
        &self.tree
    }
}

impl<K, C: Comparator<K>, A: Allocator> fmt::Debug for ConcurrentAvlTree<K, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentAvlTree")
            .field("len", &self.tree.len())
            .field("height", &self.tree.height())
            .field("writer_locked", &self.writer.is_locked_exclusive())
            .finish()
    }
}

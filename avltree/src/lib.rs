//! An insert-only AVL tree for memtable indexes.
//!
//! One writer inserts while any number of readers search and walk the tree without locks. Every
//! link that makes a node reachable is published with a release store and followed with an
//! acquire load, so a reader only ever sees fully initialized nodes, and a key whose insert
//! finished before a read began is always found by that read.
//!
//! Rotations rewrite links one at a time, so reads are optimistic: each one checks a rotation
//! version before and after it runs and starts over from the root if a rotation overlapped it.
//!
//! Nodes are allocated from an [`Allocator`] (by default an [`Arena`]) and are never freed one
//! at a time; their memory lives as long as the allocator. Keys are dropped with the tree.
//!
//! Writers must be serialized: [`AvlTree::insert`] takes `&mut self`, [`AvlTree::insert_shared`]
//! leaves it to the caller, and [`ConcurrentAvlTree`] adds a writer latch so the tree can be
//! shared freely between threads.

#[macro_use]
mod debug;

mod allocator;
mod comparator;
mod concurrent;
mod cursor;
mod iter;
mod node;
mod pointers;
mod rotation;
mod search;
mod sync;
mod tree;
pub use allocator::{
    AllocError, Allocator, Arena, ArenaOptions, DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE,
};
pub use comparator::{BytewiseComparator, Comparator, FnComparator, NaturalOrder, Reverse};
pub use concurrent::ConcurrentAvlTree;
pub use cursor::Cursor;
pub use iter::{
    AvlTreeIterator, BackwardIter, BackwardIterDirection, ForwardIter, ForwardIterDirection,
    IterDirection, RangeIter,
};
pub use node::MAX_DESCENT_DEPTH;
pub use tree::AvlTree;

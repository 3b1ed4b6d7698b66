use std::alloc::Layout;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::mem;
use std::ops::RangeBounds;
use std::ptr::NonNull;

use smallvec::SmallVec;

use crate::allocator::{AllocError, Allocator, Arena, ArenaOptions};
use crate::comparator::{Comparator, NaturalOrder};
use crate::cursor::Cursor;
use crate::iter::{AvlTreeIterator, BackwardIter, ForwardIter, RangeIter};
use crate::node::Node;
use crate::pointers::{AtomicNodePtr, NodePtr};
use crate::rotation::{RotationKind, rebalance_after_insert};
use crate::search::{self, SearchResult};
use crate::sync::{AtomicUsize, Ordering, VersionLatch};

/// Insert-only AVL tree with one writer and any number of lock-free readers.
///
/// Nodes are carved out of the allocator and never freed individually: they stay put until the
/// tree (and with it the allocator, or the tree's borrow of it) goes away. Readers follow links
/// published with release stores, so they always see fully built nodes, and validate each read
/// against a rotation version so a read that overlapped a rotation is retried.
// Notes
// - writers must be serialized externally: `insert` takes `&mut self`, `insert_shared` is the
//   unsafe escape hatch, and `ConcurrentAvlTree` wraps it with a latch
// - keys are dropped in place when the tree is dropped; node memory goes with the allocator
// Run the shuttle model test:
//   cargo test --features=shuttle -- test_concurrent_inserts_under_shuttle
// Run benchmarks:
//   cargo bench
pub struct AvlTree<K, C = NaturalOrder, A = Arena> {
    root: AtomicNodePtr<K>,
    // odd while the writer rotates
    rotations: VersionLatch,
    comparator: C,
    allocator: A,
    // bumped after each insert, so readers racing the writer may see it lag by one
    len: AtomicUsize,
    _marker: PhantomData<K>,
}

impl<K, C: Comparator<K>, A: Allocator> AvlTree<K, C, A> {
    pub fn new(comparator: C, allocator: A) -> Self {
        AvlTree {
            root: AtomicNodePtr::null(),
            rotations: VersionLatch::new(),
            comparator,
            allocator,
            len: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.root().is_none()
    }

    /// Height of the root's subtree; 0 for an empty tree.
    pub fn height(&self) -> u32 {
        crate::node::height(self.root())
    }

    /// Bytes the allocator has reserved.
    pub fn memory_usage(&self) -> usize {
        self.allocator.memory_usage()
    }

    pub(crate) fn root(&self) -> Option<NodePtr<K>> {
        self.root.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn root_link(&self) -> &AtomicNodePtr<K> {
        &self.root
    }

    #[cfg(test)]
    pub(crate) fn rotations(&self) -> &VersionLatch {
        &self.rotations
    }

    /// Runs `read` from the current root once. Returns `None` if a rotation was in progress or
    /// ran while `read` did, or if `read` gave up on a walk that went too deep.
    pub(crate) fn try_read_optimistic<T>(
        &self,
        read: impl FnOnce(Option<NodePtr<K>>) -> SearchResult<T>,
    ) -> Option<T> {
        let version = self.rotations.lock_optimistic().ok()?;
        let value = read(self.root()).ok()?;
        self.rotations
            .validate_optimistic_read(version)
            .then_some(value)
    }

    /// Runs `read` from the root until one run completes without overlapping a rotation.
    pub(crate) fn read_optimistic<T>(
        &self,
        mut read: impl FnMut(Option<NodePtr<K>>) -> SearchResult<T>,
    ) -> T {
        loop {
            if let Some(value) = self.try_read_optimistic(&mut read) {
                return value;
            }
            std::hint::spin_loop();
            #[cfg(feature = "shuttle")]
            shuttle::hint::spin_loop();
        }
    }

    /// Inserts `key`.
    ///
    /// No key comparing equal to `key` may already be present; this is checked only in debug
    /// builds. On allocator failure the tree is left untouched.
    pub fn insert(&mut self, key: K) -> Result<(), AllocError> {
        unsafe { self.insert_shared(key) }
    }

    /// Inserts `key` through a shared reference, so readers can keep using the tree meanwhile.
    ///
    /// # Safety
    ///
    /// No other insert may run on this tree at the same time. `ConcurrentAvlTree::insert` upholds
    /// this with a latch.
    pub unsafe fn insert_shared(&self, key: K) -> Result<(), AllocError> {
        unsafe { self.insert_shared_reporting(key) }.map(|_| ())
    }

    #[cfg(test)]
    pub(crate) fn insert_reporting(&mut self, key: K) -> Result<Option<RotationKind>, AllocError> {
        unsafe { self.insert_shared_reporting(key) }
    }

    pub(crate) unsafe fn insert_shared_reporting(
        &self,
        key: K,
    ) -> Result<Option<RotationKind>, AllocError> {
        debug_assert!(
            !self.contains(&key),
            "insert of a key that compares equal to one already in the tree"
        );

        let Some(mut parent) = self.root.load(Ordering::Relaxed) else {
            let node = self.allocate_node(key, None)?;
            self.root.store(Some(node), Ordering::Release);
            self.len.fetch_add(1, Ordering::Relaxed);
            debug_println!("insert: new root {:?}", node);
            return Ok(None);
        };

        let go_left = loop {
            let go_left = self.comparator.less_than(&key, parent.key());
            let next = if go_left {
                parent.left_relaxed()
            } else {
                parent.right_relaxed()
            };
            match next {
                Some(child) => parent = child,
                None => break go_left,
            }
        };

        // allocate before touching any link so a failure leaves the tree as it was
        let node = self.allocate_node(key, Some(parent))?;
        if go_left {
            parent.set_left(Some(node));
        } else {
            parent.set_right(Some(node));
        }
        debug_println!("insert: linked {:?} under {:?}", node, parent);

        let rotation = unsafe { rebalance_after_insert(&self.root, &self.rotations, parent) };
        self.len.fetch_add(1, Ordering::Relaxed);
        Ok(rotation)
    }

    fn allocate_node(&self, key: K, parent: Option<NodePtr<K>>) -> Result<NodePtr<K>, AllocError> {
        let raw: NonNull<Node<K>> = self.allocator.allocate(Layout::new::<Node<K>>())?.cast();
        unsafe { raw.as_ptr().write(Node::new(key)) };
        let node = unsafe { NodePtr::from_non_null(raw) };
        node.set_parent_relaxed(parent);
        Ok(node)
    }

    /// Whether a key comparing equal to `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        self.read_optimistic(|root| search::contains(root, &self.comparator, key))
    }

    /// Returns the stored key comparing equal to `key`.
    pub fn get(&self, key: &K) -> Option<&K> {
        self.read_optimistic(|root| search::find_equal(root, &self.comparator, key))
            .map(|node| unsafe { node.get() }.key())
    }

    /// Approximate number of keys strictly less than `key`: never below the exact count, and
    /// above it whenever keys >= `key` sit in the right subtree of a smaller key.
    pub fn estimate_count(&self, key: &K) -> u64 {
        self.read_optimistic(|root| search::estimate_count(root, &self.comparator, key))
    }

    pub fn first(&self) -> Option<&K> {
        self.read_optimistic(search::find_first)
            .map(|node| unsafe { node.get() }.key())
    }

    pub fn last(&self) -> Option<&K> {
        self.read_optimistic(search::find_last)
            .map(|node| unsafe { node.get() }.key())
    }

    /// A cursor over this tree. It starts out unpositioned.
    pub fn cursor(&self) -> Cursor<'_, K, C, A> {
        Cursor::new(self)
    }

    pub fn iter(&self) -> ForwardIter<'_, K, C, A> {
        AvlTreeIterator::new(self)
    }

    pub fn iter_rev(&self) -> BackwardIter<'_, K, C, A> {
        AvlTreeIterator::new(self)
    }

    /// Keys within `range`, ascending.
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> RangeIter<'_, K, C, A, R> {
        RangeIter::new(self, range)
    }

    /// Asserts BST order, cached heights, balance, parent links and the length counter.
    /// Only meaningful while no insert is in flight.
    pub fn check_invariants(&self) {
        debug_println!("checking invariants");
        let root = self.root();
        if let Some(root) = root {
            assert!(root.parent().is_none(), "root has a parent link");
        }
        let (_, count) = self.check_subtree(root, None, None);
        assert_eq!(
            count,
            self.len(),
            "tree holds {} nodes but len() is {}",
            count,
            self.len()
        );
    }

    // returns (height, node count)
    fn check_subtree(
        &self,
        node: Option<NodePtr<K>>,
        lower: Option<&K>,
        upper: Option<&K>,
    ) -> (u32, usize) {
        let Some(node) = node else {
            return (0, 0);
        };
        let key = unsafe { node.get() }.key();
        if let Some(lower) = lower {
            assert!(
                self.comparator.less_than(lower, key),
                "BST order violated: a right descendant is not greater than its ancestor"
            );
        }
        if let Some(upper) = upper {
            assert!(
                self.comparator.less_than(key, upper),
                "BST order violated: a left descendant is not less than its ancestor"
            );
        }
        for child in [node.left(), node.right()].into_iter().flatten() {
            assert_eq!(
                child.parent(),
                Some(node),
                "child {:?} does not link back to its parent {:?}",
                child,
                node
            );
        }

        let (left_height, left_count) = self.check_subtree(node.left(), lower, Some(key));
        let (right_height, right_count) = self.check_subtree(node.right(), Some(key), upper);
        let height = 1 + left_height.max(right_height);
        assert_eq!(
            node.height(),
            height,
            "cached height of {:?} is stale",
            node
        );
        assert!(
            left_height.abs_diff(right_height) <= 1,
            "{:?} is out of balance: left height {}, right height {}",
            node,
            left_height,
            right_height
        );
        (height, 1 + left_count + right_count)
    }

    pub fn print_tree(&self)
    where
        K: Debug,
    {
        println!("AvlTree:");
        println!("+----------------------+");
        println!("| Tree length: {}      |", self.len());
        println!("| Tree height: {}      |", self.height());
        println!("+----------------------+");
        Self::print_subtree(self.root(), 0);
    }

    // sideways: right subtree above, left subtree below
    fn print_subtree(node: Option<NodePtr<K>>, depth: usize)
    where
        K: Debug,
    {
        let Some(node) = node else {
            return;
        };
        Self::print_subtree(node.right(), depth + 1);
        println!(
            "{}{:?} (h={})",
            "    ".repeat(depth),
            node.key(),
            node.height()
        );
        Self::print_subtree(node.left(), depth + 1);
    }
}

impl<K, C: Comparator<K>> AvlTree<K, C, Arena> {
    pub fn with_arena(comparator: C) -> Self {
        Self::new(comparator, Arena::default())
    }

    pub fn with_arena_options(comparator: C, options: ArenaOptions) -> Self {
        Self::new(comparator, Arena::new(options))
    }
}

impl<K: Ord> Default for AvlTree<K, NaturalOrder, Arena> {
    fn default() -> Self {
        Self::with_arena(NaturalOrder)
    }
}

impl<K, C, A> Drop for AvlTree<K, C, A> {
    fn drop(&mut self) {
        if !mem::needs_drop::<K>() {
            return;
        }
        let mut stack: SmallVec<[NodePtr<K>; 64]> = SmallVec::new();
        stack.extend(self.root.load(Ordering::Relaxed));
        while let Some(node) = stack.pop() {
            stack.extend(node.left_relaxed());
            stack.extend(node.right_relaxed());
            unsafe { Node::drop_key_in_place(node.as_ptr()) };
        }
    }
}

unsafe impl<K: Send, C: Send, A: Send> Send for AvlTree<K, C, A> {}
unsafe impl<K: Send + Sync, C: Sync, A: Sync> Sync for AvlTree<K, C, A> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{BytewiseComparator, FnComparator, Reverse};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize as CountingUsize;

    #[cfg(not(miri))]
    const NUM_OPERATIONS: usize = 10_000;
    #[cfg(miri)]
    const NUM_OPERATIONS: usize = 100;

    #[test]
    fn test_insert_and_contains() {
        let mut tree = AvlTree::default();
        for i in 1..=NUM_OPERATIONS {
            tree.insert(i).unwrap();
            assert!(tree.contains(&i));
            assert_eq!(tree.len(), i);
            if i % 97 == 0 {
                tree.check_invariants();
            }
        }
        tree.check_invariants();
        assert!(!tree.contains(&0));
        assert!(!tree.contains(&(NUM_OPERATIONS + 1)));
        assert_eq!(tree.first(), Some(&1));
        assert_eq!(tree.last(), Some(&NUM_OPERATIONS));
    }

    #[test]
    fn test_balance_holds_after_every_insert() {
        let mut tree = AvlTree::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let key: u32 = rng.random_range(0..100_000);
            if !tree.contains(&key) {
                tree.insert(key).unwrap();
                tree.check_invariants();
            }
        }
    }

    #[test]
    fn test_random_inserts_with_seed() {
        for seed in 0..8 {
            run_random_inserts_with_seed(seed);
        }
    }

    fn run_random_inserts_with_seed(seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut keys: Vec<usize> = (0..NUM_OPERATIONS).map(|i| i * 2).collect();
        keys.shuffle(&mut rng);

        let mut tree = AvlTree::default();
        for &key in &keys {
            tree.insert(key).unwrap();
        }
        tree.check_invariants();

        // an AVL tree is at most ~1.44 log2(n + 2) tall
        let bound = 1.45 * ((NUM_OPERATIONS + 2) as f64).log2();
        assert!(
            (tree.height() as f64) <= bound,
            "height {} exceeds the AVL bound {}",
            tree.height(),
            bound
        );

        for &key in &keys {
            assert!(tree.contains(&key), "seed {}: missing {}", seed, key);
            assert!(!tree.contains(&(key + 1)), "seed {}: phantom {}", seed, key + 1);
        }

        let walked: Vec<usize> = tree.iter().copied().collect();
        let expected: Vec<usize> = (0..NUM_OPERATIONS).map(|i| i * 2).collect();
        assert_eq!(walked, expected);
    }

    #[test]
    fn test_empty_tree() {
        let tree = AvlTree::<u64>::default();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.height(), 0);
        assert!(!tree.contains(&0));
        assert!(!tree.contains(&u64::MAX));
        assert_eq!(tree.estimate_count(&10), 0);
        assert_eq!(tree.first(), None);
        assert_eq!(tree.last(), None);
        assert_eq!(tree.iter().count(), 0);
        tree.check_invariants();
    }

    #[test]
    fn test_get_and_print_tree() {
        type Row = (u32, &'static str);
        let mut tree = AvlTree::with_arena(FnComparator(|a: &Row, b: &Row| a.0.cmp(&b.0)));
        for (id, name) in [(3, "c"), (1, "a"), (2, "b"), (5, "e"), (4, "d")] {
            tree.insert((id, name)).unwrap();
        }
        assert_eq!(tree.get(&(4, "")), Some(&(4, "d")));
        assert_eq!(tree.get(&(6, "")), None);
        assert!(tree.memory_usage() > 0);
        tree.print_tree();
    }

    #[test]
    fn test_estimate_count_over_small_tree() {
        let mut tree = AvlTree::default();
        for key in 1..=5 {
            tree.insert(key).unwrap();
        }
        assert!(tree.estimate_count(&4) >= 3);
        assert_eq!(tree.estimate_count(&0), 0);
        assert_eq!(tree.estimate_count(&100), 5);
    }

    #[test]
    fn test_estimate_count_overcounts_right_subtrees() {
        let mut tree = AvlTree::default();
        // root 2 with right child 4 -> (3, 5): every key under 4 is counted once 2 < key
        for key in [2, 1, 4, 3, 5] {
            tree.insert(key).unwrap();
        }
        assert_eq!(*tree.root().unwrap().key(), 2);
        // exact rank of 3 is 2 (1 and 2); the estimate also reaches 3's subtree through 4's left
        let estimate = tree.estimate_count(&3);
        assert!(estimate >= 2);
    }

    #[test]
    fn test_byte_keys_with_bytewise_comparator() {
        let mut tree = AvlTree::with_arena(BytewiseComparator);
        let words = ["pear", "apple", "fig", "banana", "apricot", "cherry", "date"];
        for word in words {
            tree.insert(word.as_bytes().to_vec()).unwrap();
        }
        tree.check_invariants();
        assert!(tree.contains(&b"fig".to_vec()));
        assert!(!tree.contains(&b"grape".to_vec()));
        let mut sorted: Vec<&str> = words.to_vec();
        sorted.sort();
        let walked: Vec<String> = tree
            .iter()
            .map(|key| String::from_utf8(key.clone()).unwrap())
            .collect();
        assert_eq!(walked, sorted);
    }

    #[test]
    fn test_borrowed_slices_as_keys() {
        let storage: Vec<Vec<u8>> = (0u32..300).map(|i| i.to_be_bytes().to_vec()).collect();
        let probe = 42u32.to_be_bytes();
        let mut tree: AvlTree<&[u8], BytewiseComparator> = AvlTree::with_arena(BytewiseComparator);
        for bytes in storage.iter().rev() {
            tree.insert(bytes.as_slice()).unwrap();
        }
        tree.check_invariants();
        assert_eq!(tree.get(&probe.as_slice()), Some(&storage[42].as_slice()));
        assert_eq!(tree.first(), Some(&storage[0].as_slice()));
    }

    #[test]
    fn test_custom_comparators() {
        let mut tree = AvlTree::with_arena(Reverse(NaturalOrder));
        for key in 0..50 {
            tree.insert(key).unwrap();
        }
        tree.check_invariants();
        let walked: Vec<i32> = tree.iter().copied().collect();
        assert_eq!(walked, (0..50).rev().collect::<Vec<_>>());

        let mut tree = AvlTree::with_arena(FnComparator(|a: &(u8, u8), b: &(u8, u8)| {
            a.1.cmp(&b.1).then(a.0.cmp(&b.0))
        }));
        tree.insert((1, 9)).unwrap();
        tree.insert((2, 1)).unwrap();
        tree.insert((3, 5)).unwrap();
        assert_eq!(tree.first(), Some(&(2, 1)));
        assert_eq!(tree.last(), Some(&(1, 9)));
    }

    #[test]
    fn test_allocator_exhaustion_leaves_tree_unchanged() {
        let options = ArenaOptions::default()
            .with_block_size(crate::allocator::MIN_BLOCK_SIZE)
            .with_memory_limit(crate::allocator::MIN_BLOCK_SIZE);
        let mut tree = AvlTree::with_arena_options(NaturalOrder, options);
        let mut inserted = 0u64;
        let err = loop {
            match tree.insert(inserted) {
                Ok(()) => inserted += 1,
                Err(err) => break err,
            }
        };
        assert!(matches!(err, AllocError::Exhausted { .. }), "{}", err);
        assert!(inserted > 0);
        assert_eq!(tree.len() as u64, inserted);
        assert!(!tree.contains(&inserted));
        tree.check_invariants();
        assert_eq!(tree.iter().count() as u64, inserted);
        assert!(err.to_string().contains("exhausted"));
    }

    #[test]
    fn test_shared_arena_outlives_trees() {
        let arena = Arena::default();
        {
            let mut first = AvlTree::new(NaturalOrder, &arena);
            let mut second = AvlTree::new(NaturalOrder, &arena);
            for key in 0..100 {
                first.insert(key).unwrap();
                second.insert(key + 1000).unwrap();
            }
            first.check_invariants();
            second.check_invariants();
            assert!(!first.contains(&1000));
            assert!(second.contains(&1000));
        }
        assert!(arena.memory_usage() > 0);
    }

    struct DropCounter {
        key: u32,
        drops: Arc<CountingUsize>,
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_drop_releases_every_key() {
        let drops = Arc::new(CountingUsize::new(0));
        {
            let mut tree = AvlTree::with_arena(FnComparator(|a: &DropCounter, b: &DropCounter| {
                a.key.cmp(&b.key)
            }));
            for key in 0..257 {
                tree.insert(DropCounter {
                    key,
                    drops: Arc::clone(&drops),
                })
                .unwrap();
            }
            assert_eq!(drops.load(Ordering::Relaxed), 0);
        }
        assert_eq!(drops.load(Ordering::Relaxed), 257);
    }

    #[test]
    fn test_iterators_agree_with_btreeset() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut model = BTreeSet::new();
        let mut tree = AvlTree::default();
        for _ in 0..2_000 {
            let key: i64 = rng.random_range(-5_000..5_000);
            if model.insert(key) {
                tree.insert(key).unwrap();
            }
        }
        assert!(tree.iter().eq(model.iter()));
        assert!(tree.iter_rev().eq(model.iter().rev()));
        assert!(tree.range(-100..250).eq(model.range(-100..250)));
        assert!(tree.range(..=0).eq(model.range(..=0)));
        assert!(tree.range(4_000..).eq(model.range(4_000..)));
        for probe in [-5_001, -17, 0, 3, 4_999, 5_000] {
            assert_eq!(tree.contains(&probe), model.contains(&probe));
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "compares equal")]
    fn test_duplicate_insert_is_caught_in_debug_builds() {
        let mut tree = AvlTree::default();
        tree.insert(1).unwrap();
        tree.insert(1).unwrap();
    }
}

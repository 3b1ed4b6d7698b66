use crate::allocator::{Allocator, Arena};
use crate::comparator::{Comparator, NaturalOrder};
use crate::pointers::NodePtr;
use crate::search;
use crate::tree::AvlTree;

/// A position in a tree: either on a node or unpositioned.
///
/// Cursors never lock and may be used while a writer inserts. A racing insert can be missed, but
/// a forward walk always yields strictly increasing keys and a backward walk strictly decreasing
/// ones. A step that overlaps a rotation is retried, so it may briefly spin behind the writer.
pub struct Cursor<'a, K, C = NaturalOrder, A = Arena> {
    tree: &'a AvlTree<K, C, A>,
    node: Option<NodePtr<K>>,
}

impl<K, C, A> Clone for Cursor<'_, K, C, A> {
    fn clone(&self) -> Self {
        Cursor {
            tree: self.tree,
            node: self.node,
        }
    }
}

impl<'a, K, C: Comparator<K>, A: Allocator> Cursor<'a, K, C, A> {
    pub(crate) fn new(tree: &'a AvlTree<K, C, A>) -> Self {
        Cursor { tree, node: None }
    }

    /// Points the cursor at another tree. The cursor ends up unpositioned.
    pub fn set_tree(&mut self, tree: &'a AvlTree<K, C, A>) {
        self.tree = tree;
        self.node = None;
    }

    pub fn tree(&self) -> &'a AvlTree<K, C, A> {
        self.tree
    }

    pub fn valid(&self) -> bool {
        self.node.is_some()
    }

    /// The key under the cursor. Panics if the cursor is unpositioned.
    pub fn key(&self) -> &'a K {
        self.current().expect("key() on an unpositioned cursor")
    }

    pub fn current(&self) -> Option<&'a K> {
        self.node.map(|node| unsafe { node.get() }.key())
    }

    pub fn seek_to_first(&mut self) {
        self.node = self.tree.read_optimistic(search::find_first);
    }

    pub fn seek_to_last(&mut self) {
        self.node = self.tree.read_optimistic(search::find_last);
    }

    /// Moves to the first key >= `target`, unpositioning the cursor if there is none. Returns
    /// whether the key found compares equal to `target`.
    pub fn seek(&mut self, target: &K) -> bool {
        let comparator = self.tree.comparator();
        self.node = self
            .tree
            .read_optimistic(|root| search::find_greater_or_equal(root, comparator, target));
        self.node
            .is_some_and(|node| comparator.equal(node.key(), target))
    }

    /// Moves to the last key <= `target`, unpositioning the cursor if there is none. Returns
    /// whether the key found compares equal to `target`.
    pub fn seek_for_prev(&mut self, target: &K) -> bool {
        let comparator = self.tree.comparator();
        self.node = self
            .tree
            .read_optimistic(|root| search::find_less_or_equal(root, comparator, target));
        self.node
            .is_some_and(|node| comparator.equal(node.key(), target))
    }

    /// Advances to the next larger key. Returns `valid()`.
    pub fn move_next(&mut self) -> bool {
        debug_assert!(self.valid(), "move_next on an unpositioned cursor");
        let Some(node) = self.node else {
            return false;
        };
        let comparator = self.tree.comparator();
        let key = unsafe { node.get() }.key();
        self.node = self.tree.read_optimistic(|root| match search::successor(node)? {
            Some(next) if comparator.less_than(key, next.key()) => Ok(Some(next)),
            // the links ran out or led backwards past a rotation; ask the root instead
            _ => {
                debug_println!("cursor: re-descending for the successor of {:?}", node);
                search::find_greater_than(root, comparator, key)
            }
        });
        self.valid()
    }

    /// Steps back to the next smaller key. Returns `valid()`.
    pub fn move_prev(&mut self) -> bool {
        debug_assert!(self.valid(), "move_prev on an unpositioned cursor");
        let Some(node) = self.node else {
            return false;
        };
        let comparator = self.tree.comparator();
        let key = unsafe { node.get() }.key();
        self.node = self.tree.read_optimistic(|root| match search::predecessor(node)? {
            Some(prev) if comparator.less_than(prev.key(), key) => Ok(Some(prev)),
            _ => {
                debug_println!("cursor: re-descending for the predecessor of {:?}", node);
                search::find_less_than(root, comparator, key)
            }
        });
        self.valid()
    }
}

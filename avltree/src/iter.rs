use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};

use crate::allocator::{Allocator, Arena};
use crate::comparator::{Comparator, NaturalOrder};
use crate::cursor::Cursor;
use crate::tree::AvlTree;

pub trait IterDirection {
    fn start<K, C: Comparator<K>, A: Allocator>(cursor: &mut Cursor<'_, K, C, A>);
    fn advance<K, C: Comparator<K>, A: Allocator>(cursor: &mut Cursor<'_, K, C, A>);
}

pub struct ForwardIterDirection;

impl IterDirection for ForwardIterDirection {
    fn start<K, C: Comparator<K>, A: Allocator>(cursor: &mut Cursor<'_, K, C, A>) {
        cursor.seek_to_first();
    }

    fn advance<K, C: Comparator<K>, A: Allocator>(cursor: &mut Cursor<'_, K, C, A>) {
        cursor.move_next();
    }
}

pub struct BackwardIterDirection;

impl IterDirection for BackwardIterDirection {
    fn start<K, C: Comparator<K>, A: Allocator>(cursor: &mut Cursor<'_, K, C, A>) {
        cursor.seek_to_last();
    }

    fn advance<K, C: Comparator<K>, A: Allocator>(cursor: &mut Cursor<'_, K, C, A>) {
        cursor.move_prev();
    }
}

pub struct AvlTreeIterator<'a, K, C, A, D> {
    tree: &'a AvlTree<K, C, A>,
    cursor: Option<Cursor<'a, K, C, A>>,
    direction: PhantomData<D>,
}

pub type ForwardIter<'a, K, C = NaturalOrder, A = Arena> =
    AvlTreeIterator<'a, K, C, A, ForwardIterDirection>;
pub type BackwardIter<'a, K, C = NaturalOrder, A = Arena> =
    AvlTreeIterator<'a, K, C, A, BackwardIterDirection>;

impl<'a, K, C: Comparator<K>, A: Allocator, D: IterDirection> AvlTreeIterator<'a, K, C, A, D> {
    pub(crate) fn new(tree: &'a AvlTree<K, C, A>) -> Self {
        AvlTreeIterator {
            tree,
            cursor: None,
            direction: PhantomData,
        }
    }
}

impl<'a, K, C: Comparator<K>, A: Allocator, D: IterDirection> Iterator
    for AvlTreeIterator<'a, K, C, A, D>
{
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(cursor) = self.cursor.as_mut() {
            if !cursor.valid() {
                return None;
            }
            D::advance(cursor);
        } else {
            let mut cursor = self.tree.cursor();
            D::start(&mut cursor);
            self.cursor = Some(cursor);
        }
        self.cursor.as_ref()?.current()
    }
}

/// Ascending walk over the keys within a `RangeBounds`, compared with the tree's comparator.
pub struct RangeIter<'a, K, C, A, R> {
    range: R,
    cursor: Cursor<'a, K, C, A>,
    started: bool,
}

impl<'a, K, C: Comparator<K>, A: Allocator, R: RangeBounds<K>> RangeIter<'a, K, C, A, R> {
    pub(crate) fn new(tree: &'a AvlTree<K, C, A>, range: R) -> Self {
        RangeIter {
            range,
            cursor: tree.cursor(),
            started: false,
        }
    }

    fn seek_start(&mut self) {
        match self.range.start_bound() {
            Bound::Included(start) => {
                self.cursor.seek(start);
            }
            Bound::Excluded(start) => {
                if self.cursor.seek(start) {
                    self.cursor.move_next();
                }
            }
            Bound::Unbounded => self.cursor.seek_to_first(),
        }
    }

    fn before_end(&self, key: &K, comparator: &C) -> bool {
        match self.range.end_bound() {
            Bound::Included(end) => !comparator.less_than(end, key),
            Bound::Excluded(end) => comparator.less_than(key, end),
            Bound::Unbounded => true,
        }
    }
}

impl<'a, K, C: Comparator<K>, A: Allocator, R: RangeBounds<K>> Iterator
    for RangeIter<'a, K, C, A, R>
{
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            self.seek_start();
        } else if self.cursor.valid() {
            self.cursor.move_next();
        }
        let key = self.cursor.current()?;
        let tree = self.cursor.tree();
        if self.before_end(key, tree.comparator()) {
            Some(key)
        } else {
            // park the cursor so later calls stay exhausted
            self.cursor.set_tree(tree);
            None
        }
    }
}

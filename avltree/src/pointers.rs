use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::{self, NonNull};

use crate::node::Node;
use crate::sync::{AtomicPtr, Ordering};

/// A non-owning pointer to a node living in a tree's allocator.
///
/// Nodes are never freed while their tree is alive, so a `NodePtr` obtained from a tree may be
/// dereferenced for as long as the tree is borrowed. These never escape the crate.
pub(crate) struct NodePtr<K> {
    ptr: NonNull<Node<K>>,
    _marker: PhantomData<*const Node<K>>,
}

impl<K> Clone for NodePtr<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for NodePtr<K> {}

impl<K> PartialEq for NodePtr<K> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.ptr.as_ptr(), other.ptr.as_ptr())
    }
}

impl<K> Eq for NodePtr<K> {}

impl<K> fmt::Debug for NodePtr<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({:p})", self.ptr)
    }
}

impl<K> NodePtr<K> {
    /// # Safety
    ///
    /// `ptr` must point to an initialized node that outlives every use of the returned pointer.
    pub(crate) unsafe fn from_non_null(ptr: NonNull<Node<K>>) -> Self {
        NodePtr {
            ptr,
            _marker: PhantomData,
        }
    }

    pub(crate) fn as_ptr(self) -> *mut Node<K> {
        self.ptr.as_ptr()
    }

    /// Dereferences with a caller-chosen lifetime, used to hand out keys tied to a tree borrow.
    ///
    /// # Safety
    ///
    /// The node's tree (and so its allocator) must outlive `'a`.
    pub(crate) unsafe fn get<'a>(self) -> &'a Node<K> {
        unsafe { &*self.ptr.as_ptr() }
    }
}

impl<K> Deref for NodePtr<K> {
    type Target = Node<K>;

    fn deref(&self) -> &Node<K> {
        unsafe { self.ptr.as_ref() }
    }
}

/// A nullable atomic link to a node. The ordering is always explicit at the call site; see
/// `Node` for which accessors use which.
pub(crate) struct AtomicNodePtr<K> {
    ptr: AtomicPtr<Node<K>>,
}

impl<K> AtomicNodePtr<K> {
    pub(crate) const fn null() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub(crate) fn load(&self, order: Ordering) -> Option<NodePtr<K>> {
        NonNull::new(self.ptr.load(order)).map(|ptr| unsafe { NodePtr::from_non_null(ptr) })
    }

    pub(crate) fn store(&self, node: Option<NodePtr<K>>, order: Ordering) {
        let raw = match node {
            Some(node) => node.as_ptr(),
            None => ptr::null_mut(),
        };
        self.ptr.store(raw, order);
    }
}

use std::alloc::{self, Layout};
use std::cell::UnsafeCell;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::sync::{AtomicUsize, ExclusiveGuard, Ordering, RawRwLock, RwLock};

pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;
pub const MIN_BLOCK_SIZE: usize = 4 * 1024;
const BLOCK_ALIGN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Reserving another block of `block_size` bytes would take the allocator past its memory
    /// limit. `in_use` is what it had already reserved.
    Exhausted {
        block_size: usize,
        in_use: usize,
        limit: usize,
    },
    /// The global allocator refused the request.
    OutOfMemory { layout: Layout },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::Exhausted {
                block_size,
                in_use,
                limit,
            } => write!(
                f,
                "allocator exhausted: a new {}-byte block on top of {} bytes in use exceeds the \
                 limit of {}",
                block_size, in_use, limit
            ),
            AllocError::OutOfMemory { layout } => write!(
                f,
                "out of memory allocating {} bytes aligned to {}",
                layout.size(),
                layout.align()
            ),
        }
    }
}

impl std::error::Error for AllocError {}

/// Supplies node storage to a tree.
///
/// # Safety
///
/// Memory returned by `allocate` must be valid for reads and writes of `layout`, aligned to
/// `layout.align()`, not handed out again, and must stay valid until the allocator itself is
/// dropped.
/// The tree never frees individual allocations.
pub unsafe trait Allocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Bytes reserved from the system so far.
    fn memory_usage(&self) -> usize {
        0
    }
}

unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }
    fn memory_usage(&self) -> usize {
        (**self).memory_usage()
    }
}

unsafe impl<A: Allocator + ?Sized> Allocator for Arc<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }
    fn memory_usage(&self) -> usize {
        (**self).memory_usage()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaOptions {
    /// Size of the blocks small allocations are carved from. Clamped to at least `MIN_BLOCK_SIZE`.
    pub block_size: usize,
    /// Upper bound on the bytes the arena may reserve; `None` means unbounded.
    pub memory_limit: Option<usize>,
}

impl Default for ArenaOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            memory_limit: None,
        }
    }
}

impl ArenaOptions {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_memory_limit(mut self, memory_limit: usize) -> Self {
        self.memory_limit = Some(memory_limit);
        self
    }
}

/// Bump-pointer allocator. Small requests are carved out of fixed-size blocks; requests bigger than
/// a quarter block get a block of their own so the tail of the current block isn't wasted.
/// Everything is released at once when the arena is dropped.
pub struct Arena {
    lock: RwLock,
    inner: UnsafeCell<ArenaInner>,
    options: ArenaOptions,
    // readable without the lock; only updated under it
    memory_usage: AtomicUsize,
}

struct ArenaInner {
    blocks: Vec<(NonNull<u8>, Layout)>,
    // bump region of the current block: [cursor, end)
    cursor: usize,
    end: usize,
}

unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("options", &self.options)
            .field("memory_usage", &self.memory_usage())
            .finish()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(ArenaOptions::default())
    }
}

impl Arena {
    pub fn new(options: ArenaOptions) -> Self {
        let options = ArenaOptions {
            block_size: options.block_size.max(MIN_BLOCK_SIZE),
            ..options
        };
        Arena {
            lock: RwLock::new(),
            inner: UnsafeCell::new(ArenaInner {
                blocks: Vec::new(),
                cursor: 0,
                end: 0,
            }),
            options,
            memory_usage: AtomicUsize::new(0),
        }
    }

    pub fn options(&self) -> &ArenaOptions {
        &self.options
    }

    pub fn num_blocks(&self) -> usize {
        let _guard = ExclusiveGuard::lock(&self.lock);
        unsafe { (*self.inner.get()).blocks.len() }
    }

    fn reserve_block(
        &self,
        inner: &mut ArenaInner,
        size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let layout = Layout::from_size_align(size, BLOCK_ALIGN).map_err(|_| {
            AllocError::OutOfMemory {
                layout: Layout::new::<u8>(),
            }
        })?;
        let used = self.memory_usage.load(Ordering::Relaxed);
        if let Some(limit) = self.options.memory_limit {
            if used.saturating_add(size) > limit {
                debug_println!("arena limit reached: {} used, {}-byte block needed", used, size);
                return Err(AllocError::Exhausted {
                    block_size: size,
                    in_use: used,
                    limit,
                });
            }
        }
        let block = NonNull::new(unsafe { alloc::alloc(layout) })
            .ok_or(AllocError::OutOfMemory { layout })?;
        inner.blocks.push((block, layout));
        self.memory_usage.store(used + size, Ordering::Relaxed);
        Ok(block)
    }
}

unsafe impl Allocator for Arena {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let _guard = ExclusiveGuard::lock(&self.lock);
        let inner = unsafe { &mut *self.inner.get() };

        // request for a dedicated block
        if layout.size() > self.options.block_size / 4 || layout.align() > BLOCK_ALIGN {
            let size = layout.size().max(1) + layout.align().saturating_sub(BLOCK_ALIGN);
            let block = self.reserve_block(inner, size)?;
            let offset = block.as_ptr().align_offset(layout.align());
            return Ok(unsafe { NonNull::new_unchecked(block.as_ptr().add(offset)) });
        }

        let aligned = inner.cursor.next_multiple_of(layout.align());
        if inner.cursor != 0 && aligned + layout.size() <= inner.end {
            inner.cursor = aligned + layout.size();
            return Ok(unsafe { NonNull::new_unchecked(aligned as *mut u8) });
        }

        let block = self.reserve_block(inner, self.options.block_size)?;
        let start = block.as_ptr() as usize;
        inner.cursor = start + layout.size();
        inner.end = start + self.options.block_size;
        Ok(block)
    }

    fn memory_usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        for (block, layout) in self.inner.get_mut().blocks.drain(..) {
            unsafe { alloc::dealloc(block.as_ptr(), layout) };
        }
    }
}

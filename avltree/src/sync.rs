pub use std::sync::atomic::{Ordering, fence};

/// The subset of `lock_api::RawRwLock` the tree needs, without the const constructor constraint.
/// Only exclusive mode is used: readers of the tree never lock.
pub trait RawRwLock {
    fn new() -> Self;
    fn lock_exclusive(&self);
    fn try_lock_exclusive(&self) -> bool;
    fn unlock_exclusive(&self);
    fn is_locked_exclusive(&self) -> bool;
}

// Node links and heights always use the std atomics, shuttle or not;
// the shuttle runs exercise the writer latch, while the link publication
// order is exercised by the threaded reader/writer tests
pub type AtomicUsize = std::sync::atomic::AtomicUsize;
pub type AtomicPtr<T> = std::sync::atomic::AtomicPtr<T>;
pub type AtomicU32 = std::sync::atomic::AtomicU32;
pub type AtomicU64 = std::sync::atomic::AtomicU64;

// RwLock has two implementations: one for miri and shuttle,
// and one for normal
#[cfg(all(not(miri), not(feature = "shuttle")))]
pub type RwLock = WrappedUsyncRwLock;
#[cfg(any(miri, feature = "shuttle"))]
pub type RwLock = BasicSpinRwLock;

use lock_api::RawRwLock as LockApiRawRwLock;

pub struct WrappedUsyncRwLock {
    inner: usync::RawRwLock,
}

impl RawRwLock for WrappedUsyncRwLock {
    fn new() -> Self {
        Self {
            inner: <usync::RawRwLock as LockApiRawRwLock>::INIT,
        }
    }
    fn lock_exclusive(&self) {
        self.inner.lock_exclusive();
    }
    fn try_lock_exclusive(&self) -> bool {
        self.inner.try_lock_exclusive()
    }
    fn unlock_exclusive(&self) {
        unsafe { self.inner.unlock_exclusive() };
    }
    fn is_locked_exclusive(&self) -> bool {
        self.inner.is_locked_exclusive()
    }
}

#[cfg(feature = "shuttle")]
type SpinLockAtomicU64 = shuttle::sync::atomic::AtomicU64;
#[cfg(all(miri, not(feature = "shuttle")))]
type SpinLockAtomicU64 = std::sync::atomic::AtomicU64;

#[cfg(any(feature = "shuttle", miri))]
pub struct BasicSpinRwLock {
    lock: SpinLockAtomicU64,
}

#[cfg(any(feature = "shuttle", miri))]
/// A `RawRwLock` implementation for shuttle and miri. We don't care about performance, just simplicity and correctness.
impl RawRwLock for BasicSpinRwLock {
    fn new() -> Self {
        Self {
            lock: SpinLockAtomicU64::new(0),
        }
    }

    fn lock_exclusive(&self) {
        loop {
            match self
                .lock
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(_) => {
                    std::hint::spin_loop();
                    #[cfg(feature = "shuttle")]
                    shuttle::hint::spin_loop();
                    continue;
                }
            }
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        self.lock
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn unlock_exclusive(&self) {
        let res = self
            .lock
            .compare_exchange(1, 0, Ordering::Release, Ordering::Relaxed);
        assert!(
            res.is_ok(),
            "unlock_exclusive called on non-exclusively locked RwLock - value was {}",
            res.unwrap_err()
        );
    }

    fn is_locked_exclusive(&self) -> bool {
        self.lock.load(Ordering::Acquire) == 1
    }
}

/// Holds a `RawRwLock` in exclusive mode until dropped, so a panicking
/// comparator can't leave the latch held.
pub struct ExclusiveGuard<'a, L: RawRwLock> {
    lock: &'a L,
}

impl<'a, L: RawRwLock> ExclusiveGuard<'a, L> {
    pub fn lock(lock: &'a L) -> Self {
        lock.lock_exclusive();
        Self { lock }
    }

    pub fn try_lock(lock: &'a L) -> Option<Self> {
        if lock.try_lock_exclusive() {
            Some(Self { lock })
        } else {
            None
        }
    }
}

impl<L: RawRwLock> Drop for ExclusiveGuard<'_, L> {
    fn drop(&mut self) {
        debug_assert!(self.lock.is_locked_exclusive());
        self.lock.unlock_exclusive();
    }
}

/// Version counter that lets lock-free readers detect a concurrent restructure, as a seqlock.
///
/// The writer makes the version odd before it starts rearranging links and even again when it is
/// done. A reader snapshots an even version, reads, and then checks that the version is unchanged;
/// if it is, no restructure overlapped the read.
pub struct VersionLatch {
    version: AtomicU64,
}

impl VersionLatch {
    const LOWEST_VERSION: u64 = 4;

    pub fn new() -> Self {
        Self {
            version: AtomicU64::new(Self::LOWEST_VERSION),
        }
    }

    /// Writer only; must be paired with `end_write`.
    pub fn begin_write(&self) {
        let version = self.version.load(Ordering::Relaxed);
        debug_assert!(version % 2 == 0, "nested begin_write at version {}", version);
        self.version.store(version + 1, Ordering::Relaxed);
        // orders the odd version before every link store that follows
        fence(Ordering::Release);
    }

    pub fn end_write(&self) {
        let version = self.version.load(Ordering::Relaxed);
        debug_assert!(version % 2 == 1, "end_write without begin_write");
        self.version.store(version + 1, Ordering::Release);
    }

    /// The version to validate against, or `Err` while a write is in progress.
    pub fn lock_optimistic(&self) -> Result<u64, ()> {
        let version = self.version.load(Ordering::Acquire);
        if version % 2 == 1 {
            return Err(());
        }
        Ok(version)
    }

    pub fn validate_optimistic_read(&self, version: u64) -> bool {
        // orders every load of the read before the version check
        fence(Ordering::Acquire);
        self.version.load(Ordering::Relaxed) == version
    }
}

impl Default for VersionLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VersionLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionLatch")
            .field("version", &self.version.load(Ordering::Relaxed))
            .finish()
    }
}

//! Shared region: the in-process substrate every worker reaches through
//!
//! The reference design maps a single chunk of memory shared between the
//! master process and every forked worker process at a fixed virtual
//! address, and carves it into fixed-capacity object pools (one per entity
//! kind), plus a couple of bump arenas and a handful of global locks.
//!
//! This crate collapses the multi-process design to worker *threads* sharing
//! one address space (see `DESIGN.md` for the tradeoff), which means the
//! "must map at the same address" problem disappears entirely: a `Region` is
//! just an `Arc<Region>` cloned into each worker thread. What survives from
//! the reference design is the *shape* of the substrate: fixed-capacity pools
//! with bitmap allocators addressed by slot index (not pointer), a bump
//! string/path arena, and a single allocation lock serializing every pool's
//! `alloc`/`free`.
//!
//! # Example
//!
//! ```
//! use flowbench::region::Pool;
//!
//! let pool: Pool<String> = Pool::with_capacity(4);
//! let slot = pool.alloc("hello".to_string()).unwrap();
//! assert_eq!(&*pool.get(slot).unwrap(), "hello");
//! pool.free(slot);
//! assert!(pool.get(slot).is_none());
//! ```

pub mod arena;

use crate::error::{AbortKind, FlowError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

/// Default per-kind pool capacity, carried over from the reference design's
/// `FILEBENCH_NFILESETENTRIES` sizing for the fileset-entry pool. Other pools
/// use smaller, task-appropriate capacities (see `Region::new`).
pub const DEFAULT_ENTRY_CAPACITY: usize = 1024 * 1024;

/// A slot index into a [`Pool`]. Opaque and cheap to copy; the reference
/// design's raw pointers become these indices so that nothing in this crate
/// depends on a fixed memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(pub usize);

struct PoolInner<T> {
    slots: Vec<Option<Arc<T>>>,
    bitmap: Vec<bool>,
    next_hint: usize,
}

/// Fixed-capacity, bitmap-allocated pool of `Arc<T>` slots.
///
/// Allocation scans the bitmap starting from the slot after the last
/// allocation (wrapping), returns the first free bit, and sets it. `free`
/// clears the bit but does not evict the slot's value — a reader that
/// captured an `Arc` before the free completes may still observe the old
/// value briefly, which mirrors the reference design's "free clears the bit
/// but never zeroes the slot" contract.
pub struct Pool<T> {
    inner: Mutex<PoolInner<T>>,
}

impl<T> Pool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                slots: (0..capacity).map(|_| None).collect(),
                bitmap: vec![false; capacity],
                next_hint: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner<T>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Allocate a slot holding `value`. Fails with `OutOfSlots` once every
    /// bit in the bitmap is set.
    pub fn alloc(&self, value: T) -> Result<SlotIndex, FlowError> {
        let mut guard = self.lock();
        let cap = guard.bitmap.len();
        if cap == 0 {
            return Err(FlowError::OutOfSlots(std::any::type_name::<T>()));
        }
        let start = guard.next_hint % cap;
        for offset in 0..cap {
            let idx = (start + offset) % cap;
            if !guard.bitmap[idx] {
                guard.bitmap[idx] = true;
                guard.slots[idx] = Some(Arc::new(value));
                guard.next_hint = (idx + 1) % cap;
                return Ok(SlotIndex(idx));
            }
        }
        Err(FlowError::OutOfSlots(std::any::type_name::<T>()))
    }

    /// Clear the bitmap bit for `slot`. The value itself is only dropped once
    /// every outstanding `Arc` clone goes away.
    pub fn free(&self, slot: SlotIndex) {
        let mut guard = self.lock();
        if slot.0 < guard.bitmap.len() {
            guard.bitmap[slot.0] = false;
        }
    }

    /// Fetch a clone of the `Arc` at `slot`, or `None` if the slot is not
    /// (or no longer) allocated.
    pub fn get(&self, slot: SlotIndex) -> Option<Arc<T>> {
        let guard = self.lock();
        if slot.0 >= guard.bitmap.len() || !guard.bitmap[slot.0] {
            return None;
        }
        guard.slots[slot.0].clone()
    }

    /// Iterate over every currently allocated slot as `(index, value)` pairs.
    /// Used by list-walking operations (snapshot, target resolution).
    pub fn iter_live(&self) -> Vec<(SlotIndex, Arc<T>)> {
        let guard = self.lock();
        guard
            .bitmap
            .iter()
            .enumerate()
            .filter_map(|(i, &used)| {
                if used {
                    guard.slots[i].clone().map(|v| (SlotIndex(i), v))
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().bitmap.iter().filter(|&&b| b).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run-wide flags and locks that do not belong to any single pool: the abort
/// signal, the run-barrier (a reader-writer lock held in read by every worker
/// until the master finishes configuring the run), and the epoch timestamp
/// stamped by `stats::clear`.
pub struct RunState {
    abort: Mutex<AbortKind>,
    abort_cv: Condvar,
    /// Held in read by workers waiting to start; the master holds the write
    /// lock until configuration is complete, then drops it to release them.
    pub run_barrier: RwLock<()>,
    pub epoch: Mutex<std::time::Instant>,
    /// Count of worker threads currently past the run-barrier and not yet
    /// returned. `Controller::shutdown` polls this to know whether a worker
    /// is still outstanding past its grace period.
    pub running: AtomicUsize,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            abort: Mutex::new(AbortKind::None),
            abort_cv: Condvar::new(),
            run_barrier: RwLock::new(()),
            epoch: Mutex::new(std::time::Instant::now()),
            running: AtomicUsize::new(0),
        }
    }

    pub fn abort_kind(&self) -> AbortKind {
        *self.abort.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_abort(&self, kind: AbortKind) {
        let mut guard = self.abort.lock().unwrap_or_else(|p| p.into_inner());
        // `Error` must never be silently downgraded to `Done` by a later
        // clean-looking exit racing in.
        if !guard.is_set() || kind == AbortKind::Error || kind == AbortKind::Resource {
            *guard = kind;
        }
        self.abort_cv.notify_all();
    }

    pub fn reset(&self) {
        *self.abort.lock().unwrap_or_else(|p| p.into_inner()) = AbortKind::None;
        self.running.store(0, Ordering::SeqCst);
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_allocates_and_frees() {
        let pool: Pool<i32> = Pool::with_capacity(2);
        let a = pool.alloc(1).unwrap();
        let b = pool.alloc(2).unwrap();
        assert!(pool.alloc(3).is_err());
        pool.free(a);
        let c = pool.alloc(3).unwrap();
        assert_eq!(*pool.get(c).unwrap(), 3);
        assert_eq!(*pool.get(b).unwrap(), 2);
    }

    #[test]
    fn free_slot_reads_as_absent() {
        let pool: Pool<i32> = Pool::with_capacity(1);
        let a = pool.alloc(7).unwrap();
        pool.free(a);
        assert!(pool.get(a).is_none());
    }

    #[test]
    fn abort_error_is_sticky() {
        let rs = RunState::new();
        rs.set_abort(AbortKind::Done);
        rs.set_abort(AbortKind::Error);
        assert_eq!(rs.abort_kind(), AbortKind::Error);
        // A later "done" must not clobber an error abort.
        rs.set_abort(AbortKind::Done);
        assert_eq!(rs.abort_kind(), AbortKind::Error);
    }
}

//! Fileset engine: on-disk tree population, creation, and the `pick`/`unbusy`
//! protocol that lets many worker threads share one tree safely
//!
//! A [`Fileset`] owns an in-memory tree of [`FilesetEntry`] nodes (files,
//! directories, leaf directories), each tracked in exactly one of three
//! per-kind ordered indexes — free / exists-on-disk / not-on-disk — so a
//! flowop can atomically claim an entry in the state it needs (an existing
//! file to read, a free slot to create into) without two threads ever
//! racing on the same path.
//!
//! `pick` and `unbusy` are the concurrency seam: every flowop that touches
//! the fileset goes through them, and the invariants in the top-level design
//! doc (at most one `BUSY` holder per entry, `idle_<kind>` always equal to
//! the count of non-busy entries of that kind) are maintained entirely by
//! these two functions.

pub mod ondisk;
pub mod populate;

use crate::error::FlowError;
use crate::region::{Pool, SlotIndex};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Polling granularity for `pick`'s bounded wait on a kind's idle condvar.
const PICK_WAIT_STEP: Duration = Duration::from_millis(10);
/// How many `PICK_WAIT_STEP` intervals `pick` waits for `unbusy` to notify
/// before giving up and returning `NoResource` — about 200ms total, enough
/// to ride out ordinary cross-thread contention without stalling a caller
/// on a genuinely drained bucket for long.
const PICK_MAX_WAITS: u32 = 20;

/// What an entry represents in the directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    LeafDir,
}

/// Mutable, lock-protected state for one entry: everything that `pick`,
/// `unbusy`, and the flowops that open/close/delete the entry need to
/// coordinate on.
#[derive(Debug, Clone)]
pub struct EntryState {
    pub exists: bool,
    pub busy: bool,
    pub reusing: bool,
    pub thrd_waiting: bool,
    pub open_cnt: i64,
    pub size: u64,
}

/// One node in a fileset's tree: a file, a directory, or a leaf directory.
/// Allocated once during `populate` and never destroyed until the owning
/// fileset is torn down (only its `EntryState` mutates afterwards).
pub struct FilesetEntry {
    pub parent: Option<SlotIndex>,
    pub name: String,
    pub depth: u32,
    pub kind: EntryKind,
    /// Monotonic key used by the ordered indexes; stable for the entry's
    /// lifetime.
    pub index: u64,
    pub state: Mutex<EntryState>,
}

impl FilesetEntry {
    fn lock(&self) -> std::sync::MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Which ordered index an entry of a given kind currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexBucket {
    Free,
    Exists,
    NotExists,
}

/// Three disjoint ordered indexes (by entry index) for one entry kind
/// (files or leaf-dirs). Non-leaf directories don't need this — they always
/// exist once populated — and are tracked by a flat `Vec` instead.
struct KindIndexes {
    free: BTreeMap<u64, SlotIndex>,
    exists: BTreeMap<u64, SlotIndex>,
    not_exists: BTreeMap<u64, SlotIndex>,
    idle: AtomicI64,
    /// Count of entries of this kind ever registered by `populate`. Stays
    /// fixed for the fileset's lifetime, unlike `total()` below (which only
    /// counts entries currently idle) — used to tell "this kind has nothing
    /// at all" apart from "everything of this kind is momentarily busy".
    registered: u64,
}

impl KindIndexes {
    fn new() -> Self {
        Self {
            free: BTreeMap::new(),
            exists: BTreeMap::new(),
            not_exists: BTreeMap::new(),
            idle: AtomicI64::new(0),
            registered: 0,
        }
    }

    fn bucket_mut(&mut self, bucket: IndexBucket) -> &mut BTreeMap<u64, SlotIndex> {
        match bucket {
            IndexBucket::Free => &mut self.free,
            IndexBucket::Exists => &mut self.exists,
            IndexBucket::NotExists => &mut self.not_exists,
        }
    }

    fn total(&self) -> usize {
        self.free.len() + self.exists.len() + self.not_exists.len()
    }
}

/// A per-kind index plus the condvar `pick` blocks on while nothing of that
/// kind is idle, and `unbusy` notifies after returning an entry to the pool.
struct KindBucket {
    indexes: Mutex<KindIndexes>,
    idle_cv: Condvar,
}

impl KindBucket {
    fn new() -> Self {
        Self { indexes: Mutex::new(KindIndexes::new()), idle_cv: Condvar::new() }
    }
}

/// What kind of entry a `pick` call wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickKind {
    File,
    LeafDir,
    Dir,
}

/// Which sub-index (and selection strategy) a `pick` call wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickMode {
    /// Claim a free (not yet created) entry, any one.
    UniqueFree,
    /// Claim an existing entry; `hint` selects by index if `Some`, else a
    /// rotor position is used.
    Existing,
    /// Claim a not-yet-existing entry (already allocated but unlinked);
    /// `hint` selects by index if `Some`, else a rotor position.
    NonExisting,
    /// Claim the entry whose index is exactly `hint` (must be `Some`).
    ByIndex,
}

/// Flags controlling fileset creation/reuse policy (§4.4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesetFlags {
    pub reuse: bool,
    pub trust_tree: bool,
    pub cached: bool,
    pub preallocate: bool,
    pub parallel_preallocate: bool,
    pub read_only: bool,
    pub write_only: bool,
    pub is_single_file: bool,
    pub is_raw_device: bool,
}

/// A populated (or about-to-be-populated) directory tree plus the pick
/// engine over it.
pub struct Fileset {
    pub name: String,
    pub root: PathBuf,
    pub flags: FilesetFlags,
    pub prealloc_percent: u32,
    pub mean_width: f64,

    pub entries: Pool<FilesetEntry>,
    files: KindBucket,
    leafdirs: KindBucket,
    dirs: Mutex<Vec<SlotIndex>>,

    pick_lock: Mutex<()>,
    thrd_wait_cv: Condvar,

    next_index: AtomicU64,
    pub realfiles: AtomicU64,
    pub realleafdirs: AtomicU64,
    pub fs_bytes: AtomicU64,
}

impl Fileset {
    pub fn new(name: impl Into<String>, root: PathBuf, flags: FilesetFlags, prealloc_percent: u32, mean_width: f64) -> Self {
        Self {
            name: name.into(),
            root,
            flags,
            prealloc_percent,
            mean_width,
            entries: Pool::with_capacity(crate::region::DEFAULT_ENTRY_CAPACITY.min(1 << 20)),
            files: KindBucket::new(),
            leafdirs: KindBucket::new(),
            dirs: Mutex::new(Vec::new()),
            pick_lock: Mutex::new(()),
            thrd_wait_cv: Condvar::new(),
            next_index: AtomicU64::new(0),
            realfiles: AtomicU64::new(0),
            realleafdirs: AtomicU64::new(0),
            fs_bytes: AtomicU64::new(0),
        }
    }

    pub(crate) fn next_index(&self) -> u64 {
        self.next_index.fetch_add(1, Ordering::Relaxed)
    }

    fn indexes_for(&self, kind: PickKind) -> &KindBucket {
        match kind {
            PickKind::File => &self.files,
            PickKind::LeafDir => &self.leafdirs,
            PickKind::Dir => unreachable!("dirs use a flat list, not KindIndexes"),
        }
    }

    /// Register a freshly allocated entry into the `free` bucket of its
    /// kind's index (files/leafdirs) or the flat list (non-leaf dirs).
    /// Called only during `populate`.
    pub(crate) fn register_new_entry(&self, kind: PickKind, index: u64, slot: SlotIndex) {
        match kind {
            PickKind::Dir => {
                self.dirs.lock().unwrap_or_else(|p| p.into_inner()).push(slot);
            }
            _ => {
                let mut guard = self
                    .indexes_for(kind)
                    .indexes
                    .lock()
                    .unwrap_or_else(|p| p.into_inner());
                guard.free.insert(index, slot);
                guard.idle.fetch_add(1, Ordering::SeqCst);
                guard.registered += 1;
            }
        }
    }

    pub fn idle_count(&self, kind: PickKind) -> i64 {
        match kind {
            PickKind::Dir => self.dirs.lock().unwrap_or_else(|p| p.into_inner()).len() as i64,
            _ => self
                .indexes_for(kind)
                .indexes
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .idle
                .load(Ordering::SeqCst),
        }
    }

    pub fn total_count(&self, kind: PickKind) -> usize {
        match kind {
            PickKind::Dir => self.dirs.lock().unwrap_or_else(|p| p.into_inner()).len(),
            _ => self
                .indexes_for(kind)
                .indexes
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .total(),
        }
    }

    /// §4.4.3 pick: claim an entry of `kind` matching `mode`, returning its
    /// slot index. Blocks on the kind's idle condvar while nothing matching
    /// is currently idle, re-scanning each time `unbusy` notifies, until
    /// either a candidate is claimed or `PICK_MAX_WAITS` wait intervals have
    /// elapsed — at which point it gives up with `NoResource`. Returns
    /// `NoResource` immediately, without waiting, if nothing of `kind` was
    /// ever registered in the first place (a structurally empty fileset,
    /// not mere contention).
    pub fn pick(&self, kind: PickKind, mode: PickMode, hint: Option<u64>) -> Result<SlotIndex, FlowError> {
        if kind == PickKind::Dir {
            return self.pick_dir();
        }

        let bucket = match mode {
            PickMode::UniqueFree => IndexBucket::Free,
            PickMode::Existing => IndexBucket::Exists,
            PickMode::NonExisting => IndexBucket::NotExists,
            PickMode::ByIndex => IndexBucket::Exists,
        };

        let kb = self.indexes_for(kind);
        let mut waits: u32 = 0;

        loop {
            // Acquired in this order (pick_lock, then the kind's own mutex)
            // on every iteration, and both are released before any wait
            // below — so `unbusy`, which acquires the same two in the same
            // order, can never deadlock against a parked picker.
            let pick_guard = self.pick_lock.lock().unwrap_or_else(|p| p.into_inner());
            let mut indexes = kb.indexes.lock().unwrap_or_else(|p| p.into_inner());

            if indexes.registered == 0 {
                return Err(FlowError::NoResource(self.name.clone()));
            }

            if let Some(slot) = self.select_idle(&mut indexes, bucket, hint) {
                return Ok(slot);
            }

            drop(pick_guard);
            if waits >= PICK_MAX_WAITS {
                return Err(FlowError::NoResource(self.name.clone()));
            }
            let (_indexes, _timed_out) = kb
                .idle_cv
                .wait_timeout(indexes, PICK_WAIT_STEP)
                .unwrap_or_else(|p| p.into_inner());
            waits += 1;
        }
    }

    /// Scan `bucket` starting from `hint` (or the front) for a non-busy
    /// entry; claim and return it, removing its key from the bucket. The
    /// defensive `!state.busy` re-check covers the rare race where an entry
    /// still sits in the bucket from a caller's `unbusy` but hasn't actually
    /// cleared its busy flag yet.
    fn select_idle(&self, indexes: &mut KindIndexes, bucket: IndexBucket, hint: Option<u64>) -> Option<SlotIndex> {
        let start_key = hint.unwrap_or(0);
        let keys: Vec<u64> = indexes.bucket_mut(bucket).keys().copied().collect();
        let ordered: Vec<u64> = keys
            .iter()
            .filter(|&&k| k >= start_key)
            .chain(keys.iter().filter(|&&k| k < start_key))
            .copied()
            .collect();

        for key in &ordered {
            let slot = *indexes.bucket_mut(bucket).get(key).unwrap();
            let entry = match self.entries.get(slot) {
                Some(e) => e,
                None => continue,
            };
            let mut state = entry.lock();
            if !state.busy {
                state.busy = true;
                drop(state);
                indexes.bucket_mut(bucket).remove(key);
                indexes.idle.fetch_sub(1, Ordering::SeqCst);
                return Some(slot);
            }
        }
        None
    }

    fn pick_dir(&self) -> Result<SlotIndex, FlowError> {
        let dirs = self.dirs.lock().unwrap_or_else(|p| p.into_inner());
        if dirs.is_empty() {
            return Err(FlowError::NoResource(self.name.clone()));
        }
        // Directories always exist once populated and are never marked
        // BUSY by this engine (concurrent readdir/opendir is safe), so a
        // uniform pick by position is sufficient.
        let idx = (self.next_index() as usize) % dirs.len();
        Ok(dirs[idx])
    }

    /// §4.4.4 unbusy: release an entry, optionally transitioning it between
    /// index buckets, adjusting its open-reference count, and waking anyone
    /// waiting for it to go non-busy.
    pub fn unbusy(
        &self,
        kind: PickKind,
        slot: SlotIndex,
        update_exist: Option<bool>,
        open_delta: i64,
    ) -> Result<(), FlowError> {
        if kind == PickKind::Dir {
            return Ok(());
        }
        let entry = self
            .entries
            .get(slot)
            .ok_or_else(|| FlowError::NoResource(self.name.clone()))?;

        let kb = self.indexes_for(kind);
        let _pick_guard = self.pick_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut indexes = kb.indexes.lock().unwrap_or_else(|p| p.into_inner());

        let mut state = entry.lock();
        if let Some(new_exist) = update_exist {
            state.exists = new_exist;
        }
        state.open_cnt += open_delta;
        state.busy = false;
        let thrd_waiting = state.thrd_waiting;
        state.thrd_waiting = false;
        drop(state);

        let bucket = if update_exist.is_some() {
            if update_exist.unwrap() {
                IndexBucket::Exists
            } else {
                IndexBucket::NotExists
            }
        } else {
            // Caller didn't change existence: re-derive bucket from current
            // flag so the entry lands back where it belongs.
            if entry.lock().exists {
                IndexBucket::Exists
            } else {
                IndexBucket::NotExists
            }
        };
        indexes.bucket_mut(bucket).insert(entry.index, slot);
        indexes.idle.fetch_add(1, Ordering::SeqCst);
        drop(indexes);
        kb.idle_cv.notify_all();

        if thrd_waiting {
            self.thrd_wait_cv.notify_all();
        }
        Ok(())
    }

    /// Wait until `slot` is not BUSY (used by `closefile`/`deletefile`).
    pub fn wait_not_busy(&self, slot: SlotIndex) -> Result<(), FlowError> {
        let entry = self
            .entries
            .get(slot)
            .ok_or_else(|| FlowError::NoResource(self.name.clone()))?;
        let mut state = entry.lock();
        while state.busy {
            state.thrd_waiting = true;
            // `Condvar::wait` needs the same mutex the predicate guards;
            // since `EntryState` isn't behind a `Condvar`-compatible guard
            // directly we poll with a short sleep bounded by the fileset's
            // shared thrd_wait_cv as a wakeup hint.
            drop(state);
            let guard = self.pick_lock.lock().unwrap_or_else(|p| p.into_inner());
            let _ = self
                .thrd_wait_cv
                .wait_timeout(guard, std::time::Duration::from_millis(5))
                .unwrap_or_else(|p| p.into_inner());
            state = entry.lock();
        }
        Ok(())
    }

    /// Resolve an entry's full on-disk path by walking parent pointers.
    pub fn entry_path(&self, slot: SlotIndex) -> Option<PathBuf> {
        let entry = self.entries.get(slot)?;
        let mut segments = vec![entry.name.clone()];
        let mut cur = entry.parent;
        while let Some(p) = cur {
            let parent_entry = self.entries.get(p)?;
            segments.push(parent_entry.name.clone());
            cur = parent_entry.parent;
        }
        segments.reverse();
        let mut path = self.root.clone();
        for seg in segments {
            path.push(seg);
        }
        Some(path)
    }

    pub fn fs_bytes(&self) -> u64 {
        self.fs_bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_fileset() -> Fileset {
        Fileset::new("fs", PathBuf::from("/tmp/nonexistent-fileset-test"), FilesetFlags::default(), 100, 4.0)
    }

    fn add_file(fs: &Fileset, exists: bool) -> SlotIndex {
        let index = fs.next_index();
        let slot = fs
            .entries
            .alloc(FilesetEntry {
                parent: None,
                name: format!("{index:08}"),
                depth: 1,
                kind: EntryKind::File,
                index,
                state: Mutex::new(EntryState {
                    exists,
                    busy: false,
                    reusing: false,
                    thrd_waiting: false,
                    open_cnt: 0,
                    size: 0,
                }),
            })
            .unwrap();
        if exists {
            let mut guard = fs.files.indexes.lock().unwrap();
            guard.exists.insert(index, slot);
            guard.idle.fetch_add(1, Ordering::SeqCst);
            guard.registered += 1;
        } else {
            fs.register_new_entry(PickKind::File, index, slot);
        }
        slot
    }

    #[test]
    fn pick_free_then_unbusy_existing_round_trips() {
        let fs = mk_fileset();
        let slot = add_file(&fs, false);
        assert_eq!(fs.idle_count(PickKind::File), 1);

        let picked = fs.pick(PickKind::File, PickMode::UniqueFree, None).unwrap();
        assert_eq!(picked, slot);
        assert_eq!(fs.idle_count(PickKind::File), 0);

        fs.unbusy(PickKind::File, slot, Some(true), 1).unwrap();
        assert_eq!(fs.idle_count(PickKind::File), 1);
        assert_eq!(fs.total_count(PickKind::File), 1);
    }

    #[test]
    fn pick_on_empty_free_index_is_no_resource_not_a_hang() {
        let fs = mk_fileset();
        let _ = add_file(&fs, true); // only an "existing" entry, no free ones
        let err = fs.pick(PickKind::File, PickMode::UniqueFree, None).unwrap_err();
        assert!(err.is_no_resource());
    }

    #[test]
    fn busy_entry_is_never_picked_twice() {
        let fs = mk_fileset();
        let slot = add_file(&fs, true);
        let a = fs.pick(PickKind::File, PickMode::Existing, None).unwrap();
        assert_eq!(a, slot);
        // Now the only existing entry is busy; a second pick must fail
        // rather than returning the same busy entry.
        let err = fs.pick(PickKind::File, PickMode::Existing, None).unwrap_err();
        assert!(err.is_no_resource());
    }

    #[test]
    fn create_then_delete_returns_to_original_counters() {
        let fs = mk_fileset();
        let slot = add_file(&fs, false);
        let before_total = fs.total_count(PickKind::File);

        let picked = fs.pick(PickKind::File, PickMode::UniqueFree, None).unwrap();
        fs.unbusy(PickKind::File, picked, Some(true), 1).unwrap(); // createfile

        let picked2 = fs.pick(PickKind::File, PickMode::Existing, None).unwrap();
        assert_eq!(picked2, slot);
        fs.unbusy(PickKind::File, picked2, Some(false), -1).unwrap(); // deletefile

        assert_eq!(fs.total_count(PickKind::File), before_total);
        assert_eq!(fs.idle_count(PickKind::File), 1);
    }

    #[test]
    fn pick_blocks_on_a_busy_entry_until_a_concurrent_unbusy_wakes_it() {
        let fs = std::sync::Arc::new(mk_fileset());
        let slot = add_file(&fs, true);

        // Claim the only existing entry so the fileset is momentarily (not
        // structurally) out of idle candidates.
        let first = fs.pick(PickKind::File, PickMode::Existing, None).unwrap();
        assert_eq!(first, slot);

        let waiter_fs = fs.clone();
        let waiter = std::thread::spawn(move || waiter_fs.pick(PickKind::File, PickMode::Existing, None));

        // Give the waiter a chance to park on the idle condvar before
        // releasing the entry; a failure here would mean `pick` returned
        // `NoResource` immediately instead of actually waiting.
        std::thread::sleep(std::time::Duration::from_millis(30));
        fs.unbusy(PickKind::File, first, None, 0).unwrap();

        let picked = waiter.join().unwrap().unwrap();
        assert_eq!(picked, slot);
    }
}

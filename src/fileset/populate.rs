//! In-memory tree population (§4.4.1)
//!
//! Builds a fileset's directory tree top-down: at each directory level the
//! target depth and width are drawn (directly, or via a gamma distribution
//! scaled around the fileset's mean), and once a branch reaches its target
//! depth it turns into a leaf full of files or leaf directories instead of
//! more subdirectories. The root level (`parent: None`) has no entry node of
//! its own — it's `fileset.root` on disk — so when the root itself is a leaf
//! (a small fileset with `mean_depth <= 1`), files and leafdirs are created
//! directly with `parent: None` instead of one synthetic subdirectory level
//! being forced in first. Mirrors `fileset_populate_subdir` in the reference
//! implementation, with one structural difference: that code recurses before
//! checking `fs_realfiles`/`fs_realleafdirs` against the target count only in
//! the loop guard, so the very first file/leafdir under the root can push the
//! count over budget by up to one per directory level — not reproduced here
//! because it is a reference artifact, not a documented behavior; this
//! implementation checks the budget before each population call instead.

use super::{EntryKind, EntryState, Fileset, FilesetEntry, PickKind};
use crate::error::FlowError;
use crate::randdist::{RandDist, RandMode, RandSource};
use crate::region::SlotIndex;

/// Parameters that drive population, resolved from `Avd`s by the caller
/// (the builder) before population starts — population itself works only in
/// plain numbers plus a single gamma-seeded `RandDist` per axis.
pub struct PopulateParams {
    pub target_files: u64,
    pub target_leafdirs: u64,
    pub mean_width: f64,
    pub dir_gamma_permille: i64,
    pub size_mean: f64,
    pub size_gamma_permille: i64,
    pub seed: u64,
}

struct PopulateCtx<'a> {
    fileset: &'a Fileset,
    params: &'a PopulateParams,
    mean_depth: f64,
    width_dist: Option<RandDist>,
    depth_dist: Option<RandDist>,
    size_dist: Option<RandDist>,
    serial: u64,
}

/// Populate `fileset`'s tree in memory. The fileset has no entry node for the
/// root path itself — files and leafdirs directly under `root` have
/// `parent: None`.
pub fn populate(fileset: &Fileset, params: &PopulateParams) -> Result<(), FlowError> {
    if fileset.flags.is_single_file || fileset.flags.is_raw_device {
        return Ok(());
    }

    let total = (params.target_files + params.target_leafdirs).max(1) as f64;
    let mean_depth = (total.ln() / params.mean_width.max(1.000001).ln()).max(1.0);

    let width_dist = if params.dir_gamma_permille > 0 {
        let gamma = params.dir_gamma_permille as f64 / 1000.0;
        Some(RandDist::new(RandMode::Gamma, RandSource::Seeded(params.seed), 0.0, 0.0, params.mean_width / gamma, gamma))
    } else {
        None
    };
    let depth_dist = if params.dir_gamma_permille > 0 {
        let gamma = params.dir_gamma_permille as f64 / 1000.0;
        Some(RandDist::new(RandMode::Gamma, RandSource::Seeded(params.seed.wrapping_add(1)), 0.0, 0.0, mean_depth / gamma, gamma))
    } else {
        None
    };
    let size_dist = if params.size_gamma_permille > 0 {
        let gamma = params.size_gamma_permille as f64 / 1000.0;
        Some(RandDist::new(RandMode::Gamma, RandSource::Seeded(params.seed.wrapping_add(2)), 0.0, 0.0, params.size_mean / gamma, gamma))
    } else {
        None
    };

    let mut ctx = PopulateCtx {
        fileset,
        params,
        mean_depth,
        width_dist,
        depth_dist,
        size_dist,
        serial: 0,
    };

    // Depth counts each directory level starting at 1 for the root itself
    // (matching the `depth` stamped on a subdirectory's own `FilesetEntry`),
    // so a fileset small enough that `mean_depth <= 1` makes the root itself
    // the leaf level instead of forcing one empty subdirectory in first.
    populate_level(&mut ctx, None, 1.0)?;
    Ok(())
}

fn next_serial(ctx: &mut PopulateCtx) -> u64 {
    ctx.serial += 1;
    ctx.serial
}

/// Populate one directory level. `parent` is `None` only for the fileset
/// root (which has no entry node of its own — it's `fileset.root` on disk);
/// every real subdirectory passes `Some` of its own freshly allocated slot.
/// `depth` is 1-indexed from the root (matching the `depth` field stamped on
/// a subdirectory's own `FilesetEntry`), so the root call passes `1.0`.
fn populate_level(ctx: &mut PopulateCtx, parent: Option<SlotIndex>, depth: f64) -> Result<(), FlowError> {
    let randepth = ctx
        .depth_dist
        .as_mut()
        .map(|d| d.next())
        .unwrap_or(ctx.mean_depth)
        .max(1.0);
    let ranwidth = ctx
        .width_dist
        .as_mut()
        .map(|d| d.next())
        .unwrap_or(ctx.params.mean_width)
        .max(1.0);
    let is_leaf = depth >= randepth;
    let is_root = parent.is_none();

    let mut i = 1u64;
    while (is_root || i < ranwidth as u64 + 1) && ctx.fileset.realfiles.load(std::sync::atomic::Ordering::Relaxed) < ctx.params.target_files {
        if is_leaf {
            populate_file(ctx, parent, next_serial(ctx))?;
        } else {
            let child = populate_subdir_entry(ctx, parent, next_serial(ctx), depth)?;
            populate_level(ctx, Some(child), depth + 1.0)?;
        }
        i += 1;
    }

    let mut i = 1u64;
    while (is_root || i < ranwidth as u64 + 1) && ctx.fileset.realleafdirs.load(std::sync::atomic::Ordering::Relaxed) < ctx.params.target_leafdirs {
        if is_leaf {
            populate_leafdir(ctx, parent, next_serial(ctx))?;
        } else {
            let child = populate_subdir_entry(ctx, parent, next_serial(ctx), depth)?;
            populate_level(ctx, Some(child), depth + 1.0)?;
        }
        i += 1;
    }

    Ok(())
}

/// Allocate the entry for one real (non-root) subdirectory.
fn populate_subdir_entry(ctx: &mut PopulateCtx, parent: Option<SlotIndex>, serial: u64, depth: f64) -> Result<SlotIndex, FlowError> {
    let depth = depth + 1.0;
    let index = ctx.fileset.next_index();
    let name = format!("{serial:08}");
    let slot = ctx.fileset.entries.alloc(FilesetEntry {
        parent,
        name,
        depth: depth as u32,
        kind: EntryKind::Dir,
        index,
        state: EntryState {
            exists: true,
            busy: false,
            reusing: false,
            thrd_waiting: false,
            open_cnt: 0,
            size: 0,
        }
        .into(),
    })?;
    ctx.fileset.register_new_entry(PickKind::Dir, index, slot);
    Ok(slot)
}

fn populate_file(ctx: &mut PopulateCtx, parent: Option<SlotIndex>, serial: u64) -> Result<(), FlowError> {
    let index = ctx.fileset.next_index();
    let size = ctx
        .size_dist
        .as_mut()
        .map(|d| d.next().max(0.0) as u64)
        .unwrap_or(ctx.params.size_mean.max(0.0) as u64);
    let name = format!("{serial:08}");
    let slot = ctx.fileset.entries.alloc(FilesetEntry {
        parent,
        name,
        depth: 0,
        kind: EntryKind::File,
        index,
        state: EntryState {
            exists: false,
            busy: false,
            reusing: false,
            thrd_waiting: false,
            open_cnt: 0,
            size,
        }
        .into(),
    })?;
    ctx.fileset.register_new_entry(PickKind::File, index, slot);
    ctx.fileset.fs_bytes.fetch_add(size, std::sync::atomic::Ordering::Relaxed);
    ctx.fileset.realfiles.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    Ok(())
}

fn populate_leafdir(ctx: &mut PopulateCtx, parent: Option<SlotIndex>, serial: u64) -> Result<(), FlowError> {
    let index = ctx.fileset.next_index();
    let name = format!("{serial:08}");
    let slot = ctx.fileset.entries.alloc(FilesetEntry {
        parent,
        name,
        depth: 0,
        kind: EntryKind::LeafDir,
        index,
        state: EntryState {
            exists: false,
            busy: false,
            reusing: false,
            thrd_waiting: false,
            open_cnt: 0,
            size: 0,
        }
        .into(),
    })?;
    ctx.fileset.register_new_entry(PickKind::LeafDir, index, slot);
    ctx.fileset.realleafdirs.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn params(files: u64, leafdirs: u64) -> PopulateParams {
        PopulateParams {
            target_files: files,
            target_leafdirs: leafdirs,
            mean_width: 4.0,
            dir_gamma_permille: 0,
            size_mean: 16384.0,
            size_gamma_permille: 0,
            seed: 1,
        }
    }

    #[test]
    fn populate_reaches_target_file_count() {
        let fs = Fileset::new("fs", PathBuf::from("/tmp/populate-test"), super::super::FilesetFlags::default(), 100, 4.0);
        populate(&fs, &params(40, 0)).unwrap();
        assert_eq!(fs.realfiles.load(std::sync::atomic::Ordering::Relaxed), 40);
        assert_eq!(fs.total_count(PickKind::File), 40);
    }

    #[test]
    fn populate_reaches_target_leafdir_count() {
        let fs = Fileset::new("fs", PathBuf::from("/tmp/populate-test2"), super::super::FilesetFlags::default(), 100, 4.0);
        populate(&fs, &params(0, 12)).unwrap();
        assert_eq!(fs.realleafdirs.load(std::sync::atomic::Ordering::Relaxed), 12);
    }

    #[test]
    fn populated_files_start_nonexistent() {
        let fs = Fileset::new("fs", PathBuf::from("/tmp/populate-test3"), super::super::FilesetFlags::default(), 100, 4.0);
        populate(&fs, &params(5, 0)).unwrap();
        assert_eq!(fs.idle_count(PickKind::File), 5);
        assert!(fs.pick(PickKind::File, super::super::PickMode::Existing, None).is_err());
        assert!(fs.pick(PickKind::File, super::super::PickMode::UniqueFree, None).is_ok());
    }

    #[test]
    fn a_small_fileset_puts_files_directly_under_root_with_no_parent() {
        // entries=1, mean_width=4 makes mean_depth compute to 1.0, so the
        // root level itself should be the leaf: files land with
        // `parent: None` instead of one synthetic subdirectory being forced
        // in underneath the root first.
        let fs = Fileset::new("fs", PathBuf::from("/tmp/populate-test4"), super::super::FilesetFlags::default(), 100, 4.0);
        populate(&fs, &params(1, 0)).unwrap();

        let (slot, entry) = fs.entries.iter_live().into_iter().find(|(_, e)| e.kind == EntryKind::File).unwrap();
        assert!(entry.parent.is_none());
        assert_eq!(fs.entry_path(slot).unwrap(), PathBuf::from("/tmp/populate-test4").join(&entry.name));
    }
}

//! On-disk creation and preallocation (§4.4.2)
//!
//! Before walking the tree, decides whether the fileset's root survives from
//! a previous run: if `reuse` is set and either `trust_tree` is set or the
//! root already exists on disk, the existing tree is left in place; otherwise
//! any existing root is wiped with `remove_dir_all` and recreated from
//! scratch. Then walks every `Dir`/`LeafDir` entry and `mkdir`s it, then —
//! subject to `prealloc_percent` — walks every `File` entry and writes it out
//! to its target size in `FILE_ALLOC_BLOCK`-sized chunks of zeroed bytes,
//! either serially or with up to [`MAX_PARALLOC_THREADS`] concurrent workers
//! when the fileset's `parallel_preallocate` flag is set. Mirrors
//! `fileset_createset`/`fileset_alloc_file`/`fileset_alloc_thread` in the
//! reference implementation; the raw device and reuse-by-size-match paths
//! are carried over, the `FSE_REUSING` flag included.

use super::{EntryKind, Fileset, PickKind, PickMode};
use crate::error::FlowError;
use crate::region::SlotIndex;
use rand::Rng;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// Bound on simultaneous preallocation workers, carried over from the
/// reference design's `MAX_PARALLOC_THREADS`.
pub const MAX_PARALLOC_THREADS: usize = 32;

/// Bytes written per preallocation chunk, carried over from `FILE_ALLOC_BLOCK`.
pub const FILE_ALLOC_BLOCK: u64 = 1024 * 1024;

/// Create every directory, leaf directory, and (subject to
/// `prealloc_percent`) file on disk. Returns once every entry has been
/// visited; on the first unrecoverable IO error the whole operation aborts,
/// matching `fileset_createset`'s all-or-nothing contract.
pub fn create_on_disk(fileset: &Arc<Fileset>) -> Result<(), FlowError> {
    if fileset.flags.is_raw_device {
        return Ok(());
    }

    let root_exists = fileset.root.exists();
    let skip_removal = fileset.flags.reuse && (fileset.flags.trust_tree || root_exists);
    if !skip_removal && root_exists {
        std::fs::remove_dir_all(&fileset.root).map_err(|e| io_err(&fileset.root, e))?;
    }
    std::fs::create_dir_all(&fileset.root).map_err(|e| io_err(&fileset.root, e))?;

    for (slot, entry) in fileset.entries.iter_live() {
        if matches!(entry.kind, EntryKind::Dir | EntryKind::LeafDir) {
            if let Some(path) = fileset.entry_path(slot) {
                std::fs::create_dir_all(&path).map_err(|e| io_err(&path, e))?;
            }
        }
    }

    if fileset.flags.is_single_file {
        return Ok(());
    }

    preallocate_files(fileset)
}

fn io_err(path: &Path, source: std::io::Error) -> FlowError {
    FlowError::Io { path: path.display().to_string(), source }
}

fn preallocate_files(fileset: &Arc<Fileset>) -> Result<(), FlowError> {
    let randno_threshold = ((u32::MAX as u64) * (100 - fileset.prealloc_percent.min(100) as u64) / 100) as u32;

    let mut picked = Vec::new();
    loop {
        match fileset.pick(PickKind::File, PickMode::UniqueFree, None) {
            Ok(slot) => {
                let roll: u32 = rand::thread_rng().gen();
                if randno_threshold != 0 && roll <= randno_threshold {
                    fileset.unbusy(PickKind::File, slot, None, 0)?;
                    continue;
                }
                picked.push(slot);
            }
            Err(e) if e.is_no_resource() => break,
            Err(e) => return Err(e),
        }
    }

    if picked.is_empty() {
        return Ok(());
    }

    if fileset.flags.parallel_preallocate {
        preallocate_parallel(fileset, &picked)
    } else {
        for slot in &picked {
            alloc_one_file(fileset, *slot)?;
        }
        Ok(())
    }
}

fn preallocate_parallel(fileset: &Arc<Fileset>, slots: &[SlotIndex]) -> Result<(), FlowError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(MAX_PARALLOC_THREADS)
        .build()
        .map_err(|_| FlowError::Inconsistent("failed to build preallocation thread pool"))?;

    let first_error = std::sync::Mutex::new(None);
    pool.install(|| {
        use rayon::prelude::*;
        slots.par_iter().for_each(|&slot| {
            if let Err(e) = alloc_one_file(fileset, slot) {
                let mut guard = first_error.lock().unwrap_or_else(|p| p.into_inner());
                if guard.is_none() {
                    *guard = Some(e);
                }
            }
        });
    });

    match first_error.into_inner().unwrap_or_else(|p| p.into_inner()) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn alloc_one_file(fileset: &Fileset, slot: SlotIndex) -> Result<(), FlowError> {
    let entry = fileset
        .entries
        .get(slot)
        .ok_or_else(|| FlowError::NoResource(fileset.name.clone()))?;
    let path = fileset
        .entry_path(slot)
        .ok_or_else(|| FlowError::NoResource(fileset.name.clone()))?;
    let target_size = entry.state.lock().unwrap_or_else(|p| p.into_inner()).size;

    let existing_size = std::fs::metadata(&path).ok().map(|m| m.len());
    let reuse_eligible = fileset.flags.reuse && existing_size.is_some();

    let file = if reuse_eligible {
        let mut f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        let sb_size = existing_size.unwrap();
        if fileset.flags.trust_tree || sb_size == target_size {
            fileset.unbusy(PickKind::File, slot, Some(true), 0)?;
            return Ok(());
        } else if sb_size > target_size {
            f.set_len(target_size).map_err(|e| io_err(&path, e))?;
            fileset.unbusy(PickKind::File, slot, Some(true), 0)?;
            return Ok(());
        }
        f
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?
    };

    write_zeroed(file, &path, target_size)?;
    fileset.unbusy(PickKind::File, slot, Some(true), 0)?;
    Ok(())
}

fn write_zeroed(mut file: File, path: &Path, target_size: u64) -> Result<(), FlowError> {
    let chunk = vec![0u8; FILE_ALLOC_BLOCK.min(target_size.max(1)) as usize];
    file.seek(SeekFrom::Start(0)).map_err(|e| io_err(path, e))?;
    let mut written = 0u64;
    while written < target_size {
        let remaining = target_size - written;
        let wsize = remaining.min(FILE_ALLOC_BLOCK) as usize;
        file.write_all(&chunk[..wsize]).map_err(|e| io_err(path, e))?;
        written += wsize as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileset::{populate::{populate, PopulateParams}, FilesetFlags};
    use tempfile::tempdir;

    fn base_params() -> PopulateParams {
        PopulateParams {
            target_files: 6,
            target_leafdirs: 0,
            mean_width: 3.0,
            dir_gamma_permille: 0,
            size_mean: 4096.0,
            size_gamma_permille: 0,
            seed: 11,
        }
    }

    #[test]
    fn create_on_disk_materializes_files_at_target_size() {
        let dir = tempdir().unwrap();
        let fs = Arc::new(Fileset::new("fs", dir.path().to_path_buf(), FilesetFlags { preallocate: true, ..Default::default() }, 100, 3.0));
        populate(&fs, &base_params()).unwrap();
        create_on_disk(&fs).unwrap();

        let mut total_bytes = 0u64;
        for entry in walkdir_files(dir.path()) {
            total_bytes += std::fs::metadata(&entry).unwrap().len();
        }
        assert_eq!(total_bytes, fs.fs_bytes());
    }

    #[test]
    fn zero_percent_prealloc_creates_no_files() {
        let dir = tempdir().unwrap();
        let fs = Arc::new(Fileset::new("fs", dir.path().to_path_buf(), FilesetFlags::default(), 0, 3.0));
        populate(&fs, &base_params()).unwrap();
        create_on_disk(&fs).unwrap();
        assert_eq!(walkdir_files(dir.path()).len(), 0);
    }

    #[test]
    fn without_reuse_a_stray_file_left_over_from_a_prior_run_is_wiped() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        let stray = dir.path().join("leftover_from_before.txt");
        std::fs::write(&stray, b"stale").unwrap();

        let fs = Arc::new(Fileset::new("fs", dir.path().to_path_buf(), FilesetFlags { preallocate: true, ..Default::default() }, 100, 3.0));
        populate(&fs, &base_params()).unwrap();
        create_on_disk(&fs).unwrap();

        assert!(!stray.exists());
        let mut total_bytes = 0u64;
        for entry in walkdir_files(dir.path()) {
            total_bytes += std::fs::metadata(&entry).unwrap().len();
        }
        assert_eq!(total_bytes, fs.fs_bytes());
    }

    #[test]
    fn reuse_with_trust_tree_leaves_a_preexisting_root_untouched() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        let survivor = dir.path().join("kept_from_before.txt");
        std::fs::write(&survivor, b"keep me").unwrap();

        let flags = FilesetFlags { reuse: true, trust_tree: true, ..Default::default() };
        let fs = Arc::new(Fileset::new("fs", dir.path().to_path_buf(), flags, 0, 3.0));
        populate(&fs, &base_params()).unwrap();
        create_on_disk(&fs).unwrap();

        assert!(survivor.exists());
        assert_eq!(std::fs::read(&survivor).unwrap(), b"keep me");
    }

    fn walkdir_files(root: &Path) -> Vec<std::path::PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(rd) = std::fs::read_dir(&dir) else { continue };
            for entry in rd.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    out.push(path);
                }
            }
        }
        out
    }
}

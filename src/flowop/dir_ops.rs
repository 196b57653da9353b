//! Directory flowops: makedir, removedir, opendir, listdir
//!
//! `makedir`/`removedir` toggle a leaf-directory entry's existence, mirroring
//! the file equivalents in [`super::io_ops`]. `opendir`/`listdir` both pick a
//! non-leaf directory (which always exists once populated) rather than a
//! fileset entry, so they route through `PickKind::Dir` and never touch the
//! busy/exists bookkeeping beyond the no-op `unbusy` that kind gets.

use super::{Flowop, FlowopOutcome};
use crate::error::FlowError;
use crate::fileset::{Fileset, PickKind, PickMode};
use crate::stats::{FlowStats, FlowopClass, IoDirection};
use crate::threadflow::{OpenFd, Threadflow};
use std::fs::OpenOptions;
use std::sync::Arc;

fn io_err(path: &str, source: std::io::Error) -> FlowError {
    FlowError::Io { path: path.to_string(), source }
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(code) if code == libc::EIO || code == libc::EAGAIN || code == libc::EINTR
    )
}

/// §4.5 makedir: pick a nonexisting leaf-dir entry, `mkdir` it, mark existing.
pub struct MakeDirOp {
    pub fileset: Arc<Fileset>,
    pub stats: FlowStats,
}

impl Flowop for MakeDirOp {
    fn name(&self) -> &str {
        "makedir"
    }
    fn run(&self, _tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Io, || {
            let slot = match self.fileset.pick(PickKind::LeafDir, PickMode::NonExisting, None) {
                Ok(slot) => slot,
                Err(_) => return Ok((FlowopOutcome::NoResource, None, 0)),
            };
            let path = self
                .fileset
                .entry_path(slot)
                .ok_or_else(|| FlowError::NoResource(self.fileset.name.clone()))?;
            match std::fs::create_dir(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) if is_transient(&e) => {
                    self.fileset.unbusy(PickKind::LeafDir, slot, Some(false), 0)?;
                    return Ok((FlowopOutcome::AgainTransient, None, 0));
                }
                Err(e) => return Err(io_err(&path.display().to_string(), e)),
            }
            self.fileset.unbusy(PickKind::LeafDir, slot, Some(true), 0)?;
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Io
    }
}

/// §4.5 removedir: pick an existing leaf-dir entry, `rmdir` it, mark gone.
pub struct RemoveDirOp {
    pub fileset: Arc<Fileset>,
    pub stats: FlowStats,
}

impl Flowop for RemoveDirOp {
    fn name(&self) -> &str {
        "removedir"
    }
    fn run(&self, _tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Io, || {
            let slot = match self.fileset.pick(PickKind::LeafDir, PickMode::Existing, None) {
                Ok(slot) => slot,
                Err(_) => return Ok((FlowopOutcome::NoResource, None, 0)),
            };
            let path = self
                .fileset
                .entry_path(slot)
                .ok_or_else(|| FlowError::NoResource(self.fileset.name.clone()))?;
            match std::fs::remove_dir(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) if is_transient(&e) => {
                    self.fileset.unbusy(PickKind::LeafDir, slot, Some(true), 0)?;
                    return Ok((FlowopOutcome::AgainTransient, None, 0));
                }
                Err(e) => return Err(io_err(&path.display().to_string(), e)),
            }
            self.fileset.unbusy(PickKind::LeafDir, slot, Some(false), 0)?;
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Io
    }
}

/// §4.5 opendir: open a randomly picked non-leaf directory and install its
/// handle into the threadflow's fd table (no corresponding `closedirop` is
/// defined; a later `closefile` on the same slot closes it, same as a file).
pub struct OpenDirOp {
    pub fileset: Arc<Fileset>,
    pub fd_slot: usize,
    pub stats: FlowStats,
}

impl Flowop for OpenDirOp {
    fn name(&self) -> &str {
        "opendir"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Io, || {
            let slot = match self.fileset.pick(PickKind::Dir, PickMode::UniqueFree, None) {
                Ok(slot) => slot,
                Err(_) => return Ok((FlowopOutcome::NoResource, None, 0)),
            };
            let path = self
                .fileset
                .entry_path(slot)
                .ok_or_else(|| FlowError::NoResource(self.fileset.name.clone()))?;
            let file = match OpenOptions::new().read(true).open(&path) {
                Ok(f) => f,
                Err(e) if is_transient(&e) => return Ok((FlowopOutcome::AgainTransient, None, 0)),
                Err(e) => return Err(io_err(&path.display().to_string(), e)),
            };
            tf.install_fd(OpenFd { file, fileset_name: self.fileset.name.clone(), entry_slot: slot })?;
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Io
    }
}

/// Fixed per-entry overhead counted alongside each name's length, standing
/// in for `sizeof(struct dirent) - 1` in the reference implementation.
const DIRENT_OVERHEAD_BYTES: u64 = 24;

/// §4.5 listdir: opendir/readdir/closedir a randomly picked non-leaf
/// directory, reporting total (name length + per-entry overhead) as bytes
/// "read".
pub struct ListDirOp {
    pub fileset: Arc<Fileset>,
    pub stats: FlowStats,
}

impl Flowop for ListDirOp {
    fn name(&self) -> &str {
        "listdir"
    }
    fn run(&self, _tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Io, || {
            let slot = match self.fileset.pick(PickKind::Dir, PickMode::UniqueFree, None) {
                Ok(slot) => slot,
                Err(_) => return Ok((FlowopOutcome::NoResource, None, 0)),
            };
            let path = self
                .fileset
                .entry_path(slot)
                .ok_or_else(|| FlowError::NoResource(self.fileset.name.clone()))?;
            let entries = match std::fs::read_dir(&path) {
                Ok(rd) => rd,
                Err(e) if is_transient(&e) => return Ok((FlowopOutcome::AgainTransient, None, 0)),
                Err(e) => return Err(io_err(&path.display().to_string(), e)),
            };
            let mut dir_bytes = 0u64;
            for entry in entries {
                let entry = entry.map_err(|e| io_err(&path.display().to_string(), e))?;
                dir_bytes += entry.file_name().len() as u64 + DIRENT_OVERHEAD_BYTES;
            }
            self.fileset.unbusy(PickKind::Dir, slot, None, 0)?;
            Ok((FlowopOutcome::Ok, Some(IoDirection::Read), dir_bytes))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Io
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileset::FilesetFlags;
    use tempfile::tempdir;

    fn mk_populated_fileset(root: std::path::PathBuf) -> Arc<Fileset> {
        let fs = Arc::new(Fileset::new("fs", root.clone(), FilesetFlags::default(), 100, 4.0));
        crate::fileset::populate::populate(
            &fs,
            &crate::fileset::populate::PopulateParams {
                target_files: 4,
                target_leafdirs: 2,
                mean_width: 2.0,
                dir_gamma_permille: 0,
                size_mean: 0.0,
                size_gamma_permille: 0,
                seed: 1,
            },
        )
        .unwrap();
        crate::fileset::ondisk::create_on_disk(&fs).unwrap();
        fs
    }

    #[test]
    fn makedir_then_removedir_round_trips() {
        let dir = tempdir().unwrap();
        let fs = mk_populated_fileset(dir.path().to_path_buf());
        let before_idle = fs.idle_count(PickKind::LeafDir);

        let make = MakeDirOp { fileset: fs.clone(), stats: FlowStats::new() };
        assert_eq!(make.run(&mut Threadflow::new("tf", 1, 0)).unwrap(), FlowopOutcome::Ok);
        assert_eq!(fs.idle_count(PickKind::LeafDir), before_idle);

        let remove = RemoveDirOp { fileset: fs.clone(), stats: FlowStats::new() };
        assert_eq!(remove.run(&mut Threadflow::new("tf", 1, 0)).unwrap(), FlowopOutcome::Ok);
    }

    #[test]
    fn listdir_counts_bytes_for_root_entries() {
        let dir = tempdir().unwrap();
        let fs = mk_populated_fileset(dir.path().to_path_buf());
        let listdir = ListDirOp { fileset: fs.clone(), stats: FlowStats::new() };
        let mut tf = Threadflow::new("tf", 1, 0);
        assert_eq!(listdir.run(&mut tf).unwrap(), FlowopOutcome::Ok);
    }
}

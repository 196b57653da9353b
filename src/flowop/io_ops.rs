//! File I/O flowops: read/write variants, open/create/close/delete, stat, fsync
//!
//! Every op here is constructed already holding the `Arc<Fileset>`,
//! `Arc<VariableTable>` and `fd_slot` it needs; `run()` only resolves `Avd`s
//! and does the syscalls. `fd_slot` is the threadflow fd-table index a prior
//! `createfile`/`openfile` in the same threadflow's flowop list populated —
//! the workload wires these together by declaring the same `fd=` attribute
//! on the pair, which the builder turns into a shared slot number.

use super::{Flowop, FlowopOutcome};
use crate::avd::{Avd, VariableTable};
use crate::error::FlowError;
use crate::fileset::{EntryKind, Fileset, PickKind, PickMode};
use crate::stats::{FlowStats, FlowopClass, IoDirection};
use crate::threadflow::{OpenFd, Threadflow};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
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

/// Resolve `iosize`/`wss`, enforcing §8 boundary 11: a random op may never
/// request more bytes per call than its working-set size.
fn resolve_size_bounds(iosize: &Avd, wss: &Avd, vars: &VariableTable, random: bool, file_len: u64) -> Result<(u64, u64), FlowError> {
    let iosize = iosize.get_int(vars)?;
    if iosize <= 0 {
        return Err(FlowError::InvalidParameter("iosize must be > 0".into()));
    }
    let iosize = iosize as u64;
    let wss_raw = wss.get_int(vars)?;
    let wss = if wss_raw == 0 { file_len } else { wss_raw as u64 };
    if random && iosize > wss {
        return Err(FlowError::InvalidParameter("iosize exceeds working-set size for a random op".into()));
    }
    Ok((iosize, wss))
}

pub struct ReadOp {
    pub fd_slot: usize,
    pub iosize: Avd,
    pub wss: Avd,
    pub random: Avd,
    pub iters: u32,
    pub vars: Arc<VariableTable>,
    pub stats: FlowStats,
}

impl Flowop for ReadOp {
    fn name(&self) -> &str {
        "read"
    }
    fn iters(&self) -> u32 {
        self.iters.max(1)
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        let random = self.random.get_bool(&self.vars)?;
        let file_len = tf.fd(self.fd_slot).and_then(|f| f.file.metadata().ok()).map(|m| m.len()).unwrap_or(0);
        let (iosize, wss) = resolve_size_bounds(&self.iosize, &self.wss, &self.vars, random, file_len)?;
        tf.ensure_scratch(iosize as usize);

        super::timed(&self.stats, FlowopClass::Io, || {
            let Some((open, scratch)) = tf.fd_and_scratch_mut(self.fd_slot) else {
                return Err(FlowError::InvalidParameter("read: no open fd in designated slot".into()));
            };
            let buf = &mut scratch[..iosize as usize];
            let result = if random {
                let offset = rand::random::<u64>() % (wss - iosize + 1).max(1);
                open.file.read_at(buf, offset)
            } else {
                match open.file.read(buf) {
                    Ok(0) => {
                        open.file.seek(SeekFrom::Start(0)).map_err(|e| io_err(&open.fileset_name, e))?;
                        open.file.read(buf)
                    }
                    other => other,
                }
            };
            match result {
                Ok(n) => Ok((FlowopOutcome::Ok, Some(IoDirection::Read), n as u64)),
                Err(e) if is_transient(&e) => Ok((FlowopOutcome::AgainTransient, Some(IoDirection::Read), 0)),
                Err(e) => Err(io_err(&open.fileset_name, e)),
            }
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Io
    }
}

/// `write`/`pwrite`: setting `random` true gives `pwrite` semantics, false
/// gives sequential `write`; both share this implementation.
pub struct WriteOp {
    pub fd_slot: usize,
    pub iosize: Avd,
    pub wss: Avd,
    pub random: Avd,
    pub iters: u32,
    pub vars: Arc<VariableTable>,
    pub stats: FlowStats,
}

impl Flowop for WriteOp {
    fn name(&self) -> &str {
        "write"
    }
    fn iters(&self) -> u32 {
        self.iters.max(1)
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        let random = self.random.get_bool(&self.vars)?;
        let file_len = tf.fd(self.fd_slot).and_then(|f| f.file.metadata().ok()).map(|m| m.len()).unwrap_or(1);
        let (iosize, wss) = resolve_size_bounds(&self.iosize, &self.wss, &self.vars, random, file_len.max(1))?;
        tf.ensure_scratch(iosize as usize);

        super::timed(&self.stats, FlowopClass::Io, || {
            let Some((open, scratch)) = tf.fd_and_scratch_mut(self.fd_slot) else {
                return Err(FlowError::InvalidParameter("write: no open fd in designated slot".into()));
            };
            let buf = &scratch[..iosize as usize];
            let result = if random {
                let offset = rand::random::<u64>() % (wss - iosize + 1).max(1);
                open.file.write_at(buf, offset)
            } else {
                open.file.write(buf)
            };
            match result {
                Ok(n) => Ok((FlowopOutcome::Ok, Some(IoDirection::Write), n as u64)),
                Err(e) if is_transient(&e) => Ok((FlowopOutcome::AgainTransient, Some(IoDirection::Write), 0)),
                Err(e) => Err(io_err(&open.fileset_name, e)),
            }
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Io
    }
}

pub struct AppendFileOp {
    pub fd_slot: usize,
    pub iosize: Avd,
    pub vars: Arc<VariableTable>,
    pub stats: FlowStats,
}

impl Flowop for AppendFileOp {
    fn name(&self) -> &str {
        "appendfile"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        let iosize = self.iosize.get_int(&self.vars)?;
        if iosize <= 0 {
            return Err(FlowError::InvalidParameter("iosize must be > 0".into()));
        }
        let iosize = iosize as usize;
        tf.ensure_scratch(iosize);
        super::timed(&self.stats, FlowopClass::Io, || {
            let Some((open, scratch)) = tf.fd_and_scratch_mut(self.fd_slot) else {
                return Err(FlowError::InvalidParameter("appendfile: no open fd in designated slot".into()));
            };
            open.file.seek(SeekFrom::End(0)).map_err(|e| io_err(&open.fileset_name, e))?;
            match open.file.write(&scratch[..iosize]) {
                Ok(n) => Ok((FlowopOutcome::Ok, Some(IoDirection::Write), n as u64)),
                Err(e) if is_transient(&e) => Ok((FlowopOutcome::AgainTransient, Some(IoDirection::Write), 0)),
                Err(e) => Err(io_err(&open.fileset_name, e)),
            }
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Io
    }
}

pub struct AppendFileRandOp {
    pub fd_slot: usize,
    pub iosize: Avd,
    pub vars: Arc<VariableTable>,
    pub stats: FlowStats,
}

impl Flowop for AppendFileRandOp {
    fn name(&self) -> &str {
        "appendfilerand"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        let max_size = self.iosize.get_int(&self.vars)?;
        if max_size <= 0 {
            return Err(FlowError::InvalidParameter("iosize must be > 0".into()));
        }
        let drawn = 1 + (rand::random::<u64>() % max_size as u64);
        tf.ensure_scratch(drawn as usize);
        super::timed(&self.stats, FlowopClass::Io, || {
            let Some((open, scratch)) = tf.fd_and_scratch_mut(self.fd_slot) else {
                return Err(FlowError::InvalidParameter("appendfilerand: no open fd in designated slot".into()));
            };
            open.file.seek(SeekFrom::End(0)).map_err(|e| io_err(&open.fileset_name, e))?;
            match open.file.write(&scratch[..drawn as usize]) {
                Ok(n) => Ok((FlowopOutcome::Ok, Some(IoDirection::Write), n as u64)),
                Err(e) if is_transient(&e) => Ok((FlowopOutcome::AgainTransient, Some(IoDirection::Write), 0)),
                Err(e) => Err(io_err(&open.fileset_name, e)),
            }
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Io
    }
}

pub struct ReadWholeFileOp {
    pub fd_slot: usize,
    pub iosize: Avd,
    pub vars: Arc<VariableTable>,
    pub stats: FlowStats,
}

impl Flowop for ReadWholeFileOp {
    fn name(&self) -> &str {
        "readwholefile"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        let iosize = self.iosize.get_int(&self.vars)?.max(65536) as usize;
        tf.ensure_scratch(iosize);
        super::timed(&self.stats, FlowopClass::Io, || {
            let Some((open, scratch)) = tf.fd_and_scratch_mut(self.fd_slot) else {
                return Err(FlowError::InvalidParameter("readwholefile: no open fd in designated slot".into()));
            };
            open.file.seek(SeekFrom::Start(0)).map_err(|e| io_err(&open.fileset_name, e))?;
            let mut total = 0u64;
            loop {
                match open.file.read(&mut scratch[..iosize]) {
                    Ok(0) => break,
                    Ok(n) => total += n as u64,
                    Err(e) if is_transient(&e) => return Ok((FlowopOutcome::AgainTransient, Some(IoDirection::Read), total)),
                    Err(e) => return Err(io_err(&open.fileset_name, e)),
                }
            }
            Ok((FlowopOutcome::Ok, Some(IoDirection::Read), total))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Io
    }
}

pub struct WriteWholeFileOp {
    pub fd_slot: usize,
    pub iosize: Avd,
    pub wss: Avd,
    pub vars: Arc<VariableTable>,
    pub stats: FlowStats,
}

impl Flowop for WriteWholeFileOp {
    fn name(&self) -> &str {
        "writewholefile"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        let iosize = self.iosize.get_int(&self.vars)?.max(65536) as usize;
        let file_len = tf.fd(self.fd_slot).and_then(|f| f.file.metadata().ok()).map(|m| m.len()).unwrap_or(0);
        let wss_raw = self.wss.get_int(&self.vars)?;
        let wss = if wss_raw == 0 { file_len } else { wss_raw as u64 };
        tf.ensure_scratch(iosize);
        super::timed(&self.stats, FlowopClass::Io, || {
            let Some((open, scratch)) = tf.fd_and_scratch_mut(self.fd_slot) else {
                return Err(FlowError::InvalidParameter("writewholefile: no open fd in designated slot".into()));
            };
            open.file.seek(SeekFrom::Start(0)).map_err(|e| io_err(&open.fileset_name, e))?;
            let mut written = 0u64;
            while written < wss {
                let chunk = (wss - written).min(iosize as u64) as usize;
                match open.file.write(&scratch[..chunk]) {
                    Ok(n) => written += n as u64,
                    Err(e) if is_transient(&e) => return Ok((FlowopOutcome::AgainTransient, Some(IoDirection::Write), written)),
                    Err(e) => return Err(io_err(&open.fileset_name, e)),
                }
            }
            Ok((FlowopOutcome::Ok, Some(IoDirection::Write), written))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Io
    }
}

/// §4.5 createfile: pick a nonexisting entry (falling back to an existing
/// one if the fileset has none free), create it on disk, and install the
/// open fd into the threadflow's table.
pub struct CreateFileOp {
    pub fileset: Arc<Fileset>,
    pub fd_slot: usize,
    pub stats: FlowStats,
}

impl Flowop for CreateFileOp {
    fn name(&self) -> &str {
        "createfile"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Io, || {
            let slot = match self.fileset.pick(PickKind::File, PickMode::NonExisting, None) {
                Ok(slot) => slot,
                Err(_) => match self.fileset.pick(PickKind::File, PickMode::UniqueFree, None) {
                    Ok(slot) => slot,
                    Err(_) => return Ok((FlowopOutcome::NoResource, None, 0)),
                },
            };
            let path = self
                .fileset
                .entry_path(slot)
                .ok_or_else(|| FlowError::NoResource(self.fileset.name.clone()))?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(&path.display().to_string(), e))?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .map_err(|e| io_err(&path.display().to_string(), e))?;
            tf.install_fd(OpenFd { file, fileset_name: self.fileset.name.clone(), entry_slot: slot })?;
            self.fileset.unbusy(PickKind::File, slot, Some(true), 1)?;
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

/// §4.5 openfile: pick an existing entry and open it per the fileset's
/// read-only/write-only/read-write policy.
pub struct OpenFileOp {
    pub fileset: Arc<Fileset>,
    pub fd_slot: usize,
    pub stats: FlowStats,
}

impl Flowop for OpenFileOp {
    fn name(&self) -> &str {
        "openfile"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Io, || {
            let slot = match self.fileset.pick(PickKind::File, PickMode::Existing, None) {
                Ok(slot) => slot,
                Err(_) => return Ok((FlowopOutcome::NoResource, None, 0)),
            };
            let path = self
                .fileset
                .entry_path(slot)
                .ok_or_else(|| FlowError::NoResource(self.fileset.name.clone()))?;
            let mut opts = OpenOptions::new();
            if self.fileset.flags.read_only {
                opts.read(true);
            } else if self.fileset.flags.write_only {
                opts.write(true);
            } else {
                opts.read(true).write(true);
            }
            let file = opts.open(&path).map_err(|e| io_err(&path.display().to_string(), e))?;
            tf.install_fd(OpenFd { file, fileset_name: self.fileset.name.clone(), entry_slot: slot })?;
            self.fileset.unbusy(PickKind::File, slot, Some(true), 1)?;
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

/// §4.5 closefile: wait for the owning entry to go non-busy, then close.
pub struct CloseFileOp {
    pub fileset: Arc<Fileset>,
    pub fd_slot: usize,
    pub stats: FlowStats,
}

impl Flowop for CloseFileOp {
    fn name(&self) -> &str {
        "closefile"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Io, || {
            let Some(open) = tf.take_fd(self.fd_slot) else {
                return Err(FlowError::InvalidParameter("closefile: no open fd in designated slot".into()));
            };
            self.fileset.wait_not_busy(open.entry_slot)?;
            drop(open.file);
            self.fileset.unbusy(PickKind::File, open.entry_slot, None, -1)?;
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

/// §4.5 deletefile: pick an existing entry (or use the entry behind
/// `fd_slot` if one is supplied), wait until non-busy, unlink, and mark
/// the entry not-existing. §9 open question (ii): when `fd_slot` is
/// supplied the caller's own open counts against `open_cnt`, so the delta
/// applied here is `-open_cnt` observed *before* the unlink — any other
/// thread still holding the entry open keeps its fd valid (POSIX unlink
/// semantics) but the fileset stops treating the entry as existing.
pub struct DeleteFileOp {
    pub fileset: Arc<Fileset>,
    pub fd_slot: Option<usize>,
    pub stats: FlowStats,
}

impl Flowop for DeleteFileOp {
    fn name(&self) -> &str {
        "deletefile"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Io, || {
            // A designated fd names an entry this thread doesn't itself hold
            // busy, so it may still be mid-operation on another thread; wait
            // it out. A self-picked slot is already exclusively ours from
            // `pick` above, so waiting on its own busy flag here would just
            // deadlock against nobody.
            let slot = if let Some(fd_slot) = self.fd_slot {
                let slot = match tf.fd(fd_slot) {
                    Some(open) => open.entry_slot,
                    None => return Err(FlowError::InvalidParameter("deletefile: designated fd not open".into())),
                };
                self.fileset.wait_not_busy(slot)?;
                slot
            } else {
                match self.fileset.pick(PickKind::File, PickMode::Existing, None) {
                    Ok(slot) => slot,
                    Err(_) => return Ok((FlowopOutcome::NoResource, None, 0)),
                }
            };

            let entry = self
                .fileset
                .entries
                .get(slot)
                .ok_or_else(|| FlowError::NoResource(self.fileset.name.clone()))?;
            let open_cnt = entry.state.lock().unwrap_or_else(|p| p.into_inner()).open_cnt;
            if open_cnt > 0 && self.fd_slot.is_none() {
                return Err(FlowError::InvalidParameter("deletefile: entry is still open by another thread".into()));
            }
            let path = self
                .fileset
                .entry_path(slot)
                .ok_or_else(|| FlowError::NoResource(self.fileset.name.clone()))?;
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| io_err(&path.display().to_string(), e))?;
            }
            self.fileset.unbusy(PickKind::File, slot, Some(false), -open_cnt)?;
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

/// §4.5 statfile: `fd_slot = Some` fstats the open file; `None` picks an
/// existing entry and stats it by path.
pub struct StatFileOp {
    pub fileset: Arc<Fileset>,
    pub fd_slot: Option<usize>,
    pub stats: FlowStats,
}

impl Flowop for StatFileOp {
    fn name(&self) -> &str {
        "statfile"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Io, || {
            if let Some(fd_slot) = self.fd_slot {
                let Some(open) = tf.fd(fd_slot) else {
                    return Err(FlowError::InvalidParameter("statfile: designated fd not open".into()));
                };
                open.file.metadata().map_err(|e| io_err(&open.fileset_name, e))?;
                return Ok((FlowopOutcome::Ok, None, 0));
            }
            let slot = match self.fileset.pick(PickKind::File, PickMode::Existing, None) {
                Ok(slot) => slot,
                Err(_) => return Ok((FlowopOutcome::NoResource, None, 0)),
            };
            let path = self
                .fileset
                .entry_path(slot)
                .ok_or_else(|| FlowError::NoResource(self.fileset.name.clone()))?;
            let result = std::fs::metadata(&path);
            self.fileset.unbusy(PickKind::File, slot, None, 0)?;
            result.map_err(|e| io_err(&path.display().to_string(), e))?;
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

pub struct FsyncOp {
    pub fd_slot: usize,
    pub stats: FlowStats,
}

impl Flowop for FsyncOp {
    fn name(&self) -> &str {
        "fsync"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Io, || {
            let Some(open) = tf.fd(self.fd_slot) else {
                return Err(FlowError::InvalidParameter("fsync: no open fd in designated slot".into()));
            };
            open.file.sync_all().map_err(|e| io_err(&open.fileset_name, e))?;
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

/// §4.5 fsyncset: fsync every fd in the caller's threadflow belonging to
/// `fileset`.
pub struct FsyncSetOp {
    pub fileset_name: String,
    pub stats: FlowStats,
}

impl Flowop for FsyncSetOp {
    fn name(&self) -> &str {
        "fsyncset"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Io, || {
            for slot in tf.open_fd_slots() {
                let matches = tf.fd(slot).map(|f| f.fileset_name == self.fileset_name).unwrap_or(false);
                if matches {
                    if let Some(open) = tf.fd(slot) {
                        open.file.sync_all().map_err(|e| io_err(&open.fileset_name, e))?;
                    }
                }
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileset::FilesetFlags;
    use tempfile::tempdir;

    fn mk_fileset(root: std::path::PathBuf) -> Arc<Fileset> {
        Arc::new(Fileset::new("fs", root, FilesetFlags::default(), 100, 4.0))
    }

    #[test]
    fn create_then_close_then_delete_file_round_trips() {
        let dir = tempdir().unwrap();
        let fs = mk_fileset(dir.path().to_path_buf());
        crate::fileset::populate::populate(
            &fs,
            &crate::fileset::populate::PopulateParams {
                target_files: 1,
                target_leafdirs: 0,
                mean_width: 2.0,
                dir_gamma_permille: 0,
                size_mean: 0.0,
                size_gamma_permille: 0,
                seed: 1,
            },
        )
        .unwrap();

        let mut tf = Threadflow::new("tf", 1, 4096);
        let create = CreateFileOp { fileset: fs.clone(), fd_slot: 0, stats: FlowStats::new() };
        assert_eq!(create.run(&mut tf).unwrap(), FlowopOutcome::Ok);
        assert!(tf.fd(0).is_some());

        let close = CloseFileOp { fileset: fs.clone(), fd_slot: 0, stats: FlowStats::new() };
        assert_eq!(close.run(&mut tf).unwrap(), FlowopOutcome::Ok);
        assert!(tf.fd(0).is_none());

        let delete = DeleteFileOp { fileset: fs.clone(), fd_slot: None, stats: FlowStats::new() };
        assert_eq!(delete.run(&mut tf).unwrap(), FlowopOutcome::Ok);
        assert_eq!(fs.total_count(PickKind::File), 1);
        assert_eq!(fs.idle_count(PickKind::File), 1);
    }

    #[test]
    fn write_then_read_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let fs = mk_fileset(dir.path().to_path_buf());
        crate::fileset::populate::populate(
            &fs,
            &crate::fileset::populate::PopulateParams {
                target_files: 1,
                target_leafdirs: 0,
                mean_width: 2.0,
                dir_gamma_permille: 0,
                size_mean: 0.0,
                size_gamma_permille: 0,
                seed: 1,
            },
        )
        .unwrap();

        let mut tf = Threadflow::new("tf", 1, 4096);
        let vars = VariableTable::new();
        let create = CreateFileOp { fileset: fs.clone(), fd_slot: 0, stats: FlowStats::new() };
        create.run(&mut tf).unwrap();

        for b in tf.scratch.iter_mut().take(4096) {
            *b = 7;
        }
        let write = WriteOp {
            fd_slot: 0,
            iosize: Avd::int(4096),
            wss: Avd::int(4096),
            random: Avd::bool(false),
            iters: 1,
            vars: vars.clone(),
            stats: FlowStats::new(),
        };
        assert_eq!(write.run(&mut tf).unwrap(), FlowopOutcome::Ok);

        tf.fd_mut(0).unwrap().file.seek(SeekFrom::Start(0)).unwrap();
        let read = ReadOp {
            fd_slot: 0,
            iosize: Avd::int(4096),
            wss: Avd::int(4096),
            random: Avd::bool(false),
            iters: 1,
            vars,
            stats: FlowStats::new(),
        };
        assert_eq!(read.run(&mut tf).unwrap(), FlowopOutcome::Ok);
        assert!(tf.scratch[..4096].iter().all(|&b| b == 7));
    }
}

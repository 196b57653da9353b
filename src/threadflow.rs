//! Threadflow runner: per-thread file-descriptor table and flowop loop
//!
//! A `Threadflow` is the live, per-OS-thread counterpart of a threadflow
//! definition: it owns a small fixed-size file-descriptor table (flowops
//! reference fds by small integer slot, not by raw `File` object, so a
//! `createfile`/`openfile` pair and a later `closefile`/`fsync` can agree on
//! "which file" without passing the `File` itself around), an optional
//! scratch buffer for read/write payloads, and the ordered flowop list it
//! runs to completion or abort.

use crate::error::{AbortKind, FlowError};
use crate::flowop::{Flowop, FlowopOutcome};
use crate::region::RunState;
use std::fs::File;
use std::sync::Arc;

/// Fixed fd-table size; a threadflow can have at most this many files open
/// at once. Generous for synthetic workloads without being unbounded.
pub const MAX_OPEN_FDS: usize = 32;

/// One entry in a threadflow's fd table: the open file plus which fileset
/// entry it corresponds to, so `closefile`/`fsyncset`/`deletefile` can route
/// back into the owning fileset's `unbusy`.
pub struct OpenFd {
    pub file: File,
    pub fileset_name: String,
    pub entry_slot: crate::region::SlotIndex,
}

/// Per-thread live state: fd table, scratch buffer, and identity.
pub struct Threadflow {
    pub name: String,
    pub instance: u32,
    fds: Vec<Option<OpenFd>>,
    pub scratch: Vec<u8>,
    /// Rotor cursor used by flowops that round-robin through open fds
    /// (fsyncset, rotatefd).
    pub fd_rotor: usize,
}

impl Threadflow {
    pub fn new(name: impl Into<String>, instance: u32, scratch_size: usize) -> Self {
        Self {
            name: name.into(),
            instance,
            fds: (0..MAX_OPEN_FDS).map(|_| None).collect(),
            scratch: vec![0u8; scratch_size],
            fd_rotor: 0,
        }
    }

    /// Install `fd` into the first free slot. Returns the slot index, or
    /// `OutOfSlots` if the table is full.
    pub fn install_fd(&mut self, fd: OpenFd) -> Result<usize, FlowError> {
        for (i, slot) in self.fds.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(fd);
                return Ok(i);
            }
        }
        Err(FlowError::OutOfSlots("threadflow fd table"))
    }

    pub fn fd(&self, slot: usize) -> Option<&OpenFd> {
        self.fds.get(slot).and_then(|s| s.as_ref())
    }

    pub fn fd_mut(&mut self, slot: usize) -> Option<&mut OpenFd> {
        self.fds.get_mut(slot).and_then(|s| s.as_mut())
    }

    pub fn take_fd(&mut self, slot: usize) -> Option<OpenFd> {
        self.fds.get_mut(slot).and_then(|s| s.take())
    }

    /// All currently occupied fd slots, in table order, for `fsyncset`.
    pub fn open_fd_slots(&self) -> Vec<usize> {
        self.fds
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }

    pub fn ensure_scratch(&mut self, len: usize) {
        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }
    }

    /// Borrow an open fd and the scratch buffer simultaneously — both are
    /// disjoint fields, but a plain `fd_mut`/`&mut self.scratch` pair would
    /// fight the borrow checker over `&mut self`.
    pub fn fd_and_scratch_mut(&mut self, slot: usize) -> Option<(&mut OpenFd, &mut Vec<u8>)> {
        let fd = self.fds.get_mut(slot)?.as_mut()?;
        Some((fd, &mut self.scratch))
    }
}

/// Run `flowops` in order, `iters` times each per pass, looping passes until
/// the run-barrier signals an abort or a flowop returns `NoResource`/`Error`.
/// Latency is bracketed around every single `run()` call by the flowop
/// itself via its `FlowStats`; this loop only interprets the returned
/// outcome and decides whether to continue, stop cleanly, or abort.
pub fn run_loop(
    tf: &mut Threadflow,
    flowops: &[Arc<dyn Flowop>],
    run_state: &RunState,
) -> Result<(), FlowError> {
    'passes: loop {
        if run_state.abort_kind().is_set() {
            break 'passes;
        }
        for op in flowops {
            if run_state.abort_kind().is_set() {
                break 'passes;
            }
            let iters = op.iters();
            for _ in 0..iters.max(1) {
                match op.run(tf) {
                    Ok(FlowopOutcome::Ok) => {}
                    Ok(FlowopOutcome::NoResource) => {
                        run_state.set_abort(AbortKind::Done);
                        break 'passes;
                    }
                    Ok(FlowopOutcome::AgainTransient) => continue,
                    Err(e) => {
                        run_state.set_abort(AbortKind::Error);
                        return Err(e);
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fd_table_round_trips() {
        let mut tf = Threadflow::new("tf0", 1, 0);
        let tmp = tempfile::tempfile().unwrap();
        let slot = tf
            .install_fd(OpenFd {
                file: tmp,
                fileset_name: "fs".into(),
                entry_slot: crate::region::SlotIndex(0),
            })
            .unwrap();
        assert!(tf.fd(slot).is_some());
        assert!(tf.take_fd(slot).is_some());
        assert!(tf.fd(slot).is_none());
    }

    #[test]
    fn fd_table_reports_out_of_slots_when_full() {
        let mut tf = Threadflow::new("tf0", 1, 0);
        for _ in 0..MAX_OPEN_FDS {
            let tmp = tempfile::tempfile().unwrap();
            tf.install_fd(OpenFd { file: tmp, fileset_name: "fs".into(), entry_slot: crate::region::SlotIndex(0) })
                .unwrap();
        }
        let tmp = tempfile::tempfile().unwrap();
        let err = tf
            .install_fd(OpenFd { file: tmp, fileset_name: "fs".into(), entry_slot: crate::region::SlotIndex(0) })
            .unwrap_err();
        assert!(matches!(err, FlowError::OutOfSlots(_)));
    }
}

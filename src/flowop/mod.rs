//! Flowop library: the primitive operations a threadflow executes
//!
//! Every flowop is a small `struct` holding its resolved parameters (as
//! `Avd`s, read fresh on each `run()`) plus the `Arc` handles it needs to do
//! its job — a fileset, the event generator, the run state, a target
//! condvar/semaphore. Construction (by the builder) is where name-based
//! target resolution happens, matching the reference design's "may
//! pre-resolve at definition time" allowance instead of its lazier
//! first-call-then-cache behavior.
//!
//! `run()` always returns through [`FlowopOutcome`]; the threadflow loop in
//! [`crate::threadflow`] interprets `NoResource` as a clean thread exit and
//! anything else as an abort.

pub mod dir_ops;
pub mod io_ops;
pub mod limit_ops;
pub mod misc_ops;
pub mod sync_ops;

use crate::error::FlowError;
use crate::stats::{FlowStats, FlowopClass};
use crate::threadflow::Threadflow;
use std::sync::Arc;

/// Outcome of one `run()` call, mirroring §7's three non-fatal cases. A
/// workload/configuration bug is reported as `Err(FlowError)` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowopOutcome {
    Ok,
    NoResource,
    AgainTransient,
}

/// Shared contract every flowop implements.
pub trait Flowop: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError>;
    fn iters(&self) -> u32 {
        1
    }
    fn stats(&self) -> &FlowStats;
    fn class(&self) -> FlowopClass {
        FlowopClass::Other
    }
}

/// Bracket a flowop body with latency timing and stats bookkeeping. `body`
/// returns the outcome plus the (direction, bytes) to record for I/O ops.
pub(crate) fn timed<F>(stats: &FlowStats, class: FlowopClass, body: F) -> Result<FlowopOutcome, FlowError>
where
    F: FnOnce() -> Result<(FlowopOutcome, Option<crate::stats::IoDirection>, u64), FlowError>,
{
    let start = stats.begin_op();
    let (outcome, direction, bytes) = body()?;
    stats.end_op(start, class, direction, bytes);
    Ok(outcome)
}

/// A name-resolved target: either a single flowop by name or every flowop
/// sharing that name (multiple thread instances of the same definition).
pub struct ResolvedTargets<T> {
    pub targets: Vec<Arc<T>>,
}

impl<T> ResolvedTargets<T> {
    pub fn new(targets: Vec<Arc<T>>) -> Self {
        Self { targets }
    }
}

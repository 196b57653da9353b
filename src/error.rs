//! Error taxonomy for the flowop execution engine
//!
//! The engine distinguishes four kinds of failure, mirrored here as `FlowError`
//! variants: a transient device error that the calling loop should shrug off,
//! structural exhaustion ("no entry left to pick") that should end the thread
//! cleanly, a workload/configuration bug that should abort the whole run, and
//! a fatal resource-exhaustion condition in the shared region that should
//! abort immediately without attempting a final snapshot.
//!
//! Call sites that just want an error boundary (builder, controller, public
//! API) use [`crate::Result`], the `anyhow::Result` alias re-exported from the
//! crate root; call sites inside the flowop dispatch loop match on `FlowError`
//! directly so they can tell `NoResource` apart from `Error`.

use std::fmt;

/// The engine's concrete error type.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("out of slots for pool kind {0}")]
    OutOfSlots(&'static str),

    #[error("string arena exhausted")]
    StringArenaFull,

    #[error("unset variable: {0}")]
    UnsetVariable(String),

    #[error("fileset not found: {0}")]
    NoSuchFileset(String),

    #[error("flowop requires attribute: {0}")]
    MissingAttribute(&'static str),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("lock poisoned and could not be recovered: {0}")]
    Inconsistent(&'static str),

    #[error("pick found no matching entry in fileset {0}")]
    NoResource(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker panicked: {0}")]
    WorkerPanic(String),
}

impl FlowError {
    /// Classify this error the way §7 of the design classifies run() returns:
    /// `NoResource`-kind failures end the thread cleanly, everything else is
    /// an `Error`-kind abort.
    pub fn is_no_resource(&self) -> bool {
        matches!(self, FlowError::NoResource(_))
    }
}

/// The global abort state polled at every flowop boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortKind {
    None,
    Done,
    Error,
    Resource,
    Fini,
}

impl AbortKind {
    pub fn is_set(self) -> bool {
        !matches!(self, AbortKind::None)
    }
}

impl fmt::Display for AbortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortKind::None => "none",
            AbortKind::Done => "done",
            AbortKind::Error => "error",
            AbortKind::Resource => "resource",
            AbortKind::Fini => "fini",
        };
        write!(f, "{s}")
    }
}

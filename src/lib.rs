//! flowbench — a synthetic filesystem workload generator
//!
//! A workload declares processes, each spawning threads, each running an
//! ordered list of flowops against one or more pre-materialized filesets.
//! This crate implements the whole pipeline: populate a fileset's directory
//! tree in memory, materialize it on disk, build the flowop graph from a
//! [`config::WorkloadSpec`] via [`builder::WorkloadBuilder`], and run it to
//! completion under [`procflow::Controller`], returning an aggregated
//! [`stats::RunReport`].
//!
//! # Module map
//!
//! - [`avd`] / [`randdist`] — late-bound parameters and the random-variate
//!   engine backing them.
//! - [`fileset`] — directory-tree population, on-disk materialization, and
//!   the `pick`/`unbusy` concurrency protocol.
//! - [`posset`] — precomputed random-position tables for aligned I/O offsets.
//! - [`threadflow`] / [`flowop`] — the per-thread runner and the flowop
//!   library (`io_ops`, `dir_ops`, `sync_ops`, `limit_ops`, `misc_ops`).
//! - [`procflow`] — the controller that spawns, runs, and joins every
//!   declared process/thread instance.
//! - [`eventgen`] — the token-bucket rate limiter shared by `eventlimit` and
//!   friends.
//! - [`customvar`] — the custom-variable plugin host contract.
//! - [`region`] — the shared, slot-indexed substrate every worker reaches
//!   through (`Pool`, `RunState`).
//! - [`stats`] / [`logging`] / [`error`] — the ambient stack: per-flowop
//!   statistics and snapshotting, the log sink, and the error taxonomy.
//! - [`config`] / [`builder`] — the declarative `WorkloadSpec` (TOML via
//!   serde) and the typed builder that materializes it into a runnable graph.

pub mod avd;
pub mod builder;
pub mod config;
pub mod customvar;
pub mod error;
pub mod eventgen;
pub mod fileset;
pub mod flowop;
pub mod logging;
pub mod posset;
pub mod procflow;
pub mod randdist;
pub mod region;
pub mod stats;
pub mod threadflow;

pub use builder::WorkloadBuilder;
pub use config::WorkloadSpec;
pub use procflow::Controller;
pub use stats::RunReport;

/// Result type used throughout flowbench's outer (builder/controller) API
/// boundary; flowop dispatch internals use [`error::FlowError`] directly.
pub type Result<T> = anyhow::Result<T>;

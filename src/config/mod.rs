//! Declarative workload description (§6 "consumed from the parser")
//!
//! A hypothetical front-end for this crate's domain-specific grammar would
//! emit a stream of construction calls; this crate instead exposes that
//! stream as a typed builder API ([`crate::builder::WorkloadBuilder`]) plus
//! this module's [`WorkloadSpec`], a serde-deserializable TOML document that
//! captures the same information declaratively. [`toml`] round-trips a spec
//! to/from text; [`validator`] checks referential integrity (fileset names,
//! fd-slot wiring, target names) before it ever reaches the builder.

pub mod toml;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::avd::Avd;

/// Either a literal value or a `$name` reference into the workload's
/// variable table, as written in a TOML document. `$`-prefixed strings are
/// variable references; everything else is a literal.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AvdSpec {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
}

impl AvdSpec {
    pub fn into_avd(self) -> Avd {
        match self {
            AvdSpec::Bool(b) => Avd::bool(b),
            AvdSpec::Int(i) => Avd::int(i),
            AvdSpec::Double(d) => Avd::double(d),
            AvdSpec::Str(s) => match s.strip_prefix('$') {
                Some(name) => Avd::var_ref(name),
                None => Avd::string(s),
            },
        }
    }
}

impl Default for AvdSpec {
    fn default() -> Self {
        AvdSpec::Int(0)
    }
}

fn default_one_u32() -> u32 {
    1
}
fn default_mean_width() -> f64 {
    4.0
}
fn default_one_i64() -> i64 {
    1
}
fn default_gamma_shape() -> f64 {
    1.5
}

/// One declared fileset (§4.4).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesetSpec {
    pub name: String,
    pub path: PathBuf,
    pub entries: u64,
    #[serde(default)]
    pub leafdirs: u64,
    #[serde(default = "default_mean_width")]
    pub mean_width: f64,
    #[serde(default)]
    pub dir_gamma_permille: i64,
    #[serde(default)]
    pub size_mean: f64,
    #[serde(default)]
    pub size_gamma_permille: i64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub prealloc_percent: u32,
    #[serde(default)]
    pub reuse: bool,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub preallocate: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub write_only: bool,
}

/// One segment of a tabular RV (§4.3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableSegmentSpec {
    pub percent: f64,
    pub min: f64,
    pub max: f64,
}

/// Distribution shape for a `Variable::Random` binding.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RandModeSpec {
    Uniform,
    Gamma,
    Table,
}

/// A random-variate-bound variable declaration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RandVarSpec {
    #[serde(default)]
    pub mode: Option<RandModeSpec>,
    pub seed: Option<u64>,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub round: f64,
    #[serde(default)]
    pub mean: f64,
    #[serde(default = "default_gamma_shape")]
    pub gamma: f64,
    #[serde(default)]
    pub table: Vec<TableSegmentSpec>,
}

/// One named variable binding (§4.2).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariableSpec {
    Bool { name: String, value: bool },
    Int { name: String, value: i64 },
    Double { name: String, value: f64 },
    Str { name: String, value: String },
    Random { name: String, dist: RandVarSpec },
}

impl VariableSpec {
    pub fn name(&self) -> &str {
        match self {
            VariableSpec::Bool { name, .. }
            | VariableSpec::Int { name, .. }
            | VariableSpec::Double { name, .. }
            | VariableSpec::Str { name, .. }
            | VariableSpec::Random { name, .. } => name,
        }
    }
}

/// One flowop in a threadflow's ordered list (§4.5), tagged by `op`. Fields
/// not meaningful to a given op are simply absent from that variant.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FlowopSpec {
    Read {
        fd: usize,
        #[serde(default)]
        iosize: AvdSpec,
        #[serde(default)]
        wss: AvdSpec,
        #[serde(default)]
        random: AvdSpec,
        #[serde(default = "default_one_u32")]
        iters: u32,
    },
    Write {
        fd: usize,
        #[serde(default)]
        iosize: AvdSpec,
        #[serde(default)]
        wss: AvdSpec,
        #[serde(default)]
        random: AvdSpec,
        #[serde(default = "default_one_u32")]
        iters: u32,
    },
    AppendFile {
        fd: usize,
        iosize: AvdSpec,
    },
    AppendFileRand {
        fd: usize,
        iosize: AvdSpec,
    },
    ReadWholeFile {
        fd: usize,
        #[serde(default)]
        iosize: AvdSpec,
    },
    WriteWholeFile {
        fd: usize,
        #[serde(default)]
        iosize: AvdSpec,
        #[serde(default)]
        wss: AvdSpec,
    },
    CreateFile {
        fileset: String,
        fd: usize,
    },
    OpenFile {
        fileset: String,
        fd: usize,
    },
    CloseFile {
        fileset: String,
        fd: usize,
    },
    DeleteFile {
        fileset: String,
        fd: Option<usize>,
    },
    StatFile {
        fileset: String,
        fd: Option<usize>,
    },
    Fsync {
        fd: usize,
    },
    FsyncSet {
        fileset: String,
    },
    MakeDir {
        fileset: String,
    },
    RemoveDir {
        fileset: String,
    },
    OpenDir {
        fileset: String,
        fd: usize,
    },
    ListDir {
        fileset: String,
    },
    Block {
        name: String,
    },
    Wakeup {
        target: String,
    },
    SemBlock {
        name: String,
        #[serde(default = "default_one_i64")]
        value: i64,
        #[serde(default = "default_one_i64")]
        highwater: i64,
    },
    SemPost {
        target: String,
        #[serde(default = "default_one_i64")]
        value: i64,
    },
    Delay {
        seconds: AvdSpec,
    },
    Hog {
        iterations: AvdSpec,
    },
    EventLimit,
    BwLimit {
        target: String,
    },
    OpsLimit {
        target: String,
    },
    IopsLimit {
        target: String,
    },
    FinishOnCount {
        target: String,
        threshold: u64,
    },
    FinishOnBytes {
        target: String,
        threshold: u64,
    },
    Print {
        message: AvdSpec,
    },
    TestRandVar {
        name: String,
        dist: RandVarSpec,
    },
    Ioctl {
        fd: usize,
        request: AvdSpec,
    },
}

/// One declared thread within a process (§4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThreadSpec {
    pub name: String,
    #[serde(default = "default_one_u32")]
    pub instances: u32,
    #[serde(default)]
    pub memsize: usize,
    #[serde(default)]
    pub flowops: Vec<FlowopSpec>,
}

/// One declared process (§4.8).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessSpec {
    pub name: String,
    #[serde(default = "default_one_u32")]
    pub instances: u32,
    #[serde(default)]
    pub threads: Vec<ThreadSpec>,
}

/// Top-level workload description: every fileset, variable, and
/// process/thread/flowop declaration needed to run it end to end.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WorkloadSpec {
    #[serde(default)]
    pub filesets: Vec<FilesetSpec>,
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    #[serde(default)]
    pub processes: Vec<ProcessSpec>,
    #[serde(default)]
    pub eventgen_rate_hz: u64,
    pub run_duration_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avd_spec_dollar_prefix_becomes_varref() {
        match AvdSpec::Str("$iosize".into()).into_avd() {
            Avd::VarRef(name) => assert_eq!(name, "iosize"),
            _ => panic!("expected a VarRef"),
        }
    }

    #[test]
    fn avd_spec_plain_string_stays_literal() {
        match AvdSpec::Str("/mnt/data".into()).into_avd() {
            Avd::Str(s) => assert_eq!(s, "/mnt/data"),
            _ => panic!("expected a literal Str"),
        }
    }

    #[test]
    fn variable_spec_name_matches_every_variant() {
        let v = VariableSpec::Int { name: "n".into(), value: 7 };
        assert_eq!(v.name(), "n");
    }
}

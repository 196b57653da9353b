//! Workload builder: turns a declarative [`WorkloadSpec`] into materialized
//! filesets on disk and a runnable flowop graph
//!
//! This is the typed counterpart of what a DSL front-end would otherwise
//! build directly through constructor calls (§6): one pass over the spec
//! populates and materializes every fileset, binds the global variable
//! table, and then walks each process's threads in declaration order,
//! constructing each flowop and resolving its named cross-references —
//! `block`/`wakeup` gates and `semblock`/`sempost` semaphores scoped to the
//! owning process, and `bwlimit`/`opslimit`/`iopslimit`/`finishoncount`/
//! `finishonbytes` targets resolved against flowops declared earlier in the
//! same thread. [`crate::config::validator::validate`] is run first so the
//! flowop construction below can assume fileset/block/semblock references
//! are already well-formed; only limiter/finish-condition targets are
//! resolved here; a target spec. doesn't validate: if it's unknown, `build`
//! returns an error naming it.

use crate::avd::VariableTable;
use crate::config::{
    FilesetSpec, FlowopSpec, ProcessSpec, RandModeSpec, RandVarSpec, ThreadSpec, VariableSpec,
    WorkloadSpec,
};
use crate::customvar::CustomVarPlugin;
use crate::eventgen::EventGenerator;
use crate::fileset::{
    ondisk,
    populate::{populate, PopulateParams},
    Fileset, FilesetFlags,
};
use crate::flowop::dir_ops::{ListDirOp, MakeDirOp, OpenDirOp, RemoveDirOp};
use crate::flowop::io_ops::{
    AppendFileOp, AppendFileRandOp, CloseFileOp, CreateFileOp, DeleteFileOp, FsyncOp, FsyncSetOp,
    OpenFileOp, ReadOp, ReadWholeFileOp, StatFileOp, WriteOp, WriteWholeFileOp,
};
use crate::flowop::limit_ops::{CounterLimitOp, EventLimitOp, FinishOnOp, LimitMetric};
use crate::flowop::misc_ops::{DelayOp, HogOp, IoctlOp, PrintOp, TestRandVarOp};
use crate::flowop::sync_ops::{BlockOp, Gate, SemBlockOp, SemPostOp, Semaphore, WakeupOp};
use crate::flowop::Flowop;
use crate::logging::Logger;
use crate::procflow::{ProcflowDef, ThreadflowDef};
use crate::randdist::{RandDist, RandMode, RandSource, TableSegment};
use crate::stats::FlowStats;
use crate::Result;
use anyhow::{anyhow, bail, Context};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything [`crate::procflow::Controller::run`] needs, plus the shared
/// handles a caller may want to hold onto across the run (tune the event
/// rate live, log before/after, read back the final variable table).
pub struct BuiltWorkload {
    pub procflows: Vec<ProcflowDef>,
    pub duration: Option<Duration>,
    pub logger: Arc<Logger>,
    pub eventgen: Arc<EventGenerator>,
    pub vars: Arc<VariableTable>,
}

/// Materializes a [`WorkloadSpec`] into filesets on disk and a runnable
/// flowop graph. Construct one builder per workload.
pub struct WorkloadBuilder {
    custom_vars: Mutex<Vec<Arc<dyn CustomVarPlugin>>>,
}

impl WorkloadBuilder {
    pub fn new() -> Self {
        Self { custom_vars: Mutex::new(Vec::new()) }
    }

    /// Register a custom-variable plugin before calling `build`. The
    /// resulting variable table binds it under its own `name()`, exactly as
    /// if a `Variable::Random` had drawn from it — every read through
    /// `Avd::VarRef` calls `next_value()` fresh.
    pub fn register_custom_var(&self, plugin: Arc<dyn CustomVarPlugin>) {
        self.custom_vars.lock().unwrap_or_else(|p| p.into_inner()).push(plugin);
    }

    /// Validate, populate, materialize, and wire up `spec` into a
    /// [`BuiltWorkload`] ready for [`crate::procflow::Controller::run`].
    pub fn build(&self, spec: &WorkloadSpec) -> Result<BuiltWorkload> {
        crate::config::validator::validate(spec).context("workload spec failed validation")?;

        let logger = Arc::new(Logger::new());
        let eventgen = Arc::new(EventGenerator::new(spec.eventgen_rate_hz));
        let vars = VariableTable::new();

        for plugin in self.custom_vars.lock().unwrap_or_else(|p| p.into_inner()).iter() {
            vars.set_custom(plugin.name(), plugin.clone());
        }
        bind_variables(&vars, &spec.variables, &logger)?;

        let filesets = build_filesets(&spec.filesets, &logger)?;

        let mut procflows = Vec::with_capacity(spec.processes.len());
        for pspec in &spec.processes {
            procflows.push(build_process(pspec, &filesets, &vars, &eventgen, &logger)?);
        }

        let duration = spec.run_duration_secs.map(Duration::from_secs);
        Ok(BuiltWorkload { procflows, duration, logger, eventgen, vars })
    }
}

impl Default for WorkloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn bind_variables(vars: &VariableTable, specs: &[VariableSpec], logger: &Logger) -> Result<()> {
    for v in specs {
        match v {
            VariableSpec::Bool { name, value } => vars.set_bool(name, *value),
            VariableSpec::Int { name, value } => vars.set_int(name, *value),
            VariableSpec::Double { name, value } => vars.set_double(name, *value),
            VariableSpec::Str { name, value } => vars.set_string(name, value),
            VariableSpec::Random { name, dist } => {
                let rd = build_rand_dist(dist, logger, name)?;
                vars.set_random(name, rd);
            }
        }
    }
    Ok(())
}

fn build_rand_dist(spec: &RandVarSpec, logger: &Logger, label: &str) -> Result<RandDist> {
    let source = match spec.seed {
        Some(seed) => RandSource::Seeded(seed),
        None => RandSource::Urandom,
    };
    let mode = spec.mode.unwrap_or(RandModeSpec::Uniform);
    let dist = match mode {
        RandModeSpec::Uniform => RandDist::new(RandMode::Uniform, source, spec.min, spec.round, spec.mean, spec.gamma),
        RandModeSpec::Gamma => RandDist::new(RandMode::Gamma, source, spec.min, spec.round, spec.mean, spec.gamma),
        RandModeSpec::Table => {
            if spec.table.is_empty() {
                bail!("random variable '{label}': table mode requires at least one segment");
            }
            let segments: Vec<TableSegment> =
                spec.table.iter().map(|t| TableSegment { percent: t.percent, min: t.min, max: t.max }).collect();
            let (dist, underflow) = RandDist::with_table(source, spec.min, spec.round, spec.mean, &segments);
            if underflow {
                logger.error1(
                    &format!("randvar-underflow:{label}"),
                    &format!("random variable '{label}': table segment percents do not sum to 100, padded with the last segment"),
                );
            }
            dist
        }
    };
    Ok(dist)
}

fn build_filesets(specs: &[FilesetSpec], logger: &Logger) -> Result<HashMap<String, Arc<Fileset>>> {
    let mut filesets = HashMap::with_capacity(specs.len());
    for fspec in specs {
        let flags = FilesetFlags {
            reuse: fspec.reuse,
            // Not exposed by FilesetSpec: no workload observed in this
            // crate's scope needs trust_tree/parallel_preallocate/
            // is_single_file/is_raw_device, so they default off (DESIGN.md).
            trust_tree: false,
            cached: fspec.cached,
            preallocate: fspec.preallocate,
            parallel_preallocate: false,
            read_only: fspec.read_only,
            write_only: fspec.write_only,
            is_single_file: false,
            is_raw_device: false,
        };
        let fs = Arc::new(Fileset::new(fspec.name.clone(), fspec.path.clone(), flags, fspec.prealloc_percent, fspec.mean_width));
        let params = PopulateParams {
            target_files: fspec.entries,
            target_leafdirs: fspec.leafdirs,
            mean_width: fspec.mean_width,
            dir_gamma_permille: fspec.dir_gamma_permille,
            size_mean: fspec.size_mean,
            size_gamma_permille: fspec.size_gamma_permille,
            seed: fspec.seed,
        };
        populate(&fs, &params).map_err(|e| anyhow!("populating fileset '{}': {e}", fspec.name))?;
        ondisk::create_on_disk(&fs).map_err(|e| anyhow!("materializing fileset '{}' on disk: {e}", fspec.name))?;
        logger.info(&format!(
            "fileset '{}': {} files, {} leafdirs, {} bytes under {}",
            fspec.name,
            fs.realfiles.load(Ordering::Relaxed),
            fs.realleafdirs.load(Ordering::Relaxed),
            fs.fs_bytes(),
            fspec.path.display(),
        ));
        filesets.insert(fspec.name.clone(), fs);
    }
    Ok(filesets)
}

fn build_process(
    pspec: &ProcessSpec,
    filesets: &HashMap<String, Arc<Fileset>>,
    vars: &Arc<VariableTable>,
    eventgen: &Arc<EventGenerator>,
    logger: &Arc<Logger>,
) -> Result<ProcflowDef> {
    // block/wakeup and semblock/sempost are resolved within a process group,
    // matching validator.rs's scoping; both maps are threaded across every
    // thread in this process so a name declared in one thread is visible to
    // a later thread's reference.
    let mut gates: HashMap<String, Arc<Gate>> = HashMap::new();
    let mut sems: HashMap<String, Arc<Semaphore>> = HashMap::new();

    let mut threads = Vec::with_capacity(pspec.threads.len());
    for tspec in &pspec.threads {
        threads.push(build_thread(tspec, filesets, vars, eventgen, logger, &mut gates, &mut sems)?);
    }

    Ok(ProcflowDef { name: pspec.name.clone(), instances: pspec.instances, threads })
}

fn build_thread(
    tspec: &ThreadSpec,
    filesets: &HashMap<String, Arc<Fileset>>,
    vars: &Arc<VariableTable>,
    eventgen: &Arc<EventGenerator>,
    logger: &Arc<Logger>,
    gates: &mut HashMap<String, Arc<Gate>>,
    sems: &mut HashMap<String, Arc<Semaphore>>,
) -> Result<ThreadflowDef> {
    // bwlimit/opslimit/iopslimit/finishoncount/finishonbytes resolve their
    // target against a flowop declared earlier in this same thread's list,
    // keyed by its kind name (`write`, `read`, `hog`, ...); there is no
    // separate user-assignable flowop name in this spec, so a limiter must
    // follow the op it watches.
    let mut named: HashMap<String, Arc<dyn Flowop>> = HashMap::new();
    let mut flowops: Vec<Arc<dyn Flowop>> = Vec::with_capacity(tspec.flowops.len());
    for fop in &tspec.flowops {
        let built = build_flowop(fop, filesets, vars, eventgen, logger, gates, sems, &named)?;
        named.insert(built.name().to_string(), built.clone());
        flowops.push(built);
    }
    Ok(ThreadflowDef { name: tspec.name.clone(), instances: tspec.instances, memsize: tspec.memsize, flowops })
}

fn resolve_fileset(filesets: &HashMap<String, Arc<Fileset>>, name: &str) -> Result<Arc<Fileset>> {
    filesets.get(name).cloned().ok_or_else(|| anyhow!("flowop references unknown fileset '{name}'"))
}

fn resolve_target(named: &HashMap<String, Arc<dyn Flowop>>, name: &str) -> Result<Arc<dyn Flowop>> {
    named.get(name).cloned().ok_or_else(|| {
        anyhow!("flowop references unknown target '{name}' (a limiter/finish-condition target must name a flowop declared earlier in the same thread)")
    })
}

#[allow(clippy::too_many_arguments)]
fn build_flowop(
    spec: &FlowopSpec,
    filesets: &HashMap<String, Arc<Fileset>>,
    vars: &Arc<VariableTable>,
    eventgen: &Arc<EventGenerator>,
    logger: &Arc<Logger>,
    gates: &mut HashMap<String, Arc<Gate>>,
    sems: &mut HashMap<String, Arc<Semaphore>>,
    named: &HashMap<String, Arc<dyn Flowop>>,
) -> Result<Arc<dyn Flowop>> {
    let op: Arc<dyn Flowop> = match spec {
        FlowopSpec::Read { fd, iosize, wss, random, iters } => Arc::new(ReadOp {
            fd_slot: *fd,
            iosize: iosize.clone().into_avd(),
            wss: wss.clone().into_avd(),
            random: random.clone().into_avd(),
            iters: *iters,
            vars: vars.clone(),
            stats: FlowStats::new(),
        }),
        FlowopSpec::Write { fd, iosize, wss, random, iters } => Arc::new(WriteOp {
            fd_slot: *fd,
            iosize: iosize.clone().into_avd(),
            wss: wss.clone().into_avd(),
            random: random.clone().into_avd(),
            iters: *iters,
            vars: vars.clone(),
            stats: FlowStats::new(),
        }),
        FlowopSpec::AppendFile { fd, iosize } => Arc::new(AppendFileOp {
            fd_slot: *fd,
            iosize: iosize.clone().into_avd(),
            vars: vars.clone(),
            stats: FlowStats::new(),
        }),
        FlowopSpec::AppendFileRand { fd, iosize } => Arc::new(AppendFileRandOp {
            fd_slot: *fd,
            iosize: iosize.clone().into_avd(),
            vars: vars.clone(),
            stats: FlowStats::new(),
        }),
        FlowopSpec::ReadWholeFile { fd, iosize } => Arc::new(ReadWholeFileOp {
            fd_slot: *fd,
            iosize: iosize.clone().into_avd(),
            vars: vars.clone(),
            stats: FlowStats::new(),
        }),
        FlowopSpec::WriteWholeFile { fd, iosize, wss } => Arc::new(WriteWholeFileOp {
            fd_slot: *fd,
            iosize: iosize.clone().into_avd(),
            wss: wss.clone().into_avd(),
            vars: vars.clone(),
            stats: FlowStats::new(),
        }),
        FlowopSpec::CreateFile { fileset, fd } => {
            Arc::new(CreateFileOp { fileset: resolve_fileset(filesets, fileset)?, fd_slot: *fd, stats: FlowStats::new() })
        }
        FlowopSpec::OpenFile { fileset, fd } => {
            Arc::new(OpenFileOp { fileset: resolve_fileset(filesets, fileset)?, fd_slot: *fd, stats: FlowStats::new() })
        }
        FlowopSpec::CloseFile { fileset, fd } => {
            Arc::new(CloseFileOp { fileset: resolve_fileset(filesets, fileset)?, fd_slot: *fd, stats: FlowStats::new() })
        }
        FlowopSpec::DeleteFile { fileset, fd } => {
            Arc::new(DeleteFileOp { fileset: resolve_fileset(filesets, fileset)?, fd_slot: *fd, stats: FlowStats::new() })
        }
        FlowopSpec::StatFile { fileset, fd } => {
            Arc::new(StatFileOp { fileset: resolve_fileset(filesets, fileset)?, fd_slot: *fd, stats: FlowStats::new() })
        }
        FlowopSpec::Fsync { fd } => Arc::new(FsyncOp { fd_slot: *fd, stats: FlowStats::new() }),
        FlowopSpec::FsyncSet { fileset } => {
            resolve_fileset(filesets, fileset)?;
            Arc::new(FsyncSetOp { fileset_name: fileset.clone(), stats: FlowStats::new() })
        }
        FlowopSpec::MakeDir { fileset } => {
            Arc::new(MakeDirOp { fileset: resolve_fileset(filesets, fileset)?, stats: FlowStats::new() })
        }
        FlowopSpec::RemoveDir { fileset } => {
            Arc::new(RemoveDirOp { fileset: resolve_fileset(filesets, fileset)?, stats: FlowStats::new() })
        }
        FlowopSpec::OpenDir { fileset, fd } => {
            Arc::new(OpenDirOp { fileset: resolve_fileset(filesets, fileset)?, fd_slot: *fd, stats: FlowStats::new() })
        }
        FlowopSpec::ListDir { fileset } => {
            Arc::new(ListDirOp { fileset: resolve_fileset(filesets, fileset)?, stats: FlowStats::new() })
        }
        FlowopSpec::Block { name } => {
            let gate = gates.entry(name.clone()).or_insert_with(|| Gate::new(name.clone())).clone();
            Arc::new(BlockOp { gate, stats: FlowStats::new() })
        }
        FlowopSpec::Wakeup { target } => {
            let gate = gates.entry(target.clone()).or_insert_with(|| Gate::new(target.clone())).clone();
            Arc::new(WakeupOp { targets: vec![gate], stats: FlowStats::new() })
        }
        FlowopSpec::SemBlock { name, value, highwater } => {
            let sem = sems.entry(name.clone()).or_insert_with(|| Semaphore::new(name.clone(), *highwater)).clone();
            Arc::new(SemBlockOp { sem, value: *value, stats: FlowStats::new() })
        }
        FlowopSpec::SemPost { target, value } => {
            let sem = sems.entry(target.clone()).or_insert_with(|| Semaphore::new(target.clone(), 0)).clone();
            Arc::new(SemPostOp { targets: vec![sem], value: *value, stats: FlowStats::new() })
        }
        FlowopSpec::Delay { seconds } => {
            Arc::new(DelayOp { seconds: seconds.clone().into_avd(), vars: vars.clone(), stats: FlowStats::new() })
        }
        FlowopSpec::Hog { iterations } => {
            Arc::new(HogOp { iterations: iterations.clone().into_avd(), vars: vars.clone(), stats: FlowStats::new() })
        }
        FlowopSpec::EventLimit => Arc::new(EventLimitOp { eventgen: eventgen.clone(), stats: FlowStats::new() }),
        FlowopSpec::BwLimit { target } => {
            Arc::new(CounterLimitOp::new("bwlimit", eventgen.clone(), resolve_target(named, target)?, LimitMetric::Bytes))
        }
        FlowopSpec::OpsLimit { target } => {
            Arc::new(CounterLimitOp::new("opslimit", eventgen.clone(), resolve_target(named, target)?, LimitMetric::Ops))
        }
        FlowopSpec::IopsLimit { target } => {
            Arc::new(CounterLimitOp::new("iopslimit", eventgen.clone(), resolve_target(named, target)?, LimitMetric::Ops))
        }
        FlowopSpec::FinishOnCount { target, threshold } => Arc::new(FinishOnOp {
            label: "finishoncount",
            target: resolve_target(named, target)?,
            metric: LimitMetric::Ops,
            threshold: *threshold,
            stats: FlowStats::new(),
        }),
        FlowopSpec::FinishOnBytes { target, threshold } => Arc::new(FinishOnOp {
            label: "finishonbytes",
            target: resolve_target(named, target)?,
            metric: LimitMetric::Bytes,
            threshold: *threshold,
            stats: FlowStats::new(),
        }),
        FlowopSpec::Print { message } => {
            Arc::new(PrintOp { message: message.clone().into_avd(), vars: vars.clone(), logger: logger.clone(), stats: FlowStats::new() })
        }
        FlowopSpec::TestRandVar { name, dist } => {
            let rd = build_rand_dist(dist, logger, name)?;
            Arc::new(TestRandVarOp::new(name.clone(), rd, logger.clone()))
        }
        FlowopSpec::Ioctl { fd, request } => {
            Arc::new(IoctlOp { request: request.clone().into_avd(), vars: vars.clone(), fd_slot: *fd, stats: FlowStats::new() })
        }
    };
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AvdSpec;
    use tempfile::tempdir;

    fn fileset_spec(name: &str, path: std::path::PathBuf, entries: u64) -> FilesetSpec {
        FilesetSpec {
            name: name.into(),
            path,
            entries,
            leafdirs: 0,
            mean_width: 4.0,
            dir_gamma_permille: 0,
            size_mean: 4096.0,
            size_gamma_permille: 0,
            seed: 7,
            prealloc_percent: 0,
            reuse: false,
            cached: false,
            preallocate: false,
            read_only: false,
            write_only: false,
        }
    }

    #[test]
    fn builds_fileset_and_thread_graph_from_a_minimal_spec() {
        let dir = tempdir().unwrap();
        let spec = WorkloadSpec {
            filesets: vec![fileset_spec("fs1", dir.path().to_path_buf(), 4)],
            variables: vec![],
            processes: vec![ProcessSpec {
                name: "p".into(),
                instances: 1,
                threads: vec![ThreadSpec {
                    name: "t".into(),
                    instances: 1,
                    memsize: 4096,
                    flowops: vec![
                        FlowopSpec::CreateFile { fileset: "fs1".into(), fd: 0 },
                        FlowopSpec::CloseFile { fileset: "fs1".into(), fd: 0 },
                    ],
                }],
            }],
            eventgen_rate_hz: 0,
            run_duration_secs: None,
        };

        let built = WorkloadBuilder::new().build(&spec).unwrap();
        assert_eq!(built.procflows.len(), 1);
        assert_eq!(built.procflows[0].threads.len(), 1);
        assert_eq!(built.procflows[0].threads[0].flowops.len(), 2);
    }

    #[test]
    fn resolves_bwlimit_target_by_flowop_name_within_a_thread() {
        let dir = tempdir().unwrap();
        let spec = WorkloadSpec {
            filesets: vec![fileset_spec("fs1", dir.path().to_path_buf(), 4)],
            variables: vec![],
            processes: vec![ProcessSpec {
                name: "p".into(),
                instances: 1,
                threads: vec![ThreadSpec {
                    name: "t".into(),
                    instances: 1,
                    memsize: 4096,
                    flowops: vec![
                        FlowopSpec::CreateFile { fileset: "fs1".into(), fd: 0 },
                        FlowopSpec::Write { fd: 0, iosize: AvdSpec::Int(4096), wss: AvdSpec::Int(0), random: AvdSpec::Bool(false), iters: 1 },
                        FlowopSpec::BwLimit { target: "write".into() },
                    ],
                }],
            }],
            eventgen_rate_hz: 100,
            run_duration_secs: None,
        };

        let built = WorkloadBuilder::new().build(&spec).unwrap();
        assert_eq!(built.procflows[0].threads[0].flowops.len(), 3);
    }

    #[test]
    fn rejects_a_limiter_referencing_an_unknown_target() {
        let dir = tempdir().unwrap();
        let spec = WorkloadSpec {
            filesets: vec![fileset_spec("fs1", dir.path().to_path_buf(), 4)],
            variables: vec![],
            processes: vec![ProcessSpec {
                name: "p".into(),
                instances: 1,
                threads: vec![ThreadSpec {
                    name: "t".into(),
                    instances: 1,
                    memsize: 0,
                    flowops: vec![FlowopSpec::FinishOnCount { target: "ghost".into(), threshold: 1 }],
                }],
            }],
            eventgen_rate_hz: 0,
            run_duration_secs: None,
        };

        assert!(WorkloadBuilder::new().build(&spec).is_err());
    }

    #[test]
    fn gates_are_shared_across_threads_in_the_same_process() {
        let dir = tempdir().unwrap();
        let spec = WorkloadSpec {
            filesets: vec![fileset_spec("fs1", dir.path().to_path_buf(), 1)],
            variables: vec![],
            processes: vec![ProcessSpec {
                name: "p".into(),
                instances: 1,
                threads: vec![
                    ThreadSpec {
                        name: "blocker".into(),
                        instances: 1,
                        memsize: 0,
                        flowops: vec![FlowopSpec::Block { name: "gate1".into() }],
                    },
                    ThreadSpec {
                        name: "waker".into(),
                        instances: 1,
                        memsize: 0,
                        flowops: vec![FlowopSpec::Wakeup { target: "gate1".into() }],
                    },
                ],
            }],
            eventgen_rate_hz: 0,
            run_duration_secs: None,
        };

        let built = WorkloadBuilder::new().build(&spec).unwrap();
        assert_eq!(built.procflows[0].threads.len(), 2);
    }

    #[test]
    fn a_built_workload_runs_to_completion_via_finishoncount() {
        let dir = tempdir().unwrap();
        let spec = WorkloadSpec {
            filesets: vec![fileset_spec("fs1", dir.path().to_path_buf(), 1)],
            variables: vec![],
            processes: vec![ProcessSpec {
                name: "p".into(),
                instances: 1,
                threads: vec![ThreadSpec {
                    name: "t".into(),
                    instances: 1,
                    memsize: 0,
                    flowops: vec![
                        FlowopSpec::Hog { iterations: AvdSpec::Int(10) },
                        FlowopSpec::FinishOnCount { target: "hog".into(), threshold: 5 },
                    ],
                }],
            }],
            eventgen_rate_hz: 0,
            run_duration_secs: None,
        };

        let built = WorkloadBuilder::new().build(&spec).unwrap();
        let controller = crate::procflow::Controller::new(built.logger.clone(), built.eventgen.clone());
        let report = controller.run(built.procflows, Some(Duration::from_secs(5))).unwrap();
        report.check_invariants().unwrap();
        assert!(report.global.count >= 5);
    }
}

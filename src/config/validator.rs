//! Referential-integrity checks for a [`super::WorkloadSpec`]
//!
//! Syntax is already enforced by serde at parse time; what's left is
//! cross-reference validity that only makes sense once the whole document
//! is in hand: fileset names a flowop points at actually exist, `block`
//! targets a `wakeup` names exist somewhere in the same process group, and
//! so on. [`super::builder::WorkloadBuilder`] assumes a spec already passed
//! `validate` and does not re-check any of this.

use super::{FlowopSpec, WorkloadSpec};
use anyhow::{bail, Context, Result};
use std::collections::HashSet;

/// Validate a complete workload spec. Returns the first error found.
pub fn validate(spec: &WorkloadSpec) -> Result<()> {
    validate_filesets(spec)?;
    validate_variables(spec)?;
    validate_processes(spec)
}

fn validate_filesets(spec: &WorkloadSpec) -> Result<()> {
    if spec.filesets.is_empty() {
        bail!("at least one fileset must be declared");
    }
    let mut seen = HashSet::new();
    for fs in &spec.filesets {
        if fs.entries == 0 {
            bail!("fileset '{}': entries must be greater than 0", fs.name);
        }
        if fs.read_only && fs.write_only {
            bail!("fileset '{}': read_only and write_only are mutually exclusive", fs.name);
        }
        if !seen.insert(fs.name.clone()) {
            bail!("duplicate fileset name '{}'", fs.name);
        }
    }
    Ok(())
}

fn validate_variables(spec: &WorkloadSpec) -> Result<()> {
    let mut seen = HashSet::new();
    for v in &spec.variables {
        if !seen.insert(v.name().to_string()) {
            bail!("duplicate variable name '{}'", v.name());
        }
    }
    Ok(())
}

fn validate_processes(spec: &WorkloadSpec) -> Result<()> {
    if spec.processes.is_empty() {
        bail!("at least one process must be declared");
    }
    let fileset_names: HashSet<&str> = spec.filesets.iter().map(|f| f.name.as_str()).collect();
    let mut proc_names = HashSet::new();

    for proc in &spec.processes {
        if !proc_names.insert(proc.name.clone()) {
            bail!("duplicate process name '{}'", proc.name);
        }
        if proc.threads.is_empty() {
            bail!("process '{}' declares no threads", proc.name);
        }

        let mut thread_names = HashSet::new();
        // block/wakeup and semblock/sempost targets are resolved within a
        // process group, the same scope procflow.rs spawns instances into.
        let mut block_names = HashSet::new();
        let mut sem_names = HashSet::new();
        let mut wakeup_targets = Vec::new();
        let mut sempost_targets = Vec::new();

        for thread in &proc.threads {
            if !thread_names.insert(thread.name.clone()) {
                bail!("process '{}': duplicate thread name '{}'", proc.name, thread.name);
            }
            for op in &thread.flowops {
                match op {
                    FlowopSpec::Block { name } => {
                        block_names.insert(name.clone());
                    }
                    FlowopSpec::Wakeup { target } => wakeup_targets.push(target.clone()),
                    FlowopSpec::SemBlock { name, .. } => {
                        sem_names.insert(name.clone());
                    }
                    FlowopSpec::SemPost { target, .. } => sempost_targets.push(target.clone()),
                    _ => {}
                }
                check_fileset_ref(proc.name.as_str(), op, &fileset_names)?;
            }
        }

        for target in &wakeup_targets {
            if !block_names.contains(target) {
                bail!("process '{}': wakeup targets unknown block '{}'", proc.name, target);
            }
        }
        for target in &sempost_targets {
            if !sem_names.contains(target) {
                bail!("process '{}': sempost targets unknown semblock '{}'", proc.name, target);
            }
        }
    }
    Ok(())
}

fn check_fileset_ref(proc_name: &str, op: &FlowopSpec, fileset_names: &HashSet<&str>) -> Result<()> {
    let referenced = match op {
        FlowopSpec::CreateFile { fileset, .. }
        | FlowopSpec::OpenFile { fileset, .. }
        | FlowopSpec::CloseFile { fileset, .. }
        | FlowopSpec::DeleteFile { fileset, .. }
        | FlowopSpec::StatFile { fileset, .. }
        | FlowopSpec::FsyncSet { fileset }
        | FlowopSpec::MakeDir { fileset }
        | FlowopSpec::RemoveDir { fileset }
        | FlowopSpec::OpenDir { fileset, .. }
        | FlowopSpec::ListDir { fileset } => Some(fileset.as_str()),
        _ => None,
    };
    if let Some(name) = referenced {
        if !fileset_names.contains(name) {
            bail!("process '{}': flowop references unknown fileset '{}'", proc_name, name);
        }
    }
    Ok(())
}

/// Validate and load in one step, for callers that only have a path.
pub fn load_and_validate(path: &std::path::Path) -> Result<WorkloadSpec> {
    let spec = super::toml::load_file(path).context("loading workload spec")?;
    validate(&spec).context("validating workload spec")?;
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AvdSpec, FilesetSpec, ProcessSpec, ThreadSpec};

    fn minimal_fileset() -> FilesetSpec {
        FilesetSpec {
            name: "fs1".into(),
            path: "/tmp/fs1".into(),
            entries: 10,
            leafdirs: 1,
            mean_width: 4.0,
            dir_gamma_permille: 0,
            size_mean: 0.0,
            size_gamma_permille: 0,
            seed: 1,
            prealloc_percent: 0,
            reuse: false,
            cached: false,
            preallocate: false,
            read_only: false,
            write_only: false,
        }
    }

    #[test]
    fn rejects_a_flowop_referencing_an_unknown_fileset() {
        let spec = WorkloadSpec {
            filesets: vec![minimal_fileset()],
            variables: vec![],
            processes: vec![ProcessSpec {
                name: "p".into(),
                instances: 1,
                threads: vec![ThreadSpec {
                    name: "t".into(),
                    instances: 1,
                    memsize: 0,
                    flowops: vec![FlowopSpec::MakeDir { fileset: "nope".into() }],
                }],
            }],
            eventgen_rate_hz: 0,
            run_duration_secs: None,
        };
        assert!(validate(&spec).is_err());
    }

    #[test]
    fn rejects_a_wakeup_with_no_matching_block() {
        let spec = WorkloadSpec {
            filesets: vec![minimal_fileset()],
            variables: vec![],
            processes: vec![ProcessSpec {
                name: "p".into(),
                instances: 1,
                threads: vec![ThreadSpec {
                    name: "t".into(),
                    instances: 1,
                    memsize: 0,
                    flowops: vec![FlowopSpec::Wakeup { target: "ghost".into() }],
                }],
            }],
            eventgen_rate_hz: 0,
            run_duration_secs: None,
        };
        assert!(validate(&spec).is_err());
    }

    #[test]
    fn accepts_a_well_formed_spec() {
        let spec = WorkloadSpec {
            filesets: vec![minimal_fileset()],
            variables: vec![],
            processes: vec![ProcessSpec {
                name: "p".into(),
                instances: 1,
                threads: vec![ThreadSpec {
                    name: "t".into(),
                    instances: 1,
                    memsize: 0,
                    flowops: vec![
                        FlowopSpec::Block { name: "b1".into() },
                        FlowopSpec::Wakeup { target: "b1".into() },
                        FlowopSpec::Delay { seconds: AvdSpec::Double(0.01) },
                    ],
                }],
            }],
            eventgen_rate_hz: 0,
            run_duration_secs: None,
        };
        validate(&spec).unwrap();
    }
}

//! TOML round-trip for [`super::WorkloadSpec`]
//!
//! Thin wrapper over `toml`/`serde`: the interesting validation work lives
//! in [`super::validator`], not here.

use super::WorkloadSpec;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse a workload spec from a TOML file on disk.
pub fn load_file(path: &Path) -> Result<WorkloadSpec> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read workload file: {}", path.display()))?;
    load_str(&contents).with_context(|| format!("failed to parse workload file: {}", path.display()))
}

/// Parse a workload spec from a TOML string.
pub fn load_str(contents: &str) -> Result<WorkloadSpec> {
    let spec: WorkloadSpec = ::toml::from_str(contents).context("failed to parse workload TOML")?;
    Ok(spec)
}

/// Serialize a workload spec back to TOML text.
pub fn to_string(spec: &WorkloadSpec) -> Result<String> {
    ::toml::to_string_pretty(spec).context("failed to serialize workload spec")
}

/// Serialize a workload spec to a TOML file on disk.
pub fn save_file(path: &Path, spec: &WorkloadSpec) -> Result<()> {
    let text = to_string(spec)?;
    fs::write(path, text).with_context(|| format!("failed to write workload file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilesetSpec, FlowopSpec, ProcessSpec, ThreadSpec};

    #[test]
    fn parses_a_minimal_workload() {
        let toml = r#"
eventgen_rate_hz = 0

[[filesets]]
name = "bigfileset"
path = "/tmp/flowbench"
entries = 1000
leafdirs = 10

[[processes]]
name = "filereader"

[[processes.threads]]
name = "reader"

[[processes.threads.flowops]]
op = "create_file"
fileset = "bigfileset"
fd = 1

[[processes.threads.flowops]]
op = "close_file"
fileset = "bigfileset"
fd = 1
"#;
        let spec = load_str(toml).unwrap();
        assert_eq!(spec.filesets.len(), 1);
        assert_eq!(spec.filesets[0].entries, 1000);
        assert_eq!(spec.processes.len(), 1);
        assert_eq!(spec.processes[0].threads[0].flowops.len(), 2);
        assert!(matches!(spec.processes[0].threads[0].flowops[0], FlowopSpec::CreateFile { .. }));
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let spec = WorkloadSpec {
            filesets: vec![FilesetSpec {
                name: "fs1".into(),
                path: "/tmp/fs1".into(),
                entries: 10,
                leafdirs: 2,
                mean_width: 4.0,
                dir_gamma_permille: 0,
                size_mean: 4096.0,
                size_gamma_permille: 0,
                seed: 1,
                prealloc_percent: 0,
                reuse: false,
                cached: false,
                preallocate: false,
                read_only: false,
                write_only: false,
            }],
            variables: vec![],
            processes: vec![ProcessSpec {
                name: "p".into(),
                instances: 1,
                threads: vec![ThreadSpec {
                    name: "t".into(),
                    instances: 1,
                    memsize: 0,
                    flowops: vec![FlowopSpec::Delay { seconds: super::super::AvdSpec::Double(0.1) }],
                }],
            }],
            eventgen_rate_hz: 0,
            run_duration_secs: Some(10),
        };

        let text = to_string(&spec).unwrap();
        let parsed = load_str(&text).unwrap();
        assert_eq!(parsed.filesets[0].name, "fs1");
        assert_eq!(parsed.run_duration_secs, Some(10));
    }
}

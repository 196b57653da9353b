//! Miscellaneous flowops: delay, hog, print, testrandvar, ioctl
//!
//! None of these touch a fileset; they exist to shape workload timing
//! (`delay`, `hog`) or surface diagnostics (`print`, `testrandvar`). `ioctl`
//! is carried as a narrow, Linux-specific escape hatch onto an open fd.

use super::{Flowop, FlowopOutcome};
use crate::avd::{Avd, VariableTable};
use crate::error::FlowError;
use crate::logging::Logger;
use crate::randdist::RandDist;
use crate::stats::{FlowStats, FlowopClass};
use crate::threadflow::Threadflow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct DelayOp {
    pub seconds: Avd,
    pub vars: Arc<VariableTable>,
    pub stats: FlowStats,
}

impl Flowop for DelayOp {
    fn name(&self) -> &str {
        "delay"
    }
    fn run(&self, _tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Other, || {
            let seconds = self.seconds.get_double(&self.vars)?;
            if seconds > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(seconds));
            }
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
}

pub struct HogOp {
    pub iterations: Avd,
    pub vars: Arc<VariableTable>,
    pub stats: FlowStats,
}

impl Flowop for HogOp {
    fn name(&self) -> &str {
        "hog"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Other, || {
            let iterations = self.iterations.get_int(&self.vars)?.max(0) as u64;
            tf.ensure_scratch(1);
            let mut acc: u8 = tf.scratch[0];
            for _ in 0..iterations {
                acc = acc.wrapping_add(1);
            }
            tf.scratch[0] = acc;
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
}

pub struct PrintOp {
    pub message: Avd,
    pub vars: Arc<VariableTable>,
    pub logger: Arc<Logger>,
    pub stats: FlowStats,
}

impl Flowop for PrintOp {
    fn name(&self) -> &str {
        "print"
    }
    fn run(&self, _tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Other, || {
            let text = self.message.get_string(&self.vars)?;
            self.logger.info(&text);
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
}

/// Running mean/variance of a random variable, reported at destruction via
/// Welford's online algorithm (numerically steadier than the naive
/// sum-of-squares the reference implementation uses, and cheap enough to use
/// unconditionally here).
struct RunningMoments {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningMoments {
    fn new() -> Self {
        Self { count: 0, mean: 0.0, m2: 0.0 }
    }

    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    fn stddev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}

pub struct TestRandVarOp {
    pub dist: Mutex<RandDist>,
    pub name: String,
    pub logger: Arc<Logger>,
    moments: Mutex<RunningMoments>,
    pub stats: FlowStats,
}

impl TestRandVarOp {
    pub fn new(name: impl Into<String>, dist: RandDist, logger: Arc<Logger>) -> Self {
        Self {
            dist: Mutex::new(dist),
            name: name.into(),
            logger,
            moments: Mutex::new(RunningMoments::new()),
            stats: FlowStats::new(),
        }
    }

    /// Snapshot of the running mean/stddev, for the destruct-time log line.
    pub fn summary(&self) -> (f64, f64, u64) {
        let m = self.moments.lock().unwrap_or_else(|p| p.into_inner());
        (m.mean, m.stddev(), m.count)
    }

    pub fn log_summary(&self) {
        let (mean, stddev, count) = self.summary();
        self.logger.info(&format!("{}: {count} samples, mean={mean:.3}, stddev={stddev:.3}", self.name));
    }
}

impl Flowop for TestRandVarOp {
    fn name(&self) -> &str {
        "testrandvar"
    }
    fn run(&self, _tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Other, || {
            let sample = self.dist.lock().unwrap_or_else(|p| p.into_inner()).next();
            self.moments.lock().unwrap_or_else(|p| p.into_inner()).push(sample);
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
}

pub struct IoctlOp {
    pub request: Avd,
    pub vars: Arc<VariableTable>,
    pub fd_slot: usize,
    pub stats: FlowStats,
}

impl Flowop for IoctlOp {
    fn name(&self) -> &str {
        "ioctl"
    }
    fn run(&self, tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Other, || {
            let request = self.request.get_int(&self.vars)?;
            let fd = tf
                .fd(self.fd_slot)
                .ok_or_else(|| FlowError::InvalidParameter("ioctl: no open fd in designated slot".into()))?;
            use std::os::unix::io::AsRawFd;
            let raw = fd.file.as_raw_fd();
            // SAFETY: `raw` is a valid fd owned by this threadflow for the
            // duration of this call; `request` carries no pointer argument
            // in this crate's narrow ioctl surface (see SPEC_FULL.md §10).
            let ret = unsafe { libc::ioctl(raw, request as libc::c_ulong, 0) };
            if ret < 0 {
                return Ok((FlowopOutcome::AgainTransient, None, 0));
            }
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randdist::{RandMode, RandSource};

    #[test]
    fn hog_mutates_scratch_without_panicking() {
        let vars = VariableTable::new();
        let op = HogOp { iterations: Avd::int(1000), vars, stats: FlowStats::new() };
        let mut tf = Threadflow::new("tf", 1, 0);
        assert_eq!(op.run(&mut tf).unwrap(), FlowopOutcome::Ok);
    }

    #[test]
    fn testrandvar_accumulates_moments() {
        let dist = RandDist::new(RandMode::Uniform, RandSource::Seeded(1), 0.0, 0.0, 50.0, 1.0);
        let logger = Arc::new(Logger::new());
        let op = TestRandVarOp::new("r1", dist, logger);
        let mut tf = Threadflow::new("tf", 1, 0);
        for _ in 0..1000 {
            op.run(&mut tf).unwrap();
        }
        let (mean, _stddev, count) = op.summary();
        assert_eq!(count, 1000);
        assert!((40.0..60.0).contains(&mean));
    }
}

//! Per-flowop statistics and snapshot aggregation
//!
//! Every live flowop owns a [`FlowStats`]: atomic counters for op count,
//! read/write split, bytes moved, and a 64-bucket log2 latency histogram.
//! `begin_op`/`end_op` bracket a single `run()` call; `snapshot` walks every
//! live flowop and folds its counters into per-definition-name totals and a
//! single [`GlobalStats`], the library-level analogue of the reference
//! design's `stats snap`/`stats dump` commands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of log2 buckets in a flowop's latency histogram. Bucket `i` holds
/// samples with `floor(log2(latency_ns)) == i`; bucket 63 also catches
/// anything at or above 2^63 ns.
pub const HISTOGRAM_BUCKETS: usize = 64;

/// Whether a flowop counts as an I/O op (splits into rcount/wcount) or not
/// (sync/control ops only bump `count`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowopClass {
    Io,
    Sync,
    Other,
}

/// Read or write, for I/O flowops' rcount/wcount/rbytes/wbytes split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    Read,
    Write,
}

/// Atomic, lock-free per-flowop statistics. Safe to update concurrently from
/// the single thread that owns this flowop instance; read concurrently by
/// `snapshot`.
pub struct FlowStats {
    pub count: AtomicU64,
    pub rcount: AtomicU64,
    pub wcount: AtomicU64,
    pub bytes: AtomicU64,
    pub rbytes: AtomicU64,
    pub wbytes: AtomicU64,
    pub total_latency_ns: AtomicU64,
    pub min_latency_ns: AtomicU64,
    pub max_latency_ns: AtomicU64,
    histogram: [AtomicU64; HISTOGRAM_BUCKETS],
    quiet: AtomicBool,
}

impl FlowStats {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            rcount: AtomicU64::new(0),
            wcount: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            rbytes: AtomicU64::new(0),
            wbytes: AtomicU64::new(0),
            total_latency_ns: AtomicU64::new(0),
            min_latency_ns: AtomicU64::new(u64::MAX),
            max_latency_ns: AtomicU64::new(0),
            histogram: std::array::from_fn(|_| AtomicU64::new(0)),
            quiet: AtomicBool::new(false),
        }
    }

    /// Start timing one `run()` call.
    pub fn begin_op(&self) -> Instant {
        Instant::now()
    }

    /// Finish timing one `run()` call. `class` decides whether `count` alone
    /// is bumped or `rcount`/`wcount` as well; `bytes_io` and `direction` are
    /// only meaningful for I/O flowops.
    pub fn end_op(
        &self,
        start: Instant,
        class: FlowopClass,
        direction: Option<IoDirection>,
        bytes_io: u64,
    ) {
        if self.quiet.load(Ordering::Acquire) {
            return;
        }
        let latency_ns = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;

        self.count.fetch_add(1, Ordering::Relaxed);
        if class == FlowopClass::Io {
            match direction {
                Some(IoDirection::Read) => {
                    self.rcount.fetch_add(1, Ordering::Relaxed);
                    self.rbytes.fetch_add(bytes_io, Ordering::Relaxed);
                }
                Some(IoDirection::Write) => {
                    self.wcount.fetch_add(1, Ordering::Relaxed);
                    self.wbytes.fetch_add(bytes_io, Ordering::Relaxed);
                }
                None => {}
            }
            self.bytes.fetch_add(bytes_io, Ordering::Relaxed);
        }

        self.total_latency_ns.fetch_add(latency_ns, Ordering::Relaxed);
        self.min_latency_ns.fetch_min(latency_ns, Ordering::Relaxed);
        self.max_latency_ns.fetch_max(latency_ns, Ordering::Relaxed);

        let bucket = if latency_ns == 0 {
            0
        } else {
            (63 - latency_ns.leading_zeros()) as usize
        };
        let bucket = bucket.min(HISTOGRAM_BUCKETS - 1);
        self.histogram[bucket].fetch_add(1, Ordering::Relaxed);
    }

    /// Set/clear the quiet flag. While quiet, `end_op` drops samples rather
    /// than racing a concurrent `snapshot`.
    pub fn set_quiet(&self, quiet: bool) {
        self.quiet.store(quiet, Ordering::Release);
    }

    pub fn histogram_sum(&self) -> u64 {
        self.histogram.iter().map(|b| b.load(Ordering::Relaxed)).sum()
    }

    pub fn snapshot_into(&self, acc: &mut FlowTotals) {
        acc.count += self.count.load(Ordering::Relaxed);
        acc.rcount += self.rcount.load(Ordering::Relaxed);
        acc.wcount += self.wcount.load(Ordering::Relaxed);
        acc.bytes += self.bytes.load(Ordering::Relaxed);
        acc.rbytes += self.rbytes.load(Ordering::Relaxed);
        acc.wbytes += self.wbytes.load(Ordering::Relaxed);
        acc.total_latency_ns += self.total_latency_ns.load(Ordering::Relaxed);
        let min = self.min_latency_ns.load(Ordering::Relaxed);
        if min != u64::MAX {
            acc.min_latency_ns = acc.min_latency_ns.min(min);
        }
        acc.max_latency_ns = acc.max_latency_ns.max(self.max_latency_ns.load(Ordering::Relaxed));
        for (i, bucket) in self.histogram.iter().enumerate() {
            acc.histogram[i] += bucket.load(Ordering::Relaxed);
        }
    }

    /// Zero every counter and re-stamp nothing (the epoch lives on
    /// `RunState`); mirrors the reference design's `stats clear`.
    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.rcount.store(0, Ordering::Relaxed);
        self.wcount.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
        self.rbytes.store(0, Ordering::Relaxed);
        self.wbytes.store(0, Ordering::Relaxed);
        self.total_latency_ns.store(0, Ordering::Relaxed);
        self.min_latency_ns.store(u64::MAX, Ordering::Relaxed);
        self.max_latency_ns.store(0, Ordering::Relaxed);
        for b in &self.histogram {
            b.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for FlowStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain-data accumulator used by `snapshot_into` and merged at aggregation
/// time — unlike `FlowStats` this has no atomics since it is only ever owned
/// by the single thread performing the snapshot.
#[derive(Debug, Clone, Default)]
pub struct FlowTotals {
    pub count: u64,
    pub rcount: u64,
    pub wcount: u64,
    pub bytes: u64,
    pub rbytes: u64,
    pub wbytes: u64,
    pub total_latency_ns: u64,
    pub min_latency_ns: u64,
    pub max_latency_ns: u64,
    pub histogram: [u64; HISTOGRAM_BUCKETS],
}

impl FlowTotals {
    pub fn new() -> Self {
        Self {
            min_latency_ns: u64::MAX,
            ..Default::default()
        }
    }

    pub fn merge(&mut self, other: &FlowTotals) {
        self.count += other.count;
        self.rcount += other.rcount;
        self.wcount += other.wcount;
        self.bytes += other.bytes;
        self.rbytes += other.rbytes;
        self.wbytes += other.wbytes;
        self.total_latency_ns += other.total_latency_ns;
        self.min_latency_ns = self.min_latency_ns.min(other.min_latency_ns);
        self.max_latency_ns = self.max_latency_ns.max(other.max_latency_ns);
        for i in 0..HISTOGRAM_BUCKETS {
            self.histogram[i] += other.histogram[i];
        }
    }

    pub fn mean_latency(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_latency_ns / self.count)
        }
    }
}

/// A run-wide snapshot: per-flowop-definition-name totals plus the global
/// sum across every named flowop. Returned by `Controller::snapshot`.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub per_flowop: HashMap<String, FlowTotals>,
    pub global: FlowTotals,
    pub elapsed: Duration,
    pub valid: bool,
}

impl RunReport {
    /// §8 invariant 5/6 checked as assertions a caller can use in tests:
    /// global counts equal the sum over named flowops, and every
    /// histogram sums to its own count.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut summed = FlowTotals::new();
        for totals in self.per_flowop.values() {
            summed.merge(totals);
            let hist_sum: u64 = totals.histogram.iter().sum();
            if hist_sum != totals.count {
                return Err(format!(
                    "histogram sum {hist_sum} != count {} for a flowop",
                    totals.count
                ));
            }
        }
        if summed.count != self.global.count {
            return Err(format!(
                "global count {} != summed per-flowop count {}",
                self.global.count, summed.count
            ));
        }
        if summed.bytes != self.global.bytes {
            return Err(format!(
                "global bytes {} != summed per-flowop bytes {}",
                self.global.bytes, summed.bytes
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_sums_to_count() {
        let stats = FlowStats::new();
        for _ in 0..10 {
            let start = stats.begin_op();
            std::thread::sleep(Duration::from_micros(1));
            stats.end_op(start, FlowopClass::Other, None, 0);
        }
        assert_eq!(stats.histogram_sum(), stats.count.load(Ordering::Relaxed));
        assert_eq!(stats.count.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn io_class_splits_into_rcount_wcount() {
        let stats = FlowStats::new();
        let start = stats.begin_op();
        stats.end_op(start, FlowopClass::Io, Some(IoDirection::Read), 4096);
        let start = stats.begin_op();
        stats.end_op(start, FlowopClass::Io, Some(IoDirection::Write), 8192);
        assert_eq!(stats.rcount.load(Ordering::Relaxed), 1);
        assert_eq!(stats.wcount.load(Ordering::Relaxed), 1);
        assert_eq!(stats.count.load(Ordering::Relaxed), 2);
        assert_eq!(stats.bytes.load(Ordering::Relaxed), 4096 + 8192);
    }

    #[test]
    fn quiet_flag_drops_samples() {
        let stats = FlowStats::new();
        stats.set_quiet(true);
        let start = stats.begin_op();
        stats.end_op(start, FlowopClass::Other, None, 0);
        assert_eq!(stats.count.load(Ordering::Relaxed), 0);
        stats.set_quiet(false);
        let start = stats.begin_op();
        stats.end_op(start, FlowopClass::Other, None, 0);
        assert_eq!(stats.count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn clear_zeros_everything() {
        let stats = FlowStats::new();
        let start = stats.begin_op();
        stats.end_op(start, FlowopClass::Io, Some(IoDirection::Write), 100);
        stats.clear();
        assert_eq!(stats.count.load(Ordering::Relaxed), 0);
        assert_eq!(stats.histogram_sum(), 0);
    }

    #[test]
    fn report_invariants_hold_for_consistent_data() {
        let mut report = RunReport::default();
        let mut t = FlowTotals::new();
        t.count = 5;
        t.bytes = 100;
        t.histogram[0] = 5;
        report.per_flowop.insert("write1".into(), t.clone());
        report.global.merge(&t);
        assert!(report.check_invariants().is_ok());
    }
}

//! Random-variate engine: uniform, gamma and tabular piecewise distributions
//!
//! Feeds both fileset population (file sizes, directory depth/width) and
//! flowop parameters (iosize, offsets) with a `next() -> f64` contract. Three
//! modes are supported, matching the reference design: a straightforward
//! uniform draw, a gamma-distributed draw (Knuth's rejection algorithm G for
//! shape <= 1, the tangent-transform algorithm A otherwise), and a
//! precomputed 100-bucket table for arbitrary piecewise distributions.
//!
//! # Example
//!
//! ```
//! use flowbench::randdist::{RandDist, RandMode, RandSource};
//!
//! let mut dist = RandDist::new(RandMode::Uniform, RandSource::Seeded(7), 0.0, 0.0, 50.0, 1.5);
//! let sample = dist.next();
//! assert!(sample >= 0.0);
//! ```

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// One segment of a tabular distribution, as supplied by the workload
/// description: `percent` of draws land in `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct TableSegment {
    pub percent: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy)]
struct TableBucket {
    base: f64,
    range: f64,
}

/// Source of randomness backing a [`RandDist`].
#[derive(Debug, Clone, Copy)]
pub enum RandSource {
    /// Seedable PRNG — deterministic and reproducible across runs, used
    /// whenever the workload pins a seed.
    Seeded(u64),
    /// OS entropy, via `rand`'s thread-local RNG. Not reproducible.
    Urandom,
}

/// Distribution shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RandMode {
    Uniform,
    Gamma,
    Table,
}

enum RngImpl {
    Seeded(Xoshiro256PlusPlus),
    Urandom,
}

impl RngImpl {
    fn uniform01(&mut self) -> f64 {
        match self {
            RngImpl::Seeded(r) => r.gen_range(0.0..1.0),
            RngImpl::Urandom => rand::thread_rng().gen_range(0.0..1.0),
        }
    }
}

/// A random variate generator. `min`/`round`/`mean` are post-processing
/// parameters applied identically regardless of `mode`.
pub struct RandDist {
    mode: RandMode,
    rng: RngImpl,
    min: f64,
    round: f64,
    mean: f64,
    gamma_shape: f64,
    table: Vec<TableBucket>,
}

impl RandDist {
    pub fn new(mode: RandMode, source: RandSource, min: f64, round: f64, mean: f64, gamma_shape: f64) -> Self {
        let rng = match source {
            RandSource::Seeded(seed) => RngImpl::Seeded(Xoshiro256PlusPlus::seed_from_u64(seed)),
            RandSource::Urandom => RngImpl::Urandom,
        };
        Self {
            mode,
            rng,
            min,
            round,
            mean,
            gamma_shape,
            table: Vec::new(),
        }
    }

    /// Build a table-mode distribution from workload-declared segments. Per
    /// §4.3: compute the table mean as `sum((seg.min+seg.max)/2 * percent)`;
    /// if the workload declared `mean == 0`, adopt `table_mean / 100`.
    /// Segments whose percents don't sum to 100 are logged once (via the
    /// caller) and the table is padded by repeating the last segment, a
    /// deliberate decision recorded in `DESIGN.md` for an otherwise-ambiguous
    /// reference behavior.
    pub fn with_table(
        source: RandSource,
        min: f64,
        round: f64,
        mut mean: f64,
        segments: &[TableSegment],
    ) -> (Self, bool) {
        let mut underflow = false;
        let total_percent: f64 = segments.iter().map(|s| s.percent).sum();
        if (total_percent - 100.0).abs() > 0.01 {
            underflow = true;
        }

        let table_mean: f64 = segments
            .iter()
            .map(|s| (s.min + s.max) / 2.0 * s.percent)
            .sum::<f64>()
            / 100.0;
        if mean == 0.0 {
            mean = table_mean;
        }

        // Build 100 raw (base, range) buckets from the percent-weighted
        // segments, then normalize to min 0, mean 1.
        let mut raw: Vec<(f64, f64)> = Vec::with_capacity(100);
        for seg in segments {
            let n = seg.percent.round().max(0.0) as usize;
            for _ in 0..n {
                raw.push((seg.min, seg.max - seg.min));
            }
        }
        if let Some(&last) = raw.last() {
            while raw.len() < 100 {
                raw.push(last);
            }
        } else {
            raw.push((0.0, 0.0));
            while raw.len() < 100 {
                raw.push((0.0, 0.0));
            }
        }
        raw.truncate(100);

        let table_min = raw.iter().map(|(b, _)| *b).fold(f64::INFINITY, f64::min);
        let norm_mean = if table_mean == 0.0 { 1.0 } else { table_mean };
        let table = raw
            .into_iter()
            .map(|(base, range)| TableBucket {
                base: (base - table_min) / norm_mean,
                range: range / norm_mean,
            })
            .collect();

        let rng = match source {
            RandSource::Seeded(seed) => RngImpl::Seeded(Xoshiro256PlusPlus::seed_from_u64(seed)),
            RandSource::Urandom => RngImpl::Urandom,
        };

        (
            Self {
                mode: RandMode::Table,
                rng,
                min,
                round,
                mean,
                gamma_shape: 1.0,
                table,
            },
            underflow,
        )
    }

    fn raw_uniform(&mut self) -> f64 {
        let u = self.rng.uniform01();
        u * (2.0 * (self.mean - self.min)) + self.min
    }

    /// Knuth TAOCP Vol 2, Algorithm A (shape > 1) / Algorithm G (shape <= 1).
    fn raw_gamma(&mut self) -> f64 {
        let shape = self.gamma_shape.max(1e-6);
        let x = if shape <= 1.0 {
            self.gamma_rejection_g(shape)
        } else {
            self.gamma_tangent_a(shape)
        };
        let b = (self.mean - self.min) / shape;
        b * x + self.min
    }

    fn gamma_rejection_g(&mut self, shape: f64) -> f64 {
        let e = std::f64::consts::E;
        let p = e / (shape + e);
        loop {
            let u1 = self.rng.uniform01();
            let u2 = self.rng.uniform01();
            if u1 <= p {
                let x = (u1 / p).powf(1.0 / shape);
                if u2 <= (-x).exp() {
                    return x;
                }
            } else {
                let x = 1.0 - (1.0 - (u1 - p) / (1.0 - p)).ln();
                if u2 <= x.powf(shape - 1.0) {
                    return x;
                }
            }
        }
    }

    fn gamma_tangent_a(&mut self, shape: f64) -> f64 {
        let a = 1.0 / (2.0 * shape - 1.0).sqrt();
        let b = shape - (4.0f64).ln();
        let q = shape + 1.0 / a;
        let theta = 4.5;
        let d = 1.0 + (4.5f64).ln();
        loop {
            let u1 = self.rng.uniform01();
            let u2 = self.rng.uniform01();
            let v = a * (u1 / (1.0 - u1)).ln();
            let x = shape * v.exp();
            let z = u1 * u1 * u2;
            let w = b + q * v - x;
            if w + d - theta * z >= 0.0 || w >= z.ln() {
                return x;
            }
        }
    }

    fn raw_table(&mut self) -> f64 {
        if self.table.is_empty() {
            return self.min;
        }
        let u = self.rng.uniform01();
        let scaled = u * 100.0;
        let index = (scaled.floor() as usize).min(99);
        let frac = scaled - scaled.floor();
        let bucket = self.table[index];
        (bucket.base + bucket.range * frac) * (self.mean - self.min) + self.min
    }

    /// Draw the next sample, applying `round` post-processing if set.
    pub fn next(&mut self) -> f64 {
        let raw = match self.mode {
            RandMode::Uniform => self.raw_uniform(),
            RandMode::Gamma => self.raw_gamma(),
            RandMode::Table => self.raw_table(),
        };
        if self.round > 0.0 {
            (raw / self.round).round() * self.round
        } else {
            raw
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.next().max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_is_reproducible_with_seed() {
        let mut a = RandDist::new(RandMode::Uniform, RandSource::Seeded(42), 0.0, 0.0, 50.0, 1.0);
        let mut b = RandDist::new(RandMode::Uniform, RandSource::Seeded(42), 0.0, 0.0, 50.0, 1.0);
        for _ in 0..100 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn uniform_mean_and_bound_hold_over_many_samples() {
        let mut dist = RandDist::new(RandMode::Uniform, RandSource::Seeded(1), 0.0, 0.0, 50.0, 1.0);
        let n = 200_000;
        let mut sum = 0.0;
        let mut max_seen = 0.0f64;
        for _ in 0..n {
            let s = dist.next();
            sum += s;
            max_seen = max_seen.max(s);
            assert!(s <= 2.0 * 50.0 - 0.0 + 1e-9);
        }
        let mean = sum / n as f64;
        assert!((49.0..=51.0).contains(&mean), "mean was {mean}");
    }

    #[test]
    fn round_snaps_to_multiples() {
        let mut dist = RandDist::new(RandMode::Uniform, RandSource::Seeded(3), 0.0, 4096.0, 50000.0, 1.0);
        for _ in 0..50 {
            let s = dist.next();
            assert_eq!((s / 4096.0).round() * 4096.0, s);
        }
    }

    #[test]
    fn table_mode_respects_segment_ranges() {
        let segments = [
            TableSegment { percent: 50.0, min: 0.0, max: 10.0 },
            TableSegment { percent: 50.0, min: 90.0, max: 100.0 },
        ];
        let (mut dist, underflow) = RandDist::with_table(RandSource::Seeded(9), 0.0, 0.0, 0.0, &segments);
        assert!(!underflow);
        for _ in 0..1000 {
            let s = dist.next();
            assert!(s >= 0.0);
        }
    }

    #[test]
    fn table_underflow_is_flagged() {
        let segments = [TableSegment { percent: 40.0, min: 0.0, max: 1.0 }];
        let (_, underflow) = RandDist::with_table(RandSource::Seeded(1), 0.0, 0.0, 0.0, &segments);
        assert!(underflow);
    }

    #[test]
    fn gamma_samples_are_nonnegative_and_finite() {
        let mut dist = RandDist::new(RandMode::Gamma, RandSource::Seeded(5), 0.0, 0.0, 10.0, 2.0);
        for _ in 0..1000 {
            let s = dist.next();
            assert!(s.is_finite());
        }
    }
}

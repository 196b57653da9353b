//! Position sets: precomputed arrays of aligned random offsets
//!
//! A `Posset` is a named, fixed-size table of file offsets handed out to
//! flowops that want to iterate a pseudo-random access pattern without
//! drawing a fresh variate on every call (so every thread reading the same
//! set walks the same sequence of offsets, a repeatable working set rather
//! than an unbounded random one). Only the `rnd` posset type is implemented
//! — `collection` (positions loaded from an external list) was rejected by
//! the reference implementation too ("not supported at the moment"), so
//! there is no behavior here to carry forward.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Hard cap on entries in one posset, carried over from `POSSET_MAX_ENTRIES`.
pub const POSSET_MAX_ENTRIES: usize = 512;

/// Alignment every generated position is rounded down to, carried over from
/// `POSSET_POS_ALIGNMENT`.
pub const POSSET_POS_ALIGNMENT: u64 = 512;

/// A named table of aligned random positions in `[0, max]`.
pub struct Posset {
    pub name: String,
    pub max: u64,
    positions: Vec<u64>,
}

impl Posset {
    /// Build a `rnd`-type posset with `entries` positions uniformly drawn
    /// over `[0, max]` and aligned down to `POSSET_POS_ALIGNMENT`. `seed`
    /// selects a deterministic PRNG; `None` draws from OS entropy instead.
    pub fn new_random(name: impl Into<String>, max: u64, entries: usize, seed: Option<u64>) -> Result<Self, String> {
        if entries > POSSET_MAX_ENTRIES {
            return Err(format!(
                "posset entry count {entries} exceeds the maximum of {POSSET_MAX_ENTRIES}"
            ));
        }
        if max == 0 {
            return Err("posset random max must be nonzero".to_string());
        }

        let span = max + POSSET_POS_ALIGNMENT;
        let mut positions = Vec::with_capacity(entries);
        match seed {
            Some(seed) => {
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
                for _ in 0..entries {
                    positions.push(draw_aligned(rng.gen::<f64>(), max, span));
                }
            }
            None => {
                let mut rng = rand::thread_rng();
                for _ in 0..entries {
                    positions.push(draw_aligned(rng.gen::<f64>(), max, span));
                }
            }
        }

        Ok(Self { name: name.into(), max, positions })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Position at `index`, wrapping modulo the table length so a caller
    /// iterating past the end just repeats the pattern.
    pub fn at(&self, index: u64) -> u64 {
        self.positions[(index as usize) % self.positions.len()]
    }
}

fn draw_aligned(unit: f64, max: u64, span: u64) -> u64 {
    let raw = (unit * u64::MAX as f64) as u64;
    let scaled = raw / (u64::MAX / span.max(1));
    let clamped = scaled.min(max);
    (clamped / POSSET_POS_ALIGNMENT) * POSSET_POS_ALIGNMENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_aligned_and_bounded() {
        let ps = Posset::new_random("p", 1_000_000, 64, Some(5)).unwrap();
        assert_eq!(ps.len(), 64);
        for i in 0..64 {
            let pos = ps.at(i);
            assert!(pos <= 1_000_000);
            assert_eq!(pos % POSSET_POS_ALIGNMENT, 0);
        }
    }

    #[test]
    fn seeded_possets_are_reproducible() {
        let a = Posset::new_random("p", 500_000, 8, Some(42)).unwrap();
        let b = Posset::new_random("p", 500_000, 8, Some(42)).unwrap();
        for i in 0..8 {
            assert_eq!(a.at(i), b.at(i));
        }
    }

    #[test]
    fn at_wraps_modulo_table_length() {
        let ps = Posset::new_random("p", 1000, 4, Some(1)).unwrap();
        assert_eq!(ps.at(0), ps.at(4));
    }

    #[test]
    fn too_many_entries_is_rejected() {
        let err = Posset::new_random("p", 1000, POSSET_MAX_ENTRIES + 1, Some(1)).unwrap_err();
        assert!(err.contains("exceeds"));
    }

    #[test]
    fn zero_max_is_rejected() {
        assert!(Posset::new_random("p", 0, 4, Some(1)).is_err());
    }
}

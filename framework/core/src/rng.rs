use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;

/// A seedable source of pseudo-random choices for a single VU.
///
/// Each VU gets its own source derived from the run seed and the VU number, so that two runs with
/// the same seed make the same sequence of choices per VU regardless of thread scheduling.
#[derive(Debug)]
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Derive the source for a VU from the run seed.
    pub fn for_vu(run_seed: u64, vu: usize) -> Self {
        // SplitMix64 style mixing so that neighbouring VU numbers don't produce correlated streams.
        let mut z = run_seed.wrapping_add((vu as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Self::from_seed(z ^ (z >> 31))
    }

    /// Pick a value uniformly from the inclusive range.
    pub fn in_range(&mut self, range: RangeInclusive<u64>) -> u64 {
        self.rng.gen_range(range)
    }

    /// Pick an element uniformly, `None` if the slice is empty.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }
}

//! # Depth Sort
//!
//! LSD radix sort over 32-bit keys: four 8-bit digit passes, each a
//! histogram, an exclusive prefix sum and a stable scatter into a
//! ping-pong buffer. O(n) with no data-dependent branching, which matters
//! at 10^5 - 10^6 particles.
//!
//! ```text
//! pass 0: keys ──► tmp      (bits  0..8)
//! pass 1: tmp  ──► keys     (bits  8..16)
//! pass 2: keys ──► tmp      (bits 16..24)
//! pass 3: tmp  ──► keys     (bits 24..32)
//! ```

use pyre_shared::Vec3;

use crate::pool::ParticlePool;

/// Bits per digit.
pub const RADIX_BITS: u32 = 8;
/// Buckets per pass.
pub const RADIX_BUCKETS: usize = 1 << RADIX_BITS;
/// Digit passes over a 32-bit key.
pub const RADIX_PASSES: u32 = 32 / RADIX_BITS;

/// Order-preserving `f32` to `u32` map.
///
/// Positive floats get the sign bit set; negative floats are inverted, so
/// unsigned comparison of the results matches float comparison.
#[inline]
#[must_use]
pub fn float_to_sortable(f: f32) -> u32 {
    let u = f.to_bits();
    let mask = (u >> 31).wrapping_neg() | 0x8000_0000;
    u ^ mask
}

/// Back-to-front key: farther particles get smaller keys.
#[inline]
#[must_use]
pub fn depth_key(distance_squared: f32) -> u32 {
    !float_to_sortable(distance_squared)
}

/// Fills `keys`/`indices` with one entry per live particle of `pool`.
pub fn build_depth_keys(pool: &ParticlePool, camera: Vec3, keys: &mut Vec<u32>, indices: &mut Vec<u32>) {
    keys.clear();
    indices.clear();
    for (slot, p) in (0u32..).zip(pool.particles()) {
        if p.is_alive() {
            let d2 = Vec3::from_array(p.position()).distance_squared(camera);
            keys.push(depth_key(d2));
            indices.push(slot);
        }
    }
}

/// Reusable radix sorter; owns the ping-pong scratch.
#[derive(Debug, Default, Clone)]
pub struct RadixSorter {
    keys_tmp: Vec<u32>,
    values_tmp: Vec<u32>,
}

impl RadixSorter {
    /// Empty sorter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            keys_tmp: Vec::new(),
            values_tmp: Vec::new(),
        }
    }

    /// Stable ascending sort of `keys`, permuting `values` alongside.
    ///
    /// # Panics
    ///
    /// Panics if the slices differ in length.
    pub fn sort(&mut self, keys: &mut [u32], values: &mut [u32]) {
        assert_eq!(keys.len(), values.len(), "Keys and values must have equal length");
        let n = keys.len();
        if n < 2 {
            return;
        }
        self.keys_tmp.resize(n, 0);
        self.values_tmp.resize(n, 0);

        for pass in 0..RADIX_PASSES {
            let shift = pass * RADIX_BITS;
            if pass % 2 == 0 {
                radix_pass(keys, values, &mut self.keys_tmp, &mut self.values_tmp, shift);
            } else {
                radix_pass(&self.keys_tmp, &self.values_tmp, keys, values, shift);
            }
        }
    }
}

/// One histogram / prefix / scatter pass.
fn radix_pass(src_keys: &[u32], src_values: &[u32], dst_keys: &mut [u32], dst_values: &mut [u32], shift: u32) {
    let digit = |k: u32| ((k >> shift) as usize) & (RADIX_BUCKETS - 1);

    let mut histogram = [0usize; RADIX_BUCKETS];
    for &k in src_keys {
        histogram[digit(k)] += 1;
    }

    let mut offsets = [0usize; RADIX_BUCKETS];
    let mut running = 0;
    for (offset, count) in offsets.iter_mut().zip(histogram.iter()) {
        *offset = running;
        running += count;
    }

    for (&k, &v) in src_keys.iter().zip(src_values) {
        let bucket = &mut offsets[digit(k)];
        dst_keys[*bucket] = k;
        dst_values[*bucket] = v;
        *bucket += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_sortable_preserves_order() {
        let values = [-1000.0f32, -1.5, -0.0, 0.0, 1e-6, 2.5, 1e9];
        for pair in values.windows(2) {
            assert!(float_to_sortable(pair[0]) <= float_to_sortable(pair[1]), "{pair:?}");
        }
        assert!(float_to_sortable(-2.0) < float_to_sortable(-1.0));
    }

    #[test]
    fn test_depth_key_is_back_to_front() {
        assert!(depth_key(100.0) < depth_key(1.0));
    }

    #[test]
    fn test_radix_sort_random_keys() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let n = 5000u32;
        let mut keys: Vec<u32> = (0..n).map(|_| rng.gen()).collect();
        let original = keys.clone();
        let mut values: Vec<u32> = (0..n).collect();

        RadixSorter::new().sort(&mut keys, &mut values);

        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        let mut seen = vec![false; n as usize];
        for (&k, &v) in keys.iter().zip(&values) {
            assert!(!seen[v as usize], "index {v} repeated");
            seen[v as usize] = true;
            assert_eq!(original[v as usize], k);
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_radix_sort_is_stable() {
        let mut keys = vec![5, 1, 5, 1, 5];
        let mut values = vec![0, 1, 2, 3, 4];
        RadixSorter::new().sort(&mut keys, &mut values);
        assert_eq!(keys, vec![1, 1, 5, 5, 5]);
        assert_eq!(values, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_radix_sort_trivial_inputs() {
        let mut sorter = RadixSorter::new();
        sorter.sort(&mut [], &mut []);
        let mut k = [9];
        let mut v = [0];
        sorter.sort(&mut k, &mut v);
        assert_eq!((k, v), ([9], [0]));
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Random sources for device construction and cycle-to-cycle update noise.

Devices only consume Gaussian and uniform samples through [`DeviceRng`].
[`SimRng`] is the default implementation on top of `rand::rngs::StdRng`.
It is not shared between threads: every concurrent caller owns its own
instance, and [`SimRng::stream`] derives independent per-row streams from one
seed.
*/

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::numeric::DeviceValue;

/// Source of random samples consumed by device models
pub trait DeviceRng<T: DeviceValue> {
    /// Standard normal sample
    fn sample_gauss(&mut self) -> T;

    /// Uniform sample in `[0, 1)`
    fn sample_uniform(&mut self) -> T;
}

impl<T: DeviceValue, R: DeviceRng<T> + ?Sized> DeviceRng<T> for &mut R {
    #[inline]
    fn sample_gauss(&mut self) -> T {
        (**self).sample_gauss()
    }

    #[inline]
    fn sample_uniform(&mut self) -> T {
        (**self).sample_uniform()
    }
}

/// Seedable, clonable RNG used by devices and engines
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: StdRng,
}

impl SimRng {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            inner: StdRng::from_entropy(),
        }
    }

    /// `seed == 0` means "draw from entropy", anything else is reproducible
    pub fn from_construction_seed(seed: u64) -> Self {
        if seed == 0 {
            Self::from_entropy()
        } else {
            Self::seed_from_u64(seed)
        }
    }

    /// Independent stream `stream_id` of `seed`
    ///
    /// Streams with different ids are decorrelated through a splitmix64
    /// finalizer before seeding.
    pub fn stream(seed: u64, stream_id: u64) -> Self {
        Self::seed_from_u64(splitmix64(seed ^ splitmix64(stream_id.wrapping_add(1))))
    }

    /// Raw 64-bit sample (used for seeding derived generators)
    pub fn next_u64(&mut self) -> u64 {
        self.inner.gen()
    }
}

impl<T: DeviceValue> DeviceRng<T> for SimRng {
    #[inline]
    fn sample_gauss(&mut self) -> T {
        let g: f64 = self.inner.sample(StandardNormal);
        T::from_f64(g)
    }

    #[inline]
    fn sample_uniform(&mut self) -> T {
        T::from_f64(self.inner.gen::<f64>())
    }
}

#[inline]
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let mut a = SimRng::seed_from_u64(7);
        let mut b = SimRng::seed_from_u64(7);
        for _ in 0..16 {
            let ga: f32 = a.sample_gauss();
            let gb: f32 = b.sample_gauss();
            assert_eq!(ga, gb);
        }
    }

    #[test]
    fn test_clone_continues_same_stream() {
        let mut a = SimRng::seed_from_u64(11);
        let _: f64 = a.sample_uniform();
        let mut b = a.clone();
        let ua: f64 = a.sample_uniform();
        let ub: f64 = b.sample_uniform();
        assert_eq!(ua, ub);
    }

    #[test]
    fn test_streams_differ() {
        let mut s0 = SimRng::stream(42, 0);
        let mut s1 = SimRng::stream(42, 1);
        assert_ne!(s0.next_u64(), s1.next_u64());
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = SimRng::seed_from_u64(3);
        for _ in 0..1000 {
            let u: f32 = rng.sample_uniform();
            assert!((0.0..=1.0).contains(&u));
        }
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-pulse weight update
//!
//! Pure functions shared by the sparse path, the dense path, and every
//! accelerated kernel. One coincidence moves one weight by one (optionally
//! noisy) step and clips it.

use crate::numeric::{clip, DeviceValue};
use crate::rng::DeviceRng;

/// Per-element constants an update needs, packed the way kernels read them
///
/// Field order is `(min_bound, scale_down, max_bound, scale_up)`, one
/// record per device, laid out row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct ElementParams<T: DeviceValue> {
    pub min_bound: T,
    pub scale_down: T,
    pub max_bound: T,
    pub scale_up: T,
}

/// Apply one coincidence to `w`
///
/// `sign > 0` decrements by `scale_down`, otherwise increments by
/// `scale_up`. With `dw_min_std > 0` exactly one Gaussian sample is drawn
/// and the step becomes `(1 + dw_min_std * g) * scale`; otherwise nothing is
/// drawn. The result is clipped to the element bounds.
///
/// # Example
/// ```
/// use rpu_device::rng::SimRng;
/// use rpu_device::update::{apply_pulse, ElementParams};
///
/// let p = ElementParams { min_bound: -1.0f32, scale_down: 0.1, max_bound: 1.0, scale_up: 0.1 };
/// let mut rng = SimRng::seed_from_u64(0);
/// assert_eq!(apply_pulse(0.95, -1, &p, 0.0, &mut rng), 1.0); // clipped
/// assert_eq!(apply_pulse(0.5, 1, &p, 0.0, &mut rng), 0.4);
/// ```
#[inline(always)]
pub fn apply_pulse<T, R>(w: T, sign: i32, p: &ElementParams<T>, dw_min_std: T, rng: &mut R) -> T
where
    T: DeviceValue,
    R: DeviceRng<T> + ?Sized,
{
    let gain = if dw_min_std > T::zero() {
        T::one() + dw_min_std * rng.sample_gauss()
    } else {
        T::one()
    };
    let w = if sign > 0 {
        w - gain * p.scale_down
    } else {
        w + gain * p.scale_up
    };
    clip(w, p.min_bound, p.max_bound)
}

/// Apply `n` same-signed coincidences to `w`, clipping after each one
#[inline(always)]
pub fn apply_pulses<T, R>(mut w: T, n: u32, sign: i32, p: &ElementParams<T>, dw_min_std: T, rng: &mut R) -> T
where
    T: DeviceValue,
    R: DeviceRng<T> + ?Sized,
{
    for _ in 0..n {
        w = apply_pulse(w, sign, p, dw_min_std, rng);
    }
    w
}

/// Decode a 1-based signed column index into `(column, local sign)`
///
/// A negative entry flips `d_sign`. Zero is not a valid entry.
///
/// # Example
/// ```
/// use rpu_device::update::decode_signed_index;
///
/// assert_eq!(decode_signed_index(3, 1), (2, 1));
/// assert_eq!(decode_signed_index(-1, 1), (0, -1));
/// assert_eq!(decode_signed_index(-4, -1), (3, 1));
/// ```
#[inline(always)]
pub fn decode_signed_index(j_signed: i32, d_sign: i32) -> (usize, i32) {
    debug_assert!(j_signed != 0, "signed column indices are 1-based");
    if j_signed < 0 {
        ((-j_signed - 1) as usize, -d_sign)
    } else {
        ((j_signed - 1) as usize, d_sign)
    }
}

/// Encode `column` as a 1-based signed index
#[inline]
pub fn encode_signed_index(column: usize, negative: bool) -> i32 {
    let j = column as i32 + 1;
    if negative {
        -j
    } else {
        j
    }
}

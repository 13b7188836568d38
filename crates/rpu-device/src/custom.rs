// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Custom Device
//!
//! Constant-step device with multiplicative cycle-to-cycle noise. Each
//! coincidence moves the weight by its element's `scale_down` (positive
//! sign) or `scale_up` (negative sign), scaled by `1 + dw_min_std * g`
//! when noise is enabled, then clips to the element bounds.
//!
//! Dense coincidence counts contribute their sign only.

use ndarray::Array2;

use crate::error::Result;
use crate::numeric::DeviceValue;
use crate::parameters::CustomParameters;
use crate::pulsed::{PulsedDevice, PulsedDeviceState, UpdateRule};
use crate::rng::DeviceRng;
use crate::update::{apply_pulse, decode_signed_index, ElementParams};

/// Update rule of the custom device
#[derive(Debug, Clone, PartialEq)]
pub struct CustomUpdateRule<T: DeviceValue> {
    par: CustomParameters<T>,
}

impl<T: DeviceValue> CustomUpdateRule<T> {
    pub fn new(par: CustomParameters<T>) -> Self {
        Self { par }
    }
}

impl<T: DeviceValue> UpdateRule<T> for CustomUpdateRule<T> {
    type Parameters = CustomParameters<T>;

    fn parameters(&self) -> &CustomParameters<T> {
        &self.par
    }

    fn do_sparse_update<R: DeviceRng<T> + ?Sized>(
        &self,
        weights: &mut Array2<T>,
        state: &PulsedDeviceState<T>,
        i: usize,
        x_signed_indices: &[i32],
        d_sign: i32,
        rng: &mut R,
    ) {
        let dw_min_std = self.par.dw_min_std;
        let scale_down = state.scale_down.row(i);
        let scale_up = state.scale_up.row(i);
        let min_bound = state.min_bound.row(i);
        let max_bound = state.max_bound.row(i);
        let mut w = weights.row_mut(i);

        for &j_signed in x_signed_indices {
            let (j, sign) = decode_signed_index(j_signed, d_sign);
            let p = ElementParams {
                min_bound: min_bound[j],
                scale_down: scale_down[j],
                max_bound: max_bound[j],
                scale_up: scale_up[j],
            };
            w[j] = apply_pulse(w[j], sign, &p, dw_min_std, rng);
        }
    }

    fn do_dense_update<R: DeviceRng<T> + ?Sized>(
        &self,
        weights: &mut Array2<T>,
        state: &PulsedDeviceState<T>,
        coincidences: &[i32],
        rng: &mut R,
    ) {
        let dw_min_std = self.par.dw_min_std;
        let scales = state.scale_down.iter().zip(state.scale_up.iter());
        let bounds = state.min_bound.iter().zip(state.max_bound.iter());

        for (((w, &count), (&scale_down, &scale_up)), (&min_bound, &max_bound)) in
            weights.iter_mut().zip(coincidences).zip(scales).zip(bounds)
        {
            if count == 0 {
                continue;
            }
            let sign = if count < 0 { -1 } else { 1 };
            let p = ElementParams {
                min_bound,
                scale_down,
                max_bound,
                scale_up,
            };
            *w = apply_pulse(*w, sign, &p, dw_min_std, rng);
        }
    }
}

/// Pulsed device driven by [`CustomUpdateRule`]
pub type CustomDevice<T> = PulsedDevice<T, CustomUpdateRule<T>>;

impl<T: DeviceValue> PulsedDevice<T, CustomUpdateRule<T>> {
    /// Build a custom device seeded from `par.pulsed.construction_seed`
    pub fn from_parameters(x_size: usize, d_size: usize, par: CustomParameters<T>) -> Result<Self> {
        Self::construct(x_size, d_size, CustomUpdateRule::new(par))
    }

    /// Build a custom device with an explicit construction RNG
    pub fn with_rng<R: DeviceRng<T> + ?Sized>(
        x_size: usize,
        d_size: usize,
        par: CustomParameters<T>,
        rng: &mut R,
    ) -> Result<Self> {
        Self::new(x_size, d_size, CustomUpdateRule::new(par), rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::DeviceMetaParameter;
    use crate::rng::SimRng;
    use ndarray::array;

    fn deterministic_row(x_size: usize, d_size: usize) -> CustomDevice<f32> {
        let par = CustomParameters::deterministic(0.1, -1.0, 1.0);
        let mut rng = SimRng::seed_from_u64(5);
        CustomDevice::with_rng(x_size, d_size, par, &mut rng).unwrap()
    }

    #[test]
    fn test_ideal_population() {
        let device = deterministic_row(4, 2);
        assert!(device.state().scale_up.iter().all(|&s| (s - 0.1).abs() < 1e-7));
        assert!(device.state().scale_down.iter().all(|&s| (s - 0.1).abs() < 1e-7));
        assert!(device.state().max_bound.iter().all(|&b| b == 1.0));
        assert!(device.state().min_bound.iter().all(|&b| b == -1.0));
        assert_eq!(device.weight_granularity(), device.parameters().weight_granularity());
    }

    #[test]
    fn test_dense_example_scenario() {
        let device = deterministic_row(4, 1);
        let mut weights = array![[0.0f32, 0.95, -0.95, 0.5]];
        let mut rng = SimRng::seed_from_u64(0);

        // positive count decrements, negative count increments
        device.do_dense_update(&mut weights, &[1, -1, 1, 0], &mut rng);

        assert!((weights[[0, 0]] - (-0.1)).abs() < 1e-6);
        assert_eq!(weights[[0, 1]], 1.0); // clipped from 1.05
        assert_eq!(weights[[0, 2]], -1.0); // clipped from -1.05
        assert_eq!(weights[[0, 3]], 0.5);
    }

    #[test]
    fn test_dense_ignores_count_magnitude() {
        let device = deterministic_row(2, 1);
        let mut a = Array2::<f32>::zeros((1, 2));
        let mut b = Array2::<f32>::zeros((1, 2));
        let mut rng = SimRng::seed_from_u64(0);
        device.do_dense_update(&mut a, &[1, -1], &mut rng);
        device.do_dense_update(&mut b, &[7, -30], &mut rng);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sparse_updates_only_addressed_row() {
        let device = deterministic_row(3, 2);
        let mut weights = Array2::<f32>::zeros((2, 3));
        let mut rng = SimRng::seed_from_u64(0);

        // column 0 decremented, column 2 incremented (negative entry flips sign)
        device.do_sparse_update(&mut weights, 1, &[1, -3], 1, &mut rng);

        assert_eq!(weights.row(0).to_vec(), vec![0.0, 0.0, 0.0]);
        assert!((weights[[1, 0]] + 0.1).abs() < 1e-6);
        assert_eq!(weights[[1, 1]], 0.0);
        assert!((weights[[1, 2]] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_empty_list_is_noop() {
        let device = deterministic_row(3, 1);
        let mut weights = array![[0.1f32, 0.2, 0.3]];
        let before = weights.clone();
        let mut rng = SimRng::seed_from_u64(0);
        device.do_sparse_update(&mut weights, 0, &[], 1, &mut rng);
        assert_eq!(weights, before);
    }

    #[test]
    fn test_negative_d_sign_increments() {
        let device = deterministic_row(2, 1);
        let mut weights = Array2::<f32>::zeros((1, 2));
        let mut rng = SimRng::seed_from_u64(0);
        device.do_sparse_update(&mut weights, 0, &[1, 2], -1, &mut rng);
        assert!(weights.iter().all(|&w| (w - 0.1).abs() < 1e-6));
    }
}

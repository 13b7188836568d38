// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Pulsed Device
//!
//! A pulsed device is composed of two parts:
//! - [`PulsedDeviceState`]: per-element arrays (scales, bounds, decay,
//!   diffusion, reset bias) drawn once at construction
//! - an [`UpdateRule`]: the device-specific response to coincidences
//!
//! The weight matrix itself stays with the caller. Every array here has shape
//! `(d_size, x_size)`, matching the weights it describes.

use ndarray::Array2;
use tracing::debug;

use crate::error::{DeviceError, Result};
use crate::numeric::{clip, DeviceValue};
use crate::parameters::{DeviceMetaParameter, PulsedParameters};
use crate::rng::{DeviceRng, SimRng};
use crate::update::ElementParams;

/// Per-element arrays of a pulsed device
#[derive(Debug, Clone, PartialEq)]
pub struct PulsedDeviceState<T: DeviceValue> {
    pub scale_down: Array2<T>,
    pub scale_up: Array2<T>,
    pub min_bound: Array2<T>,
    pub max_bound: Array2<T>,
    /// Per-cycle multiplicative decay toward `reset_bias` (1 = no decay)
    pub decay_scale: Array2<T>,
    pub diffusion_rate: Array2<T>,
    pub reset_bias: Array2<T>,
}

impl<T: DeviceValue> PulsedDeviceState<T> {
    pub fn new(d_size: usize, x_size: usize) -> Self {
        let zeros = Array2::from_elem((d_size, x_size), T::zero());
        Self {
            scale_down: zeros.clone(),
            scale_up: zeros.clone(),
            min_bound: zeros.clone(),
            max_bound: zeros.clone(),
            decay_scale: Array2::from_elem((d_size, x_size), T::one()),
            diffusion_rate: zeros.clone(),
            reset_bias: zeros,
        }
    }

    /// `(d_size, x_size)`
    pub fn shape(&self) -> (usize, usize) {
        self.scale_down.dim()
    }

    #[inline(always)]
    pub fn element(&self, i: usize, j: usize) -> ElementParams<T> {
        ElementParams {
            min_bound: self.min_bound[[i, j]],
            scale_down: self.scale_down[[i, j]],
            max_bound: self.max_bound[[i, j]],
            scale_up: self.scale_up[[i, j]],
        }
    }

    /// Row-major packed copy of the update constants
    pub fn pack(&self) -> Vec<ElementParams<T>> {
        let (d_size, x_size) = self.shape();
        let mut packed = Vec::with_capacity(d_size * x_size);
        for i in 0..d_size {
            for j in 0..x_size {
                packed.push(self.element(i, j));
            }
        }
        packed
    }
}

/// Draw per-element arrays from the base pulsed parameters
///
/// Every device kind starts from this; kinds with extra per-element state
/// populate it afterwards.
pub fn populate_pulsed<T, R>(par: &PulsedParameters<T>, state: &mut PulsedDeviceState<T>, rng: &mut R)
where
    T: DeviceValue,
    R: DeviceRng<T> + ?Sized,
{
    let (d_size, x_size) = state.shape();
    let one = T::one();

    for i in 0..d_size {
        for j in 0..x_size {
            let mut max_bound = par.w_max * (one + par.w_max_dtod * rng.sample_gauss());
            let mut min_bound = par.w_min * (one + par.w_min_dtod * rng.sample_gauss());

            let gain = if par.dw_min_dtod_log_normal {
                (par.dw_min_dtod * rng.sample_gauss()).exp()
            } else {
                one + par.dw_min_dtod * rng.sample_gauss()
            };
            let r = par.up_down + par.up_down_dtod * rng.sample_gauss();
            let (up_bias, down_bias) = if par.up_down > T::zero() {
                (T::zero(), -r)
            } else {
                (r, T::zero())
            };
            let mut scale_up = (up_bias + gain) * par.dw_min;
            let mut scale_down = (down_bias + gain) * par.dw_min;

            if par.enforce_consistency {
                scale_up = scale_up.abs();
                scale_down = scale_down.abs();
                if min_bound > max_bound {
                    core::mem::swap(&mut min_bound, &mut max_bound);
                }
                max_bound = max_bound.abs();
                min_bound = -min_bound.abs();
            }

            let decay_scale = if par.lifetime > T::zero() {
                let lifetime = par.lifetime * (one + par.lifetime_dtod * rng.sample_gauss());
                if lifetime > one {
                    one - one / lifetime
                } else {
                    T::zero()
                }
            } else {
                one
            };

            let diffusion_rate = if par.diffusion > T::zero() {
                let rate = par.diffusion * (one + par.diffusion_dtod * rng.sample_gauss());
                if rate > T::zero() {
                    rate
                } else {
                    T::zero()
                }
            } else {
                T::zero()
            };

            let reset_bias = if par.reset_dtod > T::zero() {
                par.reset + par.reset_dtod * rng.sample_gauss()
            } else {
                par.reset
            };

            state.max_bound[[i, j]] = max_bound;
            state.min_bound[[i, j]] = min_bound;
            state.scale_up[[i, j]] = scale_up;
            state.scale_down[[i, j]] = scale_down;
            state.decay_scale[[i, j]] = decay_scale;
            state.diffusion_rate[[i, j]] = diffusion_rate;
            state.reset_bias[[i, j]] = reset_bias;
        }
    }
}

/// Device-specific response to coincidences
///
/// Implementations are selected when the device array is built and are
/// monomorphized into the update loops.
pub trait UpdateRule<T: DeviceValue>: Clone + Send + Sync {
    type Parameters: DeviceMetaParameter<T>;

    fn parameters(&self) -> &Self::Parameters;

    /// Seed per-element arrays; the default defers to the pulsed base
    fn populate<R: DeviceRng<T> + ?Sized>(&self, state: &mut PulsedDeviceState<T>, rng: &mut R) {
        populate_pulsed(self.parameters().pulsed(), state, rng);
    }

    /// Update the addressed columns of row `i`
    ///
    /// `x_signed_indices` are 1-based signed column indices; a negative entry
    /// flips `d_sign` for that column.
    fn do_sparse_update<R: DeviceRng<T> + ?Sized>(
        &self,
        weights: &mut Array2<T>,
        state: &PulsedDeviceState<T>,
        i: usize,
        x_signed_indices: &[i32],
        d_sign: i32,
        rng: &mut R,
    );

    /// Update every element with a non-zero coincidence count
    ///
    /// `coincidences` covers the weight storage in row-major order.
    fn do_dense_update<R: DeviceRng<T> + ?Sized>(
        &self,
        weights: &mut Array2<T>,
        state: &PulsedDeviceState<T>,
        coincidences: &[i32],
        rng: &mut R,
    );
}

/// Pulsed device: per-element state plus an update rule
#[derive(Debug, Clone, PartialEq)]
pub struct PulsedDevice<T: DeviceValue, U: UpdateRule<T>> {
    x_size: usize,
    d_size: usize,
    rule: U,
    state: PulsedDeviceState<T>,
}

impl<T: DeviceValue, U: UpdateRule<T>> PulsedDevice<T, U> {
    /// Build and populate a device with an explicit construction RNG
    pub fn new<R: DeviceRng<T> + ?Sized>(x_size: usize, d_size: usize, rule: U, rng: &mut R) -> Result<Self> {
        if x_size == 0 || d_size == 0 {
            return Err(DeviceError::EmptyDevice { x_size, d_size });
        }
        rule.parameters().validate()?;

        let mut state = PulsedDeviceState::new(d_size, x_size);
        rule.populate(&mut state, rng);

        debug!(
            "[PULSED-DEVICE] Populated {} ({} x {}, granularity={})",
            rule.parameters().name(),
            d_size,
            x_size,
            rule.parameters().weight_granularity()
        );

        Ok(Self {
            x_size,
            d_size,
            rule,
            state,
        })
    }

    /// Build using the parameters' `construction_seed`
    pub fn construct(x_size: usize, d_size: usize, rule: U) -> Result<Self> {
        let mut rng = SimRng::from_construction_seed(rule.parameters().pulsed().construction_seed);
        Self::new(x_size, d_size, rule, &mut rng)
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn d_size(&self) -> usize {
        self.d_size
    }

    pub fn size(&self) -> usize {
        self.x_size * self.d_size
    }

    pub fn rule(&self) -> &U {
        &self.rule
    }

    pub fn parameters(&self) -> &U::Parameters {
        self.rule.parameters()
    }

    pub fn state(&self) -> &PulsedDeviceState<T> {
        &self.state
    }

    pub fn weight_granularity(&self) -> T {
        self.rule.parameters().weight_granularity()
    }

    /// Check a caller-owned weight matrix against the device shape
    pub fn check_weights(&self, weights: &Array2<T>) -> Result<()> {
        let actual = weights.dim();
        if actual != (self.d_size, self.x_size) {
            return Err(DeviceError::ShapeMismatch {
                expected: (self.d_size, self.x_size),
                actual,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn do_sparse_update<R: DeviceRng<T> + ?Sized>(
        &self,
        weights: &mut Array2<T>,
        i: usize,
        x_signed_indices: &[i32],
        d_sign: i32,
        rng: &mut R,
    ) {
        debug_assert_eq!(weights.dim(), (self.d_size, self.x_size));
        debug_assert!(i < self.d_size);
        self.rule
            .do_sparse_update(weights, &self.state, i, x_signed_indices, d_sign, rng);
    }

    #[inline]
    pub fn do_dense_update<R: DeviceRng<T> + ?Sized>(
        &self,
        weights: &mut Array2<T>,
        coincidences: &[i32],
        rng: &mut R,
    ) {
        debug_assert_eq!(weights.dim(), (self.d_size, self.x_size));
        debug_assert_eq!(coincidences.len(), self.size());
        self.rule.do_dense_update(weights, &self.state, coincidences, rng);
    }

    /// Clip every weight into its element bounds
    pub fn clip_weights(&self, weights: &mut Array2<T>) {
        debug_assert_eq!(weights.dim(), (self.d_size, self.x_size));
        ndarray::Zip::from(weights)
            .and(&self.state.min_bound)
            .and(&self.state.max_bound)
            .for_each(|w, &lo, &hi| *w = clip(*w, lo, hi));
    }

    /// Decay weights toward their reset bias
    ///
    /// `alpha` scales the per-cycle decay (1 = one full cycle). A no-op
    /// when the device has no lifetime.
    pub fn decay_weights(&self, weights: &mut Array2<T>, alpha: T) {
        if !(self.rule.parameters().pulsed().lifetime > T::zero()) {
            return;
        }
        let one = T::one();
        ndarray::Zip::from(weights)
            .and(&self.state.decay_scale)
            .and(&self.state.reset_bias)
            .and(&self.state.min_bound)
            .and(&self.state.max_bound)
            .for_each(|w, &decay, &bias, &lo, &hi| {
                let scale = one - alpha * (one - decay);
                *w = clip((*w - bias) * scale + bias, lo, hi);
            });
    }

    /// Add Gaussian diffusion to every weight
    pub fn diffuse_weights<R: DeviceRng<T> + ?Sized>(&self, weights: &mut Array2<T>, rng: &mut R) {
        if !(self.rule.parameters().pulsed().diffusion > T::zero()) {
            return;
        }
        debug_assert_eq!(weights.dim(), (self.d_size, self.x_size));
        for ((idx, w), &rate) in weights.indexed_iter_mut().zip(self.state.diffusion_rate.iter()) {
            let (lo, hi) = (self.state.min_bound[idx], self.state.max_bound[idx]);
            *w = clip(*w + rate * rng.sample_gauss(), lo, hi);
        }
    }

    /// Reset `n_cols` columns starting at `start_col` (wrapping)
    ///
    /// Each element moves by `alpha` toward its reset bias plus `reset_std`
    /// noise: `w = (1 - alpha) * w + alpha * (bias + reset_std * g)`.
    pub fn reset_cols<R: DeviceRng<T> + ?Sized>(
        &self,
        weights: &mut Array2<T>,
        start_col: usize,
        n_cols: usize,
        alpha: T,
        rng: &mut R,
    ) {
        debug_assert_eq!(weights.dim(), (self.d_size, self.x_size));
        let reset_std = self.rule.parameters().pulsed().reset_std;
        let one = T::one();
        for c in 0..n_cols.min(self.x_size) {
            let j = (start_col + c) % self.x_size;
            for i in 0..self.d_size {
                let noise = if reset_std > T::zero() {
                    reset_std * rng.sample_gauss()
                } else {
                    T::zero()
                };
                let target = self.state.reset_bias[[i, j]] + noise;
                let w = (one - alpha) * weights[[i, j]] + alpha * target;
                weights[[i, j]] = clip(w, self.state.min_bound[[i, j]], self.state.max_bound[[i, j]]);
            }
        }
    }

    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }
}

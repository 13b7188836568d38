// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Pulse Trains
//!
//! Bit-packed stochastic pulse trains for one update batch. Every batch item
//! carries one train per input column (`x`) and one per output row (`d`),
//! each `n_k32` 32-bit words long, plus one sign flag per train.
//!
//! A coincidence between row `i` and column `j` happens wherever both trains
//! fire the same bit; its sign is `sign(x) * sign(d)`. A positive coincidence
//! decrements the weight.

use ndarray::{Array2, ArrayView2};
use rpu_device::{encode_signed_index, DeviceRng, DeviceValue, PulsedDevice, UpdateRule};

use crate::error::{EngineError, Result};
use crate::kernel::UpdateConfig;

/// Train length and probability scales of one stochastic encoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodingScales {
    pub bl: u32,
    pub scale_x: f64,
    pub scale_d: f64,
}

/// Compute train length and probability scales for an update of size `lr`
///
/// The expected number of coincidences times `dw_min` equals `lr * |x| * |d|`.
/// With update management the two scales are balanced by the input and
/// error magnitudes; with BL management (and no fixed BL) short trains are
/// used for small updates.
pub fn encoding_scales(x_abs_max: f64, d_abs_max: f64, lr: f64, dw_min: f64, config: &UpdateConfig) -> EncodingScales {
    let active = x_abs_max > 0.0 && d_abs_max > 0.0;

    let bl = if config.update_bl_management && !config.fixed_bl && active {
        let needed = (lr * x_abs_max * d_abs_max / dw_min).ceil();
        needed.clamp(1.0, config.desired_bl as f64) as u32
    } else {
        config.desired_bl
    };

    let a = (lr / (dw_min * bl as f64)).sqrt();
    let (scale_x, scale_d) = if config.update_management && active {
        let ratio = (d_abs_max / x_abs_max).sqrt();
        (a * ratio, a / ratio)
    } else {
        (a, a)
    };

    EncodingScales { bl, scale_x, scale_d }
}

/// Bit-packed pulse trains of one batch
#[derive(Debug, Clone, PartialEq)]
pub struct PulseTrainBatch {
    m_batch: usize,
    x_size: usize,
    d_size: usize,
    n_k32: usize,
    bl: u32,
    /// `[b][j][k]`
    x_words: Vec<u32>,
    /// `[b][i][k]`
    d_words: Vec<u32>,
    x_negative: Vec<bool>,
    d_negative: Vec<bool>,
}

impl PulseTrainBatch {
    /// All-zero trains (no coincidences)
    pub fn new(m_batch: usize, x_size: usize, d_size: usize, n_k32: usize) -> Self {
        Self {
            m_batch,
            x_size,
            d_size,
            n_k32,
            bl: (n_k32 * 32) as u32,
            x_words: vec![0; m_batch * x_size * n_k32],
            d_words: vec![0; m_batch * d_size * n_k32],
            x_negative: vec![false; m_batch * x_size],
            d_negative: vec![false; m_batch * d_size],
        }
    }

    /// Stochastically encode a batch of inputs `x` (m_batch, x_size) and
    /// errors `d` (m_batch, d_size)
    ///
    /// Bit `t < BL` of a train fires with probability `min(|v| * scale, 1)`.
    pub fn encode<T, R>(
        x: ArrayView2<T>,
        d: ArrayView2<T>,
        lr: f64,
        dw_min: f64,
        config: &UpdateConfig,
        rng: &mut R,
    ) -> Result<Self>
    where
        T: DeviceValue,
        R: DeviceRng<f64> + ?Sized,
    {
        config.validate()?;
        if x.nrows() != d.nrows() {
            return Err(EngineError::ShapeMismatch {
                what: "d batch",
                expected: x.nrows(),
                actual: d.nrows(),
            });
        }
        if !(lr >= 0.0) || !lr.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "learning rate must be finite and non-negative, got {}",
                lr
            )));
        }
        if !(dw_min > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "dw_min must be positive, got {}",
                dw_min
            )));
        }

        let (m_batch, x_size) = x.dim();
        let d_size = d.ncols();
        let mut batch = Self::new(m_batch, x_size, d_size, config.n_k32());
        if lr == 0.0 {
            batch.bl = config.desired_bl;
            return Ok(batch);
        }

        let abs_max = |v: &ArrayView2<T>| v.iter().fold(0.0f64, |m, &e| m.max(e.to_f64().abs()));
        let scales = encoding_scales(abs_max(&x), abs_max(&d), lr, dw_min, config);
        batch.bl = scales.bl;

        for b in 0..m_batch {
            for j in 0..x_size {
                let v = x[[b, j]].to_f64();
                let offset = (b * x_size + j) * batch.n_k32;
                fill_train(&mut batch.x_words[offset..offset + batch.n_k32], v, scales.scale_x, scales.bl, rng);
                batch.x_negative[b * x_size + j] = v < 0.0;
            }
            for i in 0..d_size {
                let v = d[[b, i]].to_f64();
                let offset = (b * d_size + i) * batch.n_k32;
                fill_train(&mut batch.d_words[offset..offset + batch.n_k32], v, scales.scale_d, scales.bl, rng);
                batch.d_negative[b * d_size + i] = v < 0.0;
            }
        }
        Ok(batch)
    }

    pub fn m_batch(&self) -> usize {
        self.m_batch
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn d_size(&self) -> usize {
        self.d_size
    }

    pub fn n_k32(&self) -> usize {
        self.n_k32
    }

    /// Bits per train actually used by the encoding
    pub fn bl(&self) -> u32 {
        self.bl
    }

    pub fn set_x_train(&mut self, b: usize, j: usize, words: &[u32], negative: bool) -> Result<()> {
        self.check_words(words)?;
        let offset = (b * self.x_size + j) * self.n_k32;
        self.x_words[offset..offset + self.n_k32].copy_from_slice(words);
        self.x_negative[b * self.x_size + j] = negative;
        Ok(())
    }

    pub fn set_d_train(&mut self, b: usize, i: usize, words: &[u32], negative: bool) -> Result<()> {
        self.check_words(words)?;
        let offset = (b * self.d_size + i) * self.n_k32;
        self.d_words[offset..offset + self.n_k32].copy_from_slice(words);
        self.d_negative[b * self.d_size + i] = negative;
        Ok(())
    }

    fn check_words(&self, words: &[u32]) -> Result<()> {
        if words.len() != self.n_k32 {
            return Err(EngineError::ShapeMismatch {
                what: "pulse train words",
                expected: self.n_k32,
                actual: words.len(),
            });
        }
        Ok(())
    }

    #[inline(always)]
    pub fn x_train(&self, b: usize, j: usize) -> &[u32] {
        let offset = (b * self.x_size + j) * self.n_k32;
        &self.x_words[offset..offset + self.n_k32]
    }

    #[inline(always)]
    pub fn d_train(&self, b: usize, i: usize) -> &[u32] {
        let offset = (b * self.d_size + i) * self.n_k32;
        &self.d_words[offset..offset + self.n_k32]
    }

    /// +1 or -1
    #[inline(always)]
    pub fn x_sign(&self, b: usize, j: usize) -> i32 {
        if self.x_negative[b * self.x_size + j] {
            -1
        } else {
            1
        }
    }

    #[inline(always)]
    pub fn d_sign(&self, b: usize, i: usize) -> i32 {
        if self.d_negative[b * self.d_size + i] {
            -1
        } else {
            1
        }
    }

    /// Signed coincidence count of element `(i, j)` for batch item `b`
    pub fn coincidence(&self, b: usize, i: usize, j: usize) -> i32 {
        let count: u32 = self
            .x_train(b, j)
            .iter()
            .zip(self.d_train(b, i))
            .map(|(&x, &d)| (x & d).count_ones())
            .sum();
        count as i32 * self.x_sign(b, j) * self.d_sign(b, i)
    }

    /// Total coincidences over the batch
    pub fn total_coincidences(&self) -> u64 {
        let mut total = 0u64;
        for b in 0..self.m_batch {
            for i in 0..self.d_size {
                for j in 0..self.x_size {
                    total += self.coincidence(b, i, j).unsigned_abs() as u64;
                }
            }
        }
        total
    }

    /// Apply the batch through the reference sparse path
    ///
    /// Decomposes the trains into one sparse call per batch item, bit
    /// position, and active row, in that order. Per element this is the same
    /// pulse sequence the accelerated kernels apply.
    pub fn replay_sparse<T, U, R>(
        &self,
        device: &PulsedDevice<T, U>,
        weights: &mut Array2<T>,
        rng: &mut R,
    ) -> Result<u64>
    where
        T: DeviceValue,
        U: UpdateRule<T>,
        R: DeviceRng<T> + ?Sized,
    {
        if device.x_size() != self.x_size || device.d_size() != self.d_size {
            return Err(EngineError::ShapeMismatch {
                what: "device size",
                expected: self.x_size * self.d_size,
                actual: device.size(),
            });
        }
        device.check_weights(weights)?;

        let mut pulses = 0u64;
        let mut indices = Vec::with_capacity(self.x_size);
        for b in 0..self.m_batch {
            for k in 0..self.n_k32 {
                for bit in 0..32 {
                    let mask = 1u32 << bit;
                    indices.clear();
                    for j in 0..self.x_size {
                        if self.x_train(b, j)[k] & mask != 0 {
                            indices.push(encode_signed_index(j, self.x_negative[b * self.x_size + j]));
                        }
                    }
                    if indices.is_empty() {
                        continue;
                    }
                    for i in 0..self.d_size {
                        if self.d_train(b, i)[k] & mask != 0 {
                            device.do_sparse_update(weights, i, &indices, self.d_sign(b, i), rng);
                            pulses += indices.len() as u64;
                        }
                    }
                }
            }
        }
        Ok(pulses)
    }
}

fn fill_train<R: DeviceRng<f64> + ?Sized>(words: &mut [u32], v: f64, scale: f64, bl: u32, rng: &mut R) {
    let p = (v.abs() * scale).min(1.0);
    if !(p > 0.0) {
        return;
    }
    for t in 0..bl as usize {
        if rng.sample_uniform() < p {
            words[t / 32] |= 1 << (t % 32);
        }
    }
}

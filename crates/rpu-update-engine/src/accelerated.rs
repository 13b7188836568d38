// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Accelerated Device
//!
//! Host copy of a pulsed device packed for parallel launches. Element
//! constants are stored as one [`ElementParams`] record per weight, row-major,
//! alongside the device's `dw_min_std`.
//!
//! ## Launch model
//! - Weight storage rows are split into tasks of `rows_per_task` rows and
//!   processed with rayon (`par_chunks_mut`)
//! - Every storage row owns an RNG stream derived from `(seed ^ step, row)`,
//!   so the result does not depend on scheduling
//! - Per element, pulses are applied in batch order, one clip per pulse,
//!   through the same rule the reference engine uses. With noise disabled a
//!   launch is bit-identical to [`PulseTrainBatch::replay_sparse`]

use ndarray::Array2;
use rayon::prelude::*;
use rpu_device::{
    apply_pulses, DeviceError, DeviceMetaParameter, DeviceUpdateType, DeviceValue, ElementParams, PulsedDevice,
    SimRng, UpdateRule,
};
use tracing::{debug, trace};

use crate::error::{EngineError, Result};
use crate::kernel::{self, KernelDescriptor, KernelKind, LaunchLimits, UpdateConfig};
use crate::pulse::PulseTrainBatch;

/// Packed device ready for parallel update launches
#[derive(Debug, Clone)]
pub struct AcceleratedDevice<T: DeviceValue> {
    x_size: usize,
    d_size: usize,
    /// Row-major `(d_size, x_size)`
    params: Vec<ElementParams<T>>,
    dw_min_std: T,
    update_type: DeviceUpdateType,
    seed: u64,
    step: u64,
    limits: LaunchLimits,
}

impl<T: DeviceValue> AcceleratedDevice<T> {
    /// Pack a reference device
    ///
    /// `seed` drives the per-row noise streams of every later launch.
    pub fn from_device<U: UpdateRule<T>>(device: &PulsedDevice<T, U>, seed: u64) -> Self {
        let update_type = device.parameters().update_type();
        debug!(
            "[UPDATE-ENGINE] Packed {} ({} x {}, {}) for accelerated launches",
            device.parameters().name(),
            device.d_size(),
            device.x_size(),
            update_type
        );
        Self {
            x_size: device.x_size(),
            d_size: device.d_size(),
            params: device.state().pack(),
            dw_min_std: device.parameters().dw_min_std(),
            update_type,
            seed,
            step: 0,
            limits: LaunchLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: LaunchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn d_size(&self) -> usize {
        self.d_size
    }

    pub fn dw_min_std(&self) -> T {
        self.dw_min_std
    }

    /// Kernel catalog family of the packed device
    pub fn update_type(&self) -> DeviceUpdateType {
        self.update_type
    }

    pub fn params(&self) -> &[ElementParams<T>] {
        &self.params
    }

    pub fn limits(&self) -> &LaunchLimits {
        &self.limits
    }

    /// Launches performed so far
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Ordered candidate kernels for this device
    pub fn select_update_kernels(
        &self,
        m_batch: usize,
        n_k32: usize,
        use_bo64: bool,
        out_trans: bool,
        config: &UpdateConfig,
    ) -> Vec<KernelDescriptor> {
        let kernels = match self.update_type {
            DeviceUpdateType::ConstantStep => kernel::select_update_kernels(m_batch, n_k32, use_bo64, out_trans, config),
        };
        debug!(
            "[KERNEL-SELECT] {} m_batch={} n_k32={} bo64={} out_trans={} -> [{}]",
            self.update_type,
            m_batch,
            n_k32,
            use_bo64,
            out_trans,
            kernels.iter().map(|k| k.name()).collect::<Vec<_>>().join(", ")
        );
        kernels
    }

    /// First candidate that fits this device's launch limits
    pub fn choose_kernel(&self, kernels: &[KernelDescriptor], m_batch: usize) -> Result<KernelDescriptor> {
        kernel::first_launchable(kernels, &self.limits)
            .copied()
            .ok_or(EngineError::NoLaunchableKernel {
                m_batch,
                n_k32: kernels.first().map(|k| k.n_k32).unwrap_or(0),
            })
    }

    /// Apply `batch` to `weights` with kernel `desc`
    ///
    /// `weights` is `(d_size, x_size)`, or `(x_size, d_size)` when
    /// `desc.out_trans`. Returns the number of pulses applied.
    pub fn launch(&mut self, desc: &KernelDescriptor, weights: &mut Array2<T>, batch: &PulseTrainBatch) -> Result<u64> {
        self.check_launch(desc, weights, batch)?;

        let launch_seed = self.seed ^ self.step;
        self.step += 1;

        let stride = weights.ncols();
        let storage = weights.as_slice_mut().ok_or(EngineError::NonContiguousWeights)?;
        if storage.is_empty() || batch.m_batch() == 0 {
            return Ok(0);
        }

        let ctx = LaunchContext {
            params: &self.params,
            x_size: self.x_size,
            dw_min_std: self.dw_min_std,
            batch,
            out_trans: desc.out_trans,
            stride,
            seed: launch_seed,
        };
        let packed = if desc.kind == KernelKind::Batch64 {
            Some(Packed64::new(&ctx, storage_dims(desc, self.x_size, self.d_size)))
        } else {
            None
        };

        let rows_per_task = desc.rows_per_task.max(1);
        let pulses: u64 = storage
            .par_chunks_mut(stride * rows_per_task)
            .enumerate()
            .map(|(task, chunk)| {
                let first_row = task * rows_per_task;
                match (desc.kind, packed.as_ref()) {
                    (KernelKind::SingleBatch, _) => ctx.single_batch(first_row, chunk),
                    (KernelKind::Batch64, Some(packed)) => ctx.batch64(first_row, chunk, packed),
                    (KernelKind::SharedBatch, _) => ctx.shared_batch(first_row, chunk, desc.batch_chunk),
                    _ => ctx.batch(first_row, chunk),
                }
            })
            .sum();

        trace!(
            "[UPDATE-ENGINE] {} step={} m_batch={} pulses={}",
            desc.name(),
            self.step,
            batch.m_batch(),
            pulses
        );
        Ok(pulses)
    }

    fn check_launch(&self, desc: &KernelDescriptor, weights: &Array2<T>, batch: &PulseTrainBatch) -> Result<()> {
        if batch.x_size() != self.x_size {
            return Err(EngineError::ShapeMismatch {
                what: "x trains",
                expected: self.x_size,
                actual: batch.x_size(),
            });
        }
        if batch.d_size() != self.d_size {
            return Err(EngineError::ShapeMismatch {
                what: "d trains",
                expected: self.d_size,
                actual: batch.d_size(),
            });
        }

        let expected = storage_dims(desc, self.x_size, self.d_size);
        if weights.dim() != expected {
            return Err(DeviceError::ShapeMismatch {
                expected,
                actual: weights.dim(),
            }
            .into());
        }

        let mismatch = |reason: String| EngineError::KernelMismatch {
            kernel: desc.name(),
            reason,
        };
        if desc.n_k32 != batch.n_k32() {
            return Err(mismatch(format!(
                "descriptor n_k32={} but trains have {}",
                desc.n_k32,
                batch.n_k32()
            )));
        }
        if desc.kind == KernelKind::SingleBatch && batch.m_batch() > 1 {
            return Err(mismatch(format!("m_batch={} > 1", batch.m_batch())));
        }
        if desc.kind == KernelKind::Batch64 && desc.n_k32 != 1 {
            return Err(mismatch("64-bit packing needs n_k32 == 1".to_string()));
        }
        if !desc.is_launchable(&self.limits) {
            return Err(mismatch(format!(
                "needs {} cache bytes, limit is {}",
                desc.shared_cache_bytes, self.limits.shared_cache_bytes
            )));
        }
        Ok(())
    }
}

/// `(storage rows, storage cols)` of the weights for `desc`
fn storage_dims(desc: &KernelDescriptor, x_size: usize, d_size: usize) -> (usize, usize) {
    if desc.out_trans {
        (x_size, d_size)
    } else {
        (d_size, x_size)
    }
}

/// Read-only state shared by every task of one launch
struct LaunchContext<'a, T: DeviceValue> {
    params: &'a [ElementParams<T>],
    x_size: usize,
    dw_min_std: T,
    batch: &'a PulseTrainBatch,
    out_trans: bool,
    stride: usize,
    seed: u64,
}

impl<'a, T: DeviceValue> LaunchContext<'a, T> {
    #[inline(always)]
    fn element(&self, storage_row: usize, storage_col: usize) -> &ElementParams<T> {
        let (i, j) = if self.out_trans {
            (storage_col, storage_row)
        } else {
            (storage_row, storage_col)
        };
        &self.params[i * self.x_size + j]
    }

    /// Train addressed by a storage row (d when row-major, x when transposed)
    #[inline(always)]
    fn row_train(&self, b: usize, storage_row: usize) -> (&'a [u32], i32) {
        if self.out_trans {
            (self.batch.x_train(b, storage_row), self.batch.x_sign(b, storage_row))
        } else {
            (self.batch.d_train(b, storage_row), self.batch.d_sign(b, storage_row))
        }
    }

    #[inline(always)]
    fn col_train(&self, b: usize, storage_col: usize) -> (&'a [u32], i32) {
        if self.out_trans {
            (self.batch.d_train(b, storage_col), self.batch.d_sign(b, storage_col))
        } else {
            (self.batch.x_train(b, storage_col), self.batch.x_sign(b, storage_col))
        }
    }

    #[inline(always)]
    fn rng(&self, storage_row: usize) -> SimRng {
        SimRng::stream(self.seed, storage_row as u64)
    }

    /// Apply the coincidences of batch item `b` between two trains
    #[inline(always)]
    fn apply_item(&self, w: &mut T, p: &ElementParams<T>, row: (&[u32], i32), col: (&[u32], i32), rng: &mut SimRng) -> u64 {
        let sign = row.1 * col.1;
        let mut pulses = 0u64;
        for (&a, &b) in row.0.iter().zip(col.0) {
            let n = (a & b).count_ones();
            if n > 0 {
                *w = apply_pulses(*w, n, sign, p, self.dw_min_std, rng);
                pulses += n as u64;
            }
        }
        pulses
    }

    fn single_batch(&self, first_row: usize, chunk: &mut [T]) -> u64 {
        let mut pulses = 0u64;
        for (r, row) in chunk.chunks_mut(self.stride).enumerate() {
            let storage_row = first_row + r;
            let mut rng = self.rng(storage_row);
            let row_train = self.row_train(0, storage_row);
            for (c, w) in row.iter_mut().enumerate() {
                let p = self.element(storage_row, c);
                pulses += self.apply_item(w, p, row_train, self.col_train(0, c), &mut rng);
            }
        }
        pulses
    }

    fn batch(&self, first_row: usize, chunk: &mut [T]) -> u64 {
        let m_batch = self.batch.m_batch();
        let mut pulses = 0u64;
        for (r, row) in chunk.chunks_mut(self.stride).enumerate() {
            let storage_row = first_row + r;
            let mut rng = self.rng(storage_row);
            for (c, w) in row.iter_mut().enumerate() {
                let p = self.element(storage_row, c);
                for b in 0..m_batch {
                    pulses += self.apply_item(w, p, self.row_train(b, storage_row), self.col_train(b, c), &mut rng);
                }
            }
        }
        pulses
    }

    fn batch64(&self, first_row: usize, chunk: &mut [T], packed: &Packed64) -> u64 {
        let m_batch = self.batch.m_batch();
        let pairs = m_batch / 2;
        let mut pulses = 0u64;
        for (r, row) in chunk.chunks_mut(self.stride).enumerate() {
            let storage_row = first_row + r;
            let mut rng = self.rng(storage_row);
            for (c, w) in row.iter_mut().enumerate() {
                let p = self.element(storage_row, c);
                for pair in 0..pairs {
                    let word = packed.row_word(pair, storage_row) & packed.col_word(pair, c);
                    let b = 2 * pair;
                    for (half, item) in [(word as u32, b), ((word >> 32) as u32, b + 1)] {
                        let n = half.count_ones();
                        if n > 0 {
                            let sign = self.row_train(item, storage_row).1 * self.col_train(item, c).1;
                            *w = apply_pulses(*w, n, sign, p, self.dw_min_std, &mut rng);
                            pulses += n as u64;
                        }
                    }
                }
                if m_batch % 2 == 1 {
                    let b = m_batch - 1;
                    pulses += self.apply_item(w, p, self.row_train(b, storage_row), self.col_train(b, c), &mut rng);
                }
            }
        }
        pulses
    }

    fn shared_batch(&self, first_row: usize, chunk: &mut [T], batch_chunk: usize) -> u64 {
        let m_batch = self.batch.m_batch();
        let n_k32 = self.batch.n_k32();
        let batch_chunk = batch_chunk.max(1);
        let rows_in_task = chunk.len() / self.stride;

        let mut rngs: Vec<SimRng> = (0..rows_in_task).map(|r| self.rng(first_row + r)).collect();
        // [r][b_local][k] words and [r][b_local] signs of the row-side trains
        let mut cache_words = vec![0u32; rows_in_task * batch_chunk * n_k32];
        let mut cache_signs = vec![0i8; rows_in_task * batch_chunk];
        let mut pulses = 0u64;

        for b0 in (0..m_batch).step_by(batch_chunk) {
            let b1 = (b0 + batch_chunk).min(m_batch);

            for r in 0..rows_in_task {
                for b in b0..b1 {
                    let (words, sign) = self.row_train(b, first_row + r);
                    let slot = r * batch_chunk + (b - b0);
                    cache_words[slot * n_k32..(slot + 1) * n_k32].copy_from_slice(words);
                    cache_signs[slot] = sign as i8;
                }
            }

            for (r, row) in chunk.chunks_mut(self.stride).enumerate() {
                let storage_row = first_row + r;
                for (c, w) in row.iter_mut().enumerate() {
                    let p = self.element(storage_row, c);
                    for b in b0..b1 {
                        let slot = r * batch_chunk + (b - b0);
                        let row_train = (&cache_words[slot * n_k32..(slot + 1) * n_k32], cache_signs[slot] as i32);
                        pulses += self.apply_item(w, p, row_train, self.col_train(b, c), &mut rngs[r]);
                    }
                }
            }
        }
        pulses
    }
}

/// Row- and column-side trains of batch-item pairs packed into 64-bit words
///
/// Low half holds item `2 * pair`, high half item `2 * pair + 1`.
struct Packed64 {
    rows: usize,
    cols: usize,
    row_words: Vec<u64>,
    col_words: Vec<u64>,
}

impl Packed64 {
    fn new<T: DeviceValue>(ctx: &LaunchContext<'_, T>, (rows, cols): (usize, usize)) -> Self {
        let pairs = ctx.batch.m_batch() / 2;
        Self {
            rows,
            cols,
            row_words: pack_pairs(pairs, rows, |b, r| ctx.row_train(b, r).0),
            col_words: pack_pairs(pairs, cols, |b, c| ctx.col_train(b, c).0),
        }
    }

    #[inline(always)]
    fn row_word(&self, pair: usize, row: usize) -> u64 {
        self.row_words[pair * self.rows + row]
    }

    #[inline(always)]
    fn col_word(&self, pair: usize, col: usize) -> u64 {
        self.col_words[pair * self.cols + col]
    }
}

fn pack_pairs<'t>(pairs: usize, n: usize, train: impl Fn(usize, usize) -> &'t [u32]) -> Vec<u64> {
    let mut words = Vec::with_capacity(pairs * n);
    for pair in 0..pairs {
        for idx in 0..n {
            let lo = train(2 * pair, idx)[0] as u64;
            let hi = train(2 * pair + 1, idx)[0] as u64;
            words.push(lo | (hi << 32));
        }
    }
    words
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Pulsed Updater
//!
//! Caller-side driver of the accelerated engine: encodes a batch into pulse
//! trains, looks up the ordered kernel list, launches the first kernel that
//! fits, and reports what ran.
//!
//! Launches run on the global rayon pool unless a dedicated pool was
//! requested with [`PulsedUpdater::with_threads`].

use ndarray::{Array2, ArrayView2};
use rayon::ThreadPool;
use rpu_device::{DeviceRng, DeviceValue, PulsedDevice, UpdateRule};
use serde::Serialize;
use tracing::info;

use crate::accelerated::AcceleratedDevice;
use crate::cache::{KernelCache, KernelKey};
use crate::error::{EngineError, Result};
use crate::kernel::{KernelKind, LaunchLimits, UpdateConfig};
use crate::pulse::PulseTrainBatch;

/// Outcome of one update launch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub kernel: &'static str,
    pub m_batch: usize,
    pub bl: u32,
    pub pulses: u64,
}

pub struct PulsedUpdater<T: DeviceValue> {
    device: AcceleratedDevice<T>,
    cache: KernelCache,
    pool: Option<ThreadPool>,
    out_trans: bool,
    dw_min: f64,
}

impl<T: DeviceValue> PulsedUpdater<T> {
    pub fn new<U: UpdateRule<T>>(device: &PulsedDevice<T, U>, config: UpdateConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            device: AcceleratedDevice::from_device(device, seed),
            cache: KernelCache::new(config),
            pool: None,
            out_trans: false,
            dw_min: device.weight_granularity().to_f64(),
        })
    }

    /// Run launches on a dedicated pool of `num_threads` threads
    pub fn with_threads(mut self, num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("rpu-update-{}", i))
            .build()
            .map_err(|e| EngineError::ThreadPool(e.to_string()))?;
        info!("[UPDATE-ENGINE] Dedicated update pool with {} threads", pool.current_num_threads());
        self.pool = Some(pool);
        Ok(self)
    }

    /// Weights are stored `[col][row]`
    pub fn with_out_trans(mut self, out_trans: bool) -> Self {
        self.out_trans = out_trans;
        self
    }

    /// Replace the launch limits used to skip kernels
    pub fn with_limits(mut self, limits: LaunchLimits) -> Self {
        self.device = self.device.with_limits(limits);
        self
    }

    pub fn device(&self) -> &AcceleratedDevice<T> {
        &self.device
    }

    pub fn config(&self) -> &UpdateConfig {
        self.cache.config()
    }

    pub fn cache(&self) -> &KernelCache {
        &self.cache
    }

    pub fn set_config(&mut self, config: UpdateConfig) -> Result<()> {
        config.validate()?;
        self.cache.set_config(config);
        Ok(())
    }

    /// Encode `x` (m_batch, x_size) and `d` (m_batch, d_size) and apply them
    pub fn update<R: DeviceRng<f64> + ?Sized>(
        &mut self,
        weights: &mut Array2<T>,
        x: ArrayView2<T>,
        d: ArrayView2<T>,
        lr: f64,
        rng: &mut R,
    ) -> Result<UpdateReport> {
        let batch = PulseTrainBatch::encode(x, d, lr, self.dw_min, self.cache.config(), rng)?;
        self.apply_batch(weights, &batch)
    }

    /// Apply already encoded pulse trains
    pub fn apply_batch(&mut self, weights: &mut Array2<T>, batch: &PulseTrainBatch) -> Result<UpdateReport> {
        let key = KernelKey {
            m_batch: batch.m_batch(),
            n_k32: batch.n_k32(),
            use_bo64: self.cache.config().use_bo64,
            out_trans: self.out_trans,
        };
        let kernels = self.cache.get_or_select(&self.device, key);
        let desc = self.device.choose_kernel(kernels, batch.m_batch())?;

        let device = &mut self.device;
        let pulses = match &self.pool {
            Some(pool) => pool.install(|| device.launch(&desc, weights, batch))?,
            None => device.launch(&desc, weights, batch)?,
        };

        Ok(UpdateReport {
            kernel: desc.name(),
            m_batch: batch.m_batch(),
            bl: batch.bl(),
            pulses,
        })
    }

    /// Kernel that would run for a batch of `m_batch` items
    pub fn planned_kernel(&mut self, m_batch: usize) -> Result<KernelKind> {
        let key = KernelKey {
            m_batch,
            n_k32: self.cache.config().n_k32(),
            use_bo64: self.cache.config().use_bo64,
            out_trans: self.out_trans,
        };
        let kernels = self.cache.get_or_select(&self.device, key);
        Ok(self.device.choose_kernel(kernels, m_batch)?.kind)
    }
}

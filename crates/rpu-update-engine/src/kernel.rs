// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Update Kernel Catalog
//!
//! Pure description of the kernels the accelerated engine can launch for a
//! constant-step device, and the ordered selection over them.
//!
//! Selection never inspects the weights: it depends only on the batch shape,
//! the pulse word count, and the update configuration. The caller walks the
//! returned list and launches the first descriptor whose resource needs fit
//! the current [`LaunchLimits`]. The generic `Batch` kernel is always last and
//! always launchable, so the walk cannot come up empty.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Upper bound on pulse train length (bits)
pub const MAX_BL: u32 = 32 * 32;

/// Upper bound on rows handled by one parallel task
pub const MAX_ROWS_PER_TASK: usize = 256;

/// Kernel variants, most specialized first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    /// One batch item, no batch loop
    SingleBatch,
    /// Two batch items packed per 64-bit word
    Batch64,
    /// Pulse words staged per batch chunk in a task-local cache
    SharedBatch,
    /// Generic fallback
    Batch,
}

impl KernelKind {
    pub fn name(&self) -> &'static str {
        match self {
            KernelKind::SingleBatch => "SingleBatch",
            KernelKind::Batch64 => "Batch64",
            KernelKind::SharedBatch => "SharedBatch",
            KernelKind::Batch => "Batch",
        }
    }
}

impl std::fmt::Display for KernelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Word width a kernel consumes pulse trains in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordWidth {
    W32,
    W64,
}

impl WordWidth {
    pub fn bits(&self) -> u32 {
        match self {
            WordWidth::W32 => 32,
            WordWidth::W64 => 64,
        }
    }
}

/// Pulse encoding and launch configuration of the update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Pulse train length requested by the user
    pub desired_bl: u32,
    /// Always use `desired_bl` instead of shortening trains per update
    pub fixed_bl: bool,
    /// Balance x/d probabilities by their magnitudes
    pub update_management: bool,
    /// Shorten trains when the expected update is small (ignored with `fixed_bl`)
    pub update_bl_management: bool,
    /// Allow the 64-bit two-item kernel
    pub use_bo64: bool,
    /// Rows per parallel task (rounded to a power of two)
    pub rows_per_task: usize,
    /// Batch items staged together by the shared kernel
    pub max_batch_chunk: usize,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            desired_bl: 31,
            fixed_bl: true,
            update_management: true,
            update_bl_management: true,
            use_bo64: true,
            rows_per_task: 16,
            max_batch_chunk: 256,
        }
    }
}

impl UpdateConfig {
    /// 32-bit words per pulse train
    pub fn n_k32(&self) -> usize {
        self.desired_bl.div_ceil(32) as usize
    }

    /// Effective rows per task: clamped to `[1, MAX_ROWS_PER_TASK]`, power of two
    pub fn task_rows(&self) -> usize {
        self.rows_per_task.clamp(1, MAX_ROWS_PER_TASK).next_power_of_two()
    }

    pub fn validate(&self) -> Result<()> {
        if self.desired_bl == 0 || self.desired_bl > MAX_BL {
            return Err(EngineError::InvalidConfig(format!(
                "desired_bl must be in [1, {}], got {}",
                MAX_BL, self.desired_bl
            )));
        }
        if self.rows_per_task == 0 {
            return Err(EngineError::InvalidConfig(
                "rows_per_task must be positive".to_string(),
            ));
        }
        if self.max_batch_chunk == 0 {
            return Err(EngineError::InvalidConfig(
                "max_batch_chunk must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runtime resource limits checked before launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchLimits {
    /// Bytes one task may stage in its local pulse cache
    pub shared_cache_bytes: usize,
}

impl Default for LaunchLimits {
    fn default() -> Self {
        Self {
            shared_cache_bytes: 48 * 1024,
        }
    }
}

/// One launchable kernel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelDescriptor {
    pub kind: KernelKind,
    pub word_width: WordWidth,
    /// Batch items consumed per inner step
    pub batch_chunk: usize,
    pub rows_per_task: usize,
    /// Weights stored `[col][row]`
    pub out_trans: bool,
    pub n_k32: usize,
    /// Task-local cache the kernel needs (0 for kernels without one)
    pub shared_cache_bytes: usize,
}

impl KernelDescriptor {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_launchable(&self, limits: &LaunchLimits) -> bool {
        self.shared_cache_bytes <= limits.shared_cache_bytes
    }
}

/// Bytes staged by the shared kernel: `n_k32` words plus one sign byte per
/// row and batch item
fn shared_cache_bytes(batch_chunk: usize, rows_per_task: usize, n_k32: usize) -> usize {
    batch_chunk * rows_per_task * (n_k32 * std::mem::size_of::<u32>() + 1)
}

/// Ordered kernel catalog of the constant-step device
///
/// Always non-empty; the generic `Batch` kernel is always last.
pub fn select_update_kernels(
    m_batch: usize,
    n_k32: usize,
    use_bo64: bool,
    out_trans: bool,
    config: &UpdateConfig,
) -> Vec<KernelDescriptor> {
    let rows_per_task = config.task_rows();
    let descriptor = |kind, word_width, batch_chunk, shared_cache_bytes| KernelDescriptor {
        kind,
        word_width,
        batch_chunk,
        rows_per_task,
        out_trans,
        n_k32,
        shared_cache_bytes,
    };

    let mut kernels = Vec::with_capacity(3);

    if m_batch == 1 {
        kernels.push(descriptor(KernelKind::SingleBatch, WordWidth::W32, 1, 0));
    }

    if use_bo64 && n_k32 == 1 && m_batch >= 2 && config.fixed_bl {
        kernels.push(descriptor(KernelKind::Batch64, WordWidth::W64, 2, 0));
    }

    if m_batch > 1 {
        let batch_chunk = m_batch.min(config.max_batch_chunk.max(1));
        kernels.push(descriptor(
            KernelKind::SharedBatch,
            WordWidth::W32,
            batch_chunk,
            shared_cache_bytes(batch_chunk, rows_per_task, n_k32),
        ));
    }

    kernels.push(descriptor(KernelKind::Batch, WordWidth::W32, 1, 0));
    kernels
}

/// First descriptor that fits `limits`
pub fn first_launchable<'a>(
    kernels: &'a [KernelDescriptor],
    limits: &LaunchLimits,
) -> Option<&'a KernelDescriptor> {
    kernels.iter().find(|k| k.is_launchable(limits))
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the update engine

use rpu_device::DeviceError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("No launchable kernel for m_batch={m_batch}, n_k32={n_k32}")]
    NoLaunchableKernel { m_batch: usize, n_k32: usize },

    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Kernel {kernel} cannot run this launch: {reason}")]
    KernelMismatch { kernel: &'static str, reason: String },

    #[error("Weight matrix must be in standard (row-major, contiguous) layout")]
    NonContiguousWeights,

    #[error("Invalid update configuration: {0}")]
    InvalidConfig(String),

    #[error("Thread pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

pub type Result<T> = core::result::Result<T, EngineError>;

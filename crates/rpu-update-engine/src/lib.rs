// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # RPU Update Engine
//!
//! Parallel pulsed-update engine for constant-step device arrays.
//!
//! ## Architecture
//! - **Pulse trains**: bit-packed stochastic encodings of a batch
//! - **Kernel catalog**: pure, ordered kernel selection per launch shape
//! - **Accelerated device**: packed element records + rayon launches
//! - **Updater**: encode, select, launch, report
//! - **Engine selection**: reference vs accelerated by problem size
//!
//! Every kernel applies pulses through `rpu_device::apply_pulse`, the same
//! rule the reference sparse/dense paths use.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod accelerated;
pub mod backend;
pub mod cache;
pub mod error;
pub mod kernel;
pub mod pulse;
pub mod updater;

pub use accelerated::AcceleratedDevice;
pub use backend::{select_engine, EngineDecision, EngineSelectionConfig, EngineType};
pub use cache::{KernelCache, KernelKey};
pub use error::{EngineError, Result};
pub use kernel::{
    first_launchable, select_update_kernels, KernelDescriptor, KernelKind, LaunchLimits, UpdateConfig, WordWidth,
};
pub use pulse::{encoding_scales, EncodingScales, PulseTrainBatch};
pub use updater::{PulsedUpdater, UpdateReport};

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # rpu-sim - Pulsed Analog Resistive Device Simulator
//!
//! Simulates stochastic, bounded weight updates of resistive crossbar arrays
//! built from constant-step pulsed devices.
//!
//! ## Feature Flags
//!
//! - **`f16`**: half precision devices (f32 and f64 are always built)
//! - **`accelerated`** (default): rayon-parallel update engine and the `simulation` module
//! - **`file-logging`**: per-run log folders for the `pulse_sim` tool
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rpu_sim::prelude::*;
//!
//! let config = load_config_or_default(None, None)?;
//! validate_config(&config)?;
//!
//! let device: CustomDevice<f32> = bridge::build_device(&config.device)?;
//! let mut weights = ndarray::Array2::<f32>::zeros((device.d_size(), device.x_size()));
//! let mut rng = SimRng::seed_from_u64(1);
//!
//! // one coincidence at element (0, 0); a positive sign decrements
//! device.do_sparse_update(&mut weights, 0, &[1], 1, &mut rng);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: rpu-config, rpu-observability              │
//! │  (TOML + overrides, tracing setup)                      │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Device: rpu-device                                     │
//! │  (meta-parameters, per-element state, reference update) │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Execution: rpu-update-engine                           │
//! │  (pulse trains, kernel catalog, rayon launches)         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod error;
#[cfg(feature = "accelerated")]
pub mod simulation;

pub use error::{Result, SimError};

pub use rpu_config as config;
pub use rpu_device as device;
pub use rpu_observability as observability;

#[cfg(feature = "accelerated")]
pub use rpu_update_engine as update_engine;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::bridge;
    pub use crate::error::{Result, SimError};

    pub use rpu_config::{load_config, load_config_or_default, validate_config, RpuConfig};
    pub use rpu_device::{
        CustomDevice, CustomParameters, DeviceMetaParameter, DeviceRng, DeviceValue, Precision, PulsedDevice,
        PulsedParameters, SimRng,
    };

    #[cfg(feature = "accelerated")]
    pub use rpu_update_engine::{
        select_engine, EngineType, KernelKind, PulseTrainBatch, PulsedUpdater, UpdateConfig, UpdateReport,
    };
}

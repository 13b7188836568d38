// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # RPU Device Model
//!
//! Everything a single simulated device array needs:
//! - **Numeric**: precision-generic scalar trait (f32, f64, f16)
//! - **Parameters**: pulsed base meta-parameters and device kinds
//! - **Pulsed**: per-element state (scales, bounds) + update rule strategy
//! - **Update**: the per-pulse rule shared by every execution back end
//! - **Custom**: constant-step device with multiplicative update noise
//!
//! The reference update engine lives here (single-threaded sparse/dense
//! paths). The parallel engine in `rpu-update-engine` reuses [`update`].

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod custom;
pub mod error;
pub mod numeric;
pub mod parameters;
pub mod pulsed;
pub mod rng;
pub mod update;

// Re-export commonly used types
pub use custom::{CustomDevice, CustomUpdateRule};
pub use error::{DeviceError, Result};
pub use numeric::{clip, DeviceValue, Precision};
pub use parameters::{
    CustomParameters, DeviceMetaParameter, DeviceUpdateType, ParameterPatch, PulsedParameters,
};
pub use pulsed::{populate_pulsed, PulsedDevice, PulsedDeviceState, UpdateRule};
pub use rng::{DeviceRng, SimRng};
pub use update::{apply_pulse, apply_pulses, decode_signed_index, encode_signed_index, ElementParams};

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Umbrella error type

use rpu_config::ConfigError;
use rpu_device::DeviceError;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[cfg(feature = "accelerated")]
    #[error(transparent)]
    Engine(#[from] rpu_update_engine::EngineError),

    #[error("Precision '{0}' is not compiled into this build")]
    PrecisionUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SimError>;

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for device construction and configuration
//!
//! Update calls never return errors: malformed indices or shapes at update
//! time are precondition failures. Everything here is raised while building
//! parameters or devices.

/// Error types for device operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("Parameter {field} must be non-negative, got {value}")]
    NegativeStd { field: &'static str, value: f64 },

    #[error("Invalid bounds: w_min ({w_min}) must not exceed w_max ({w_max})")]
    InvalidBounds { w_min: f64, w_max: f64 },

    #[error("Invalid step size: dw_min must be positive, got {0}")]
    InvalidStepSize(f64),

    #[error("Invalid parameter {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Empty device: x_size and d_size must be positive, got ({x_size}, {d_size})")]
    EmptyDevice { x_size: usize, d_size: usize },
}

pub type Result<T> = core::result::Result<T, DeviceError>;

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Checks that configuration values are within valid ranges and consistent
//! with each other. All problems are collected and reported together.

use crate::{ConfigError, ConfigResult, RpuConfig};

/// Accepted spellings of `device.precision`
pub const PRECISIONS: &[&str] = &["fp32", "float", "f32", "fp64", "double", "f64", "fp16", "half", "f16"];

/// Accepted spellings of `engine.backend`
pub const BACKENDS: &[&str] = &["reference", "ref", "cpu", "accelerated", "parallel", "rayon", "auto"];

/// Accepted `logging.level` values
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Largest supported pulse train length
pub const MAX_DESIRED_BL: u32 = 1024;

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    NegativeValue { field: String, value: f64 },
    InvalidValue { field: String, reason: String },
    UnknownOption { field: String, value: String, allowed: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativeValue { field, value } => {
                write!(f, "{} = {} must be non-negative", field, value)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
            Self::UnknownOption { field, value, allowed } => {
                write!(f, "Unknown {} '{}' (expected one of: {})", field, value, allowed)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &RpuConfig) -> ConfigResult<()> {
    let errors = collect_errors(config);
    if errors.is_empty() {
        return Ok(());
    }

    let error_messages = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::ValidationError(format!(
        "Configuration validation failed:\n{}",
        error_messages
    )))
}

/// All validation problems, in section order
pub fn collect_errors(config: &RpuConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    validate_device(config, &mut errors);
    validate_update(config, &mut errors);
    validate_engine(config, &mut errors);
    validate_logging(config, &mut errors);
    errors
}

fn invalid(errors: &mut Vec<ConfigValidationError>, field: &str, reason: impl Into<String>) {
    errors.push(ConfigValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    });
}

fn check_option(errors: &mut Vec<ConfigValidationError>, field: &str, value: &str, allowed: &[&str]) {
    if !allowed.contains(&value.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::UnknownOption {
            field: field.to_string(),
            value: value.to_string(),
            allowed: allowed.join(", "),
        });
    }
}

fn validate_device(config: &RpuConfig, errors: &mut Vec<ConfigValidationError>) {
    let device = &config.device;

    if device.kind.to_lowercase() != "custom" {
        errors.push(ConfigValidationError::UnknownOption {
            field: "device.kind".to_string(),
            value: device.kind.clone(),
            allowed: "custom".to_string(),
        });
    }
    check_option(errors, "device.precision", &device.precision, PRECISIONS);

    if device.x_size == 0 || device.d_size == 0 {
        invalid(
            errors,
            "device.x_size/d_size",
            format!("device shape {}x{} is empty", device.d_size, device.x_size),
        );
    }
    if !(device.dw_min.is_finite() && device.dw_min > 0.0) {
        invalid(errors, "device.dw_min", format!("{} must be positive", device.dw_min));
    }
    if !(device.w_min.is_finite() && device.w_max.is_finite()) || device.w_min > device.w_max {
        invalid(
            errors,
            "device.w_min/w_max",
            format!("w_min = {} must not exceed w_max = {}", device.w_min, device.w_max),
        );
    }
    if !(-1.0..=1.0).contains(&device.up_down) {
        invalid(errors, "device.up_down", format!("{} is outside [-1, 1]", device.up_down));
    }
    for (field, value) in device.std_fields() {
        if value < 0.0 || !value.is_finite() {
            errors.push(ConfigValidationError::NegativeValue {
                field: format!("device.{}", field),
                value,
            });
        }
    }
}

fn validate_update(config: &RpuConfig, errors: &mut Vec<ConfigValidationError>) {
    let update = &config.update;

    if update.desired_bl == 0 || update.desired_bl > MAX_DESIRED_BL {
        invalid(
            errors,
            "update.desired_bl",
            format!("{} is outside [1, {}]", update.desired_bl, MAX_DESIRED_BL),
        );
    }
    if !(update.learning_rate.is_finite() && update.learning_rate >= 0.0) {
        errors.push(ConfigValidationError::NegativeValue {
            field: "update.learning_rate".to_string(),
            value: update.learning_rate,
        });
    }
    if update.batch_size == 0 {
        invalid(errors, "update.batch_size", "must be at least 1");
    }
}

fn validate_engine(config: &RpuConfig, errors: &mut Vec<ConfigValidationError>) {
    let engine = &config.engine;

    check_option(errors, "engine.backend", &engine.backend, BACKENDS);
    if engine.rows_per_task == 0 {
        invalid(errors, "engine.rows_per_task", "must be at least 1");
    }
    if engine.max_batch_chunk == 0 {
        invalid(errors, "engine.max_batch_chunk", "must be at least 1");
    }
}

fn validate_logging(config: &RpuConfig, errors: &mut Vec<ConfigValidationError>) {
    check_option(errors, "logging.level", &config.logging.level, LOG_LEVELS);
}

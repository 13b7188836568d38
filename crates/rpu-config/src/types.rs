// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `rpu_configuration.toml`.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RpuConfig {
    pub device: DeviceConfig,
    pub update: UpdateSettings,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Device meta-parameters and array shape
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device kind (only "custom" is built in)
    pub kind: String,
    /// "fp32", "fp64" or "fp16"
    pub precision: String,
    pub x_size: usize,
    pub d_size: usize,
    pub dw_min: f64,
    pub dw_min_dtod: f64,
    pub dw_min_dtod_log_normal: bool,
    /// Cycle-to-cycle update noise (relative std)
    pub dw_min_std: f64,
    pub up_down: f64,
    pub up_down_dtod: f64,
    pub w_min: f64,
    pub w_min_dtod: f64,
    pub w_max: f64,
    pub w_max_dtod: f64,
    pub lifetime: f64,
    pub lifetime_dtod: f64,
    pub reset: f64,
    pub reset_dtod: f64,
    pub reset_std: f64,
    pub diffusion: f64,
    pub diffusion_dtod: f64,
    pub enforce_consistency: bool,
    /// 0 = draw device-to-device variation from entropy
    pub construction_seed: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: "custom".to_string(),
            precision: "fp32".to_string(),
            x_size: 128,
            d_size: 64,
            dw_min: 0.001,
            dw_min_dtod: 0.3,
            dw_min_dtod_log_normal: false,
            dw_min_std: 0.3,
            up_down: 0.0,
            up_down_dtod: 0.01,
            w_min: -0.6,
            w_min_dtod: 0.3,
            w_max: 0.6,
            w_max_dtod: 0.3,
            lifetime: 0.0,
            lifetime_dtod: 0.0,
            reset: 0.0,
            reset_dtod: 0.0,
            reset_std: 0.01,
            diffusion: 0.0,
            diffusion_dtod: 0.0,
            enforce_consistency: true,
            construction_seed: 0,
        }
    }
}

impl DeviceConfig {
    /// Named non-negative spread and noise fields, for validation
    pub fn std_fields(&self) -> [(&'static str, f64); 11] {
        [
            ("dw_min_dtod", self.dw_min_dtod),
            ("dw_min_std", self.dw_min_std),
            ("up_down_dtod", self.up_down_dtod),
            ("w_min_dtod", self.w_min_dtod),
            ("w_max_dtod", self.w_max_dtod),
            ("lifetime", self.lifetime),
            ("lifetime_dtod", self.lifetime_dtod),
            ("reset_dtod", self.reset_dtod),
            ("reset_std", self.reset_std),
            ("diffusion", self.diffusion),
            ("diffusion_dtod", self.diffusion_dtod),
        ]
    }
}

/// Pulse encoding settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UpdateSettings {
    pub desired_bl: u32,
    pub fixed_bl: bool,
    pub update_management: bool,
    pub update_bl_management: bool,
    pub use_bo64: bool,
    pub learning_rate: f64,
    pub batch_size: usize,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            desired_bl: 31,
            fixed_bl: true,
            update_management: true,
            update_bl_management: true,
            use_bo64: true,
            learning_rate: 0.01,
            batch_size: 1,
        }
    }
}

/// Update engine settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// "reference", "accelerated" or "auto"
    pub backend: String,
    /// Worker threads for accelerated launches (0 = global rayon pool)
    pub threads: usize,
    pub rows_per_task: usize,
    pub max_batch_chunk: usize,
    pub shared_cache_bytes: usize,
    /// Work (`x_size * d_size * batch`) at which auto selection goes parallel
    pub accelerated_work_threshold: usize,
    /// Seed of the update noise streams (0 = entropy)
    pub seed: u64,
    /// Weights stored `[col][row]`
    pub out_trans: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: "auto".to_string(),
            threads: 0,
            rows_per_task: 16,
            max_batch_chunk: 256,
            shared_cache_bytes: 48 * 1024,
            accelerated_work_threshold: 16_384,
            seed: 0,
            out_trans: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// "trace", "debug", "info", "warn" or "error"
    pub level: String,
    /// Crates to log at debug level regardless of `level`
    pub debug_crates: Vec<String>,
    /// Directory for rolling log files (empty = console only)
    pub log_dir: String,
    /// JSON console output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug_crates: Vec::new(),
            log_dir: String::new(),
            json: false,
        }
    }
}

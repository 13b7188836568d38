// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # rpu-observability
//!
//! Logging initialization shared by the RPU simulator crates and tools, with
//! per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: Per-run log folders with per-crate rolling files

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "rpu-sim",
    "rpu-device",
    "rpu-update-engine",
    "rpu-config",
    "pulse-sim",
];

/// Tracing target of a crate name (`rpu-device` -> `rpu_device`)
pub fn tracing_target(crate_name: &str) -> String {
    crate_name.replace('-', "_")
}

/// Observability errors
#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("Unknown log level '{0}'")]
    UnknownLevel(String),

    #[error("Unknown log format '{0}' (expected text or json)")]
    UnknownFormat(String),
}

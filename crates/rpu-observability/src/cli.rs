// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! CLI argument parsing for per-crate debug flags
//!
//! Supports flags like `--debug-rpu-device`, `--debug-rpu-update-engine`, etc.

use std::collections::BTreeSet;
use std::env;

use crate::{tracing_target, KNOWN_CRATES};

/// Environment variable with comma-separated crate names (or `all`)
pub const DEBUG_ENV: &str = "RPU_DEBUG";

/// Per-crate debug flags
///
/// # Example
/// ```rust
/// use rpu_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(vec!["--debug-rpu-device".to_string()]);
/// assert!(flags.is_enabled("rpu-device"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrateDebugFlags {
    pub enabled_crates: BTreeSet<String>,
}

impl CrateDebugFlags {
    /// Parse debug flags from command-line arguments
    ///
    /// Looks for arguments matching `--debug-{crate-name}`. `--debug-all`
    /// enables every known crate.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();
        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
            } else if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enable(crate_name);
            }
        }
        flags
    }

    /// Enable debug output for one crate; `_` and `-` are interchangeable
    pub fn enable(&mut self, crate_name: &str) {
        let name = crate_name.trim();
        if !name.is_empty() {
            self.enabled_crates.insert(name.replace('_', "-"));
        }
    }

    pub fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enable(crate_name);
        }
    }

    /// Merge a comma-separated list (`all` enables every known crate)
    pub fn enable_list(&mut self, list: &str) {
        if list.trim() == "all" {
            self.enable_all();
            return;
        }
        for crate_name in list.split(',') {
            self.enable(crate_name);
        }
    }

    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains(&crate_name.replace('_', "-"))
    }

    pub fn enabled_crates(&self) -> Vec<&String> {
        self.enabled_crates.iter().collect()
    }

    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// `DEBUG` if enabled for the crate, `INFO` otherwise
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Filter directive string for `EnvFilter`
    ///
    /// Format: `rpu_device=debug,rpu_update_engine=debug,<base_level>`.
    pub fn to_filter_string(&self, base_level: &str) -> String {
        let mut filters: Vec<String> = self
            .enabled_crates
            .iter()
            .map(|name| format!("{}=debug", tracing_target(name)))
            .collect();
        filters.push(base_level.to_string());
        filters.join(",")
    }
}

/// Debug flags from the process arguments and `RPU_DEBUG`
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(env_var) = env::var(DEBUG_ENV) {
        flags.enable_list(&env_var);
    }
    flags
}

/// Help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variable:
  {env}={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  {env}=all                             Enable debug for all crates

Examples:
  --debug-rpu-update-engine
  {env}=rpu-device,rpu-update-engine
"#,
        KNOWN_CRATES.join(", "),
        env = DEBUG_ENV
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_crate_flag() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-rpu-device".to_string()]);
        assert!(flags.is_enabled("rpu-device"));
        assert!(!flags.is_enabled("rpu-update-engine"));
    }

    #[test]
    fn test_underscore_names_match() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-rpu_update_engine".to_string()]);
        assert!(flags.is_enabled("rpu-update-engine"));
        assert!(flags.is_enabled("rpu_update_engine"));
    }

    #[test]
    fn test_debug_all() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-all".to_string()]);
        for crate_name in KNOWN_CRATES {
            assert!(flags.is_enabled(crate_name), "{} should be enabled", crate_name);
        }
    }

    #[test]
    fn test_unrelated_args_ignored() {
        let flags = CrateDebugFlags::from_args(vec!["--config".to_string(), "x.toml".to_string()]);
        assert!(!flags.any_enabled());
        assert_eq!(flags.to_filter_string("warn"), "warn");
    }

    #[test]
    fn test_filter_string_uses_targets() {
        let mut flags = CrateDebugFlags::default();
        flags.enable_list("rpu-device, rpu-update-engine");
        assert_eq!(
            flags.to_filter_string("info"),
            "rpu_device=debug,rpu_update_engine=debug,info"
        );
    }

    #[test]
    fn test_log_level() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-rpu-device".to_string()]);
        assert_eq!(flags.log_level("rpu-device"), tracing::Level::DEBUG);
        assert_eq!(flags.log_level("rpu-config"), tracing::Level::INFO);
    }
}

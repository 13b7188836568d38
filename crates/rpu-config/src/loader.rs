// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later ones win:
//! 1. TOML file (base values, every field defaulted)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, RpuConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "rpu_configuration.toml";

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "RPU_CONFIG_PATH";

/// Environment variable -> override key
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("RPU_DW_MIN", "dw_min"),
    ("RPU_DW_MIN_STD", "dw_min_std"),
    ("RPU_PRECISION", "precision"),
    ("RPU_ENGINE_BACKEND", "backend"),
    ("RPU_THREADS", "threads"),
    ("RPU_SEED", "seed"),
    ("RPU_LOG_LEVEL", "log_level"),
];

/// Find the RPU configuration file
///
/// Search order:
/// 1. `RPU_CONFIG_PATH` environment variable
/// 2. Current working directory: `./rpu_configuration.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(path) = search_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "RPU configuration file '{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from a TOML file
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the file is not found, contains invalid TOML, or an
/// override value cannot be parsed. Validation is a separate step.
pub fn load_config(config_path: Option<&Path>, cli_args: Option<&HashMap<String, String>>) -> ConfigResult<RpuConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let config: RpuConfig = toml::from_str(&content)?;
    finish(config, cli_args)
}

/// Like [`load_config`], but falls back to defaults when no file is found
/// by search. An explicit `config_path` that does not exist is still an error.
pub fn load_config_or_default(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<RpuConfig> {
    if config_path.is_some() {
        return load_config(config_path, cli_args);
    }
    match find_config_file() {
        Ok(path) => load_config(Some(&path), cli_args),
        Err(ConfigError::FileNotFound(_)) if env::var(CONFIG_PATH_ENV).is_err() => {
            finish(RpuConfig::default(), cli_args)
        }
        Err(err) => Err(err),
    }
}

fn finish(mut config: RpuConfig, cli_args: Option<&HashMap<String, String>>) -> ConfigResult<RpuConfig> {
    apply_environment_overrides(&mut config)?;
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }
    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `RPU_DW_MIN` -> `device.dw_min`
/// - `RPU_DW_MIN_STD` -> `device.dw_min_std`
/// - `RPU_PRECISION` -> `device.precision`
/// - `RPU_ENGINE_BACKEND` -> `engine.backend`
/// - `RPU_THREADS` -> `engine.threads`
/// - `RPU_SEED` -> `engine.seed`
/// - `RPU_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut RpuConfig) -> ConfigResult<()> {
    for (var, key) in ENV_OVERRIDES {
        if let Ok(value) = env::var(var) {
            apply_override(config, key, &value)
                .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", var, e)))?;
        }
    }
    Ok(())
}

/// Apply CLI argument overrides to configuration
///
/// Keys: `dw_min`, `dw_min_std`, `precision`, `x_size`, `d_size`,
/// `construction_seed`, `desired_bl`, `fixed_bl`, `learning_rate`,
/// `batch_size`, `backend`, `threads`, `seed`, `out_trans`, `log_level`.
/// Unknown keys are ignored.
pub fn apply_cli_overrides(config: &mut RpuConfig, cli_args: &HashMap<String, String>) -> ConfigResult<()> {
    for (key, value) in cli_args {
        apply_override(config, key, value)?;
    }
    Ok(())
}

/// Returns `false` for an unknown key
fn apply_override(config: &mut RpuConfig, key: &str, value: &str) -> ConfigResult<bool> {
    match key {
        "dw_min" => config.device.dw_min = parse(key, value)?,
        "dw_min_std" => config.device.dw_min_std = parse(key, value)?,
        "precision" => config.device.precision = value.to_string(),
        "x_size" => config.device.x_size = parse(key, value)?,
        "d_size" => config.device.d_size = parse(key, value)?,
        "construction_seed" => config.device.construction_seed = parse(key, value)?,
        "desired_bl" => config.update.desired_bl = parse(key, value)?,
        "fixed_bl" => config.update.fixed_bl = parse_bool(value),
        "learning_rate" => config.update.learning_rate = parse(key, value)?,
        "batch_size" => config.update.batch_size = parse(key, value)?,
        "backend" => config.engine.backend = value.to_string(),
        "threads" => config.engine.threads = parse(key, value)?,
        "seed" => config.engine.seed = parse(key, value)?,
        "out_trans" => config.engine.out_trans = parse_bool(value),
        "log_level" => config.logging.level = value.to_string(),
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{} = '{}'", key, value)))
}

fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        env::remove_var(CONFIG_PATH_ENV);
        for (var, _) in ENV_OVERRIDES {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_env();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_missing_env_path_is_error() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var(CONFIG_PATH_ENV, "/definitely/not/here/rpu.toml");
        let result = load_config_or_default(None, None);
        env::remove_var(CONFIG_PATH_ENV);

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_env();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[device]").unwrap();
        writeln!(file, "dw_min = 0.01").unwrap();
        writeln!(file, "x_size = 3").unwrap();
        writeln!(file, "[update]").unwrap();
        writeln!(file, "desired_bl = 7").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.device.dw_min, 0.01);
        assert_eq!(config.device.x_size, 3);
        assert_eq!(config.update.desired_bl, 7);
        // untouched sections keep defaults
        assert_eq!(config.engine, crate::EngineConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_env();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[device\ndw_min = ").unwrap();

        assert!(matches!(
            load_config(Some(&config_path), None),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_env();
        let mut config = RpuConfig::default();

        env::set_var("RPU_DW_MIN_STD", "0.0");
        env::set_var("RPU_ENGINE_BACKEND", "reference");
        env::set_var("RPU_SEED", "42");

        let result = apply_environment_overrides(&mut config);
        clear_env();

        result.unwrap();
        assert_eq!(config.device.dw_min_std, 0.0);
        assert_eq!(config.engine.backend, "reference");
        assert_eq!(config.engine.seed, 42);
    }

    #[test]
    fn test_unparsable_environment_value() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_env();
        let mut config = RpuConfig::default();

        env::set_var("RPU_THREADS", "many");
        let result = apply_environment_overrides(&mut config);
        clear_env();

        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = RpuConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("dw_min".to_string(), "0.05".to_string());
        cli_args.insert("fixed_bl".to_string(), "no".to_string());
        cli_args.insert("batch_size".to_string(), "16".to_string());
        cli_args.insert("unrelated".to_string(), "whatever".to_string());

        apply_cli_overrides(&mut config, &cli_args).unwrap();

        assert_eq!(config.device.dw_min, 0.05);
        assert!(!config.update.fixed_bl);
        assert_eq!(config.update.batch_size, 16);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_env();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[device]").unwrap();
        writeln!(file, "dw_min = 0.1").unwrap();
        writeln!(file, "dw_min_std = 0.2").unwrap();

        env::set_var("RPU_DW_MIN", "0.2");
        env::set_var("RPU_DW_MIN_STD", "0.4");

        let mut cli_args = HashMap::new();
        cli_args.insert("dw_min".to_string(), "0.3".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args));
        clear_env();
        let config = config.unwrap();

        // CLI wins for dw_min, env wins for dw_min_std (no CLI override)
        assert_eq!(config.device.dw_min, 0.3);
        assert_eq!(config.device.dw_min_std, 0.4);
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration to runtime type conversion
//!
//! `rpu-config` stays free of simulator types; this module turns a loaded
//! [`RpuConfig`] into device parameters, update settings and logging setup.

use rpu_config::{DeviceConfig, RpuConfig};
use rpu_device::{CustomDevice, CustomParameters, DeviceMetaParameter, DeviceValue, ParameterPatch, Precision};
use rpu_observability::{CrateDebugFlags, LogFormat};

use crate::error::{Result, SimError};

/// Requested weight precision, checked against the compiled features
pub fn precision(device: &DeviceConfig) -> Result<Precision> {
    let precision = Precision::parse(&device.precision).map_err(|e| SimError::InvalidConfig(e.to_string()))?;
    if !precision.is_compiled() {
        return Err(SimError::PrecisionUnavailable(precision.to_string()));
    }
    Ok(precision)
}

/// Every `[device]` meta-parameter as a patch over the device defaults
pub fn parameter_patch(device: &DeviceConfig) -> ParameterPatch {
    ParameterPatch {
        dw_min: Some(device.dw_min),
        dw_min_dtod: Some(device.dw_min_dtod),
        dw_min_dtod_log_normal: Some(device.dw_min_dtod_log_normal),
        dw_min_std: Some(device.dw_min_std),
        up_down: Some(device.up_down),
        up_down_dtod: Some(device.up_down_dtod),
        w_min: Some(device.w_min),
        w_min_dtod: Some(device.w_min_dtod),
        w_max: Some(device.w_max),
        w_max_dtod: Some(device.w_max_dtod),
        lifetime: Some(device.lifetime),
        lifetime_dtod: Some(device.lifetime_dtod),
        reset: Some(device.reset),
        reset_dtod: Some(device.reset_dtod),
        reset_std: Some(device.reset_std),
        diffusion: Some(device.diffusion),
        diffusion_dtod: Some(device.diffusion_dtod),
        enforce_consistency: Some(device.enforce_consistency),
        construction_seed: Some(device.construction_seed),
    }
}

/// Custom device meta-parameters from the `[device]` section
pub fn device_parameters<T: DeviceValue>(device: &DeviceConfig) -> Result<CustomParameters<T>> {
    if !device.kind.eq_ignore_ascii_case("custom") {
        return Err(SimError::InvalidConfig(format!("unsupported device kind '{}'", device.kind)));
    }

    let mut par = CustomParameters::default();
    par.merge(&parameter_patch(device))?;
    Ok(par)
}

/// Device of the configured shape and parameters
pub fn build_device<T: DeviceValue>(device: &DeviceConfig) -> Result<CustomDevice<T>> {
    let par = device_parameters(device)?;
    Ok(CustomDevice::from_parameters(device.x_size, device.d_size, par)?)
}

/// Logging setup from the `[logging]` section
pub fn logging_config(config: &RpuConfig) -> rpu_observability::LoggingConfig {
    let logging = &config.logging;
    rpu_observability::LoggingConfig {
        level: logging.level.clone(),
        format: if logging.json { LogFormat::Json } else { LogFormat::Text },
        log_dir: (!logging.log_dir.is_empty()).then(|| logging.log_dir.clone().into()),
        ..Default::default()
    }
}

/// `debug_crates` from the file merged with `--debug-*` flags and `RPU_DEBUG`
pub fn debug_flags(config: &RpuConfig, mut flags: CrateDebugFlags) -> CrateDebugFlags {
    for crate_name in &config.logging.debug_crates {
        flags.enable(crate_name);
    }
    flags
}

#[cfg(feature = "accelerated")]
mod engine {
    use rpu_config::{EngineConfig, RpuConfig};
    use rpu_update_engine::{EngineSelectionConfig, EngineType, LaunchLimits, UpdateConfig};

    use crate::error::Result;

    /// Pulse encoding and launch shape from `[update]` and `[engine]`
    pub fn update_config(config: &RpuConfig) -> UpdateConfig {
        UpdateConfig {
            desired_bl: config.update.desired_bl,
            fixed_bl: config.update.fixed_bl,
            update_management: config.update.update_management,
            update_bl_management: config.update.update_bl_management,
            use_bo64: config.update.use_bo64,
            rows_per_task: config.engine.rows_per_task,
            max_batch_chunk: config.engine.max_batch_chunk,
        }
    }

    pub fn launch_limits(engine: &EngineConfig) -> LaunchLimits {
        LaunchLimits {
            shared_cache_bytes: engine.shared_cache_bytes,
        }
    }

    /// Requested engine and the auto-selection thresholds
    pub fn engine_selection(engine: &EngineConfig) -> Result<(EngineType, EngineSelectionConfig)> {
        let engine_type: EngineType = engine.backend.parse()?;
        let mut selection = EngineSelectionConfig::for_engine(engine_type);
        selection.accelerated_work_threshold = engine.accelerated_work_threshold;
        Ok((engine_type, selection))
    }
}

#[cfg(feature = "accelerated")]
pub use engine::{engine_selection, launch_limits, update_config};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_device() {
        let config = RpuConfig::default();
        let device = build_device::<f32>(&config.device).unwrap();
        assert_eq!(device.x_size(), config.device.x_size);
        assert_eq!(device.d_size(), config.device.d_size);
        assert!((device.weight_granularity() - 0.001).abs() < 1e-9);
    }

    #[test]
    fn test_parameters_follow_config() {
        let mut device = DeviceConfig::default();
        device.dw_min_std = 0.0;
        device.dw_min = 0.05;
        device.construction_seed = 11;

        let par = device_parameters::<f32>(&device).unwrap();
        assert!(!par.is_noisy());
        assert_eq!(par.pulsed.dw_min, 0.05);
        assert_eq!(par.pulsed.construction_seed, 11);
        assert_eq!(par.name(), "CustomRPUDevice");
    }

    #[test]
    fn test_patch_sets_every_device_field() {
        let mut device = DeviceConfig::default();
        device.w_max = 0.9;
        device.lifetime = 50.0;
        device.enforce_consistency = false;

        let patch = parameter_patch(&device);
        assert!(!patch.is_empty());
        assert_eq!(patch.w_max, Some(0.9));
        assert_eq!(patch.dw_min_std, Some(device.dw_min_std));

        let par = device_parameters::<f64>(&device).unwrap();
        assert_eq!(par.pulsed.w_max, 0.9);
        assert_eq!(par.pulsed.w_min, device.w_min);
        assert_eq!(par.pulsed.lifetime, 50.0);
        assert!(!par.pulsed.enforce_consistency);
        assert_eq!(par.dw_min_std, device.dw_min_std);
    }

    #[test]
    fn test_inverted_bounds_is_device_error() {
        let mut device = DeviceConfig::default();
        device.w_min = 0.8;
        device.w_max = 0.2;
        assert!(matches!(device_parameters::<f32>(&device), Err(SimError::Device(_))));
    }

    #[test]
    fn test_negative_noise_is_device_error() {
        let mut device = DeviceConfig::default();
        device.dw_min_std = -1.0;
        assert!(matches!(device_parameters::<f32>(&device), Err(SimError::Device(_))));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut device = DeviceConfig::default();
        device.kind = "linear-step".to_string();
        assert!(matches!(device_parameters::<f32>(&device), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_precision_resolution() {
        let mut device = DeviceConfig::default();
        assert_eq!(precision(&device).unwrap(), Precision::FP32);

        device.precision = "double".to_string();
        assert_eq!(precision(&device).unwrap(), Precision::FP64);

        device.precision = "half".to_string();
        if cfg!(feature = "f16") {
            assert_eq!(precision(&device).unwrap(), Precision::FP16);
        } else {
            assert!(matches!(precision(&device), Err(SimError::PrecisionUnavailable(_))));
        }

        device.precision = "bf16".to_string();
        assert!(matches!(precision(&device), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_logging_bridge() {
        let mut config = RpuConfig::default();
        config.logging.json = true;
        config.logging.debug_crates = vec!["rpu_update_engine".to_string()];

        let logging = logging_config(&config);
        assert_eq!(logging.format, LogFormat::Json);
        assert!(logging.log_dir.is_none());

        let flags = debug_flags(&config, CrateDebugFlags::default());
        assert!(flags.is_enabled("rpu-update-engine"));
    }

    #[cfg(feature = "accelerated")]
    #[test]
    fn test_engine_bridge() {
        use rpu_update_engine::EngineType;

        let mut config = RpuConfig::default();
        config.engine.backend = "reference".to_string();
        config.engine.rows_per_task = 8;
        config.update.desired_bl = 63;

        let update = update_config(&config);
        assert_eq!(update.desired_bl, 63);
        assert_eq!(update.rows_per_task, 8);
        assert_eq!(update.n_k32(), 2);

        let (engine_type, selection) = engine_selection(&config.engine).unwrap();
        assert_eq!(engine_type, EngineType::Reference);
        assert!(selection.force_reference);

        config.engine.backend = "gpu".to_string();
        assert!(engine_selection(&config.engine).is_err());
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end pipeline: configuration file -> device -> both update engines.

#![cfg(feature = "accelerated")]

use ndarray::{array, Array2};
use rpu_sim::bridge;
use rpu_sim::config::{load_config, validate_config, RpuConfig, CONFIG_FILE_NAME};
use rpu_sim::prelude::*;
use rpu_sim::simulation::simulate;
use tempfile::tempdir;

const NOISELESS_CONFIG: &str = r#"
[device]
x_size = 12
d_size = 7
dw_min = 0.01
dw_min_std = 0.0
construction_seed = 77

[update]
desired_bl = 31
learning_rate = 0.05
batch_size = 5

[engine]
backend = "accelerated"
rows_per_task = 2
seed = 1234
"#;

fn load(text: &str) -> RpuConfig {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, text).unwrap();
    let config = load_config(Some(&path), None).unwrap();
    validate_config(&config).unwrap();
    config
}

fn inputs(config: &RpuConfig, seed: u64) -> (Array2<f32>, Array2<f32>) {
    let mut rng = SimRng::seed_from_u64(seed);
    let m = config.update.batch_size;
    let mut sample = |rows, cols| {
        Array2::from_shape_fn((rows, cols), |_| {
            let u: f32 = rng.sample_uniform();
            2.0 * u - 1.0
        })
    };
    let x = sample(m, config.device.x_size);
    let d = sample(m, config.device.d_size);
    (x, d)
}

#[test]
fn test_configured_engines_agree_without_noise() {
    let config = load(NOISELESS_CONFIG);
    let device: CustomDevice<f32> = bridge::build_device(&config.device).unwrap();
    let update_config = bridge::update_config(&config);
    let mut updater = PulsedUpdater::new(&device, update_config.clone(), config.engine.seed)
        .unwrap()
        .with_limits(bridge::launch_limits(&config.engine));

    let mut reference = Array2::<f32>::zeros((7, 12));
    let mut accelerated = Array2::<f32>::zeros((7, 12));
    let mut encode_rng = SimRng::seed_from_u64(5);
    let mut noise_rng = SimRng::seed_from_u64(6);

    for step in 0..20 {
        let (x, d) = inputs(&config, step);
        let batch = PulseTrainBatch::encode(
            x.view(),
            d.view(),
            config.update.learning_rate,
            device.weight_granularity() as f64,
            &update_config,
            &mut encode_rng,
        )
        .unwrap();

        let pulses = batch.replay_sparse(&device, &mut reference, &mut noise_rng).unwrap();
        let report = updater.apply_batch(&mut accelerated, &batch).unwrap();
        assert_eq!(report.pulses, pulses);
        assert_eq!(report.m_batch, 5);
    }

    assert_eq!(reference, accelerated);
    assert!(reference.iter().any(|&w| w != 0.0));
}

#[test]
fn test_engine_choice_follows_backend() {
    let mut config = load(NOISELESS_CONFIG);
    let (engine_type, selection) = bridge::engine_selection(&config.engine).unwrap();
    assert_eq!(engine_type, EngineType::Accelerated);
    assert_eq!(
        select_engine(12, 7, 5, &selection).engine_type,
        EngineType::Accelerated
    );

    config.engine.backend = "reference".to_string();
    let (_, selection) = bridge::engine_selection(&config.engine).unwrap();
    assert_eq!(
        select_engine(1024, 1024, 64, &selection).engine_type,
        EngineType::Reference
    );
}

#[test]
fn test_dense_update_from_configured_device() {
    let mut config = load(NOISELESS_CONFIG);
    config.device.x_size = 2;
    config.device.d_size = 2;
    config.device.dw_min_dtod = 0.0;
    config.device.up_down_dtod = 0.0;
    config.device.w_min_dtod = 0.0;
    config.device.w_max_dtod = 0.0;
    config.device.reset_std = 0.0;

    let device: CustomDevice<f32> = bridge::build_device(&config.device).unwrap();
    let mut weights = array![[0.0f32, 0.0], [0.0, 0.0]];
    let mut rng = SimRng::seed_from_u64(0);

    device.do_dense_update(&mut weights, &[1, -1, 1, 0], &mut rng);

    assert_eq!(weights, array![[-0.01f32, 0.01], [-0.01, 0.0]]);
}

#[test]
fn test_cli_override_reaches_device() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, NOISELESS_CONFIG).unwrap();

    let mut cli = std::collections::HashMap::new();
    cli.insert("dw_min_std".to_string(), "0.2".to_string());
    let config = load_config(Some(&path), Some(&cli)).unwrap();

    let device: CustomDevice<f32> = bridge::build_device(&config.device).unwrap();
    assert!(device.parameters().is_noisy());
}

#[test]
fn test_simulation_compare_agrees_in_both_precisions() {
    let config = load(NOISELESS_CONFIG);

    let single = simulate::<f32>(&config, 8, true).unwrap();
    let agreement = single.report.agreement.unwrap();
    assert!(agreement.exact);
    assert_eq!(agreement.max_abs_difference, 0.0);
    assert_eq!(single.reference, single.accelerated);
    assert_eq!(single.report.precision, Precision::FP32);

    let double = simulate::<f64>(&config, 8, true).unwrap();
    assert!(double.report.agreement.unwrap().exact);
    assert_eq!(double.report.precision, Precision::FP64);
    let weights = double.accelerated.unwrap();
    assert_eq!(weights.dim(), (7, 12));
    assert!(weights.iter().any(|&w| w != 0.0));
}

#[test]
fn test_simulation_runs_only_selected_engine() {
    let mut config = load(NOISELESS_CONFIG);

    let outcome = simulate::<f32>(&config, 3, false).unwrap();
    assert_eq!(outcome.report.selected_engine, EngineType::Accelerated);
    assert!(outcome.accelerated.is_some());
    assert!(outcome.report.accelerated.is_some());
    assert!(outcome.reference.is_none());
    assert!(outcome.report.reference.is_none());
    assert!(outcome.report.agreement.is_none());

    config.engine.backend = "reference".to_string();
    let outcome = simulate::<f32>(&config, 3, false).unwrap();
    assert_eq!(outcome.report.selected_engine, EngineType::Reference);
    assert!(outcome.reference.is_some());
    assert!(outcome.accelerated.is_none());

    let json = serde_json::to_value(&outcome.report).unwrap();
    assert!(json.get("reference").is_some());
    assert!(json.get("accelerated").is_none());
    assert!(json.get("agreement").is_none());
}

#[test]
fn test_simulation_transposed_output_matches_reference() {
    let mut config = load(NOISELESS_CONFIG);
    config.engine.out_trans = true;

    let outcome = simulate::<f32>(&config, 5, true).unwrap();
    assert!(outcome.report.agreement.unwrap().exact);
    assert_eq!(outcome.accelerated.unwrap().dim(), (7, 12));
}

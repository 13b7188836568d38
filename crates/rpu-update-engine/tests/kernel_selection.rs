// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Kernel Selection Tests
//!
//! Validates that the catalog is pure, ordered, and picks the specialized
//! kernels exactly for the launch shapes they support.

use rpu_device::{CustomDevice, CustomParameters};
use rpu_update_engine::*;

fn rank(kind: KernelKind) -> u8 {
    match kind {
        KernelKind::SingleBatch => 0,
        KernelKind::Batch64 => 1,
        KernelKind::SharedBatch => 2,
        KernelKind::Batch => 3,
    }
}

fn configs() -> Vec<UpdateConfig> {
    let mut configs = Vec::new();
    for fixed_bl in [false, true] {
        for desired_bl in [1, 31, 32, 33, 100] {
            for rows_per_task in [1, 5, 64] {
                configs.push(UpdateConfig {
                    desired_bl,
                    fixed_bl,
                    rows_per_task,
                    ..Default::default()
                });
            }
        }
    }
    configs
}

#[test]
fn test_catalog_invariants_over_grid() {
    for config in configs() {
        for m_batch in 0..12 {
            for n_k32 in 1..5 {
                for use_bo64 in [false, true] {
                    for out_trans in [false, true] {
                        let kernels = select_update_kernels(m_batch, n_k32, use_bo64, out_trans, &config);
                        let kinds: Vec<KernelKind> = kernels.iter().map(|k| k.kind).collect();

                        assert_eq!(kinds.last(), Some(&KernelKind::Batch));
                        assert!(kinds.windows(2).all(|w| rank(w[0]) < rank(w[1])), "{:?}", kinds);

                        assert_eq!(kinds.contains(&KernelKind::SingleBatch), m_batch == 1);
                        assert_eq!(
                            kinds.contains(&KernelKind::Batch64),
                            use_bo64 && n_k32 == 1 && m_batch >= 2 && config.fixed_bl
                        );
                        assert_eq!(kinds.contains(&KernelKind::SharedBatch), m_batch > 1);

                        for k in &kernels {
                            assert_eq!(k.out_trans, out_trans);
                            assert_eq!(k.n_k32, n_k32);
                            assert!(k.rows_per_task.is_power_of_two());
                            assert!(k.rows_per_task <= 256);
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn test_selection_is_stable() {
    let config = UpdateConfig::default();
    let first = select_update_kernels(9, 1, true, false, &config);
    for _ in 0..10 {
        assert_eq!(select_update_kernels(9, 1, true, false, &config), first);
    }
}

#[test]
fn test_selection_independent_of_device() {
    let config = UpdateConfig::default();
    let small = CustomDevice::<f32>::from_parameters(2, 2, CustomParameters::deterministic(0.1, -1.0, 1.0)).unwrap();
    let large = CustomDevice::<f32>::from_parameters(64, 32, CustomParameters::default()).unwrap();

    let a = AcceleratedDevice::from_device(&small, 0).select_update_kernels(9, 1, true, false, &config);
    let b = AcceleratedDevice::from_device(&large, 5).select_update_kernels(9, 1, true, false, &config);
    assert_eq!(a, b);
    assert_eq!(a, select_update_kernels(9, 1, true, false, &config));
}

#[test]
fn test_first_launchable_respects_limits() {
    let config = UpdateConfig {
        desired_bl: 128,
        ..Default::default()
    };
    let kernels = select_update_kernels(64, config.n_k32(), true, false, &config);
    assert_eq!(kernels[0].kind, KernelKind::SharedBatch);

    let roomy = LaunchLimits {
        shared_cache_bytes: 1 << 20,
    };
    let tight = LaunchLimits {
        shared_cache_bytes: 1024,
    };
    assert_eq!(first_launchable(&kernels, &roomy).unwrap().kind, KernelKind::SharedBatch);
    assert_eq!(first_launchable(&kernels, &tight).unwrap().kind, KernelKind::Batch);
}

#[test]
fn test_device_limits_drive_choice() {
    let device = CustomDevice::<f32>::from_parameters(4, 4, CustomParameters::deterministic(0.1, -1.0, 1.0)).unwrap();
    let acc = AcceleratedDevice::from_device(&device, 0).with_limits(LaunchLimits {
        shared_cache_bytes: 0,
    });
    let kernels = acc.select_update_kernels(6, 2, false, false, &UpdateConfig::default());
    assert_eq!(acc.choose_kernel(&kernels, 6).unwrap().kind, KernelKind::Batch);
}

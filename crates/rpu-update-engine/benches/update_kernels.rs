// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Update kernel benchmarks
//!
//! Compares the reference sparse replay against each launchable accelerated
//! kernel on the same pulse trains. Inputs are fixed and noise is on, the
//! way training runs use the engine.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use rpu_device::{CustomDevice, CustomParameters, PulsedParameters, SimRng};
use rpu_update_engine::{select_update_kernels, AcceleratedDevice, LaunchLimits, PulseTrainBatch, UpdateConfig};

fn create_device(x_size: usize, d_size: usize) -> CustomDevice<f32> {
    let mut pulsed = PulsedParameters::<f32>::default();
    pulsed.construction_seed = 1;
    let par = CustomParameters::new(pulsed, 0.3).unwrap();
    CustomDevice::from_parameters(x_size, d_size, par).unwrap()
}

fn create_batch(m_batch: usize, x_size: usize, d_size: usize) -> PulseTrainBatch {
    let mut rng = SimRng::seed_from_u64(7);
    let mut batch = PulseTrainBatch::new(m_batch, x_size, d_size, 1);
    for b in 0..m_batch {
        for j in 0..x_size {
            batch.set_x_train(b, j, &[rng.next_u64() as u32], j % 3 == 0).unwrap();
        }
        for i in 0..d_size {
            batch.set_d_train(b, i, &[rng.next_u64() as u32], i % 2 == 0).unwrap();
        }
    }
    batch
}

fn bench_update_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_kernels");
    group.sample_size(20);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    let (x_size, d_size) = (256, 256);
    let device = create_device(x_size, d_size);

    for m_batch in [1usize, 16, 63] {
        let batch = create_batch(m_batch, x_size, d_size);
        group.throughput(Throughput::Elements((x_size * d_size * m_batch) as u64));

        group.bench_with_input(BenchmarkId::new("reference", m_batch), &m_batch, |b, _| {
            let mut weights = Array2::<f32>::zeros((d_size, x_size));
            let mut rng = SimRng::seed_from_u64(0);
            b.iter(|| {
                let _ = batch.replay_sparse(black_box(&device), black_box(&mut weights), &mut rng);
            });
        });

        let kernels = select_update_kernels(m_batch, 1, true, false, &UpdateConfig::default());
        for desc in kernels.iter().filter(|k| k.is_launchable(&LaunchLimits::default())) {
            group.bench_with_input(BenchmarkId::new(desc.name(), m_batch), &m_batch, |b, _| {
                let mut acc = AcceleratedDevice::from_device(&device, 0);
                let mut weights = Array2::<f32>::zeros((d_size, x_size));
                b.iter(|| {
                    let _ = acc.launch(black_box(desc), black_box(&mut weights), black_box(&batch));
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_update_kernels);
criterion_main!(benches);

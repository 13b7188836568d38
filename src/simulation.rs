// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Multi-step pulsed update simulation
//!
//! Builds a device from a loaded [`RpuConfig`], encodes `steps` random update
//! batches up front and drives them through the engine chosen by
//! [`select_engine`]. With `compare` set both engines run on identical pulse
//! trains and the report carries their agreement.

use std::time::Instant;

use ndarray::Array2;
use rpu_config::RpuConfig;
use rpu_device::{CustomDevice, DeviceRng, DeviceValue, Precision, SimRng};
use rpu_update_engine::{select_engine, EngineType, PulseTrainBatch, PulsedUpdater};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bridge;
use crate::error::Result;

/// Summary of one engine's pass over all steps
#[derive(Debug, Clone, Serialize)]
pub struct EngineRun {
    pub elapsed_ms: f64,
    pub pulses: u64,
    pub mean_weight: f64,
    pub min_weight: f64,
    pub max_weight: f64,
}

impl EngineRun {
    fn new<T: DeviceValue>(weights: &Array2<T>, elapsed_ms: f64, pulses: u64) -> Self {
        let values: Vec<f64> = weights.iter().map(|w| w.to_f64()).collect();
        let n = values.len().max(1) as f64;
        Self {
            elapsed_ms,
            pulses,
            mean_weight: values.iter().sum::<f64>() / n,
            min_weight: values.iter().copied().fold(f64::INFINITY, f64::min),
            max_weight: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Element-wise agreement of the two final weight matrices
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Agreement {
    pub max_abs_difference: f64,
    pub exact: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub precision: Precision,
    pub steps: usize,
    pub seed: u64,
    pub noisy: bool,
    pub selected_engine: EngineType,
    pub selection_reason: String,
    pub estimated_speedup: f32,
    pub kernel: &'static str,
    pub bl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<EngineRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerated: Option<EngineRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement: Option<Agreement>,
    pub config: RpuConfig,
}

/// Final weights of every engine that ran, in natural `(d_size, x_size)` layout
#[derive(Debug, Clone)]
pub struct SimOutcome<T: DeviceValue> {
    pub report: SimReport,
    pub reference: Option<Array2<T>>,
    pub accelerated: Option<Array2<T>>,
}

fn random_batch<T: DeviceValue>(rng: &mut SimRng, rows: usize, cols: usize) -> Array2<T> {
    Array2::from_shape_fn((rows, cols), |_| {
        let u: f64 = rng.sample_uniform();
        T::from_f64(2.0 * u - 1.0)
    })
}

/// Run `steps` update cycles on a `T`-precision device built from `config`
///
/// Only the selected engine runs unless `compare` is set. Each cycle is an
/// update batch followed by decay and diffusion on the natural layout.
pub fn simulate<T: DeviceValue>(config: &RpuConfig, steps: usize, compare: bool) -> Result<SimOutcome<T>> {
    let device: CustomDevice<T> = bridge::build_device(&config.device)?;
    let noisy = device.parameters().is_noisy();
    let (x_size, d_size) = (device.x_size(), device.d_size());
    let m_batch = config.update.batch_size;

    let seed = match config.engine.seed {
        0 => SimRng::from_entropy().next_u64(),
        seed => seed,
    };

    let (_, selection) = bridge::engine_selection(&config.engine)?;
    let decision = select_engine(x_size, d_size, m_batch, &selection);
    info!("[PULSE-SIM] {} (estimated speedup {:.1}x)", decision.reason, decision.estimated_speedup);

    let update_config = bridge::update_config(config);
    let out_trans = config.engine.out_trans;
    let mut updater = PulsedUpdater::new(&device, update_config.clone(), seed)?
        .with_limits(bridge::launch_limits(&config.engine))
        .with_out_trans(out_trans);
    if config.engine.threads > 0 {
        updater = updater.with_threads(config.engine.threads)?;
    }
    let kernel = updater.planned_kernel(m_batch)?;
    info!(
        "[PULSE-SIM] {}x{} {} array, batch {}, kernel {}",
        d_size,
        x_size,
        T::PRECISION,
        m_batch,
        kernel
    );

    // encode every step up front so both engines see identical trains
    let dw_min = device.weight_granularity().to_f64();
    let mut input_rng = SimRng::seed_from_u64(seed ^ 0x5eed);
    let mut batches = Vec::with_capacity(steps);
    for _ in 0..steps {
        let x = random_batch::<T>(&mut input_rng, m_batch, x_size);
        let d = random_batch::<T>(&mut input_rng, m_batch, d_size);
        batches.push(PulseTrainBatch::encode(
            x.view(),
            d.view(),
            config.update.learning_rate,
            dw_min,
            &update_config,
            &mut input_rng,
        )?);
    }
    let bl = batches.last().map_or(update_config.desired_bl, |b| b.bl());

    let run_reference = compare || decision.engine_type == EngineType::Reference;
    let run_accelerated = compare || decision.engine_type == EngineType::Accelerated;
    let cycle_seed = seed.rotate_left(17);

    let mut reference = None;
    let mut reference_run = None;
    if run_reference {
        let mut weights = Array2::from_elem((d_size, x_size), T::zero());
        let mut noise_rng = SimRng::seed_from_u64(seed);
        let mut cycle_rng = SimRng::seed_from_u64(cycle_seed);
        let mut pulses = 0;
        let started = Instant::now();
        for batch in &batches {
            pulses += batch.replay_sparse(&device, &mut weights, &mut noise_rng)?;
            device.decay_weights(&mut weights, T::one());
            device.diffuse_weights(&mut weights, &mut cycle_rng);
        }
        let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;
        debug!("[PULSE-SIM] Reference path: {} pulses in {:.2} ms", pulses, elapsed_ms);
        reference_run = Some(EngineRun::new(&weights, elapsed_ms, pulses));
        reference = Some(weights);
    }

    let mut accelerated = None;
    let mut accelerated_run = None;
    if run_accelerated {
        let shape = if out_trans { (x_size, d_size) } else { (d_size, x_size) };
        let mut weights = Array2::from_elem(shape, T::zero());
        let mut cycle_rng = SimRng::seed_from_u64(cycle_seed);
        let mut pulses = 0;
        let started = Instant::now();
        for batch in &batches {
            pulses += updater.apply_batch(&mut weights, batch)?.pulses;
            // cycle effects run on the natural layout
            if out_trans {
                let mut natural = weights.t().as_standard_layout().into_owned();
                device.decay_weights(&mut natural, T::one());
                device.diffuse_weights(&mut natural, &mut cycle_rng);
                weights = natural.t().as_standard_layout().into_owned();
            } else {
                device.decay_weights(&mut weights, T::one());
                device.diffuse_weights(&mut weights, &mut cycle_rng);
            }
        }
        let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;
        debug!("[PULSE-SIM] Accelerated path: {} pulses in {:.2} ms", pulses, elapsed_ms);

        let natural = if out_trans {
            weights.t().as_standard_layout().into_owned()
        } else {
            weights
        };
        accelerated_run = Some(EngineRun::new(&natural, elapsed_ms, pulses));
        accelerated = Some(natural);
    }

    let agreement = match (&reference, &accelerated) {
        (Some(a), Some(b)) => {
            let max_abs_difference = a
                .iter()
                .zip(b.iter())
                .map(|(a, b)| (a.to_f64() - b.to_f64()).abs())
                .fold(0.0, f64::max);
            let exact = max_abs_difference == 0.0;
            if !noisy && !exact {
                warn!("[PULSE-SIM] Noise-free engines disagree (max |dw| = {:e})", max_abs_difference);
            }
            Some(Agreement { max_abs_difference, exact })
        }
        _ => None,
    };

    let report = SimReport {
        precision: T::PRECISION,
        steps,
        seed,
        noisy,
        selected_engine: decision.engine_type,
        selection_reason: decision.reason,
        estimated_speedup: decision.estimated_speedup,
        kernel: kernel.name(),
        bl,
        reference: reference_run,
        accelerated: accelerated_run,
        agreement,
        config: config.clone(),
    };
    Ok(SimOutcome {
        report,
        reference,
        accelerated,
    })
}

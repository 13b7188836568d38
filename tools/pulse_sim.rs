// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pulsed update simulator.
//!
//! Builds a device array from `rpu_configuration.toml` (plus env and CLI
//! overrides), drives encoded update batches through the engine picked by
//! `[engine] backend` and prints a JSON report. `--compare` runs both the
//! reference sparse path and the accelerated engine on identical pulse trains
//! and reports the agreement between the two weight matrices.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rpu_sim::bridge;
use rpu_sim::config::{load_config_or_default, validate_config, RpuConfig};
use rpu_sim::device::Precision;
use rpu_sim::observability::{debug_flags_help, init_logging, parse_debug_flags};
use rpu_sim::simulation::{simulate, SimReport};
use tracing::info;

const USAGE: &str = "Usage: pulse_sim [--config <path>] [--set <key>=<value>]... [--steps <n>] [--compare] [--output <path>]\n\n\
     Options:\n\
     --config <path>      Configuration file (default: search for rpu_configuration.toml)\n\
     --set key=value      Override a configuration key (dw_min, dw_min_std, batch_size, ...)\n\
     --steps <n>          Update steps to simulate (default: 100)\n\
     --compare            Run both engines and report their agreement\n\
     --output <path>      Write the JSON report to a file instead of stdout\n";

struct Args {
    config_path: Option<PathBuf>,
    overrides: HashMap<String, String>,
    steps: usize,
    compare: bool,
    output: Option<PathBuf>,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        config_path: None,
        overrides: HashMap::new(),
        steps: 100,
        compare: false,
        output: None,
    };

    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config_path = Some(PathBuf::from(next_value(&mut iter, &arg)?)),
            "--set" => {
                let pair = next_value(&mut iter, &arg)?;
                let Some((key, value)) = pair.split_once('=') else {
                    bail!("--set expects key=value, got '{}'", pair);
                };
                args.overrides.insert(key.trim().to_string(), value.trim().to_string());
            }
            "--steps" => {
                let value = next_value(&mut iter, &arg)?;
                args.steps = value.parse().with_context(|| format!("invalid --steps '{}'", value))?;
            }
            "--compare" => args.compare = true,
            "--output" => args.output = Some(PathBuf::from(next_value(&mut iter, &arg)?)),
            "-h" | "--help" => {
                println!("{}\n{}", USAGE, debug_flags_help());
                return Ok(None);
            }
            // consumed by parse_debug_flags
            other if other.starts_with("--debug-") => {}
            other => bail!("Unknown argument: {}\n\n{}", other, USAGE),
        }
    }
    Ok(Some(args))
}

fn next_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    iter.next().with_context(|| format!("{} expects a value", flag))
}

fn run(config: &RpuConfig, precision: Precision, steps: usize, compare: bool) -> Result<SimReport> {
    let report = match precision {
        Precision::FP32 => simulate::<f32>(config, steps, compare)?.report,
        Precision::FP64 => simulate::<f64>(config, steps, compare)?.report,
        #[cfg(feature = "f16")]
        Precision::FP16 => simulate::<half::f16>(config, steps, compare)?.report,
        #[allow(unreachable_patterns)]
        other => bail!("precision {} is not compiled into this build", other),
    };
    Ok(report)
}

fn main() -> Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let config = load_config_or_default(args.config_path.as_deref(), Some(&args.overrides))
        .context("Failed to load configuration")?;
    validate_config(&config)?;

    let flags = bridge::debug_flags(&config, parse_debug_flags());
    let _guard = init_logging(&flags, &bridge::logging_config(&config))?;

    let precision = bridge::precision(&config.device)?;
    let report = run(&config, precision, args.steps, args.compare)?;

    let json = serde_json::to_string_pretty(&report)?;
    match args.output {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("[PULSE-SIM] Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

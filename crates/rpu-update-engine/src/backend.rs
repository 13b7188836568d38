// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Engine Selection
//!
//! Chooses between the single-threaded reference engine and the parallel
//! accelerated engine for a given array and batch size.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};

/// Update engine to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// Per-row sparse updates on the calling thread
    Reference,
    /// Rayon-parallel kernels over pulse trains
    Accelerated,
    /// Pick by problem size
    #[default]
    Auto,
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineType::Reference => write!(f, "Reference"),
            EngineType::Accelerated => write!(f, "Accelerated"),
            EngineType::Auto => write!(f, "Auto"),
        }
    }
}

impl std::str::FromStr for EngineType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "reference" | "ref" | "cpu" => Ok(EngineType::Reference),
            "accelerated" | "parallel" | "rayon" => Ok(EngineType::Accelerated),
            "auto" => Ok(EngineType::Auto),
            _ => Err(EngineError::InvalidConfig(format!("unknown engine backend '{}'", s))),
        }
    }
}

/// Auto-selection thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSelectionConfig {
    /// Minimum `x_size * d_size * m_batch` to consider the accelerated engine
    pub accelerated_work_threshold: usize,
    pub force_reference: bool,
    pub force_accelerated: bool,
}

impl Default for EngineSelectionConfig {
    fn default() -> Self {
        Self {
            // below this a parallel launch costs more than it saves
            accelerated_work_threshold: 16_384,
            force_reference: false,
            force_accelerated: false,
        }
    }
}

impl EngineSelectionConfig {
    /// Selection settings implied by a requested engine type
    pub fn for_engine(engine: EngineType) -> Self {
        Self {
            force_reference: engine == EngineType::Reference,
            force_accelerated: engine == EngineType::Accelerated,
            ..Default::default()
        }
    }
}

/// Engine decision with rationale
#[derive(Debug, Clone, PartialEq)]
pub struct EngineDecision {
    pub engine_type: EngineType,
    pub reason: String,
    pub estimated_speedup: f32,
}

/// Pick the engine for an `(d_size, x_size)` array updated with batches of
/// `m_batch`
///
/// Force flags win (reference first). Otherwise the accelerated engine is
/// chosen when the work per update reaches the threshold and more than one
/// worker thread is available.
pub fn select_engine(x_size: usize, d_size: usize, m_batch: usize, config: &EngineSelectionConfig) -> EngineDecision {
    if config.force_reference {
        return EngineDecision {
            engine_type: EngineType::Reference,
            reason: "Forced reference engine via configuration".to_string(),
            estimated_speedup: 1.0,
        };
    }

    let threads = rayon::current_num_threads();
    let work = x_size * d_size * m_batch.max(1);

    if config.force_accelerated {
        return EngineDecision {
            engine_type: EngineType::Accelerated,
            reason: "Forced accelerated engine via configuration".to_string(),
            estimated_speedup: estimate_speedup(work, d_size, threads, config),
        };
    }

    if work >= config.accelerated_work_threshold && threads > 1 && d_size > 1 {
        let speedup = estimate_speedup(work, d_size, threads, config);
        if speedup > 1.5 {
            let decision = EngineDecision {
                engine_type: EngineType::Accelerated,
                reason: format!(
                    "Accelerated engine selected: {} x {} array, batch {} ({} threads)",
                    d_size, x_size, m_batch, threads
                ),
                estimated_speedup: speedup,
            };
            info!("[ENGINE-SELECT] {}", decision.reason);
            return decision;
        }
    }

    EngineDecision {
        engine_type: EngineType::Reference,
        reason: format!(
            "Reference engine selected: {} x {} array, batch {} (below parallel threshold)",
            d_size, x_size, m_batch
        ),
        estimated_speedup: 1.0,
    }
}

/// Rough speedup model: parallelism is capped by rows and threads, and only
/// pays off in proportion to how far the work exceeds the threshold
fn estimate_speedup(work: usize, d_size: usize, threads: usize, config: &EngineSelectionConfig) -> f32 {
    let parallel = threads.min(d_size).max(1) as f32;
    let saturation = (work as f32 / config.accelerated_work_threshold.max(1) as f32).min(1.0);
    1.0 + (parallel - 1.0) * 0.8 * saturation
}

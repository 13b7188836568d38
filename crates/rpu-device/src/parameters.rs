// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Device meta-parameters
//!
//! [`PulsedParameters`] carries the fields shared by every pulsed device
//! (nominal step, bounds, device-to-device spreads, decay, diffusion, reset).
//! [`CustomParameters`] extends it with the multiplicative cycle-to-cycle
//! noise `dw_min_std`. Both are immutable once a device is built from them;
//! adjustments go through [`ParameterPatch`] before construction.

use core::fmt;

use crate::error::{DeviceError, Result};
use crate::numeric::DeviceValue;

/// Update-functor family a device implements
///
/// Selects which accelerated kernel catalog a device draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceUpdateType {
    /// Fixed step per coincidence, sign-only response
    ConstantStep,
}

impl fmt::Display for DeviceUpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceUpdateType::ConstantStep => write!(f, "ConstantStep"),
        }
    }
}

/// Partial parameter set; every `Some` field replaces the target value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterPatch {
    pub dw_min: Option<f64>,
    pub dw_min_dtod: Option<f64>,
    pub dw_min_dtod_log_normal: Option<bool>,
    pub dw_min_std: Option<f64>,
    pub up_down: Option<f64>,
    pub up_down_dtod: Option<f64>,
    pub w_min: Option<f64>,
    pub w_min_dtod: Option<f64>,
    pub w_max: Option<f64>,
    pub w_max_dtod: Option<f64>,
    pub lifetime: Option<f64>,
    pub lifetime_dtod: Option<f64>,
    pub reset: Option<f64>,
    pub reset_dtod: Option<f64>,
    pub reset_std: Option<f64>,
    pub diffusion: Option<f64>,
    pub diffusion_dtod: Option<f64>,
    pub enforce_consistency: Option<bool>,
    pub construction_seed: Option<u64>,
}

impl ParameterPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Parameters shared by the pulsed device family
#[derive(Debug, Clone, PartialEq)]
pub struct PulsedParameters<T: DeviceValue> {
    /// Nominal weight change per coincidence
    pub dw_min: T,
    /// Device-to-device spread of `dw_min` (relative)
    pub dw_min_dtod: T,
    /// Draw the step gain log-normally instead of normally
    pub dw_min_dtod_log_normal: bool,
    /// Up/down asymmetry; positive weakens the down direction
    pub up_down: T,
    pub up_down_dtod: T,
    pub w_min: T,
    pub w_min_dtod: T,
    pub w_max: T,
    pub w_max_dtod: T,
    /// Decay lifetime in update cycles; 0 disables decay
    pub lifetime: T,
    pub lifetime_dtod: T,
    /// Reset target and its spreads
    pub reset: T,
    pub reset_dtod: T,
    pub reset_std: T,
    /// Per-cycle diffusion std; 0 disables diffusion
    pub diffusion: T,
    pub diffusion_dtod: T,
    /// Force positive scales and `min_bound <= 0 <= max_bound`
    pub enforce_consistency: bool,
    /// Seed for the construction RNG; 0 draws from entropy
    pub construction_seed: u64,
}

impl<T: DeviceValue> Default for PulsedParameters<T> {
    fn default() -> Self {
        Self {
            dw_min: T::from_f64(0.001),
            dw_min_dtod: T::from_f64(0.3),
            dw_min_dtod_log_normal: false,
            up_down: T::zero(),
            up_down_dtod: T::from_f64(0.01),
            w_min: T::from_f64(-0.6),
            w_min_dtod: T::from_f64(0.3),
            w_max: T::from_f64(0.6),
            w_max_dtod: T::from_f64(0.3),
            lifetime: T::zero(),
            lifetime_dtod: T::zero(),
            reset: T::zero(),
            reset_dtod: T::zero(),
            reset_std: T::from_f64(0.01),
            diffusion: T::zero(),
            diffusion_dtod: T::zero(),
            enforce_consistency: true,
            construction_seed: 0,
        }
    }
}

impl<T: DeviceValue> PulsedParameters<T> {
    /// Parameters with every spread and noise source switched off
    ///
    /// Scales equal `dw_min` and bounds equal `[w_min, w_max]` for every
    /// element. Used for calibration and deterministic test fixtures.
    pub fn ideal(dw_min: f64, w_min: f64, w_max: f64) -> Self {
        Self {
            dw_min: T::from_f64(dw_min),
            dw_min_dtod: T::zero(),
            up_down_dtod: T::zero(),
            w_min: T::from_f64(w_min),
            w_min_dtod: T::zero(),
            w_max: T::from_f64(w_max),
            w_max_dtod: T::zero(),
            reset_std: T::zero(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.dw_min > T::zero()) {
            return Err(DeviceError::InvalidStepSize(self.dw_min.to_f64()));
        }
        if self.w_min > self.w_max {
            return Err(DeviceError::InvalidBounds {
                w_min: self.w_min.to_f64(),
                w_max: self.w_max.to_f64(),
            });
        }
        let stds = [
            ("dw_min_dtod", self.dw_min_dtod),
            ("up_down_dtod", self.up_down_dtod),
            ("w_min_dtod", self.w_min_dtod),
            ("w_max_dtod", self.w_max_dtod),
            ("lifetime", self.lifetime),
            ("lifetime_dtod", self.lifetime_dtod),
            ("reset_dtod", self.reset_dtod),
            ("reset_std", self.reset_std),
            ("diffusion", self.diffusion),
            ("diffusion_dtod", self.diffusion_dtod),
        ];
        for (field, value) in stds {
            if value < T::zero() {
                return Err(DeviceError::NegativeStd {
                    field,
                    value: value.to_f64(),
                });
            }
        }
        Ok(())
    }

    /// Apply the base-family fields of `patch`, ignoring device-specific ones
    pub fn apply_patch(&mut self, patch: &ParameterPatch) {
        fn set<T: DeviceValue>(target: &mut T, value: Option<f64>) {
            if let Some(v) = value {
                *target = T::from_f64(v);
            }
        }
        set(&mut self.dw_min, patch.dw_min);
        set(&mut self.dw_min_dtod, patch.dw_min_dtod);
        set(&mut self.up_down, patch.up_down);
        set(&mut self.up_down_dtod, patch.up_down_dtod);
        set(&mut self.w_min, patch.w_min);
        set(&mut self.w_min_dtod, patch.w_min_dtod);
        set(&mut self.w_max, patch.w_max);
        set(&mut self.w_max_dtod, patch.w_max_dtod);
        set(&mut self.lifetime, patch.lifetime);
        set(&mut self.lifetime_dtod, patch.lifetime_dtod);
        set(&mut self.reset, patch.reset);
        set(&mut self.reset_dtod, patch.reset_dtod);
        set(&mut self.reset_std, patch.reset_std);
        set(&mut self.diffusion, patch.diffusion);
        set(&mut self.diffusion_dtod, patch.diffusion_dtod);
        if let Some(v) = patch.dw_min_dtod_log_normal {
            self.dw_min_dtod_log_normal = v;
        }
        if let Some(v) = patch.enforce_consistency {
            self.enforce_consistency = v;
        }
        if let Some(v) = patch.construction_seed {
            self.construction_seed = v;
        }
    }

    fn write_fields(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\t dw_min:\t\t{}\t(dtod={})", self.dw_min, self.dw_min_dtod)?;
        if self.dw_min_dtod_log_normal {
            writeln!(f, "\t dw_min_dtod_log_normal:\ttrue")?;
        }
        writeln!(f, "\t up_down:\t\t{}\t(dtod={})", self.up_down, self.up_down_dtod)?;
        writeln!(f, "\t w_min:\t\t{}\t(dtod={})", self.w_min, self.w_min_dtod)?;
        writeln!(f, "\t w_max:\t\t{}\t(dtod={})", self.w_max, self.w_max_dtod)?;
        if self.lifetime > T::zero() {
            writeln!(f, "\t lifetime [decay]:\t{}\t(dtod={})", self.lifetime, self.lifetime_dtod)?;
        }
        if self.diffusion > T::zero() {
            writeln!(f, "\t diffusion:\t\t{}\t(dtod={})", self.diffusion, self.diffusion_dtod)?;
        }
        writeln!(
            f,
            "\t reset:\t\t{}\t(dtod={}, std={})",
            self.reset, self.reset_dtod, self.reset_std
        )?;
        writeln!(f, "\t enforce_consistency:\t{}", self.enforce_consistency)
    }
}

impl<T: DeviceValue> fmt::Display for PulsedParameters<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PulsedDevice parameters:")?;
        self.write_fields(f)
    }
}

/// Meta-parameter interface of a device kind
///
/// Clone comes from `Clone`, print from `Display`. Device kinds override
/// only what differs from the pulsed base.
pub trait DeviceMetaParameter<T: DeviceValue>:
    Clone + fmt::Debug + fmt::Display + Send + Sync
{
    /// Device kind name (for logging/printing)
    fn name(&self) -> &'static str;

    fn update_type(&self) -> DeviceUpdateType {
        DeviceUpdateType::ConstantStep
    }

    /// Base pulsed-device fields
    fn pulsed(&self) -> &PulsedParameters<T>;

    /// Relative std of the multiplicative update noise; 0 is deterministic
    fn dw_min_std(&self) -> T;

    /// Nominal minimum step used by calibration logic
    fn weight_granularity(&self) -> T {
        self.pulsed().dw_min
    }

    fn validate(&self) -> Result<()>;

    /// Apply `patch` field-wise and re-validate
    ///
    /// On error the parameters are left unchanged.
    fn merge(&mut self, patch: &ParameterPatch) -> Result<()>;
}

/// Parameters of the custom constant-step device
#[derive(Debug, Clone, PartialEq)]
pub struct CustomParameters<T: DeviceValue> {
    pub pulsed: PulsedParameters<T>,
    /// Relative std of the multiplicative cycle-to-cycle update noise
    pub dw_min_std: T,
}

impl<T: DeviceValue> Default for CustomParameters<T> {
    fn default() -> Self {
        Self {
            pulsed: PulsedParameters::default(),
            dw_min_std: T::from_f64(0.3),
        }
    }
}

impl<T: DeviceValue> CustomParameters<T> {
    pub fn new(pulsed: PulsedParameters<T>, dw_min_std: T) -> Result<Self> {
        let par = Self { pulsed, dw_min_std };
        par.validate()?;
        Ok(par)
    }

    /// No device-to-device spread, no cycle-to-cycle noise
    pub fn deterministic(dw_min: f64, w_min: f64, w_max: f64) -> Self {
        Self {
            pulsed: PulsedParameters::ideal(dw_min, w_min, w_max),
            dw_min_std: T::zero(),
        }
    }

    pub fn with_dw_min_std(mut self, dw_min_std: f64) -> Result<Self> {
        self.merge(&ParameterPatch {
            dw_min_std: Some(dw_min_std),
            ..Default::default()
        })?;
        Ok(self)
    }

    pub fn is_noisy(&self) -> bool {
        self.dw_min_std > T::zero()
    }
}

impl<T: DeviceValue> DeviceMetaParameter<T> for CustomParameters<T> {
    fn name(&self) -> &'static str {
        "CustomRPUDevice"
    }

    fn pulsed(&self) -> &PulsedParameters<T> {
        &self.pulsed
    }

    fn dw_min_std(&self) -> T {
        self.dw_min_std
    }

    fn validate(&self) -> Result<()> {
        if self.dw_min_std < T::zero() {
            return Err(DeviceError::NegativeStd {
                field: "dw_min_std",
                value: self.dw_min_std.to_f64(),
            });
        }
        self.pulsed.validate()
    }

    fn merge(&mut self, patch: &ParameterPatch) -> Result<()> {
        let mut merged = self.clone();
        merged.pulsed.apply_patch(patch);
        if let Some(v) = patch.dw_min_std {
            merged.dw_min_std = T::from_f64(v);
        }
        merged.validate()?;
        *self = merged;
        Ok(())
    }
}

impl<T: DeviceValue> fmt::Display for CustomParameters<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} parameters:", self.name())?;
        self.pulsed.write_fields(f)?;
        writeln!(f, "\t dw_min_std:\t\t{}", self.dw_min_std)
    }
}

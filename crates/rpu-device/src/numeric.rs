// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Numeric type abstractions for weight precision
//!
//! Devices are generic over the storage precision of their weights and
//! per-element parameters. The update rule sits in the innermost training
//! loop, so every precision is resolved at compile time.
//!
//! # Design Principles
//!
//! 1. **Zero-cost for f32**: the f32 implementation compiles down to plain
//!    float arithmetic.
//!
//! 2. **No dynamic dispatch**: each precision is a separate monomorphization.
//!
//! # Example
//!
//! ```
//! use rpu_device::numeric::{clip, DeviceValue};
//!
//! fn step_down<T: DeviceValue>(w: T, scale: T, min_bound: T, max_bound: T) -> T {
//!     clip(w - scale, min_bound, max_bound)
//! }
//!
//! assert_eq!(step_down(0.0f32, 0.5, -0.25, 1.0), -0.25);
//! ```

use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Sub};
use serde::{Deserialize, Serialize};

// ============================================================================
// Precision Selection
// ============================================================================

/// Weight storage precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 32-bit floating point (default, always available)
    #[default]
    FP32,
    /// 64-bit floating point (feature `f64`)
    FP64,
    /// 16-bit floating point (feature `f16`)
    FP16,
}

impl Precision {
    /// Parse from a configuration string
    pub fn parse(s: &str) -> Result<Self, &'static str> {
        match s.to_lowercase().as_str() {
            "fp32" | "f32" | "float" | "single" => Ok(Precision::FP32),
            "fp64" | "f64" | "double" => Ok(Precision::FP64),
            "fp16" | "f16" | "half" => Ok(Precision::FP16),
            _ => Err("Invalid precision: must be 'fp32', 'fp64', or 'fp16'"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::FP32 => "fp32",
            Precision::FP64 => "fp64",
            Precision::FP16 => "fp16",
        }
    }

    /// Whether this build carries an implementation for the precision
    pub fn is_compiled(&self) -> bool {
        match self {
            Precision::FP32 | Precision::FP64 => true,
            Precision::FP16 => cfg!(feature = "f16"),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Device Value Trait
// ============================================================================

/// Scalar type a device stores its weight and per-element parameters in
///
/// Implementations must be `Copy` and thread-safe; the accelerated engine
/// moves rows of these values across rayon worker threads.
pub trait DeviceValue:
    Copy
    + Send
    + Sync
    + fmt::Debug
    + fmt::Display
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// Precision tag of this type
    const PRECISION: Precision;

    /// Convert from f64 (parameters are configured in f64)
    fn from_f64(value: f64) -> Self;

    /// Convert to f64 (reporting, statistics)
    fn to_f64(self) -> f64;

    fn zero() -> Self;

    fn one() -> Self;

    #[inline(always)]
    fn abs(self) -> Self {
        if self < Self::zero() {
            -self
        } else {
            self
        }
    }

    #[inline]
    fn exp(self) -> Self {
        Self::from_f64(self.to_f64().exp())
    }
}

/// Clip `w` into `[min_bound, max_bound]`
///
/// Upper bound is applied first, then the lower bound, so an inverted bound
/// pair resolves to `min_bound` instead of panicking like `f32::clamp`.
#[inline(always)]
pub fn clip<T: DeviceValue>(w: T, min_bound: T, max_bound: T) -> T {
    let w = if w > max_bound { max_bound } else { w };
    if w < min_bound {
        min_bound
    } else {
        w
    }
}

// ============================================================================
// f32 Implementation (Zero-Cost Default)
// ============================================================================

impl DeviceValue for f32 {
    const PRECISION: Precision = Precision::FP32;

    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline(always)]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline(always)]
    fn zero() -> Self {
        0.0
    }

    #[inline(always)]
    fn one() -> Self {
        1.0
    }

    #[inline(always)]
    fn abs(self) -> Self {
        f32::abs(self)
    }

    #[inline]
    fn exp(self) -> Self {
        f32::exp(self)
    }
}

// ============================================================================
// f64 Implementation
// ============================================================================

// Always built: parameters, encoding scales and pulse probabilities are f64.
impl DeviceValue for f64 {
    const PRECISION: Precision = Precision::FP64;

    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline(always)]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline(always)]
    fn zero() -> Self {
        0.0
    }

    #[inline(always)]
    fn one() -> Self {
        1.0
    }

    #[inline(always)]
    fn abs(self) -> Self {
        f64::abs(self)
    }

    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }
}

// ============================================================================
// f16 Implementation (half crate)
// ============================================================================

#[cfg(feature = "f16")]
impl DeviceValue for half::f16 {
    const PRECISION: Precision = Precision::FP16;

    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        half::f16::from_f64(value)
    }

    #[inline(always)]
    fn to_f64(self) -> f64 {
        half::f16::to_f64(self)
    }

    #[inline(always)]
    fn zero() -> Self {
        half::f16::ZERO
    }

    #[inline(always)]
    fn one() -> Self {
        half::f16::ONE
    }
}

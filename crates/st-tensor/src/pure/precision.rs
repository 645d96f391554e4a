// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Storage precision versus accumulation precision.
//!
//! Tensors store their payload in any [`Element`] type, but every reduction
//! widens to [`Accumulator`] first and narrows once per produced element. The
//! accumulator is at least as wide as the widest storage type, so reduced
//! precision storage only costs rounding on load and store.

use core::fmt;
use half::{bf16, f16};
use serde::{Deserialize, Serialize};

/// Scalar type used for every sum, whatever the storage precision.
pub type Accumulator = f32;

/// Storage precision tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    #[default]
    F32,
    F16,
    Bf16,
}

impl DType {
    pub fn label(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::Bf16 => "bf16",
        }
    }

    /// Size of one stored element in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 | DType::Bf16 => 2,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Element type a tensor can be stored in.
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;

    /// Widens the stored value into the accumulator.
    fn widen(self) -> Accumulator;

    /// Rounds an accumulated value back into storage precision.
    fn narrow(value: Accumulator) -> Self;

    #[inline]
    fn zero() -> Self {
        Self::narrow(0.0)
    }
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    #[inline]
    fn widen(self) -> Accumulator {
        self
    }

    #[inline]
    fn narrow(value: Accumulator) -> Self {
        value
    }
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;

    #[inline]
    fn widen(self) -> Accumulator {
        self.to_f32()
    }

    #[inline]
    fn narrow(value: Accumulator) -> Self {
        f16::from_f32(value)
    }
}

impl Element for bf16 {
    const DTYPE: DType = DType::Bf16;

    #[inline]
    fn widen(self) -> Accumulator {
        self.to_f32()
    }

    #[inline]
    fn narrow(value: Accumulator) -> Self {
        bf16::from_f32(value)
    }
}

/// Multiply path used inside reductions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeMode {
    /// Full f32 products.
    #[default]
    Standard,
    /// TF32 tensor-core emulation: both factors keep only a 10-bit mantissa.
    /// Sums still run in f32.
    Tf32,
}

impl ComputeMode {
    pub fn label(self) -> &'static str {
        match self {
            ComputeMode::Standard => "standard",
            ComputeMode::Tf32 => "tf32",
        }
    }

    /// Relative tolerance callers should expect from this multiply path when
    /// values are stored as `dtype`.
    pub fn tolerance(self, dtype: DType) -> f32 {
        match (self, dtype) {
            (ComputeMode::Tf32, _) => 5e-1,
            (ComputeMode::Standard, DType::F32) => 1e-3,
            (ComputeMode::Standard, DType::F16 | DType::Bf16) => 1e-1,
        }
    }

    /// Prepares a widened factor for this multiply path. Kernels that reuse a
    /// factor many times can prepare it once and multiply plainly afterwards;
    /// the result equals [`ComputeMode::mul`].
    #[inline(always)]
    pub fn operand(self, value: Accumulator) -> Accumulator {
        match self {
            ComputeMode::Standard => value,
            ComputeMode::Tf32 => round_tf32(value),
        }
    }
}

impl fmt::Display for ComputeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rounds an f32 to the nearest TF32 value (ties to even). Non-finite inputs
/// pass through untouched.
#[inline(always)]
pub fn round_tf32(value: f32) -> f32 {
    if !value.is_finite() {
        return value;
    }
    const DROPPED: u32 = 13;
    let bits = value.to_bits();
    let lsb = (bits >> DROPPED) & 1;
    let bias = (1u32 << (DROPPED - 1)) - 1 + lsb;
    f32::from_bits(bits.wrapping_add(bias) & !((1u32 << DROPPED) - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tf32_keeps_ten_mantissa_bits() {
        assert_eq!(round_tf32(1.0), 1.0);
        let step = 2f32.powi(-10);
        assert_eq!(round_tf32(1.0 + step), 1.0 + step);
        // Below half a TF32 ulp rounds down, above rounds up.
        assert_eq!(round_tf32(1.0 + step * 0.25), 1.0);
        assert_eq!(round_tf32(1.0 + step * 0.75), 1.0 + step);
        // Exact tie rounds to the even neighbour.
        assert_eq!(round_tf32(1.0 + step * 0.5), 1.0);
        assert_eq!(round_tf32(1.0 + step * 1.5), 1.0 + step * 2.0);
        assert!(round_tf32(f32::NAN).is_nan());
        assert_eq!(round_tf32(f32::INFINITY), f32::INFINITY);
    }

    #[test]
    fn reduced_precision_round_trips_small_integers() {
        for value in [0.0f32, 1.0, -2.0, 17.0, 61.0] {
            assert_eq!(<f16 as Element>::narrow(value).widen(), value);
            assert_eq!(<bf16 as Element>::narrow(value).widen(), value);
        }
        assert_eq!(<f16 as Element>::zero(), f16::ZERO);
    }

    #[test]
    fn dtype_labels_match_serde_names() {
        let parsed: DType = serde_json::from_str("\"bf16\"").unwrap();
        assert_eq!(parsed, DType::Bf16);
        assert_eq!(parsed.to_string(), "bf16");
        let mode: ComputeMode = serde_json::from_str("\"tf32\"").unwrap();
        assert_eq!(mode, ComputeMode::Tf32);
        assert_eq!(DType::F16.size_of(), 2);
    }
}

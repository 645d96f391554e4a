// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Pure Rust row-major tensors.
//!
//! Everything here is safe Rust without native bindings. Tensors are two
//! dimensional; payloads with more axes are flattened along the column axis
//! so the row axis always indexes the batch.

pub mod precision;

pub use self::precision::{round_tf32, Accumulator, ComputeMode, DType, Element};

use core::fmt;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use spiral_config::determinism;
use std::error::Error;

/// Result alias used throughout the pure module.
pub type PureResult<T> = Result<T, TensorError>;

/// Errors emitted by tensors and the operators built on them.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorError {
    /// A tensor constructor received an invalid shape.
    InvalidDimensions { rows: usize, cols: usize },
    /// Data provided to a constructor or operator does not match the tensor shape.
    DataLength { expected: usize, got: usize },
    /// An operator was asked to combine tensors of incompatible shapes.
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// Generic configuration violation.
    InvalidValue { label: &'static str },
    /// A stateful operator was driven out of order, e.g. backward without a
    /// pending forward.
    InvalidSequence { label: &'static str },
}

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorError::InvalidDimensions { rows, cols } => {
                write!(
                    f,
                    "invalid tensor dimensions ({rows} x {cols}); both axes must be non-zero"
                )
            }
            TensorError::DataLength { expected, got } => {
                write!(f, "data length mismatch: expected {expected}, got {got}")
            }
            TensorError::ShapeMismatch { left, right } => {
                write!(
                    f,
                    "shape mismatch: left={:?}, right={:?} cannot be combined",
                    left, right
                )
            }
            TensorError::InvalidValue { label } => {
                write!(f, "invalid value: {label}")
            }
            TensorError::InvalidSequence { label } => {
                write!(f, "invalid call sequence: {label}")
            }
        }
    }
}

impl Error for TensorError {}

/// A simple row-major 2D tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor<T: Element = f32> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

/// Element count of a `rows x cols` tensor, rejecting empty or overflowing
/// shapes.
fn checked_len(rows: usize, cols: usize) -> PureResult<usize> {
    match rows.checked_mul(cols) {
        Some(len) if len > 0 => Ok(len),
        _ => Err(TensorError::InvalidDimensions { rows, cols }),
    }
}

impl<T: Element> Tensor<T> {
    fn from_parts(rows: usize, cols: usize, data: Vec<T>) -> PureResult<Self> {
        let expected = checked_len(rows, cols)?;
        if expected != data.len() {
            return Err(TensorError::DataLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    fn seedable_rng(seed: Option<u64>, label: &str) -> StdRng {
        determinism::rng_from_optional(seed, label)
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> PureResult<Self> {
        let len = checked_len(rows, cols)?;
        Self::from_parts(rows, cols, vec![T::zero(); len])
    }

    /// Create a tensor from raw data. The provided vector must match
    /// `rows * cols` elements.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> PureResult<Self> {
        Self::from_parts(rows, cols, data)
    }

    /// Create a tensor from f32 values, rounding them into storage precision.
    pub fn from_f32(rows: usize, cols: usize, data: &[f32]) -> PureResult<Self> {
        Self::from_parts(rows, cols, data.iter().map(|&v| T::narrow(v)).collect())
    }

    /// Construct a tensor by applying a generator function to each coordinate.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> PureResult<Self>
    where
        F: FnMut(usize, usize) -> T,
    {
        let mut data = Vec::with_capacity(checked_len(rows, cols)?);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self::from_parts(rows, cols, data)
    }

    /// Construct a tensor by sampling a normal distribution with the provided
    /// mean and standard deviation. Samples are drawn in f32 and rounded into
    /// storage precision.
    ///
    /// When `seed` is provided the RNG becomes deterministic which makes tests
    /// and benchmarks reproducible. Otherwise the global determinism config
    /// decides between a derived seed and host entropy.
    pub fn random_normal(
        rows: usize,
        cols: usize,
        mean: f32,
        std: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        let len = checked_len(rows, cols)?;
        if !(std > 0.0) {
            return Err(TensorError::InvalidValue {
                label: "random_normal_std",
            });
        }
        let mut rng = Self::seedable_rng(seed, "st-tensor/tensor/normal");
        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            let sample: f64 = StandardNormal.sample(&mut rng);
            data.push(T::narrow(mean + std * sample as f32));
        }
        Self::from_parts(rows, cols, data)
    }

    /// Returns the `(rows, cols)` pair of the tensor.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of elements stored in the tensor.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Always false: zero-sized tensors cannot be constructed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// Returns a read-only view of the underlying buffer.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Returns a mutable view of the underlying buffer.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Borrows a single row.
    ///
    /// # Panics
    /// Panics if `row >= rows`.
    pub fn row(&self, row: usize) -> &[T] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Mutably borrows a single row.
    ///
    /// # Panics
    /// Panics if `row >= rows`.
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        let start = row * self.cols;
        &mut self.data[start..start + self.cols]
    }

    /// Sets every element to zero without reallocating.
    pub fn fill_zero(&mut self) {
        self.data.fill(T::zero());
    }

    /// Converts into another storage precision through the accumulator.
    pub fn cast<U: Element>(&self) -> Tensor<U> {
        Tensor {
            data: self.data.iter().map(|v| U::narrow(v.widen())).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Widens every element into a plain f32 vector.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.data.iter().map(|v| v.widen()).collect()
    }

    /// Add a scaled tensor to this tensor (`self += scale * other`).
    pub fn add_scaled(&mut self, other: &Tensor<T>, scale: f32) -> PureResult<()> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = T::narrow(a.widen() + scale * b.widen());
        }
        Ok(())
    }

    /// Largest element-wise absolute difference. Any NaN on either side makes
    /// the result NaN.
    pub fn max_abs_diff(&self, other: &Tensor<T>) -> PureResult<f32> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let mut worst = 0.0f32;
        for (a, b) in self.data.iter().zip(other.data.iter()) {
            let diff = (a.widen() - b.widen()).abs();
            if diff.is_nan() {
                return Ok(f32::NAN);
            }
            worst = worst.max(diff);
        }
        Ok(worst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn zero_axes_are_rejected() {
        assert_eq!(
            Tensor::<f32>::zeros(0, 3).unwrap_err(),
            TensorError::InvalidDimensions { rows: 0, cols: 3 }
        );
        assert_eq!(
            Tensor::<f32>::from_vec(2, 2, vec![1.0; 3]).unwrap_err(),
            TensorError::DataLength {
                expected: 4,
                got: 3
            }
        );
    }

    #[test]
    fn overflowing_shapes_are_rejected() {
        let huge = usize::MAX / 2;
        assert_eq!(
            Tensor::<f32>::zeros(huge, 3).unwrap_err(),
            TensorError::InvalidDimensions { rows: huge, cols: 3 }
        );
        assert!(Tensor::<f32>::from_fn(3, huge, |_, _| 0.0).is_err());
        assert!(Tensor::<f32>::random_normal(huge, huge, 0.0, 1.0, Some(1)).is_err());
        assert!(Tensor::<f32>::from_vec(huge, 4, Vec::new()).is_err());
    }

    #[test]
    fn rows_are_contiguous_slices() {
        let mut tensor = Tensor::<f32>::from_fn(3, 2, |r, c| (r * 10 + c) as f32).unwrap();
        assert_eq!(tensor.row(1), &[10.0, 11.0]);
        tensor.row_mut(2)[0] = -1.0;
        assert_eq!(tensor.data()[4], -1.0);
        tensor.fill_zero();
        assert!(tensor.data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn seeded_normal_is_reproducible() {
        let a = Tensor::<f32>::random_normal(4, 8, 0.0, 1.0, Some(11)).unwrap();
        let b = Tensor::<f32>::random_normal(4, 8, 0.0, 1.0, Some(11)).unwrap();
        assert_eq!(a, b);
        assert!(Tensor::<f32>::random_normal(1, 1, 0.0, 0.0, None).is_err());
    }

    #[test]
    fn cast_and_add_scaled_go_through_accumulator() {
        let base = Tensor::<f32>::from_vec(1, 3, vec![1.0, 2.5, -4.0]).unwrap();
        let half: Tensor<f16> = base.cast();
        assert_eq!(half.dtype(), DType::F16);
        assert_eq!(half.to_f32_vec(), vec![1.0, 2.5, -4.0]);

        let mut acc = Tensor::<f32>::zeros(1, 3).unwrap();
        acc.add_scaled(&base, 2.0).unwrap();
        assert_eq!(acc.data(), &[2.0, 5.0, -8.0]);
        assert_eq!(acc.max_abs_diff(&base).unwrap(), 4.0);

        let wrong = Tensor::<f32>::zeros(3, 1).unwrap();
        assert!(matches!(
            acc.add_scaled(&wrong, 1.0),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn errors_render_human_readable_messages() {
        let err = TensorError::InvalidSequence {
            label: "backward without forward",
        };
        assert_eq!(
            err.to_string(),
            "invalid call sequence: backward without forward"
        );
    }
}

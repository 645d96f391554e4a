// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::{PureResult, TensorError};
use core::fmt;

/// Fixed geometry of a dot-interaction operator.
///
/// Every tensor the operator touches is row-major with one row per sample:
///
/// | tensor        | columns                 |
/// |---------------|-------------------------|
/// | dense         | `in_width`              |
/// | embeddings    | `n_emb * in_width`      |
/// | concatenated  | `n_ins * in_width`      |
/// | gram          | `n_ins * n_ins`         |
/// | output        | [`Self::out_len`]       |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InteractionShape {
    height: usize,
    n_emb: usize,
    in_width: usize,
}

impl InteractionShape {
    /// Validates and builds a shape. At least one embedding vector is required
    /// so that there is a pair to interact.
    pub fn new(height: usize, n_emb: usize, in_width: usize) -> PureResult<Self> {
        if height == 0 || in_width == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: height,
                cols: in_width,
            });
        }
        if n_emb == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: height,
                cols: 0,
            });
        }
        let overflow = || TensorError::InvalidDimensions {
            rows: height,
            cols: in_width,
        };
        // Every derived buffer size must fit in usize before the accessors
        // below compute them unchecked.
        let n_ins = n_emb.checked_add(1).ok_or_else(overflow)?;
        let concat_cols = n_ins.checked_mul(in_width).ok_or_else(overflow)?;
        let gram_cols = n_ins.checked_mul(n_ins).ok_or_else(overflow)?;
        let out_cols = (gram_cols / 2)
            .checked_add(in_width)
            .and_then(|v| v.checked_add(1))
            .ok_or_else(overflow)?;
        let widest = concat_cols.max(gram_cols).max(out_cols);
        height.checked_mul(widest).ok_or_else(overflow)?;
        Ok(Self {
            height,
            n_emb,
            in_width,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn n_emb(&self) -> usize {
        self.n_emb
    }

    pub fn in_width(&self) -> usize {
        self.in_width
    }

    /// Number of feature rows per sample: the dense row plus every embedding.
    pub fn n_ins(&self) -> usize {
        1 + self.n_emb
    }

    /// Number of strict upper-triangle interaction terms per sample.
    pub fn triangle_len(&self) -> usize {
        let n = self.n_ins();
        n * (n - 1) / 2
    }

    /// Length of one output row: dense passthrough, interaction terms, pad.
    pub fn out_len(&self) -> usize {
        self.in_width + self.triangle_len() + 1
    }

    /// Column of the always-zero pad slot.
    pub fn pad_index(&self) -> usize {
        self.out_len() - 1
    }

    pub fn dense_shape(&self) -> (usize, usize) {
        (self.height, self.in_width)
    }

    pub fn embedding_shape(&self) -> (usize, usize) {
        (self.height, self.n_emb * self.in_width)
    }

    pub fn concat_shape(&self) -> (usize, usize) {
        (self.height, self.n_ins() * self.in_width)
    }

    pub fn gram_shape(&self) -> (usize, usize) {
        let n = self.n_ins();
        (self.height, n * n)
    }

    pub fn output_shape(&self) -> (usize, usize) {
        (self.height, self.out_len())
    }
}

impl fmt::Display for InteractionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x(1+{})x{} -> {}",
            self.height,
            self.n_emb,
            self.in_width,
            self.out_len()
        )
    }
}

/// Rejects `got` unless it equals `expected`.
#[inline]
pub(crate) fn expect_shape(got: (usize, usize), expected: (usize, usize)) -> PureResult<()> {
    if got != expected {
        return Err(TensorError::ShapeMismatch {
            left: got,
            right: expected,
        });
    }
    Ok(())
}

/// Strict upper-triangle coordinates `(m, n)` with `n > m`, in output order:
/// column-major, i.e. `n` outer from 1, `m` inner from 0.
pub fn upper_triangle(n_ins: usize) -> impl Iterator<Item = (usize, usize)> {
    (1..n_ins).flat_map(|n| (0..n).map(move |m| (m, n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_len_counts_dense_pairs_and_pad() {
        for n_emb in 1..12 {
            let shape = InteractionShape::new(3, n_emb, 7).unwrap();
            let n_ins = n_emb + 1;
            assert_eq!(shape.out_len(), 7 + n_ins * (n_ins - 1) / 2 + 1);
            assert_eq!(upper_triangle(n_ins).count(), shape.triangle_len());
        }
        // 26 embeddings of width 128: 128 dense + 351 pairs + 1 pad.
        assert_eq!(InteractionShape::new(1, 26, 128).unwrap().out_len(), 480);
        assert_eq!(InteractionShape::new(1, 33, 128).unwrap().out_len(), 690);
    }

    #[test]
    fn oversized_shapes_are_rejected() {
        assert!(matches!(
            InteractionShape::new(1, usize::MAX, 1),
            Err(TensorError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            InteractionShape::new(1, usize::MAX / 4, 8),
            Err(TensorError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            InteractionShape::new(usize::MAX / 2, 3, 8),
            Err(TensorError::InvalidDimensions { .. })
        ));
        assert!(InteractionShape::new(1 << 20, 26, 128).is_ok());
    }

    #[test]
    fn triangle_walks_columns_first() {
        let order: Vec<_> = upper_triangle(4).collect();
        assert_eq!(
            order,
            vec![(0, 1), (0, 2), (1, 2), (0, 3), (1, 3), (2, 3)]
        );
        assert!(upper_triangle(1).next().is_none());
    }

    #[test]
    fn degenerate_shapes_are_rejected() {
        assert!(InteractionShape::new(0, 1, 4).is_err());
        assert!(InteractionShape::new(2, 0, 4).is_err());
        assert!(InteractionShape::new(2, 1, 0).is_err());
    }

    #[test]
    fn flattened_shapes_follow_row_per_sample_layout() {
        let shape = InteractionShape::new(5, 3, 4).unwrap();
        assert_eq!(shape.dense_shape(), (5, 4));
        assert_eq!(shape.embedding_shape(), (5, 12));
        assert_eq!(shape.concat_shape(), (5, 16));
        assert_eq!(shape.gram_shape(), (5, 16));
        assert_eq!(shape.output_shape(), (5, 4 + 6 + 1));
        assert_eq!(shape.pad_index(), 10);
        assert_eq!(shape.to_string(), "5x(1+3)x4 -> 11");
    }
}

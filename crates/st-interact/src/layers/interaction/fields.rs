// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Embedding inputs and gradients with explicit field geometry.
//!
//! A packed `(height, n_emb * in_width)` tensor cannot tell `2 x 3` fields
//! from `3 x 2`, so both views carry the field count alongside the data and
//! are checked as `(n_emb, in_width)` against the operator shape.

use super::shape::{expect_shape, InteractionShape};
use crate::{Element, PureResult, Tensor, TensorError};

/// Embedding features of one batch.
#[derive(Clone, Copy, Debug)]
pub enum Embeddings<'a, T: Element> {
    /// Fields stored back to back in every row.
    Packed { tensor: &'a Tensor<T>, n_emb: usize },
    /// One `(height, in_width)` tensor per field, in field order.
    Fields(&'a [Tensor<T>]),
}

impl<'a, T: Element> Embeddings<'a, T> {
    pub fn packed(tensor: &'a Tensor<T>, n_emb: usize) -> Self {
        Self::Packed { tensor, n_emb }
    }

    pub fn fields(fields: &'a [Tensor<T>]) -> Self {
        Self::Fields(fields)
    }

    /// Rejects inputs whose height, field count or field width differ from
    /// `shape`.
    pub fn check(&self, shape: &InteractionShape) -> PureResult<()> {
        match *self {
            Self::Packed { tensor, n_emb } => check_packed(shape, tensor.shape(), n_emb),
            Self::Fields(fields) => check_fields(shape, fields.iter().map(Tensor::shape)),
        }
    }

    /// Copies the embedding rows of `sample` into `dst` (`n_emb * in_width`).
    pub(crate) fn copy_row(&self, sample: usize, width: usize, dst: &mut [T]) {
        match *self {
            Self::Packed { tensor, .. } => dst.copy_from_slice(tensor.row(sample)),
            Self::Fields(fields) => {
                for (chunk, field) in dst.chunks_mut(width).zip(fields) {
                    chunk.copy_from_slice(field.row(sample));
                }
            }
        }
    }
}

/// Destination of the embedding gradient, mirroring [`Embeddings`].
#[derive(Debug)]
pub enum EmbeddingGrads<'a, T: Element> {
    Packed { tensor: &'a mut Tensor<T>, n_emb: usize },
    Fields(&'a mut [Tensor<T>]),
}

impl<'a, T: Element> EmbeddingGrads<'a, T> {
    pub fn packed(tensor: &'a mut Tensor<T>, n_emb: usize) -> Self {
        Self::Packed { tensor, n_emb }
    }

    pub fn fields(fields: &'a mut [Tensor<T>]) -> Self {
        Self::Fields(fields)
    }

    pub fn check(&self, shape: &InteractionShape) -> PureResult<()> {
        match self {
            Self::Packed { tensor, n_emb } => check_packed(shape, tensor.shape(), *n_emb),
            Self::Fields(fields) => check_fields(shape, fields.iter().map(Tensor::shape)),
        }
    }
}

fn check_packed(shape: &InteractionShape, got: (usize, usize), n_emb: usize) -> PureResult<()> {
    let (rows, cols) = got;
    if n_emb == 0 || cols % n_emb != 0 {
        return Err(TensorError::ShapeMismatch {
            left: got,
            right: shape.embedding_shape(),
        });
    }
    expect_shape((n_emb, cols / n_emb), (shape.n_emb(), shape.in_width()))?;
    expect_shape((rows, cols), shape.embedding_shape())
}

fn check_fields(
    shape: &InteractionShape,
    fields: impl ExactSizeIterator<Item = (usize, usize)>,
) -> PureResult<()> {
    expect_shape((fields.len(), shape.in_width()), (shape.n_emb(), shape.in_width()))?;
    for field in fields {
        expect_shape(field, shape.dense_shape())?;
    }
    Ok(())
}

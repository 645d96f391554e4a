// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Feature concatenation and its gradient scatter.

use super::batch::for_each_sample;
use super::fields::{EmbeddingGrads, Embeddings};
use super::shape::{expect_shape, InteractionShape};
use crate::{Element, PureResult, Tensor};

/// Stacks the dense row on top of the embedding rows of every sample:
/// row 0 of the per-sample matrix is the dense vector, rows `1..=n_emb` are
/// the embeddings in field order.
pub fn concat<T: Element>(
    shape: &InteractionShape,
    dense: &Tensor<T>,
    embeddings: Embeddings<'_, T>,
    out: &mut Tensor<T>,
    parallel: bool,
) -> PureResult<()> {
    expect_shape(dense.shape(), shape.dense_shape())?;
    embeddings.check(shape)?;
    expect_shape(out.shape(), shape.concat_shape())?;

    let width = shape.in_width();
    let (_, stride) = shape.concat_shape();
    for_each_sample(parallel, out.data_mut(), stride, || (), |_, sample, row| {
        let (head, tail) = row.split_at_mut(width);
        head.copy_from_slice(dense.row(sample));
        embeddings.copy_row(sample, width, tail);
    });
    Ok(())
}

/// Routes the per-sample matrix gradient back to its sources.
///
/// Row 0 is **added** to `dense_grad` because the dense features usually feed
/// other consumers whose gradients land in the same buffer. Rows `1..` are
/// **written** into the embedding gradient; this operator is their only
/// producer.
pub fn scatter<T: Element>(
    shape: &InteractionShape,
    concat_grad: &Tensor<T>,
    dense_grad: &mut Tensor<T>,
    embedding_grad: EmbeddingGrads<'_, T>,
    parallel: bool,
) -> PureResult<()> {
    expect_shape(concat_grad.shape(), shape.concat_shape())?;
    expect_shape(dense_grad.shape(), shape.dense_shape())?;
    embedding_grad.check(shape)?;

    let width = shape.in_width();
    for_each_sample(parallel, dense_grad.data_mut(), width, || (), |_, sample, row| {
        let source = &concat_grad.row(sample)[..width];
        for (dst, src) in row.iter_mut().zip(source) {
            *dst = T::narrow(dst.widen() + src.widen());
        }
    });
    match embedding_grad {
        EmbeddingGrads::Packed { tensor, .. } => {
            let (_, stride) = shape.embedding_shape();
            for_each_sample(parallel, tensor.data_mut(), stride, || (), |_, sample, row| {
                row.copy_from_slice(&concat_grad.row(sample)[width..]);
            });
        }
        EmbeddingGrads::Fields(fields) => {
            for (field, grad) in fields.iter_mut().enumerate() {
                let start = (field + 1) * width;
                for_each_sample(parallel, grad.data_mut(), width, || (), |_, sample, row| {
                    row.copy_from_slice(&concat_grad.row(sample)[start..start + width]);
                });
            }
        }
    }
    Ok(())
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Per-sample self-product (Gram) matrix and its symmetric gradient.

use super::batch::for_each_sample;
use super::shape::{expect_shape, InteractionShape};
use crate::{Accumulator, ComputeMode, Element, PureResult, Tensor};

/// Widens one sample's feature rows into `scratch`, already prepared for the
/// multiply path.
#[inline]
fn load_rows<T: Element>(mode: ComputeMode, source: &[T], scratch: &mut Vec<Accumulator>) {
    scratch.clear();
    scratch.extend(source.iter().map(|v| mode.operand(v.widen())));
}

#[inline]
fn dot(lhs: &[Accumulator], rhs: &[Accumulator]) -> Accumulator {
    debug_assert_eq!(lhs.len(), rhs.len());
    let mut acc: Accumulator = 0.0;
    for (a, b) in lhs.iter().zip(rhs) {
        acc += a * b;
    }
    acc
}

/// `gram[b, i, j] = Σ_k concat[b, i, k] * concat[b, j, k]`, both triangles
/// filled. Each entry is reduced in [`Accumulator`] precision and narrowed
/// once; `(i, j)` and `(j, i)` share a single reduction, which is exact since
/// the summands are identical.
pub fn gram<T: Element>(
    shape: &InteractionShape,
    concat: &Tensor<T>,
    out: &mut Tensor<T>,
    mode: ComputeMode,
    parallel: bool,
) -> PureResult<()> {
    expect_shape(concat.shape(), shape.concat_shape())?;
    expect_shape(out.shape(), shape.gram_shape())?;

    let n = shape.n_ins();
    let width = shape.in_width();
    for_each_sample(
        parallel,
        out.data_mut(),
        n * n,
        Vec::<Accumulator>::new,
        |rows, sample, gram| {
            load_rows(mode, concat.row(sample), rows);
            for i in 0..n {
                let row_i = &rows[i * width..(i + 1) * width];
                for j in i..n {
                    let row_j = &rows[j * width..(j + 1) * width];
                    let value = T::narrow(dot(row_i, row_j));
                    gram[i * n + j] = value;
                    gram[j * n + i] = value;
                }
            }
        },
    );
    Ok(())
}

/// Folds an upper-triangular Gram gradient back onto the feature rows:
///
/// `concat_grad[b, m, :] = Σ_k (gram_grad[b, m, k] + gram_grad[b, k, m]) * concat[b, k, :]`
///
/// An interaction `dot(row_i, row_j)` depends on both rows, but only one of
/// `(i, j)`/`(j, i)` carries gradient, so the symmetric sum routes it to both.
/// Any lower-triangle or diagonal gradient the caller supplies is honoured by
/// the same rule.
pub fn recombine<T: Element>(
    shape: &InteractionShape,
    gram_grad: &Tensor<T>,
    concat: &Tensor<T>,
    out: &mut Tensor<T>,
    mode: ComputeMode,
    parallel: bool,
) -> PureResult<()> {
    expect_shape(gram_grad.shape(), shape.gram_shape())?;
    expect_shape(concat.shape(), shape.concat_shape())?;
    expect_shape(out.shape(), shape.concat_shape())?;

    let n = shape.n_ins();
    let width = shape.in_width();
    for_each_sample(
        parallel,
        out.data_mut(),
        n * width,
        RecombineScratch::default,
        |scratch, sample, grad_rows| {
            let upstream = gram_grad.row(sample);
            scratch.coeff.clear();
            for m in 0..n {
                for k in 0..n {
                    let sym = upstream[m * n + k].widen() + upstream[k * n + m].widen();
                    scratch.coeff.push(mode.operand(sym));
                }
            }
            load_rows(mode, concat.row(sample), &mut scratch.rows);

            for (m, dst) in grad_rows.chunks_mut(width).enumerate() {
                scratch.acc.clear();
                scratch.acc.resize(width, 0.0);
                for k in 0..n {
                    let coeff = scratch.coeff[m * n + k];
                    let row_k = &scratch.rows[k * width..(k + 1) * width];
                    for (acc, x) in scratch.acc.iter_mut().zip(row_k) {
                        *acc += coeff * x;
                    }
                }
                for (slot, acc) in dst.iter_mut().zip(&scratch.acc) {
                    *slot = T::narrow(*acc);
                }
            }
        },
    );
    Ok(())
}

#[derive(Default)]
struct RecombineScratch {
    coeff: Vec<Accumulator>,
    rows: Vec<Accumulator>,
    acc: Vec<Accumulator>,
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Output row layout: `[dense | strict upper triangle | pad]`.

use super::batch::for_each_sample;
use super::shape::{expect_shape, upper_triangle, InteractionShape};
use crate::{Element, PureResult, Tensor};

/// Writes the output rows. The dense vector passes through unchanged, the
/// interaction terms follow in [`upper_triangle`] order and the final pad
/// slot is always zero.
pub fn assemble<T: Element>(
    shape: &InteractionShape,
    dense: &Tensor<T>,
    gram: &Tensor<T>,
    out: &mut Tensor<T>,
    parallel: bool,
) -> PureResult<()> {
    expect_shape(dense.shape(), shape.dense_shape())?;
    expect_shape(gram.shape(), shape.gram_shape())?;
    expect_shape(out.shape(), shape.output_shape())?;

    let n = shape.n_ins();
    let width = shape.in_width();
    for_each_sample(parallel, out.data_mut(), shape.out_len(), || (), |_, sample, row| {
        let (head, tail) = row.split_at_mut(width);
        head.copy_from_slice(dense.row(sample));
        let gram = gram.row(sample);
        let (terms, pad) = tail.split_at_mut(tail.len() - 1);
        for (slot, (m, col)) in terms.iter_mut().zip(upper_triangle(n)) {
            *slot = gram[m * n + col];
        }
        pad[0] = T::zero();
    });
    Ok(())
}

/// Splits an output gradient back into its sources. The dense columns are
/// copied into `dense_grad`; each interaction term is placed at its `(m, n)`
/// position in `gram_grad` and every other position, the diagonal and the
/// lower triangle included, is zeroed. The pad gradient is dropped.
pub fn disassemble<T: Element>(
    shape: &InteractionShape,
    grad_output: &Tensor<T>,
    dense_grad: &mut Tensor<T>,
    gram_grad: &mut Tensor<T>,
    parallel: bool,
) -> PureResult<()> {
    expect_shape(grad_output.shape(), shape.output_shape())?;
    expect_shape(dense_grad.shape(), shape.dense_shape())?;
    expect_shape(gram_grad.shape(), shape.gram_shape())?;

    let n = shape.n_ins();
    let width = shape.in_width();
    let terms_end = shape.pad_index();
    for_each_sample(parallel, dense_grad.data_mut(), width, || (), |_, sample, row| {
        row.copy_from_slice(&grad_output.row(sample)[..width]);
    });
    for_each_sample(parallel, gram_grad.data_mut(), n * n, || (), |_, sample, grad| {
        grad.fill(T::zero());
        let terms = &grad_output.row(sample)[width..terms_end];
        for (value, (m, col)) in terms.iter().zip(upper_triangle(n)) {
            grad[m * n + col] = *value;
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_dense_then_triangle_then_pad() {
        let shape = InteractionShape::new(1, 2, 2).unwrap();
        let dense = Tensor::<f32>::from_vec(1, 2, vec![-1.0, -2.0]).unwrap();
        // gram[m][n] = 10 * m + n, deliberately asymmetric to pin the
        // upper-triangle reads.
        let gram = Tensor::<f32>::from_fn(1, 9, |_, c| (10 * (c / 3) + c % 3) as f32).unwrap();
        let mut out = Tensor::<f32>::from_vec(1, 6, vec![9.0; 6]).unwrap();
        assemble(&shape, &dense, &gram, &mut out, false).unwrap();
        assert_eq!(out.data(), &[-1.0, -2.0, 1.0, 2.0, 12.0, 0.0]);
    }

    #[test]
    fn disassemble_inverts_the_layout_and_drops_pad() {
        let shape = InteractionShape::new(2, 2, 2).unwrap();
        let grad = Tensor::<f32>::from_vec(
            2,
            6,
            vec![
                1.0, 2.0, 3.0, 4.0, 5.0, 99.0, //
                6.0, 7.0, 8.0, 9.0, 10.0, -99.0,
            ],
        )
        .unwrap();
        let mut dense_grad = Tensor::<f32>::from_vec(2, 2, vec![5.0; 4]).unwrap();
        let mut gram_grad = Tensor::<f32>::from_vec(2, 9, vec![7.0; 18]).unwrap();
        disassemble(&shape, &grad, &mut dense_grad, &mut gram_grad, false).unwrap();
        assert_eq!(dense_grad.data(), &[1.0, 2.0, 6.0, 7.0]);
        assert_eq!(
            gram_grad.row(0),
            &[0.0, 3.0, 4.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0]
        );
        assert_eq!(
            gram_grad.row(1),
            &[0.0, 8.0, 9.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0]
        );
    }
}

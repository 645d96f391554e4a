// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::{Element, PureResult, Tensor};

/// Module contract for interaction layers that combine a dense feature tensor
/// with a flattened embedding tensor.
///
/// Unlike single-input layers, forward takes `&mut self`: the module keeps the
/// activations its backward pass needs, so forward and backward must be
/// called in pairs on the same instance.
pub trait Module<T: Element> {
    /// Identifier used in tracing spans.
    fn name(&self) -> &str;

    /// Expected `(rows, cols)` of the dense and embedding inputs, in that order.
    fn input_shapes(&self) -> [(usize, usize); 2];

    /// `(rows, cols)` of the forward output and of the incoming gradient.
    fn output_shape(&self) -> (usize, usize);

    /// Runs a forward pass and retains the state for the following backward.
    fn forward(&mut self, dense: &Tensor<T>, embeddings: &Tensor<T>) -> PureResult<Tensor<T>>;

    /// Propagates `grad_output` back to both inputs. The dense gradient is
    /// accumulated into `dense_grad`, the embedding gradient overwrites
    /// `embedding_grad`.
    fn backward(
        &mut self,
        grad_output: &Tensor<T>,
        dense_grad: &mut Tensor<T>,
        embedding_grad: &mut Tensor<T>,
    ) -> PureResult<()>;

    /// Runs [`Module::backward`] into freshly zeroed buffers and returns them
    /// as `(dense_grad, embedding_grad)`.
    fn backward_fresh(&mut self, grad_output: &Tensor<T>) -> PureResult<(Tensor<T>, Tensor<T>)> {
        let [(dense_rows, dense_cols), (emb_rows, emb_cols)] = self.input_shapes();
        let mut dense_grad = Tensor::zeros(dense_rows, dense_cols)?;
        let mut embedding_grad = Tensor::zeros(emb_rows, emb_cols)?;
        self.backward(grad_output, &mut dense_grad, &mut embedding_grad)?;
        Ok((dense_grad, embedding_grad))
    }

    /// Number of trainable scalars. Interaction layers are parameter-free by
    /// default.
    fn parameter_count(&self) -> usize {
        0
    }
}

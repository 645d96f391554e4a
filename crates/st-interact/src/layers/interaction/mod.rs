// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Dot-product feature interaction.
//!
//! Forward stacks the dense row and the embedding rows of each sample,
//! computes their Gram matrix and emits `[dense | upper triangle | 0]`.
//! Backward undoes the layout, folds the triangle gradient onto both
//! participating rows and scatters the rows back to their sources.

pub mod assemble;
mod batch;
pub mod concat;
pub mod fields;
pub mod gram;
pub mod shape;

pub use fields::{EmbeddingGrads, Embeddings};
pub use shape::{upper_triangle, InteractionShape};

use crate::module::Module;
use crate::{ComputeMode, Element, PureResult, Tensor, TensorError};
use shape::expect_shape;
use spiral_config::determinism;
use tracing::{debug, debug_span, trace};

/// Samples below which batch kernels stay on the calling thread.
pub const DEFAULT_PARALLEL_MIN_BATCH: usize = 64;

const BACKWARD_WITHOUT_FORWARD: &str = "dot interaction backward requires a preceding forward";

/// Buffers owned by one forward/backward pair.
#[derive(Debug)]
struct Workspace<T: Element> {
    concat: Tensor<T>,
    gram: Tensor<T>,
    gram_grad: Tensor<T>,
    concat_grad: Tensor<T>,
    dense_pass: Tensor<T>,
}

impl<T: Element> Workspace<T> {
    fn new(shape: &InteractionShape) -> PureResult<Self> {
        let (rows, concat_cols) = shape.concat_shape();
        let (_, gram_cols) = shape.gram_shape();
        Ok(Self {
            concat: Tensor::zeros(rows, concat_cols)?,
            gram: Tensor::zeros(rows, gram_cols)?,
            gram_grad: Tensor::zeros(rows, gram_cols)?,
            concat_grad: Tensor::zeros(rows, concat_cols)?,
            dense_pass: Tensor::zeros(rows, shape.in_width())?,
        })
    }
}

/// Read-only view of the state retained between forward and backward.
#[derive(Clone, Copy, Debug)]
pub struct InteractionIntermediates<'a, T: Element> {
    /// `(height, n_ins * in_width)`: dense row followed by the embeddings.
    pub concat: &'a Tensor<T>,
    /// `(height, n_ins * n_ins)`: full Gram matrix, both triangles.
    pub gram: &'a Tensor<T>,
}

/// Parameter-free pairwise interaction operator.
///
/// A forward call arms the operator with the concatenated feature matrix;
/// the next backward call consumes it. Calling backward without an armed
/// forward is rejected with [`TensorError::InvalidSequence`]. Buffers are
/// recycled across steps, so a steady training loop allocates only the
/// returned output tensors.
///
/// Instances are not meant to be shared between data-parallel replicas; give
/// every replica its own operator.
#[derive(Debug)]
pub struct DotInteraction<T: Element = f32> {
    name: String,
    shape: InteractionShape,
    compute: ComputeMode,
    parallel_min_batch: usize,
    pending: Option<Workspace<T>>,
    spare: Option<Workspace<T>>,
}

impl<T: Element> DotInteraction<T> {
    pub fn new(name: impl Into<String>, shape: InteractionShape) -> Self {
        Self {
            name: name.into(),
            shape,
            compute: ComputeMode::Standard,
            parallel_min_batch: DEFAULT_PARALLEL_MIN_BATCH,
            pending: None,
            spare: None,
        }
    }

    /// Selects the multiply path used by both Gram forward and recombination.
    pub fn with_compute_mode(mut self, compute: ComputeMode) -> Self {
        self.compute = compute;
        self
    }

    /// Batches with at least this many samples are spread over the rayon pool.
    /// `0` always parallelises.
    pub fn with_parallel_min_batch(mut self, samples: usize) -> Self {
        self.parallel_min_batch = samples;
        self
    }

    pub fn shape(&self) -> &InteractionShape {
        &self.shape
    }

    pub fn compute_mode(&self) -> ComputeMode {
        self.compute
    }

    /// Whether a forward result is waiting for its backward call.
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Retained concatenated and Gram matrices of the pending forward call.
    pub fn intermediates(&self) -> Option<InteractionIntermediates<'_, T>> {
        self.pending.as_ref().map(|ws| InteractionIntermediates {
            concat: &ws.concat,
            gram: &ws.gram,
        })
    }

    fn parallel(&self) -> bool {
        self.shape.height() >= self.parallel_min_batch && !determinism::lock_reduction_order()
    }

    fn checkout_workspace(&mut self) -> PureResult<Workspace<T>> {
        if let Some(stale) = self.pending.take() {
            debug!(
                name = %self.name,
                "forward overwrote state of a forward that never ran backward"
            );
            return Ok(stale);
        }
        match self.spare.take() {
            Some(ws) => {
                trace!(name = %self.name, "reusing interaction workspace");
                Ok(ws)
            }
            None => {
                trace!(name = %self.name, "allocating interaction workspace");
                Workspace::new(&self.shape)
            }
        }
    }

    fn run_forward(
        &self,
        ws: &mut Workspace<T>,
        dense: &Tensor<T>,
        embeddings: Embeddings<'_, T>,
        parallel: bool,
    ) -> PureResult<Tensor<T>> {
        concat::concat(&self.shape, dense, embeddings, &mut ws.concat, parallel)?;
        gram::gram(&self.shape, &ws.concat, &mut ws.gram, self.compute, parallel)?;
        let (rows, cols) = self.shape.output_shape();
        let mut output = Tensor::zeros(rows, cols)?;
        assemble::assemble(&self.shape, dense, &ws.gram, &mut output, parallel)?;
        Ok(output)
    }

    fn run_backward(
        &self,
        ws: &mut Workspace<T>,
        grad_output: &Tensor<T>,
        dense_grad: &mut Tensor<T>,
        embedding_grad: EmbeddingGrads<'_, T>,
        parallel: bool,
    ) -> PureResult<()> {
        assemble::disassemble(
            &self.shape,
            grad_output,
            &mut ws.dense_pass,
            &mut ws.gram_grad,
            parallel,
        )?;
        gram::recombine(
            &self.shape,
            &ws.gram_grad,
            &ws.concat,
            &mut ws.concat_grad,
            self.compute,
            parallel,
        )?;
        dense_grad.add_scaled(&ws.dense_pass, 1.0)?;
        concat::scatter(
            &self.shape,
            &ws.concat_grad,
            dense_grad,
            embedding_grad,
            parallel,
        )
    }

    /// Computes `[dense | upper-triangle interactions | 0]` for every sample
    /// and retains what backward needs.
    ///
    /// `embeddings` is read as `(height, n_emb * in_width)` with the configured
    /// field geometry. Use [`Self::forward_embeddings`] with a declared field
    /// count, or [`Self::forward_fields`], to have that geometry checked too.
    pub fn forward(&mut self, dense: &Tensor<T>, embeddings: &Tensor<T>) -> PureResult<Tensor<T>> {
        let packed = Embeddings::packed(embeddings, self.shape.n_emb());
        self.forward_embeddings(dense, packed)
    }

    /// Forward pass over one `(height, in_width)` tensor per embedding field.
    pub fn forward_fields(
        &mut self,
        dense: &Tensor<T>,
        fields: &[Tensor<T>],
    ) -> PureResult<Tensor<T>> {
        self.forward_embeddings(dense, Embeddings::fields(fields))
    }

    /// Forward pass over any embedding view. Field count and width are
    /// validated against the operator shape before any work is done.
    pub fn forward_embeddings(
        &mut self,
        dense: &Tensor<T>,
        embeddings: Embeddings<'_, T>,
    ) -> PureResult<Tensor<T>> {
        let span = debug_span!(
            "dot_interaction.forward",
            name = %self.name,
            shape = %self.shape,
            dtype = %T::DTYPE,
            compute = %self.compute,
        );
        let _entered = span.enter();

        expect_shape(dense.shape(), self.shape.dense_shape())?;
        embeddings.check(&self.shape)?;

        let parallel = self.parallel();
        let mut ws = self.checkout_workspace()?;
        match self.run_forward(&mut ws, dense, embeddings, parallel) {
            Ok(output) => {
                self.pending = Some(ws);
                Ok(output)
            }
            Err(err) => {
                self.spare = Some(ws);
                Err(err)
            }
        }
    }

    /// Back-propagates `grad_output` through the pending forward call.
    ///
    /// The dense gradient (passthrough columns plus the dense row's share of
    /// every interaction) is **added** to `dense_grad`. The embedding gradient
    /// **replaces** the contents of `embedding_grad`.
    ///
    /// Shape errors leave the pending forward intact; a successful call
    /// consumes it.
    pub fn backward(
        &mut self,
        grad_output: &Tensor<T>,
        dense_grad: &mut Tensor<T>,
        embedding_grad: &mut Tensor<T>,
    ) -> PureResult<()> {
        let packed = EmbeddingGrads::packed(embedding_grad, self.shape.n_emb());
        self.backward_embeddings(grad_output, dense_grad, packed)
    }

    /// Backward pass writing one `(height, in_width)` gradient per field.
    pub fn backward_fields(
        &mut self,
        grad_output: &Tensor<T>,
        dense_grad: &mut Tensor<T>,
        field_grads: &mut [Tensor<T>],
    ) -> PureResult<()> {
        self.backward_embeddings(grad_output, dense_grad, EmbeddingGrads::fields(field_grads))
    }

    /// Backward pass into any embedding gradient view.
    pub fn backward_embeddings(
        &mut self,
        grad_output: &Tensor<T>,
        dense_grad: &mut Tensor<T>,
        embedding_grad: EmbeddingGrads<'_, T>,
    ) -> PureResult<()> {
        let span = debug_span!(
            "dot_interaction.backward",
            name = %self.name,
            shape = %self.shape,
            dtype = %T::DTYPE,
        );
        let _entered = span.enter();

        if self.pending.is_none() {
            return Err(TensorError::InvalidSequence {
                label: BACKWARD_WITHOUT_FORWARD,
            });
        }
        expect_shape(grad_output.shape(), self.shape.output_shape())?;
        expect_shape(dense_grad.shape(), self.shape.dense_shape())?;
        embedding_grad.check(&self.shape)?;

        let parallel = self.parallel();
        let Some(mut ws) = self.pending.take() else {
            return Err(TensorError::InvalidSequence {
                label: BACKWARD_WITHOUT_FORWARD,
            });
        };
        let result = self.run_backward(&mut ws, grad_output, dense_grad, embedding_grad, parallel);
        self.spare = Some(ws);
        result
    }

    /// Drops any pending forward state and the recycled buffers.
    pub fn reset(&mut self) {
        self.pending = None;
        self.spare = None;
    }
}

impl<T: Element> Module<T> for DotInteraction<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_shapes(&self) -> [(usize, usize); 2] {
        [self.shape.dense_shape(), self.shape.embedding_shape()]
    }

    fn output_shape(&self) -> (usize, usize) {
        self.shape.output_shape()
    }

    fn forward(&mut self, dense: &Tensor<T>, embeddings: &Tensor<T>) -> PureResult<Tensor<T>> {
        DotInteraction::forward(self, dense, embeddings)
    }

    fn backward(
        &mut self,
        grad_output: &Tensor<T>,
        dense_grad: &mut Tensor<T>,
        embedding_grad: &mut Tensor<T>,
    ) -> PureResult<()> {
        DotInteraction::backward(self, grad_output, dense_grad, embedding_grad)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Feature interaction operators for recommendation models.
//!
//! [`DotInteraction`] takes a dense feature row and a set of embedding rows
//! per sample and emits the dense row followed by every pairwise dot product
//! between distinct rows. The backward pass routes the incoming gradient to
//! both inputs through the symmetric Gram derivative.

pub mod config;
pub mod layers;
pub mod module;
pub mod telemetry;

pub use config::{ConfigError, InteractionConfig};
pub use layers::{
    upper_triangle, DotInteraction, EmbeddingGrads, Embeddings, InteractionIntermediates,
    InteractionShape, DEFAULT_PARALLEL_MIN_BATCH,
};
pub use module::Module;

pub use st_tensor::{
    round_tf32, Accumulator, ComputeMode, DType, Element, PureResult, Tensor, TensorError,
};

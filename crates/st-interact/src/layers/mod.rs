pub mod interaction;

pub use interaction::{
    upper_triangle, DotInteraction, EmbeddingGrads, Embeddings, InteractionIntermediates,
    InteractionShape, DEFAULT_PARALLEL_MIN_BATCH,
};

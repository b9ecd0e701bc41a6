//! Out-of-sample embedding
//!
//! Landmark embeddings produced by a reduction stage, the stress functional
//! measuring how well a point fits such an embedding, and the projector that
//! places new frames into it.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

pub mod landmarks;
pub mod projection;
pub mod stress;

pub use self::landmarks::{FixedLandmarkEmbedding, LandmarkEmbedding};
pub use self::projection::OutOfSampleProjector;
pub use self::stress::StressFunction;

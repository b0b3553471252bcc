//! Anomaly Scoring Engine
//!
//! Loads a serialized model artifact, normalizes its container layout,
//! resolves one scoring capability and scores feature vectors with it.

mod artifact;
mod model;

pub use artifact::{
    decode_artifact, ArtifactEncoding, CentroidSpec, ContainerSpec, EstimatorSpec, GaussianSpec,
    LinearSpec, LogisticSpec, ModelArtifact, PipelineSpec, ScalerSpec, StageSpec,
};
pub use model::{Capability, ModelHandle};

use thiserror::Error;

/// Errors from model loading and scoring
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Artifact decode failed (json: {json}; postcard: {postcard})")]
    Decode { json: String, postcard: String },

    #[error("Container holds no model under any known key")]
    EmptyContainer,

    #[error("Pipeline must end with exactly one estimator stage")]
    InvalidPipeline,

    #[error("Model declares no supported scoring capability")]
    UnsupportedModel,

    #[error("Input has {got} features, {stage} expects {expected}")]
    DimensionMismatch {
        stage: &'static str,
        got: usize,
        expected: usize,
    },
}

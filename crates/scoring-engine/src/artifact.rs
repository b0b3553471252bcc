//! Model Artifact Schema

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Serialized model artifact, as fetched from blob storage.
///
/// Two encodings are accepted, tried in order: serde_json (structured
/// object) and postcard (compact binary). Both share this schema; the
/// enums stay externally tagged so the non-self-describing binary form
/// round-trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelArtifact {
    /// Wrapper object holding the model under one of several known keys
    Container(ContainerSpec),
    /// A bare transform-then-estimate pipeline
    Pipeline(PipelineSpec),
    /// A bare estimator
    Estimator(EstimatorSpec),
}

/// Container layout; the keys mirror what training jobs historically
/// export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    #[serde(default)]
    pub pipeline: Option<PipelineSpec>,
    #[serde(default)]
    pub model: Option<EstimatorSpec>,
    #[serde(default)]
    pub scaler: Option<ScalerSpec>,
    #[serde(default)]
    pub clf: Option<EstimatorSpec>,
}

/// Ordered transform stages followed by one final estimator stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub stages: Vec<StageSpec>,
}

/// One pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSpec {
    Scaler(ScalerSpec),
    Estimator(EstimatorSpec),
}

/// Standardization stage: `(x - mean) / scale` per component.
/// A zero scale component passes the centred value through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerSpec {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    /// Declared training input width, when known
    #[serde(default)]
    pub n_features: Option<usize>,
}

/// Estimator parameters with optional capability blocks.
///
/// A capability is supported iff its block is present; resolution probes
/// the blocks in a fixed priority order and keeps the first one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstimatorSpec {
    /// Declared training input width, when known
    #[serde(default)]
    pub n_features: Option<usize>,
    /// Signed margin to the normal region; higher is more normal
    #[serde(default)]
    pub decision_function: Option<CentroidSpec>,
    /// Log-density under the training distribution; lower is more anomalous
    #[serde(default)]
    pub score_samples: Option<GaussianSpec>,
    /// Class-probability head (two classes, or a degenerate single class)
    #[serde(default)]
    pub predict_proba: Option<LogisticSpec>,
    /// Raw numeric prediction
    #[serde(default)]
    pub predict: Option<LinearSpec>,
}

/// `decision_function` parameters: offset minus distance to a centroid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidSpec {
    pub center: Vec<f64>,
    pub offset: f64,
}

/// `score_samples` parameters: independent Gaussian per component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianSpec {
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
}

/// `predict_proba` parameters: logistic head
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticSpec {
    pub weights: Vec<f64>,
    pub bias: f64,
    /// Classes the head was trained with (1 or 2)
    pub classes: usize,
}

/// `predict` parameters: linear model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSpec {
    pub weights: Vec<f64>,
    pub bias: f64,
}

/// Encoding an artifact was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactEncoding {
    Json,
    Postcard,
}

impl ArtifactEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactEncoding::Json => "json",
            ArtifactEncoding::Postcard => "postcard",
        }
    }
}

/// Decode artifact bytes, trying the JSON encoding first and falling
/// back to postcard. Both failures are reported together.
pub fn decode_artifact(bytes: &[u8]) -> Result<(ModelArtifact, ArtifactEncoding), ModelError> {
    match serde_json::from_slice::<ModelArtifact>(bytes) {
        Ok(artifact) => Ok((artifact, ArtifactEncoding::Json)),
        Err(json_err) => match postcard::from_bytes::<ModelArtifact>(bytes) {
            Ok(artifact) => Ok((artifact, ArtifactEncoding::Postcard)),
            Err(postcard_err) => Err(ModelError::Decode {
                json: json_err.to_string(),
                postcard: postcard_err.to_string(),
            }),
        },
    }
}

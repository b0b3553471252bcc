//! Model Resolution and Scoring

use signal_features::FeatureVector;
use tracing::{debug, info};

use crate::artifact::{
    decode_artifact, CentroidSpec, ContainerSpec, EstimatorSpec, GaussianSpec, LinearSpec,
    LogisticSpec, ModelArtifact, PipelineSpec, ScalerSpec, StageSpec,
};
use crate::ModelError;

/// Scoring capability resolved from an estimator.
///
/// Probed in declaration order below; the first block present on the
/// estimator wins. Resolution happens once at load, never per event.
#[derive(Debug)]
pub enum Capability {
    /// Higher output means more normal
    DecisionFunction(CentroidSpec),
    /// Log-density; lower output means more anomalous
    ScoreSamples(GaussianSpec),
    /// Probability of the anomalous class
    ProbabilisticClassifier(LogisticSpec),
    /// Raw predictor output
    GenericPredictor(LinearSpec),
}

impl Capability {
    fn resolve(spec: &EstimatorSpec) -> Result<Self, ModelError> {
        if let Some(centroid) = &spec.decision_function {
            return Ok(Capability::DecisionFunction(centroid.clone()));
        }
        if let Some(gaussian) = &spec.score_samples {
            return Ok(Capability::ScoreSamples(gaussian.clone()));
        }
        if let Some(logistic) = &spec.predict_proba {
            return Ok(Capability::ProbabilisticClassifier(logistic.clone()));
        }
        if let Some(linear) = &spec.predict {
            return Ok(Capability::GenericPredictor(linear.clone()));
        }
        Err(ModelError::UnsupportedModel)
    }

    /// Capability name, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Capability::DecisionFunction(_) => "decision_function",
            Capability::ScoreSamples(_) => "score_samples",
            Capability::ProbabilisticClassifier(_) => "predict_proba",
            Capability::GenericPredictor(_) => "predict",
        }
    }

    fn score(&self, x: &[f64]) -> Result<f64, ModelError> {
        match self {
            Capability::DecisionFunction(spec) => {
                check_width("decision_function", x.len(), spec.center.len())?;
                let distance = x
                    .iter()
                    .zip(&spec.center)
                    .map(|(v, c)| (v - c).powi(2))
                    .sum::<f64>()
                    .sqrt();
                Ok(spec.offset - distance)
            }
            Capability::ScoreSamples(spec) => {
                check_width("score_samples", x.len(), spec.mean.len())?;
                check_width("score_samples", spec.variance.len(), spec.mean.len())?;
                let ln_2pi = (2.0 * std::f64::consts::PI).ln();
                let mut log_density = 0.0;
                for ((v, mean), variance) in x.iter().zip(&spec.mean).zip(&spec.variance) {
                    let variance = variance.max(f64::MIN_POSITIVE);
                    log_density -= 0.5 * ((v - mean).powi(2) / variance + variance.ln() + ln_2pi);
                }
                Ok(log_density)
            }
            Capability::ProbabilisticClassifier(spec) => {
                check_width("predict_proba", x.len(), spec.weights.len())?;
                let logit = dot(x, &spec.weights) + spec.bias;
                let p = 1.0 / (1.0 + (-logit).exp());
                // Probability row per class; anomalous class sits at
                // index 1, a single-class head yields its only entry.
                let proba = if spec.classes >= 2 {
                    vec![1.0 - p, p]
                } else {
                    vec![1.0]
                };
                Ok(if proba.len() >= 2 { proba[1] } else { proba[0] })
            }
            Capability::GenericPredictor(spec) => {
                check_width("predict", x.len(), spec.weights.len())?;
                Ok(dot(x, &spec.weights) + spec.bias)
            }
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn check_width(stage: &'static str, got: usize, expected: usize) -> Result<(), ModelError> {
    if got != expected {
        return Err(ModelError::DimensionMismatch {
            stage,
            got,
            expected,
        });
    }
    Ok(())
}

/// Resolved, immutable scoring model.
///
/// Built once at startup and shared read-only across pipeline tasks.
#[derive(Debug)]
pub struct ModelHandle {
    stages: Vec<ScalerSpec>,
    capability: Capability,
    expected_features: Option<usize>,
}

impl ModelHandle {
    /// Decode, normalize and resolve an artifact in one step.
    pub fn load(bytes: &[u8]) -> Result<Self, ModelError> {
        let (artifact, encoding) = decode_artifact(bytes)?;
        let handle = Self::resolve(artifact)?;
        info!(
            bytes = bytes.len(),
            encoding = encoding.as_str(),
            capability = handle.capability.kind(),
            expected_features = ?handle.expected_features,
            "model artifact resolved"
        );
        Ok(handle)
    }

    /// Normalize any artifact form into a scoring handle.
    ///
    /// Container keys are tried in priority order: embedded pipeline,
    /// embedded model, (scaler, clf) composed into a two-stage pipeline,
    /// bare clf.
    pub fn resolve(artifact: ModelArtifact) -> Result<Self, ModelError> {
        match artifact {
            ModelArtifact::Container(container) => Self::from_container(container),
            ModelArtifact::Pipeline(pipeline) => Self::from_pipeline(pipeline),
            ModelArtifact::Estimator(spec) => Self::from_estimator(Vec::new(), spec),
        }
    }

    fn from_container(container: ContainerSpec) -> Result<Self, ModelError> {
        if let Some(pipeline) = container.pipeline {
            return Self::from_pipeline(pipeline);
        }
        if let Some(model) = container.model {
            return Self::from_estimator(Vec::new(), model);
        }
        match (container.scaler, container.clf) {
            (Some(scaler), Some(clf)) => Self::from_estimator(vec![scaler], clf),
            (None, Some(clf)) => Self::from_estimator(Vec::new(), clf),
            _ => Err(ModelError::EmptyContainer),
        }
    }

    fn from_pipeline(pipeline: PipelineSpec) -> Result<Self, ModelError> {
        let count = pipeline.stages.len();
        let mut stages = Vec::new();
        let mut estimator = None;

        for (idx, stage) in pipeline.stages.into_iter().enumerate() {
            match stage {
                StageSpec::Scaler(scaler) => stages.push(scaler),
                StageSpec::Estimator(spec) if idx + 1 == count => estimator = Some(spec),
                StageSpec::Estimator(_) => return Err(ModelError::InvalidPipeline),
            }
        }

        match estimator {
            Some(spec) => Self::from_estimator(stages, spec),
            None => Err(ModelError::InvalidPipeline),
        }
    }

    fn from_estimator(stages: Vec<ScalerSpec>, spec: EstimatorSpec) -> Result<Self, ModelError> {
        let capability = Capability::resolve(&spec)?;
        // First stage with a declared width wins; the estimator is the
        // last stage in that order.
        let expected_features = stages
            .iter()
            .find_map(|stage| stage.n_features)
            .or(spec.n_features);

        Ok(Self {
            stages,
            capability,
            expected_features,
        })
    }

    /// Score one feature vector.
    ///
    /// Orientation of the value depends on the resolved capability; see
    /// [`Capability`].
    pub fn score(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        let mut x: Vec<f64> = features.values().collect();
        for scaler in &self.stages {
            apply_scaler(scaler, &mut x)?;
        }
        let score = self.capability.score(&x)?;
        debug!(capability = self.capability.kind(), score, "scored feature vector");
        Ok(score)
    }

    /// Model-declared input width, when any stage declares one.
    pub fn expected_features(&self) -> Option<usize> {
        self.expected_features
    }

    /// Resolved capability name, for logs.
    pub fn capability_kind(&self) -> &'static str {
        self.capability.kind()
    }
}

fn apply_scaler(scaler: &ScalerSpec, x: &mut [f64]) -> Result<(), ModelError> {
    check_width("scaler", x.len(), scaler.mean.len())?;
    check_width("scaler", scaler.scale.len(), scaler.mean.len())?;

    for ((v, mean), scale) in x.iter_mut().zip(&scaler.mean).zip(&scaler.scale) {
        *v -= mean;
        if *scale != 0.0 {
            *v /= scale;
        }
    }
    Ok(())
}

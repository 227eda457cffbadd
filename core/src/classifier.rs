//! The classifier adapter: preprocessing, scoring and labelling behind one
//! call that never fails with anything else than a [`Failure`].
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, ensure};
use image::{DynamicImage, GrayImage};
use tract_core::prelude::*;

use crate::config::Config;
use crate::labels::{ClassLabel, Labels};
use crate::model::{Scorer, TractScorer};
use crate::preprocess::{self, Preprocessor};

/// Why a call did not produce a [`Prediction`].
///
/// Every variant is terminal for the call that produced it and none of them
/// poisons the classifier: the next call starts from scratch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    NoInputProvided,
    ModelUnavailable,
    PreprocessingFailure(String),
    InferenceFailure(String),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::NoInputProvided => write!(f, "No input image provided"),
            Failure::ModelUnavailable => write!(f, "Model is not loaded"),
            Failure::PreprocessingFailure(msg) => write!(f, "Preprocessing failed: {msg}"),
            Failure::InferenceFailure(msg) => write!(f, "Inference failed: {msg}"),
        }
    }
}

impl std::error::Error for Failure {}

/// Transformation applied to the raw model output before the argmax.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// The model already outputs probabilities.
    #[default]
    Identity,
    /// The model outputs logits.
    Softmax,
}

impl Activation {
    fn apply(&self, scores: &mut [f32]) {
        if *self == Activation::Softmax {
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            scores.iter_mut().for_each(|s| *s = (*s - max).exp());
            let sum: f32 = scores.iter().sum();
            scores.iter_mut().for_each(|s| *s /= sum);
        }
    }
}

/// Coarse confidence bucket, from static thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    NeedsReview,
}

impl ConfidenceTier {
    /// Both bounds are strict: 80 is medium, 60 needs review.
    pub fn from_confidence(confidence: f32) -> ConfidenceTier {
        if confidence > 80.0 {
            ConfidenceTier::High
        } else if confidence > 60.0 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::NeedsReview
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "✅",
            ConfidenceTier::Medium => "⚠️",
            ConfidenceTier::NeedsReview => "❓",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::NeedsReview => "needs review",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug)]
pub struct Prediction {
    pub index: usize,
    pub label: ClassLabel,
    /// Winning score, as a percentage.
    pub confidence: f32,
    pub tier: ConfidenceTier,
    pub icon: String,
    /// Activated score vector, in class order.
    pub scores: Vec<f32>,
    /// The resampled grayscale plane the model saw.
    pub display: GrayImage,
}

impl Prediction {
    pub fn description(&self) -> String {
        format!(
            "### {icon} Result: **{label}**\n\n\
             **Confidence:** {confidence:.2}%\n\n\
             **Details:**\n\
             - Predicted class: {label}\n\
             - Confidence score: {confidence:.2}%\n\
             - Status: {marker} {tier}\n",
            icon = self.icon,
            label = self.label,
            confidence = self.confidence,
            marker = self.tier.marker(),
            tier = self.tier,
        )
    }
}

/// Index of the highest score, the first one on ties.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (ix, &score) in scores.iter().enumerate() {
        if best.is_none_or(|(_, b)| score > b) {
            best = Some((ix, score));
        }
    }
    best.map(|(ix, _)| ix)
}

/// Turns images into labelled predictions.
///
/// The scorer is loaded once and shared read-only: cloning a classifier or
/// calling it from several threads at once is fine.
#[derive(Clone, Debug)]
pub struct Classifier {
    scorer: Option<Arc<dyn Scorer>>,
    labels: Arc<Labels>,
    preprocessor: Preprocessor,
    activation: Activation,
}

impl Classifier {
    /// A classifier without model. Until a scorer is attached, every call
    /// with an image returns [`Failure::ModelUnavailable`].
    pub fn new(labels: Labels, preprocessor: Preprocessor) -> Classifier {
        Classifier {
            scorer: None,
            labels: Arc::new(labels),
            preprocessor,
            activation: Activation::default(),
        }
    }

    pub fn with_scorer(self, scorer: Arc<dyn Scorer>) -> Classifier {
        Classifier { scorer: Some(scorer), ..self }
    }

    pub fn with_activation(self, activation: Activation) -> Classifier {
        Classifier { activation, ..self }
    }

    /// Builds labels and preprocessor from the configuration, then loads the
    /// model once.
    ///
    /// An invalid configuration is an error. A model that can not be loaded
    /// is not: it is logged and the classifier answers
    /// [`Failure::ModelUnavailable`] to every image. A model whose output
    /// length is known and differs from the class count is an error.
    pub fn from_config(config: &Config) -> TractResult<Classifier> {
        config.validate()?;
        let labels = Labels::new(
            config.classes.iter().cloned(),
            config.icons.clone(),
            config.default_icon.clone(),
        )?;
        let preprocessor = config.input.preprocessor();
        let classifier =
            Classifier::new(labels, preprocessor).with_activation(config.activation);
        let Some(path) = &config.model else {
            warn!("No model configured, inference is disabled");
            return Ok(classifier);
        };
        let scorer = match TractScorer::load(path, config.format, &preprocessor.input_shape()) {
            Ok(scorer) => scorer,
            Err(e) => {
                warn!("Could not load model, inference is disabled: {e:?}");
                return Ok(classifier);
            }
        };
        info!("Model loaded from {path:?}");
        classifier.with_checked_scorer(Arc::new(scorer))
    }

    /// Like [`with_scorer`](Self::with_scorer), but rejects a scorer whose
    /// known output length does not match the class list.
    pub fn with_checked_scorer(self, scorer: Arc<dyn Scorer>) -> TractResult<Classifier> {
        if let Some(len) = scorer.output_len() {
            ensure!(
                len == self.labels.len(),
                "Model outputs {} scores but {} classes are configured",
                len,
                self.labels.len()
            );
        }
        Ok(self.with_scorer(scorer))
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn has_model(&self) -> bool {
        self.scorer.is_some()
    }

    pub fn predict(&self, image: Option<&DynamicImage>) -> Result<Prediction, Failure> {
        let Some(image) = image else { return Err(Failure::NoInputProvided) };
        let scorer = self.scorer.as_ref().ok_or(Failure::ModelUnavailable)?;
        let preprocessed = self
            .preprocessor
            .preprocess(Some(image))
            .map_err(|e| Failure::PreprocessingFailure(format!("{e:#}")))?
            .ok_or(Failure::NoInputProvided)?;
        let mut scores = self
            .run(scorer.as_ref(), preprocessed.tensor)
            .map_err(|e| Failure::InferenceFailure(format!("{e:#}")))?;
        self.activation.apply(&mut scores);
        let index = self.check(&scores).map_err(|e| Failure::InferenceFailure(format!("{e:#}")))?;
        let Some(label) = self.labels.get(index).cloned() else {
            return Err(Failure::InferenceFailure(format!("No class for score index {index}")));
        };
        let confidence = scores[index] * 100.0;
        let tier = ConfidenceTier::from_confidence(confidence);
        let icon = self.labels.icon_for(&label).to_string();
        debug!("predicted {label} ({confidence:.2}%, {tier}) from {scores:?}");
        Ok(Prediction { index, label, confidence, tier, icon, scores, display: preprocessed.display })
    }

    /// Decodes an encoded image (png, jpeg, ...) and predicts.
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction, Failure> {
        if !self.has_model() {
            return Err(Failure::ModelUnavailable);
        }
        let image = preprocess::decode(bytes)
            .map_err(|e| Failure::PreprocessingFailure(format!("{e:#}")))?;
        self.predict(Some(&image))
    }

    pub fn predict_path(&self, path: impl AsRef<Path>) -> Result<Prediction, Failure> {
        if !self.has_model() {
            return Err(Failure::ModelUnavailable);
        }
        let image = preprocess::open(path)
            .map_err(|e| Failure::PreprocessingFailure(format!("{e:#}")))?;
        self.predict(Some(&image))
    }

    fn run(&self, scorer: &dyn Scorer, input: Tensor) -> TractResult<Vec<f32>> {
        match catch_unwind(AssertUnwindSafe(|| scorer.score(input))) {
            Ok(result) => result,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                bail!("Scorer panicked: {msg}")
            }
        }
    }

    fn check(&self, scores: &[f32]) -> TractResult<usize> {
        ensure!(
            scores.len() == self.labels.len(),
            "Model produced {} scores for {} classes",
            scores.len(),
            self.labels.len()
        );
        ensure!(scores.iter().all(|s| s.is_finite()), "Model produced non-finite scores");
        let Some(index) = argmax(scores) else { bail!("Model produced an empty score vector") };
        Ok(index)
    }
}

//! # Grayscope
//!
//! Grayscale image classification on top of tract.
//!
//! An image goes through a fixed preprocessing pipeline (luminance, bilinear
//! resize, normalization), is scored by a model loaded once at start-up, and
//! the best class comes back with a confidence, an icon and a description.
//! Every failure comes back as a [`classifier::Failure`], never as a panic.
//!
//! ## Example
//!
//! ```
//! # use std::sync::Arc;
//! use grayscope_core::prelude::*;
//!
//! #[derive(Debug)]
//! struct Fixed;
//!
//! impl Scorer for Fixed {
//!     fn score(&self, _input: Tensor) -> TractResult<Vec<f32>> {
//!         Ok(vec![0.05, 0.90, 0.05])
//!     }
//! }
//!
//! # fn main() -> TractResult<()> {
//! let labels = Labels::new(["A", "B", "C"], Default::default(), "🍲")?;
//! let classifier = Classifier::new(labels, Preprocessor::default()).with_scorer(Arc::new(Fixed));
//!
//! let image = image::DynamicImage::new_rgb8(320, 240);
//! let prediction = classifier.predict(Some(&image))?;
//! assert_eq!(prediction.label.as_str(), "B");
//! assert_eq!(prediction.tier, ConfidenceTier::High);
//! # Ok(())
//! # }
//! ```
//!
//! Real-life use-cases load an ONNX, NNEF or TFLite model from a path through
//! [`Config`](config::Config) and [`Classifier::from_config`](classifier::Classifier::from_config).

#[macro_use]
extern crate log;

pub mod classifier;
pub mod config;
pub mod labels;
pub mod model;
pub mod preprocess;
pub mod view;

pub use tract_core;

pub mod prelude {
    pub use crate::classifier::{Activation, Classifier, ConfidenceTier, Failure, Prediction};
    pub use crate::config::{Config, InputConfig};
    pub use crate::labels::{ClassLabel, Labels};
    pub use crate::model::{ModelFormat, Scorer, TractScorer};
    pub use crate::preprocess::{InputLayout, Preprocessed, Preprocessor};
    pub use crate::view::{ResetView, View, reset};
    pub use tract_core::prelude::{Tensor, TractResult};
}

#[cfg(test)]
#[allow(dead_code)]
fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("GRAYSCOPE_LOG").try_init();
}

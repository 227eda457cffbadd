//! Text fields a front-end shows: the processed image, the label, the
//! confidence and a markdown description.
use image::{DynamicImage, GrayImage};
use serde::Serialize;

use crate::classifier::{Classifier, Failure, Prediction};

pub const WELCOME: &str =
    "🍜 **Welcome to the image classifier!**\n\n✨ Upload an image to start the analysis.";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct View {
    #[serde(skip)]
    pub display_image: Option<GrayImage>,
    pub label: String,
    pub confidence: String,
    pub description: String,
}

impl View {
    pub fn from_outcome(outcome: &Result<Prediction, Failure>) -> View {
        match outcome {
            Ok(prediction) => View {
                display_image: Some(prediction.display.clone()),
                label: format!("{} {}", prediction.icon, prediction.label),
                confidence: format!("{:.1}%", prediction.confidence),
                description: prediction.description(),
            },
            Err(Failure::NoInputProvided) => View {
                display_image: None,
                label: "⚠️ Please upload an image".to_string(),
                confidence: String::new(),
                description: "🍜 Choose an image to start the analysis!".to_string(),
            },
            Err(Failure::ModelUnavailable) => View {
                display_image: None,
                label: "❌ Model not loaded".to_string(),
                confidence: "0%".to_string(),
                description: "Please check the model path!".to_string(),
            },
            Err(e) => View {
                display_image: None,
                label: "Error".to_string(),
                confidence: "0%".to_string(),
                description: format!("❌ An error occurred: {e}"),
            },
        }
    }
}

/// The empty initial state, including the input slot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResetView {
    #[serde(skip)]
    pub input_image: Option<DynamicImage>,
    #[serde(flatten)]
    pub view: View,
}

/// Back to the initial display state. Pure: nothing is remembered between
/// calls, so the result never depends on what was shown before.
pub fn reset() -> ResetView {
    ResetView {
        input_image: None,
        view: View { description: WELCOME.to_string(), ..View::default() },
    }
}

impl Classifier {
    pub fn predict_view(&self, image: Option<&DynamicImage>) -> View {
        View::from_outcome(&self.predict(image))
    }
}

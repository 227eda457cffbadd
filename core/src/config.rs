use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail, ensure};
use serde::{Deserialize, Serialize};
use tract_core::prelude::TractResult;

use crate::classifier::Activation;
use crate::model::ModelFormat;
use crate::preprocess::{InputLayout, Preprocessor};

/// Static configuration, read once at start-up.
///
/// ```toml
/// model = "models/hand_gesture_model.onnx"
/// classes = ["Sinh_menh", "Tinh_duyen", "Tri_Tue"]
/// default_icon = "🍲"
///
/// [icons]
/// Sinh_menh = "🍜"
///
/// [input]
/// width = 100
/// height = 100
/// layout = "hw"
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub model: Option<PathBuf>,
    #[serde(default)]
    pub format: Option<ModelFormat>,
    pub classes: Vec<String>,
    #[serde(default)]
    pub icons: HashMap<String, String>,
    #[serde(default = "default_icon")]
    pub default_icon: String,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default)]
    pub input: InputConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    #[serde(default = "default_side")]
    pub width: u32,
    #[serde(default = "default_side")]
    pub height: u32,
    #[serde(default)]
    pub layout: InputLayout,
}

fn default_icon() -> String {
    "🍲".to_string()
}

fn default_side() -> u32 {
    100
}

impl Default for InputConfig {
    fn default() -> InputConfig {
        InputConfig { width: default_side(), height: default_side(), layout: InputLayout::Hw }
    }
}

impl InputConfig {
    pub fn preprocessor(&self) -> Preprocessor {
        Preprocessor::new(self.width, self.height, self.layout)
    }
}

impl Default for Config {
    /// The sample three class gesture model.
    fn default() -> Config {
        let icons = [("Sinh_menh", "🍜"), ("Tinh_duyen", "🥖"), ("Tri_Tue", "🍚")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config {
            model: Some(PathBuf::from("hand_gesture_model.onnx")),
            format: None,
            classes: vec!["Sinh_menh".into(), "Tinh_duyen".into(), "Tri_Tue".into()],
            icons,
            default_icon: default_icon(),
            activation: Activation::Identity,
            input: InputConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(s: &str) -> TractResult<Config> {
        let config: Config = toml::from_str(s).context("Parsing configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration file. A relative model path is resolved against
    /// the directory of the file.
    pub fn from_path(path: impl AsRef<Path>) -> TractResult<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Reading configuration {path:?}"))?;
        let mut config =
            Config::from_toml(&text).with_context(|| format!("Loading configuration {path:?}"))?;
        if let (Some(model), Some(dir)) = (&config.model, path.parent()) {
            if model.is_relative() {
                config.model = Some(dir.join(model));
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> TractResult<()> {
        ensure!(!self.classes.is_empty(), "Configuration lists no class");
        let mut seen = HashSet::new();
        for class in &self.classes {
            if !seen.insert(class) {
                bail!("Class {class:?} is listed twice")
            }
        }
        ensure!(
            self.input.width > 0 && self.input.height > 0,
            "Input size must be positive, got {}x{}",
            self.input.width,
            self.input.height
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample() -> TractResult<()> {
        let config = Config::default();
        config.validate()?;
        assert_eq!(config.classes.len(), 3);
        assert_eq!(config.icons["Tri_Tue"], "🍚");
        assert_eq!(config.input.preprocessor(), Preprocessor::default());
        Ok(())
    }

    #[test]
    fn minimal() -> TractResult<()> {
        let config = Config::from_toml(r#"classes = ["A", "B", "C"]"#)?;
        assert_eq!(config.model, None);
        assert_eq!(config.default_icon, "🍲");
        assert_eq!(config.activation, Activation::Identity);
        assert_eq!(config.input, InputConfig::default());
        Ok(())
    }

    #[test]
    fn full() -> TractResult<()> {
        let config = Config::from_toml(
            r#"
            model = "gesture.nnef.tgz"
            format = "nnef"
            classes = ["A", "B"]
            default_icon = "?"
            activation = "softmax"

            [icons]
            A = "🍜"

            [input]
            width = 64
            height = 48
            layout = "chw"
            "#,
        )?;
        assert_eq!(config.format, Some(ModelFormat::Nnef));
        assert_eq!(config.activation, Activation::Softmax);
        assert_eq!(config.input.preprocessor().input_shape().to_vec(), vec![1, 1, 48, 64]);
        Ok(())
    }

    #[test]
    fn rejects_bad_configs() {
        assert!(Config::from_toml(r#"classes = []"#).is_err());
        assert!(Config::from_toml(r#"classes = ["A", "A"]"#).is_err());
        assert!(Config::from_toml("classes = [\"A\"]\ncolour = 3").is_err());
        assert!(Config::from_toml("classes = [\"A\"]\n[input]\nwidth = 0").is_err());
        assert!(Config::from_toml("classes = [\"A\"]\nformat = \"keras\"").is_err());
    }

    #[test]
    fn relative_model_path() -> TractResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("grayscope.toml");
        std::fs::write(&path, "model = \"m.onnx\"\nclasses = [\"A\"]\n")?;
        let config = Config::from_path(&path)?;
        assert_eq!(config.model, Some(dir.path().join("m.onnx")));
        Ok(())
    }
}

use std::fmt;
use std::path::Path;

use anyhow::{Context, bail};
use tract_core::prelude::*;

/// An opaque scoring function, from a preprocessed tensor to one score per
/// class.
///
/// Implementations are loaded once and shared read-only between calls, so
/// `score` must not depend on previous calls.
pub trait Scorer: fmt::Debug + Send + Sync {
    fn score(&self, input: Tensor) -> TractResult<Vec<f32>>;

    /// Length of the score vector, when it is known before running.
    fn output_len(&self) -> Option<usize> {
        None
    }
}

/// Serialized model formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Onnx,
    Nnef,
    Tflite,
}

impl ModelFormat {
    /// Guess the format from the path, the same way tract's command line does.
    pub fn guess(path: &Path) -> Option<ModelFormat> {
        let name = path.to_string_lossy();
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        if ext == "onnx" {
            Some(ModelFormat::Onnx)
        } else if ext == "tflite" {
            Some(ModelFormat::Tflite)
        } else if path.is_dir()
            || ext == "nnef"
            || ext == "tgz"
            || name.ends_with(".tar")
            || name.ends_with(".tar.gz")
        {
            Some(ModelFormat::Nnef)
        } else {
            None
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFormat::Onnx => "onnx",
            ModelFormat::Nnef => "nnef",
            ModelFormat::Tflite => "tflite",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ModelFormat {
    type Err = TractError;
    fn from_str(s: &str) -> TractResult<ModelFormat> {
        match s {
            "onnx" => Ok(ModelFormat::Onnx),
            "nnef" => Ok(ModelFormat::Nnef),
            "tflite" => Ok(ModelFormat::Tflite),
            _ => bail!("Unknown model format {s:?} (expected onnx, nnef or tflite)"),
        }
    }
}

/// A tract runnable plan used as a [`Scorer`].
pub struct TractScorer {
    plan: TypedRunnableModel<TypedModel>,
    output_len: Option<usize>,
}

impl fmt::Debug for TractScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TractScorer {{ output_len: {:?} }}", self.output_len)
    }
}

impl TractScorer {
    /// Optimizes `model` and turns it into a runnable plan.
    pub fn new(model: TypedModel) -> TractResult<TractScorer> {
        let model = model.into_optimized()?;
        let output_len = model
            .output_fact(0)?
            .shape
            .as_concrete()
            .map(|shape| shape.iter().product::<usize>());
        let plan = model.into_runnable()?;
        Ok(TractScorer { plan, output_len })
    }

    /// Loads a serialized model, pinning its input to `input_shape` (f32).
    pub fn load(
        path: impl AsRef<Path>,
        format: Option<ModelFormat>,
        input_shape: &[usize],
    ) -> TractResult<TractScorer> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("model not found: {:?}", path)
        }
        let format = match format.or_else(|| ModelFormat::guess(path)) {
            Some(format) => format,
            None => bail!("Can not guess model format for {:?}, please set it explicitly", path),
        };
        debug!("loading {format} model from {path:?}");
        let model = Self::typed_model(path, format, input_shape)
            .with_context(|| format!("Loading {format} model from {path:?}"))?;
        Self::new(model)
    }

    #[allow(unused_variables)]
    fn typed_model(
        path: &Path,
        format: ModelFormat,
        input_shape: &[usize],
    ) -> TractResult<TypedModel> {
        match format {
            #[cfg(feature = "onnx")]
            ModelFormat::Onnx => {
                use tract_onnx::prelude::{Framework, InferenceModelExt};
                tract_onnx::onnx()
                    .model_for_path(path)?
                    .with_input_fact(0, f32::fact(input_shape.to_vec()).into())?
                    .into_typed()
            }
            #[cfg(feature = "nnef")]
            ModelFormat::Nnef => {
                use tract_nnef::prelude::Framework;
                tract_nnef::nnef().with_tract_core().model_for_path(path)
            }
            #[cfg(feature = "tflite")]
            ModelFormat::Tflite => {
                use tract_tflite::prelude::Framework;
                tract_tflite::tflite().model_for_path(path)
            }
            #[allow(unreachable_patterns)]
            _ => bail!("Support for {format} models is not compiled in"),
        }
    }
}

impl Scorer for TractScorer {
    fn score(&self, input: Tensor) -> TractResult<Vec<f32>> {
        let outputs = self.plan.run(tvec!(input.into()))?;
        let Some(output) = outputs.first() else { bail!("Model produced no output") };
        let scores = output.cast_to::<f32>()?;
        Ok(scores.as_slice::<f32>()?.to_vec())
    }

    fn output_len(&self) -> Option<usize> {
        self.output_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(shape: &[usize]) -> TractResult<TypedModel> {
        let mut model = TypedModel::default();
        let source = model.add_source("input", f32::fact(shape.to_vec()))?;
        model.set_output_outlets(&[source])?;
        Ok(model)
    }

    #[test]
    fn guess_format() {
        assert_eq!(ModelFormat::guess(Path::new("m/gesture.onnx")), Some(ModelFormat::Onnx));
        assert_eq!(ModelFormat::guess(Path::new("gesture.tflite")), Some(ModelFormat::Tflite));
        assert_eq!(ModelFormat::guess(Path::new("gesture.nnef.tgz")), Some(ModelFormat::Nnef));
        assert_eq!(ModelFormat::guess(Path::new("gesture.nnef.tar")), Some(ModelFormat::Nnef));
        assert_eq!(ModelFormat::guess(Path::new("gesture.nnef.tar.gz")), Some(ModelFormat::Nnef));
        assert_eq!(ModelFormat::guess(Path::new("gesture.h5")), None);
    }

    #[test]
    fn parse_format() -> TractResult<()> {
        assert_eq!("onnx".parse::<ModelFormat>()?, ModelFormat::Onnx);
        assert_eq!("tflite".parse::<ModelFormat>()?, ModelFormat::Tflite);
        assert!("keras".parse::<ModelFormat>().is_err());
        Ok(())
    }

    #[test]
    fn identity_plan_scores() -> TractResult<()> {
        crate::setup_test_logger();
        let scorer = TractScorer::new(identity(&[1, 3])?)?;
        assert_eq!(scorer.output_len(), Some(3));
        let scores = scorer.score(tensor2(&[[0.05f32, 0.9, 0.05]]))?;
        assert_eq!(scores, vec![0.05, 0.9, 0.05]);
        Ok(())
    }

    #[test]
    fn missing_file() {
        let err = TractScorer::load("no/such/model.onnx", None, &[1, 100, 100]).unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn unknown_format() -> TractResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gesture.h5");
        std::fs::write(&path, b"HDF")?;
        let err = TractScorer::load(&path, None, &[1, 100, 100]).unwrap_err();
        assert!(err.to_string().contains("Can not guess model format"));
        Ok(())
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn corrupted_onnx() -> TractResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gesture.onnx");
        std::fs::write(&path, b"not protobuf at all")?;
        assert!(TractScorer::load(&path, None, &[1, 100, 100]).is_err());
        Ok(())
    }

    #[cfg(feature = "nnef")]
    #[test]
    fn nnef_tar_roundtrip() -> TractResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("identity.nnef.tar");
        let file = std::fs::File::create(&path)?;
        tract_nnef::nnef().with_tract_core().write_to_tar(&identity(&[1, 4])?, file)?;
        let scorer = TractScorer::load(&path, None, &[1, 4])?;
        assert_eq!(scorer.output_len(), Some(4));
        let scores = scorer.score(tensor2(&[[1f32, 2., 3., 4.]]))?;
        assert_eq!(scores, vec![1., 2., 3., 4.]);
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use grayscope_core::prelude::*;
use serde::Serialize;

#[derive(Serialize)]
struct Report<'a> {
    image: &'a Path,
    #[serde(flatten)]
    view: View,
    #[serde(skip_serializing_if = "Option::is_none")]
    class: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tier: Option<ConfidenceTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scores: Option<&'a [f32]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
}

impl<'a> Report<'a> {
    fn new(image: &'a Path, outcome: &'a Result<Prediction, Failure>) -> Report<'a> {
        let view = View::from_outcome(outcome);
        match outcome {
            Ok(p) => Report {
                image,
                view,
                class: Some(p.label.as_str()),
                tier: Some(p.tier),
                scores: Some(&p.scores),
                failure: None,
            },
            Err(e) => Report {
                image,
                view,
                class: None,
                tier: None,
                scores: None,
                failure: Some(e.to_string()),
            },
        }
    }
}

pub fn print(image: &Path, outcome: &Result<Prediction, Failure>, json: bool) -> anyhow::Result<()> {
    let report = Report::new(image, outcome);
    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{}", image.display());
        println!("  {}  {}", report.view.label, report.view.confidence);
        for line in report.view.description.lines() {
            println!("  {line}");
        }
    }
    if let Err(e) = outcome {
        info!("{}: {e}", image.display());
    }
    Ok(())
}

pub fn print_reset(json: bool) -> anyhow::Result<()> {
    let state = reset();
    if json {
        println!("{}", serde_json::to_string(&state)?);
    } else {
        println!("{}", state.view.description);
    }
    Ok(())
}

pub fn display_path(dir: &Path, image: &Path) -> PathBuf {
    let stem = image.file_stem().map(|s| s.to_string_lossy()).unwrap_or_else(|| "image".into());
    dir.join(format!("{stem}.display.png"))
}

pub fn save_display(dir: &Path, image: &Path, prediction: &Prediction) -> anyhow::Result<()> {
    let path = display_path(dir, image);
    prediction.display.save(&path).with_context(|| format!("Writing {path:?}"))?;
    debug!("wrote processed image to {path:?}");
    Ok(())
}

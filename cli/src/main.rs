#[macro_use]
extern crate log;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use grayscope_core::prelude::*;

mod banner;
mod report;

/// Classify grayscale images with a pre-trained model.
#[derive(Parser, Debug)]
#[clap(name = "grayscope", version)]
struct Args {
    /// Sets the level of verbosity.
    #[clap(short, long, parse(from_occurrences))]
    verbose: u64,

    /// Configuration file (TOML). Defaults to the sample gesture model.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Overrides the model path of the configuration.
    #[clap(long)]
    model: Option<PathBuf>,

    /// Hint the model format ('onnx', 'nnef' or 'tflite') instead of guess from extension.
    #[clap(long)]
    format: Option<ModelFormat>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print model path, classes and input shape.
    Info,

    /// Classify images.
    Predict {
        #[clap(required = true)]
        images: Vec<PathBuf>,

        /// One JSON object per image instead of text.
        #[clap(long)]
        json: bool,

        /// Directory where the processed (resized, grayscale) images are written.
        #[clap(long)]
        save_display: Option<PathBuf>,
    },

    /// Print the initial, empty state.
    Reset {
        #[clap(long)]
        json: bool,
    },
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "grayscope=warn,grayscope_core=warn",
        1 => "grayscope=info,grayscope_core=info",
        2 => "grayscope=debug,grayscope_core=debug",
        _ => "grayscope=trace,grayscope_core=trace,tract=debug",
    };
    let env = env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, level);
    env_logger::Builder::from_env(env).format_timestamp_nanos().init();

    if let Err(e) = handle(args) {
        error!("{e:?}");
        process::exit(1)
    }
}

fn handle(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if let Some(model) = args.model {
        config.model = Some(model);
    }
    if args.format.is_some() {
        config.format = args.format;
    }

    match args.command {
        Command::Info => {
            let classifier = Classifier::from_config(&config)?;
            banner::print(&config, &classifier);
        }
        Command::Predict { images, json, save_display } => {
            let classifier = Classifier::from_config(&config)?;
            if let Some(dir) = &save_display {
                std::fs::create_dir_all(dir)?;
            }
            for image in &images {
                let outcome = classifier.predict_path(image);
                if let (Some(dir), Ok(prediction)) = (&save_display, &outcome) {
                    report::save_display(dir, image, prediction)?;
                }
                report::print(image, &outcome, json)?;
            }
        }
        Command::Reset { json } => report::print_reset(json)?,
    }
    Ok(())
}

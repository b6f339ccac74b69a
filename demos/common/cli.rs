use crate::common::backend::RecorderTy;
use anyhow::{Context, bail};
use burn::prelude::*;
use burn::record::FileRecorder;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const HELP: &str = "\
CNN Comparison on MNIST

Trains the requested classifiers on MNIST, keeping for each the parameters of its best
validation epoch, then prints a comparison of their curves, sizes, speed and test accuracy.
Configurations, models and run summaries are persisted in an artifacts directory.

USAGE:
    mnist-compare [OPTIONS]

BEHAVIOR OVERVIEW
- MNIST is downloaded into ~/.cache/burn-dataset/mnist on first use.
- 20% of the training images are held out for validation, with a fixed seed.
- If --training-config is given, the training config is loaded from that file. Otherwise it is
  loaded from the artifacts directory, or a default one is created. The effective config is saved
  into the artifacts directory.
- The mask ratio of the training config only applies to the masked-attention model.
- For each model, the best parameters are saved as <model>-model and the run summary as
  <model>-summary.json in the artifacts directory.

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -m, --models <LIST>         Comma-separated models to train, among baseline, branching and mage
                                [default: baseline,branching,mage]
    -e, --epochs <N>            Override the number of epochs of the training config
    -k, --mask-ratio <RATIO>    Override the mask ratio of the training config, in [0, 1]
    -s, --samples <N>           Number of correct and of wrong validation predictions to show
                                [default: 5]
    -c, --training-config <PATH>
                                Load training configuration from this file (overrides any config in artifacts directory)
    -a, --artifacts-path <PATH>
                                Directory where configurations, models and summaries are saved.
                                If the directory does not exist, it will be created.
                                Defaults to a newly created temporary directory (path will be printed).
";

/// The compared classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Baseline,
    Branching,
    Mage,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Baseline, Variant::Branching, Variant::Mage];

    pub fn name(&self) -> &'static str {
        match self {
            Variant::Baseline => "baseline",
            Variant::Branching => "branching",
            Variant::Mage => "mage",
        }
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::ALL
            .into_iter()
            .find(|variant| variant.name() == s.trim())
            .ok_or_else(|| format!("unknown model {s:?}"))
    }
}

#[derive(Debug)]
pub struct AppArgs {
    pub models: Vec<Variant>,
    pub epochs: Option<usize>,
    pub mask_ratio: Option<f64>,
    pub samples: usize,
    pub training_config: Option<PathBuf>,
    pub artifacts_path: PathBuf,
}

impl AppArgs {
    pub fn parse() -> anyhow::Result<Self> {
        let mut pargs = pico_args::Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        let args = AppArgs {
            models: pargs
                .opt_value_from_fn(["-m", "--models"], parse_variants)?
                .unwrap_or_else(|| Variant::ALL.to_vec()),
            epochs: pargs.opt_value_from_str(["-e", "--epochs"])?,
            mask_ratio: pargs.opt_value_from_str(["-k", "--mask-ratio"])?,
            samples: pargs.opt_value_from_str(["-s", "--samples"])?.unwrap_or(5),
            training_config: pargs
                .opt_value_from_os_str(["-c", "--training-config"], parse_path)?,
            artifacts_path: pargs
                .opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?
                .unwrap_or_else(|| {
                    // e.g. /tmp/cnn-compare-mnist-compare-abcd-0
                    let name = format!(
                        "{}-{}-",
                        std::env!("CARGO_PKG_NAME"),
                        std::env!("CARGO_BIN_NAME")
                    );
                    let tmp = temp_dir::TempDir::with_prefix(name)
                        .expect("Failed to create the temporary directory")
                        .dont_delete_on_drop();
                    let path = tmp.path();
                    println!("new artifacts directory: {path:?}");
                    path.into()
                }),
        };

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            bail!("unused arguments: {remaining:?}");
        }
        if args.models.is_empty() {
            bail!("no model selected");
        }

        Ok(args)
    }

    pub fn create_artifact_dir(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.artifacts_path)
            .with_context(|| format!("failed to create {:?}", self.artifacts_path))
    }

    fn training_config_path(&self) -> PathBuf {
        self.artifacts_path
            .join(TRAINING_CONFIG_NAME)
            .with_added_extension("json")
    }

    pub fn save_training_config(&self, training_config: &impl Config) -> anyhow::Result<()> {
        save_config(&self.training_config_path(), training_config)
    }

    /// The explicit config file if given, otherwise the one of the artifacts directory if present.
    pub fn load_training_config<TrainingConfig: Config>(
        &self,
    ) -> anyhow::Result<Option<TrainingConfig>> {
        match &self.training_config {
            Some(path) => load_config(path)?
                .with_context(|| format!("Failed to find the training config file {path:?}"))
                .map(Some),
            None => load_config(&self.training_config_path()),
        }
    }

    pub fn save_model_config(&self, variant: Variant, model_config: &impl Config) -> anyhow::Result<()> {
        let path = self
            .artifacts_path
            .join(format!("{}-{MODEL_CONFIG_NAME}", variant.name()))
            .with_added_extension("json");
        save_config(&path, model_config)
    }

    pub fn save_model<B: Backend>(&self, variant: Variant, model: &impl Module<B>) -> anyhow::Result<()> {
        let path = self
            .artifacts_path
            .join(format!("{}-{MODEL_NAME}", variant.name()));
        let file_ext = <RecorderTy as FileRecorder<B>>::file_extension();
        println!("Saving model to {:?}", path.with_added_extension(file_ext));
        // ext added automatically
        cnn_compare::training::save_model::<B, _, _>(model, &path, &RecorderTy::new())?;
        Ok(())
    }

    pub fn save_summary(&self, summary: &cnn_compare::report::RunSummary) -> anyhow::Result<()> {
        let path = self
            .artifacts_path
            .join(format!("{}-{SUMMARY_NAME}", summary.model))
            .with_added_extension("json");
        println!("Saving run summary into {path:?}");
        std::fs::write(&path, summary.to_json()?)
            .with_context(|| format!("failed to write {path:?}"))
    }
}

fn parse_path(s: &std::ffi::OsStr) -> Result<std::path::PathBuf, &'static str> {
    Ok(s.into())
}

fn parse_variants(s: &str) -> Result<Vec<Variant>, String> {
    s.split(',')
        .filter(|name| !name.trim().is_empty())
        .map(Variant::from_str)
        .collect()
}

pub const TRAINING_CONFIG_NAME: &str = "training_config";
pub const MODEL_CONFIG_NAME: &str = "config";
pub const MODEL_NAME: &str = "model";
pub const SUMMARY_NAME: &str = "summary";

pub fn save_config(path: &Path, config: &impl Config) -> anyhow::Result<()> {
    println!("Saving config into {path:?}");
    config
        .save(path)
        .with_context(|| format!("Failed to save the config into {path:?}"))
}

pub fn load_config<C: Config>(path: &Path) -> anyhow::Result<Option<C>> {
    let exists = std::fs::exists(path).with_context(|| format!("failed to check {path:?}"))?;
    if exists {
        println!("Loading config from {path:?}");
        let config = C::load(path).with_context(|| format!("Failed to load the config {path:?}"))?;
        Ok(Some(config))
    } else {
        Ok(None)
    }
}

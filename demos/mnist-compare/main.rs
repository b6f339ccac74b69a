use burn::data::dataloader::DataLoaderBuilder;
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use cnn_compare::prelude::*;
use cnn_compare::report::{self, collect_predictions, select_samples};
use cnn_compare::training::Loader;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[path = "../common/mod.rs"]
pub mod common;

use common::backend::{MainAutoBackend, MainBackend, MainDevice};
use common::cli::{AppArgs, Variant};
use common::mnist::dataset::{HEIGHT, MnistDataset, NUM_CLASSES, WIDTH};

type Splits = DatasetSplits<Subset<MnistDataset>>;

pub fn launch<B, AutoB>(args: &AppArgs) -> anyhow::Result<()>
where
    B: Backend + MainDevice,
    AutoB: AutodiffBackend<InnerBackend = B, Device = B::Device> + MainDevice,
{
    args.create_artifact_dir()?;

    let mut training_config = args
        .load_training_config::<TrainingConfig>()?
        .unwrap_or_else(|| {
            println!("Using the default training config");
            TrainingConfig::new(optimizer_config())
                .with_image_size([HEIGHT, WIDTH])
                .with_num_classes(NUM_CLASSES)
        });
    if let Some(epochs) = args.epochs {
        training_config.num_epochs = epochs;
    }
    if let Some(mask_ratio) = args.mask_ratio {
        training_config.mask_ratio = Some(mask_ratio);
    }
    args.save_training_config(&training_config)?;

    let (train, valid) = SplitConfig::new()
        .with_seed(training_config.seed)
        .split(Arc::new(MnistDataset::train()?))?;
    let test = Subset::full(Arc::new(MnistDataset::test()?));
    let splits = || DatasetSplits {
        train: train.clone(),
        valid: valid.clone(),
        test: test.clone(),
    };

    let device = AutoB::main_device();
    let [height, width] = training_config.image_size;
    let num_classes = training_config.num_classes;
    let mut summaries = Vec::with_capacity(args.models.len());
    for &variant in &args.models {
        // masking only regularizes the masked-attention model
        let config = match variant {
            Variant::Mage => training_config.clone(),
            _ => training_config.clone().with_mask_ratio(None),
        };
        let summary = match variant {
            Variant::Baseline => {
                let model_config = BaselineCnnConfig::new()
                    .with_num_classes(num_classes)
                    .with_image_size([height, width]);
                run::<B, AutoB, _>(variant, &model_config, &config, splits(), args, &device)?
            }
            Variant::Branching => {
                let model_config = BranchingCnnConfig::new()
                    .with_num_classes(num_classes)
                    .with_image_size([height, width]);
                run::<B, AutoB, _>(variant, &model_config, &config, splits(), args, &device)?
            }
            Variant::Mage => {
                let model_config = MageCnnConfig::new()
                    .with_num_classes(num_classes)
                    .with_image_size([height, width]);
                run::<B, AutoB, _>(variant, &model_config, &config, splits(), args, &device)?
            }
        };
        summaries.push(summary);
    }

    println!("\n{}", report::render_table(&summaries));
    for metric in Metric::ALL {
        println!("{}", report::render_distribution(&summaries, metric));
    }
    Ok(())
}

/// Trains one variant, saves its best model and summary, and shows some validation predictions.
fn run<B, AutoB, C>(
    variant: Variant,
    model_config: &C,
    training_config: &TrainingConfig,
    splits: Splits,
    args: &AppArgs,
    device: &AutoB::Device,
) -> anyhow::Result<RunSummary>
where
    B: Backend,
    AutoB: AutodiffBackend<InnerBackend = B, Device = B::Device>,
    C: ModelConfigExt<AutoB>,
    C::Model: AutodiffModule<AutoB>,
    <C::Model as AutodiffModule<AutoB>>::InnerModule: ImageClassifier<B>,
{
    tracing::info!("training the {} model", variant.name());
    args.save_model_config(variant, model_config)?;

    // seeded before the initialization, so the initial parameters are reproducible
    AutoB::seed(device, training_config.seed);
    let model = model_config.init(device);
    let optim = training_config.optimizer.init::<AutoB, C::Model>();

    let test = splits.test.clone();
    let valid = splits.valid.clone();
    let outcome = train(model, optim, splits, training_config, device)?;
    let model = outcome.model.valid();
    args.save_model::<B>(variant, &model)?;

    let loader = |split: Subset<MnistDataset>| -> Loader<B> {
        DataLoaderBuilder::new(training_config.batcher())
            .batch_size(training_config.batch_size)
            .set_device(device.clone())
            .build(split)
    };
    let inference_time = match loader(test).iter().next() {
        Some(batch) => measure_inference_time(&model, batch.images),
        None => Default::default(),
    };

    let predictions = collect_predictions(&model, &loader(valid));
    println!("\n{} validation samples:", variant.name());
    for sample in select_samples(&predictions, args.samples, args.samples, training_config.seed) {
        println!("  #{:>5} {}", sample.index, sample.label());
    }

    let summary = RunSummary::new(
        variant.name(),
        &outcome,
        count_parameters(&model),
        inference_time,
    );
    args.save_summary(&summary)?;
    Ok(summary)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cnn_compare=info,mnist_compare=info")),
        )
        .init();

    let args = AppArgs::parse()?;
    launch::<MainBackend, MainAutoBackend>(&args)
}

//! Supervised training with best-checkpoint selection.

mod checkpoint;
mod history;

pub use checkpoint::{Checkpoint, load_model, save_model};
pub use history::{History, Metric};

use crate::data::{ImageBatch, ImageBatcher, ImageItem, NormalizationConfig};
use crate::error::{self, TrainError};
use crate::masking::{check_ratio, generate_mask};
use crate::metrics::{PhaseMetrics, PhaseTracker};
use crate::models::ImageClassifier;
use crate::schedule::StepLrConfig;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend, train::ClassificationOutput};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub optimizer: AdamWConfig,
    #[config(default = "StepLrConfig::new()")]
    pub lr_schedule: StepLrConfig,
    #[config(default = "CrossEntropyLossConfig::new()")]
    pub loss: CrossEntropyLossConfig,
    #[config(default = 10)]
    pub num_epochs: usize,
    #[config(default = 64)]
    pub batch_size: usize,
    /// A single worker keeps the batch order reproducible.
    #[config(default = 1)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    /// `[height, width]` of the images of every split.
    #[config(default = "[28, 28]")]
    pub image_size: [usize; 2],
    #[config(default = 10)]
    pub num_classes: usize,
    #[config(default = "NormalizationConfig::new()")]
    pub normalization: NormalizationConfig,
    /// Fraction of training pixels occluded per batch, if any.
    #[config(default = "None")]
    pub mask_ratio: Option<f64>,
}

impl TrainingConfig {
    pub fn batcher(&self) -> ImageBatcher {
        ImageBatcher::new(self.image_size).with_normalization(self.normalization.clone())
    }
}

/// AdamW with the decoupled weight decay commonly used for image classifiers.
pub fn optimizer_config() -> AdamWConfig {
    AdamWConfig::new().with_weight_decay(1e-2)
}

/// Train, validation and test datasets.
pub struct DatasetSplits<D> {
    pub train: D,
    pub valid: D,
    pub test: D,
}

/// Result of [`train`].
pub struct TrainingOutcome<M> {
    /// Model holding the parameters of the best validation epoch.
    pub model: M,
    pub history: History,
    /// 1-based epoch of the restored parameters, `None` if no epoch beat the untrained model.
    pub best_epoch: Option<usize>,
    pub best_valid_accuracy: f64,
    /// Accuracy of the restored model on the test split.
    pub test_accuracy: f64,
    /// Wall-clock time of the epochs, without the test evaluation.
    pub training_time: Duration,
}

pub type Loader<B> = Arc<dyn DataLoader<B, ImageBatch<B>> + 'static>;

/// Trains `model` for `config.num_epochs` epochs, keeping the parameters with the highest
/// validation accuracy, and evaluates them once on the test split.
///
/// The splits are checked before any training happens.
pub fn train<AutoB, M, O, D>(
    model: M,
    mut optim: O,
    splits: DatasetSplits<D>,
    config: &TrainingConfig,
    device: &AutoB::Device,
) -> error::Result<TrainingOutcome<M>>
where
    AutoB: AutodiffBackend,
    M: AutodiffModule<AutoB> + ImageClassifier<AutoB>,
    M::InnerModule: ImageClassifier<AutoB::InnerBackend>,
    O: Optimizer<M, AutoB>,
    D: Dataset<ImageItem> + 'static,
{
    let [height, width] = config.image_size;
    validate_split("train", &splits.train, height * width, config.num_classes)?;
    validate_split("valid", &splits.valid, height * width, config.num_classes)?;
    validate_split("test", &splits.test, height * width, config.num_classes)?;
    let mask_ratio = config.mask_ratio.map(check_ratio).transpose()?;

    AutoB::seed(device, config.seed);

    let batcher = config.batcher();
    let loader_train: Loader<AutoB> = DataLoaderBuilder::new(batcher.clone())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(splits.train);
    let loader_valid: Loader<AutoB::InnerBackend> = DataLoaderBuilder::new(batcher.clone())
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(splits.valid);
    let loader_test: Loader<AutoB::InnerBackend> = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(splits.test);

    let loss_train = config.loss.init::<AutoB>(device);
    let loss_valid = config.loss.init::<AutoB::InnerBackend>(device);

    tracing::info!(
        "training on {} items for {} epochs ({} valid, {} test items)",
        loader_train.num_items(),
        config.num_epochs,
        loader_valid.num_items(),
        loader_test.num_items(),
    );

    let mut model = model;
    let mut schedule = config.lr_schedule.init();
    let mut history = History::default();
    let mut best = Checkpoint::snapshot(&model, None, 0.0);
    let start = Instant::now();

    for epoch in 1..config.num_epochs + 1 {
        let lr = schedule.lr();
        let (trained, train_metrics) = epoch_train(
            &loader_train,
            model,
            &mut optim,
            &loss_train,
            lr,
            mask_ratio,
            [epoch, config.num_epochs],
        );
        model = trained;
        schedule.step();

        let valid_metrics = evaluate(&loader_valid, &model.valid(), &loss_valid);
        history.push(train_metrics, valid_metrics);

        tracing::info!(
            "Epoch {epoch}/{}, lr {lr:.2e}, Train Loss {:.4}, Train Acc {:.4}, Valid Loss {:.4}, Valid Acc {:.4}",
            config.num_epochs,
            train_metrics.loss,
            train_metrics.accuracy,
            valid_metrics.loss,
            valid_metrics.accuracy,
        );

        if best.update(&model, epoch, valid_metrics.accuracy) {
            tracing::debug!(
                "new best checkpoint at epoch {epoch} (valid acc {:.4})",
                valid_metrics.accuracy
            );
        }
    }

    let training_time = start.elapsed();
    let best_epoch = best.epoch();
    let best_valid_accuracy = best.valid_accuracy();
    let model = best.restore(model);
    let test_metrics = evaluate(&loader_test, &model.valid(), &loss_valid);
    tracing::info!(
        "training complete in {}m {}s",
        training_time.as_secs() / 60,
        training_time.as_secs() % 60
    );
    tracing::info!(
        "restored epoch {best_epoch:?} (valid acc {best_valid_accuracy:.4}), Test Acc {:.4}",
        test_metrics.accuracy
    );

    Ok(TrainingOutcome {
        model,
        history,
        best_epoch,
        best_valid_accuracy,
        test_accuracy: test_metrics.accuracy,
        training_time,
    })
}

/// One pass over the training split, with one optimizer step per batch.
///
/// `[epoch, num_epochs]` is the 1-based position of this pass.
pub fn epoch_train<AutoB, M, O>(
    loader: &Loader<AutoB>,
    mut model: M,
    optim: &mut O,
    loss: &CrossEntropyLoss<AutoB>,
    lr: f64,
    mask_ratio: Option<f64>,
    [epoch, num_epochs]: [usize; 2],
) -> (M, PhaseMetrics)
where
    AutoB: AutodiffBackend,
    M: AutodiffModule<AutoB> + ImageClassifier<AutoB>,
    O: Optimizer<M, AutoB>,
{
    let num_items = loader.num_items();
    let mut tracker = PhaseTracker::new(num_items, epoch, num_epochs, Some(lr));

    for (b, batch) in loader.iter().enumerate() {
        let [batch_size, _, height, width] = batch.images.dims();
        let device = batch.images.device();
        let mask = mask_ratio
            .map(|ratio| generate_mask::<AutoB>(batch_size, [height, width], ratio, &device));

        let output = forward_classification(&model, batch.images, batch.targets, mask, loss);
        tracker.update(&output);

        let grads = output.loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optim.step(lr, model, grads);

        tracing::debug!(
            "Epoch {epoch}/{num_epochs}, Batch {:0>4}, Items {}/{num_items}, Loss {:.4}",
            b + 1,
            tracker.items(),
            tracker.batch_loss(),
        );
    }

    (model, tracker.finish())
}

/// One pass over a split without parameter updates or masking.
pub fn evaluate<B, M>(loader: &Loader<B>, model: &M, loss: &CrossEntropyLoss<B>) -> PhaseMetrics
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let mut tracker = PhaseTracker::new(loader.num_items(), 0, 0, None);
    for batch in loader.iter() {
        let output = forward_classification(model, batch.images, batch.targets, None, loss);
        tracker.update(&output);
    }
    tracker.finish()
}

/// Forward pass of `model` with the mean cross-entropy loss of the batch.
///
/// # Shapes
///   - Images [batch, 1, height, width]
///   - Targets [batch]
///   - Mask [batch, 1, height, width]
pub fn forward_classification<B: Backend, M: ImageClassifier<B>>(
    model: &M,
    images: Tensor<B, 4>,
    targets: Tensor<B, 1, Int>,
    mask: Option<Tensor<B, 4>>,
    loss: &CrossEntropyLoss<B>,
) -> ClassificationOutput<B> {
    let [batch_size, _, _, _] = images.dims();
    assert_eq!([batch_size], targets.dims());

    let output = model.forward_masked(images, mask);
    let [_batch_size, _num_classes] = output.dims();
    let loss = loss.forward(output.clone(), targets.clone());

    ClassificationOutput::new(loss, output, targets)
}

/// Rejects splits that are empty, or that hold images or labels the models can't take.
pub fn validate_split<D: Dataset<ImageItem>>(
    split: &'static str,
    dataset: &D,
    num_pixels: usize,
    num_classes: usize,
) -> error::Result<()> {
    if dataset.is_empty() {
        return Err(TrainError::EmptySplit { split });
    }
    for item in dataset.iter() {
        if item.image.len() != num_pixels {
            return Err(TrainError::ImageSizeMismatch {
                split,
                expected: num_pixels,
                got: item.image.len(),
            });
        }
        if item.label >= num_classes {
            return Err(TrainError::LabelOutOfRange {
                split,
                label: item.label,
                num_classes,
            });
        }
    }
    tracing::debug!("{split} split: {} items", dataset.len());
    Ok(())
}

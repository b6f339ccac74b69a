use crate::models::ImageClassifier;
use burn::data::dataloader::Progress;
use burn::prelude::*;
use burn::train::ClassificationOutput;
use burn::train::metric::{
    AccuracyMetric, Adaptor, LossInput, LossMetric, Metric, MetricMetadata, Numeric, NumericEntry,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Number of scalar parameters of all trainable tensors of `model`.
pub fn count_parameters<B: Backend, M: Module<B>>(model: &M) -> usize {
    model.num_params()
}

/// Wall-clock time of one forward pass over `images`, divided by the batch size.
///
/// Should be called on a model of a non-autodiff backend, so that no graph is recorded.
/// The output is read back so that lazy or asynchronous backends finish the computation.
pub fn measure_inference_time<B: Backend, M: ImageClassifier<B>>(
    model: &M,
    images: Tensor<B, 4>,
) -> Duration {
    let [batch_size, _, _, _] = images.dims();
    assert!(batch_size > 0, "cannot time an empty batch");

    let start = Instant::now();
    let output = model.forward(images);
    let _ = output.into_data();
    let elapsed = start.elapsed();

    elapsed / batch_size as u32
}

/// Loss and accuracy of one phase of one epoch.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PhaseMetrics {
    /// Mean loss per item.
    pub loss: f64,
    /// Fraction of items correctly classified, in `[0, 1]`.
    pub accuracy: f64,
}

/// Feeds the batch outputs of one phase into burn's loss and accuracy metrics.
///
/// Both metrics weight each batch by its size, so the running values are means per item.
pub struct PhaseTracker<B: Backend> {
    loss: LossMetric<B>,
    accuracy: AccuracyMetric<B>,
    meta: MetricMetadata,
}

impl<B: Backend> PhaseTracker<B> {
    /// `num_items` is the size of the split, `epoch` is 1-based.
    pub fn new(num_items: usize, epoch: usize, epoch_total: usize, lr: Option<f64>) -> Self {
        Self {
            loss: LossMetric::new(),
            accuracy: AccuracyMetric::new(),
            meta: MetricMetadata {
                progress: Progress::new(0, num_items),
                epoch,
                epoch_total,
                iteration: 0,
                lr,
            },
        }
    }

    pub fn update(&mut self, output: &ClassificationOutput<B>) {
        let [batch_size, _num_classes] = output.output.dims();
        self.meta.iteration += 1;
        self.meta.progress.items_processed += batch_size;

        // LossMetric weights a batch by the length of its loss tensor
        let loss = output.loss.clone().reshape([1]).repeat_dim(0, batch_size);
        self.loss.update(&LossInput::new(loss), &self.meta);
        self.accuracy.update(&output.adapt(), &self.meta);
    }

    pub fn items(&self) -> usize {
        self.meta.progress.items_processed
    }

    /// Loss of the last batch.
    pub fn batch_loss(&self) -> f64 {
        self.loss.value().current()
    }

    /// Averages over the whole split.
    pub fn finish(&self) -> PhaseMetrics {
        let Progress {
            items_processed,
            items_total,
        } = self.meta.progress;
        debug_assert_eq!(items_processed, items_total, "the whole split must be visited");
        PhaseMetrics {
            loss: running_mean(self.loss.value()),
            // burn reports percentages
            accuracy: running_mean(self.accuracy.value()) / 100.0,
        }
    }
}

fn running_mean(entry: NumericEntry) -> f64 {
    match entry {
        NumericEntry::Aggregated { count: 0, .. } => 0.0,
        NumericEntry::Aggregated { sum, count, .. } => sum / count as f64,
        NumericEntry::Value(value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BaselineCnnConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn classification(
        loss: f32,
        logits: Tensor<TestBackend, 2>,
        targets: Tensor<TestBackend, 1, Int>,
    ) -> ClassificationOutput<TestBackend> {
        let loss = Tensor::from_floats([loss], &logits.device());
        ClassificationOutput::new(loss, logits, targets)
    }

    #[test]
    fn tracker_weights_batches_by_size() {
        let device = Default::default();
        let mut tracker = PhaseTracker::<TestBackend>::new(6, 1, 1, None);

        // 2 of 4 correct
        let logits = Tensor::from_floats([[0.1, 0.9], [2.0, -1.0], [0.3, 0.2], [-5.0, 5.0]], &device);
        let targets = Tensor::from_ints([1, 0, 1, 0], &device);
        tracker.update(&classification(1.0, logits, targets));
        assert_eq!(tracker.items(), 4);
        assert!((tracker.batch_loss() - 1.0).abs() < 1e-6);

        // 2 of 2 correct
        let logits = Tensor::from_floats([[1.0, 0.0], [0.0, 1.0]], &device);
        let targets = Tensor::from_ints([0, 1], &device);
        tracker.update(&classification(0.25, logits, targets));
        assert_eq!(tracker.items(), 6);
        assert!((tracker.batch_loss() - 0.25).abs() < 1e-6);

        let metrics = tracker.finish();
        assert!((metrics.loss - 4.5 / 6.0).abs() < 1e-6, "{metrics:?}");
        assert!((metrics.accuracy - 4.0 / 6.0).abs() < 1e-6, "{metrics:?}");
    }

    #[test]
    fn empty_tracker_finishes_at_zero() {
        let tracker = PhaseTracker::<TestBackend>::new(0, 1, 1, None);
        assert_eq!(
            tracker.finish(),
            PhaseMetrics {
                loss: 0.0,
                accuracy: 0.0
            }
        );
    }

    #[test]
    fn counts_parameters_and_times_inference() {
        let device = Default::default();
        let model = BaselineCnnConfig::new()
            .with_num_classes(2)
            .init::<TestBackend>(&device);
        assert_eq!(
            count_parameters(&model),
            (32 * 9 + 32) + (64 * 32 * 9 + 64) + (64 * 7 * 7 * 2 + 2)
        );

        let images = Tensor::<TestBackend, 4>::zeros([4, 1, 28, 28], &device);
        let per_image = measure_inference_time(&model, images);
        assert!(per_image > Duration::ZERO);
    }
}

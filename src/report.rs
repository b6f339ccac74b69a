//! Summaries of finished runs: curve markers, box-plot statistics, comparison tables and
//! sampled predictions.

use crate::data::ImageBatch;
use crate::models::ImageClassifier;
use crate::training::{History, Loader, Metric, TrainingOutcome};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;

/// Everything reported about one trained model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub model: String,
    pub history: History,
    pub best_epoch: Option<usize>,
    pub best_valid_accuracy: f64,
    pub test_accuracy: f64,
    pub num_params: usize,
    pub inference_time_per_image: Duration,
    pub training_time: Duration,
}

impl RunSummary {
    pub fn new<M>(
        model: impl Into<String>,
        outcome: &TrainingOutcome<M>,
        num_params: usize,
        inference_time_per_image: Duration,
    ) -> Self {
        Self {
            model: model.into(),
            history: outcome.history.clone(),
            best_epoch: outcome.best_epoch,
            best_valid_accuracy: outcome.best_valid_accuracy,
            test_accuracy: outcome.test_accuracy,
            num_params,
            inference_time_per_image,
            training_time: outcome.training_time,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Highest validation accuracy.
    pub fn peak_valid_accuracy(&self) -> Option<Marker> {
        Marker::peak(self.history.series(Metric::ValidAccuracy))
    }

    /// Lowest validation loss.
    pub fn min_valid_loss(&self) -> Option<Marker> {
        Marker::min(self.history.series(Metric::ValidLoss))
    }
}

/// A highlighted point of a per-epoch curve.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    /// 1-based.
    pub epoch: usize,
    pub value: f64,
}

impl Marker {
    /// Earliest maximum of `series`.
    pub fn peak(series: &[f64]) -> Option<Self> {
        Self::extremum(series, |candidate, best| candidate > best)
    }

    /// Earliest minimum of `series`.
    pub fn min(series: &[f64]) -> Option<Self> {
        Self::extremum(series, |candidate, best| candidate < best)
    }

    fn extremum(series: &[f64], better: impl Fn(f64, f64) -> bool) -> Option<Self> {
        let mut found: Option<Self> = None;
        for (i, &value) in series.iter().enumerate() {
            if found.is_none_or(|marker| better(value, marker.value)) {
                found = Some(Self {
                    epoch: i + 1,
                    value,
                });
            }
        }
        found
    }
}

/// Box-plot statistics of a series, with linearly interpolated quartiles.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FiveNumberSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl FiveNumberSummary {
    pub fn of(series: &[f64]) -> Option<Self> {
        if series.is_empty() {
            return None;
        }
        let mut sorted = series.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

/// One row per run: size, speed, best/test accuracy and the curve markers.
pub fn render_table(runs: &[RunSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:>10} {:>14} {:>10} {:>10} {:>12} {:>9} {:>14} {:>14}",
        "Model",
        "Params",
        "Infer (us/img)",
        "Train (s)",
        "Best Epoch",
        "Best Val Acc",
        "Test Acc",
        "Peak Val Acc",
        "Min Val Loss",
    );
    for run in runs {
        let best_epoch = run
            .best_epoch
            .map_or_else(|| "-".to_string(), |epoch| epoch.to_string());
        let _ = writeln!(
            out,
            "{:<12} {:>10} {:>14.1} {:>10.1} {:>10} {:>12.4} {:>9.4} {:>14} {:>14}",
            run.model,
            run.num_params,
            run.inference_time_per_image.as_secs_f64() * 1e6,
            run.training_time.as_secs_f64(),
            best_epoch,
            run.best_valid_accuracy,
            run.test_accuracy,
            render_marker(run.peak_valid_accuracy()),
            render_marker(run.min_valid_loss()),
        );
    }
    out
}

fn render_marker(marker: Option<Marker>) -> String {
    match marker {
        Some(Marker { epoch, value }) => format!("{value:.4} @{epoch}"),
        None => "-".to_string(),
    }
}

/// Five-number summaries of `metric` across the runs.
pub fn render_distribution(runs: &[RunSummary], metric: Metric) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:>8} {:>8} {:>8} {:>8} {:>8}  ({})",
        "Model",
        "min",
        "q1",
        "median",
        "q3",
        "max",
        metric.name(),
    );
    for run in runs {
        if let Some(s) = FiveNumberSummary::of(run.history.series(metric)) {
            let _ = writeln!(
                out,
                "{:<12} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4}",
                run.model, s.min, s.q1, s.median, s.q3, s.max,
            );
        }
    }
    out
}

/// Predicted class of one sample with its softmax probability.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SamplePrediction {
    /// Position of the sample in its split.
    pub index: usize,
    pub predicted: usize,
    pub target: usize,
    pub confidence: f64,
}

impl SamplePrediction {
    pub fn is_correct(&self) -> bool {
        self.predicted == self.target
    }

    pub fn label(&self) -> String {
        if self.is_correct() {
            format!("Correct: {} / Conf: {:.2}", self.predicted, self.confidence)
        } else {
            format!(
                "Wrong: {} (True: {}) / Conf: {:.2}",
                self.predicted, self.target, self.confidence
            )
        }
    }
}

/// Predictions of `model` for one batch, indexed from `first_index`.
pub fn predict_batch<B: Backend, M: ImageClassifier<B>>(
    model: &M,
    batch: ImageBatch<B>,
    first_index: usize,
) -> Vec<SamplePrediction> {
    let batch_size = batch.batch_size();
    let probabilities = softmax(model.forward(batch.images), 1);
    let [_batch_size, _num_classes] = probabilities.dims();

    let confidences = probabilities.clone().max_dim(1).reshape([batch_size]).into_data();
    let predictions = probabilities.argmax(1).reshape([batch_size]).into_data();
    let targets = batch.targets.into_data();

    confidences
        .iter::<f64>()
        .zip(predictions.iter::<i64>())
        .zip(targets.iter::<i64>())
        .enumerate()
        .map(|(i, ((confidence, predicted), target))| SamplePrediction {
            index: first_index + i,
            predicted: predicted as usize,
            target: target as usize,
            confidence,
        })
        .collect()
}

/// Predictions of `model` over a whole split, in loader order.
pub fn collect_predictions<B: Backend, M: ImageClassifier<B>>(
    model: &M,
    loader: &Loader<B>,
) -> Vec<SamplePrediction> {
    let mut predictions = Vec::with_capacity(loader.num_items());
    for batch in loader.iter() {
        let first_index = predictions.len();
        predictions.extend(predict_batch(model, batch, first_index));
    }
    predictions
}

/// Up to `num_correct` correct and `num_wrong` wrong predictions, drawn without replacement.
///
/// The correct ones come first.
pub fn select_samples(
    predictions: &[SamplePrediction],
    num_correct: usize,
    num_wrong: usize,
    seed: u64,
) -> Vec<SamplePrediction> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (mut correct, mut wrong): (Vec<_>, Vec<_>) =
        predictions.iter().copied().partition(SamplePrediction::is_correct);
    correct.shuffle(&mut rng);
    wrong.shuffle(&mut rng);
    correct.truncate(num_correct);
    wrong.truncate(num_wrong);
    correct.extend(wrong);
    correct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::PhaseMetrics;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn prediction(index: usize, predicted: usize, target: usize) -> SamplePrediction {
        SamplePrediction {
            index,
            predicted,
            target,
            confidence: 0.5,
        }
    }

    fn summary(name: &str, valid_accuracy: &[f64]) -> RunSummary {
        let mut history = History::default();
        for (i, &accuracy) in valid_accuracy.iter().enumerate() {
            let train = PhaseMetrics {
                loss: 1.0 / (i + 1) as f64,
                accuracy,
            };
            let valid = PhaseMetrics {
                loss: [0.9, 0.5, 0.6, 0.5][i % 4],
                accuracy,
            };
            history.push(train, valid);
        }
        RunSummary {
            model: name.to_string(),
            history,
            best_epoch: Some(2),
            best_valid_accuracy: 0.9,
            test_accuracy: 0.88,
            num_params: 50_186,
            inference_time_per_image: Duration::from_micros(12),
            training_time: Duration::from_secs(95),
        }
    }

    #[test]
    fn markers_pick_the_earliest_extremum() {
        let series = [0.3, 0.7, 0.5, 0.7];
        assert_eq!(
            Marker::peak(&series),
            Some(Marker {
                epoch: 2,
                value: 0.7
            })
        );
        assert_eq!(
            Marker::min(&[0.9, 0.4, 0.4, 0.6]),
            Some(Marker {
                epoch: 2,
                value: 0.4
            })
        );
        assert_eq!(Marker::peak(&[]), None);
    }

    #[test]
    fn five_number_summary_interpolates() {
        let s = FiveNumberSummary::of(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert!(close(s.min, 1.0));
        assert!(close(s.q1, 1.75));
        assert!(close(s.median, 2.5));
        assert!(close(s.q3, 3.25));
        assert!(close(s.max, 4.0));

        let s = FiveNumberSummary::of(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!(close(s.q1, 2.0));
        assert!(close(s.median, 3.0));
        assert!(close(s.q3, 4.0));

        let single = FiveNumberSummary::of(&[0.5]).unwrap();
        assert!(close(single.min, 0.5) && close(single.max, 0.5) && close(single.median, 0.5));
        assert_eq!(FiveNumberSummary::of(&[]), None);
    }

    #[test]
    fn prediction_labels() {
        let correct = SamplePrediction {
            index: 0,
            predicted: 7,
            target: 7,
            confidence: 0.987,
        };
        let wrong = SamplePrediction {
            index: 1,
            predicted: 3,
            target: 8,
            confidence: 0.51,
        };
        assert_eq!(correct.label(), "Correct: 7 / Conf: 0.99");
        assert_eq!(wrong.label(), "Wrong: 3 (True: 8) / Conf: 0.51");
    }

    #[test]
    fn sample_selection_is_seeded_and_bounded() {
        let predictions: Vec<_> = (0..20).map(|i| prediction(i, i % 3, 0)).collect();
        let a = select_samples(&predictions, 4, 2, 7);
        let b = select_samples(&predictions, 4, 2, 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
        assert!(a[..4].iter().all(SamplePrediction::is_correct));
        assert!(a[4..].iter().all(|p| !p.is_correct()));

        // only 7 correct predictions exist
        let many = select_samples(&predictions, 100, 0, 7);
        assert_eq!(many.len(), 7);
    }

    #[test]
    fn summary_markers_and_rendering() {
        let runs = [
            summary("baseline", &[0.5, 0.9, 0.8, 0.9]),
            summary("mage", &[0.6, 0.7]),
        ];
        assert_eq!(
            runs[0].peak_valid_accuracy(),
            Some(Marker {
                epoch: 2,
                value: 0.9
            })
        );
        assert_eq!(runs[0].min_valid_loss().map(|m| m.epoch), Some(2));

        let table = render_table(&runs);
        assert_eq!(table.lines().count(), 3);
        assert!(table.contains("baseline"));
        assert!(table.contains("50186"));
        assert!(table.contains("0.9000 @2"));
        assert!(table.contains("95.0"));

        let distribution = render_distribution(&runs, Metric::ValidAccuracy);
        assert!(distribution.contains("val_acc"));
        assert_eq!(distribution.lines().count(), 3);
    }

    #[test]
    fn summary_json() {
        let run = summary("branching", &[0.4, 0.6]);
        let json = run.to_json().unwrap();
        assert!(json.contains("\"model\": \"branching\""));
        assert_eq!(RunSummary::from_json(&json).unwrap(), run);
    }
}

use crate::metrics::PhaseMetrics;
use serde::{Deserialize, Serialize};

/// Per-epoch metric series, one value appended per epoch.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct History {
    pub train_loss: Vec<f64>,
    pub train_accuracy: Vec<f64>,
    pub valid_loss: Vec<f64>,
    pub valid_accuracy: Vec<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    TrainLoss,
    TrainAccuracy,
    ValidLoss,
    ValidAccuracy,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::TrainLoss,
        Metric::TrainAccuracy,
        Metric::ValidLoss,
        Metric::ValidAccuracy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::TrainLoss => "train_loss",
            Metric::TrainAccuracy => "train_acc",
            Metric::ValidLoss => "val_loss",
            Metric::ValidAccuracy => "val_acc",
        }
    }
}

impl History {
    pub fn push(&mut self, train: PhaseMetrics, valid: PhaseMetrics) {
        self.train_loss.push(train.loss);
        self.train_accuracy.push(train.accuracy);
        self.valid_loss.push(valid.loss);
        self.valid_accuracy.push(valid.accuracy);
    }

    /// Number of recorded epochs.
    pub fn len(&self) -> usize {
        self.valid_accuracy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn series(&self, metric: Metric) -> &[f64] {
        match metric {
            Metric::TrainLoss => &self.train_loss,
            Metric::TrainAccuracy => &self.train_accuracy,
            Metric::ValidLoss => &self.valid_loss,
            Metric::ValidAccuracy => &self.valid_accuracy,
        }
    }

    /// `(train, valid)` metrics of the epoch at `index` (0-based).
    pub fn epoch(&self, index: usize) -> Option<(PhaseMetrics, PhaseMetrics)> {
        let train = PhaseMetrics {
            loss: *self.train_loss.get(index)?,
            accuracy: *self.train_accuracy.get(index)?,
        };
        let valid = PhaseMetrics {
            loss: *self.valid_loss.get(index)?,
            accuracy: *self.valid_accuracy.get(index)?,
        };
        Some((train, valid))
    }

    /// Earliest 1-based epoch with the highest validation accuracy, and that accuracy.
    pub fn best_valid_epoch(&self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &accuracy) in self.valid_accuracy.iter().enumerate() {
            if best.is_none_or(|(_, best_accuracy)| accuracy > best_accuracy) {
                best = Some((i + 1, accuracy));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(loss: f64, accuracy: f64) -> PhaseMetrics {
        PhaseMetrics { loss, accuracy }
    }

    #[test]
    fn push_appends_one_entry_per_series() {
        let mut history = History::default();
        assert!(history.is_empty());
        history.push(phase(1.0, 0.5), phase(0.9, 0.6));
        history.push(phase(0.8, 0.7), phase(0.7, 0.75));
        assert_eq!(history.len(), 2);
        for metric in Metric::ALL {
            assert_eq!(history.series(metric).len(), 2);
        }
        assert_eq!(history.series(Metric::ValidLoss), &[0.9, 0.7]);
        assert_eq!(history.epoch(1), Some((phase(0.8, 0.7), phase(0.7, 0.75))));
        assert_eq!(history.epoch(2), None);
    }

    #[test]
    fn best_epoch_prefers_the_earliest_tie() {
        let mut history = History::default();
        for accuracy in [0.5, 0.8, 0.7, 0.8] {
            history.push(phase(0.0, 0.0), phase(0.0, accuracy));
        }
        assert_eq!(history.best_valid_epoch(), Some((2, 0.8)));
        assert_eq!(History::default().best_valid_epoch(), None);
    }

    #[test]
    fn serializes_with_metric_names() {
        let mut history = History::default();
        history.push(phase(1.0, 0.5), phase(0.9, 0.6));
        let json = serde_json::to_string(&history).unwrap();
        let back: History = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
        assert_eq!(Metric::ValidAccuracy.name(), "val_acc");
    }
}

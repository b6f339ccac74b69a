use crate::error::{Result, TrainError};
use burn::prelude::*;
use burn::record::FileRecorder;
use std::path::Path;

/// Value snapshot of a model's parameters, tagged with the epoch that produced it.
///
/// The snapshot owns its record, so later optimizer steps on the live model never affect it.
pub struct Checkpoint<B: Backend, M: Module<B>> {
    record: M::Record,
    /// 1-based epoch, or `None` for the parameters before any training.
    epoch: Option<usize>,
    valid_accuracy: f64,
}

impl<B: Backend, M: Module<B>> Checkpoint<B, M> {
    pub fn snapshot(model: &M, epoch: Option<usize>, valid_accuracy: f64) -> Self {
        Self {
            record: model.clone().into_record(),
            epoch,
            valid_accuracy,
        }
    }

    /// Loads the snapshot into `model`, replacing all of its parameters.
    pub fn restore(self, model: M) -> M {
        model.load_record(self.record)
    }

    pub fn epoch(&self) -> Option<usize> {
        self.epoch
    }

    pub fn valid_accuracy(&self) -> f64 {
        self.valid_accuracy
    }

    /// Replaces the snapshot if `valid_accuracy` is strictly higher, and returns whether it did.
    ///
    /// Ties keep the earlier snapshot.
    pub fn update(&mut self, model: &M, epoch: usize, valid_accuracy: f64) -> bool {
        if valid_accuracy > self.valid_accuracy {
            *self = Self::snapshot(model, Some(epoch), valid_accuracy);
            true
        } else {
            false
        }
    }
}

/// Saves `model` into `path` (the recorder adds its file extension).
pub fn save_model<B, M, R>(model: &M, path: &Path, recorder: &R) -> Result<()>
where
    B: Backend,
    M: Module<B>,
    R: FileRecorder<B>,
{
    tracing::debug!("saving model to {path:?}");
    model
        .clone()
        .save_file(path, recorder)
        .map_err(|e| TrainError::Record(format!("failed to save {path:?}: {e:?}")))
}

/// Loads the parameters saved at `path` into `model`.
pub fn load_model<B, M, R>(model: M, path: &Path, recorder: &R, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
    R: FileRecorder<B>,
{
    tracing::debug!("loading model from {path:?}");
    model
        .load_file(path, recorder, device)
        .map_err(|e| TrainError::Record(format!("failed to load {path:?}: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BaselineCnnConfig;
    use burn::backend::NdArray;
    use burn::module::Param;
    use burn::record::CompactRecorder;

    type TestBackend = NdArray<f32>;

    fn fc_bias(model: &crate::models::BaselineCnn<TestBackend>) -> Vec<f32> {
        model
            .fc
            .bias
            .as_ref()
            .unwrap()
            .val()
            .into_data()
            .to_vec::<f32>()
            .unwrap()
    }

    #[test]
    fn restore_brings_back_the_snapshot() {
        let device = Default::default();
        let mut model = BaselineCnnConfig::new()
            .with_num_classes(2)
            .init::<TestBackend>(&device);
        let checkpoint = Checkpoint::snapshot(&model, Some(1), 0.5);
        let before = fc_bias(&model);

        model.fc.bias = Some(Param::from_tensor(Tensor::ones([2], &device)));
        assert_eq!(fc_bias(&model), vec![1.0, 1.0]);

        let model = checkpoint.restore(model);
        assert_eq!(fc_bias(&model), before);
    }

    #[test]
    fn update_requires_strict_improvement() {
        let device = Default::default();
        let model = BaselineCnnConfig::new().init::<TestBackend>(&device);
        let mut checkpoint = Checkpoint::snapshot(&model, None, 0.0);
        assert!(!checkpoint.update(&model, 1, 0.0));
        assert_eq!(checkpoint.epoch(), None);
        assert!(checkpoint.update(&model, 2, 0.6));
        assert!(!checkpoint.update(&model, 3, 0.6));
        assert!(!checkpoint.update(&model, 4, 0.4));
        assert_eq!(checkpoint.epoch(), Some(2));
        assert_eq!(checkpoint.valid_accuracy(), 0.6);
    }

    #[test]
    fn save_and_load_file() {
        let device = Default::default();
        let config = BaselineCnnConfig::new().with_num_classes(2);
        let model = config.init::<TestBackend>(&device);
        let dir = std::env::temp_dir().join(format!("cnn-compare-ckpt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model");

        let recorder = CompactRecorder::new();
        save_model(&model, &path, &recorder).unwrap();
        let loaded = load_model(config.init::<TestBackend>(&device), &path, &recorder, &device)
            .unwrap();
        // half precision records, so compare loosely
        for (a, b) in fc_bias(&model).iter().zip(fc_bias(&loaded)) {
            assert!((a - b).abs() < 1e-2);
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn loading_a_missing_file_fails() {
        let device = Default::default();
        let model = BaselineCnnConfig::new().init::<TestBackend>(&device);
        let path = std::env::temp_dir().join("cnn-compare-missing-checkpoint");
        let result = load_model(model, &path, &CompactRecorder::new(), &device);
        assert!(matches!(result, Err(TrainError::Record(_))));
    }
}

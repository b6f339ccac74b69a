//! Training and comparison of convolutional image classifiers: a baseline CNN, a
//! branching/merging CNN and a masked-attention CNN.

pub mod attention;
pub mod data;
pub mod error;
pub mod masking;
pub mod metrics;
pub mod models;
pub mod report;
pub mod schedule;
pub mod training;

pub mod prelude {
    pub use crate::attention::{SelfAttention2d, SelfAttention2dConfig};
    pub use crate::data::*;
    pub use crate::error::TrainError;
    pub use crate::masking::{apply_mask, generate_mask, mask_images};
    pub use crate::metrics::{PhaseMetrics, count_parameters, measure_inference_time};
    pub use crate::models::*;
    pub use crate::report::{RunSummary, SamplePrediction};
    pub use crate::schedule::{StepLr, StepLrConfig};
    pub use crate::training::{
        DatasetSplits, History, Metric, TrainingConfig, TrainingOutcome, optimizer_config, train,
    };
}

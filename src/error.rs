use std::fmt;

pub type Result<T> = std::result::Result<T, TrainError>;

/// Failures detected before or around a training run.
///
/// Shape errors inside a forward pass are not represented here, they are
/// asserted by the modules themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainError {
    /// A dataset split has no items.
    EmptySplit { split: &'static str },
    /// An item's pixel count differs from the configured image size.
    ImageSizeMismatch {
        split: &'static str,
        expected: usize,
        got: usize,
    },
    /// An item's label is not a valid class index.
    LabelOutOfRange {
        split: &'static str,
        label: usize,
        num_classes: usize,
    },
    /// The masking ratio must be within `[0, 1]`.
    InvalidMaskRatio(f64),
    /// The validation fraction must be within `[0, 1)`.
    InvalidSplitFraction(f64),
    /// Persisting or loading a checkpoint failed.
    Record(String),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::EmptySplit { split } => write!(f, "the {split} split is empty"),
            TrainError::ImageSizeMismatch {
                split,
                expected,
                got,
            } => write!(
                f,
                "an item of the {split} split has {got} pixels, expected {expected}"
            ),
            TrainError::LabelOutOfRange {
                split,
                label,
                num_classes,
            } => write!(
                f,
                "an item of the {split} split has label {label}, but there are only {num_classes} classes"
            ),
            TrainError::InvalidMaskRatio(ratio) => {
                write!(f, "mask ratio {ratio} is outside of [0, 1]")
            }
            TrainError::InvalidSplitFraction(fraction) => {
                write!(f, "validation fraction {fraction} is outside of [0, 1)")
            }
            TrainError::Record(reason) => write!(f, "checkpoint record error: {reason}"),
        }
    }
}

impl std::error::Error for TrainError {}

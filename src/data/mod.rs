mod item;
mod split;
mod synthetic;

pub use item::{ImageBatch, ImageBatcher, ImageItem, NormalizationConfig};
pub use split::{SplitConfig, Subset, split_indices};
pub use synthetic::SyntheticDataset;

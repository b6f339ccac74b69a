use crate::error::{self, TrainError};
use burn::data::dataset::Dataset;
use burn::prelude::*;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use std::sync::Arc;

/// Configuration of the one-time train/validation partition.
#[derive(Config, Debug, PartialEq)]
pub struct SplitConfig {
    /// Fraction of the items that goes into the validation split.
    #[config(default = 0.2)]
    pub valid_fraction: f64,
    #[config(default = 42)]
    pub seed: u64,
}

/// A view over selected items of a shared dataset.
///
/// The items are yielded in the order of `indices`.
pub struct Subset<D> {
    dataset: Arc<D>,
    indices: Vec<usize>,
}

impl<D> Clone for Subset<D> {
    fn clone(&self) -> Self {
        Self {
            dataset: Arc::clone(&self.dataset),
            indices: self.indices.clone(),
        }
    }
}

impl<D> Subset<D> {
    pub fn new(dataset: Arc<D>, indices: Vec<usize>) -> Self {
        Self { dataset, indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Selects every item of the dataset, in order.
    pub fn full<I>(dataset: Arc<D>) -> Self
    where
        D: Dataset<I>,
    {
        let indices = (0..dataset.len()).collect();
        Self { dataset, indices }
    }
}

impl<D, I> Dataset<I> for Subset<D>
where
    D: Dataset<I>,
{
    fn get(&self, index: usize) -> Option<I> {
        let index = *self.indices.get(index)?;
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

impl SplitConfig {
    /// Shuffles the indices of `dataset` with the configured seed and partitions them into
    /// `(train, valid)`.
    ///
    /// The validation split receives `round(len * valid_fraction)` items.
    pub fn split<D, I>(&self, dataset: Arc<D>) -> error::Result<(Subset<D>, Subset<D>)>
    where
        D: Dataset<I>,
    {
        if !(0.0..1.0).contains(&self.valid_fraction) {
            return Err(TrainError::InvalidSplitFraction(self.valid_fraction));
        }
        let (train, valid) = split_indices(dataset.len(), self.valid_fraction, self.seed);
        tracing::debug!(
            "dataset split: {} training, {} validation (seed {})",
            train.len(),
            valid.len(),
            self.seed
        );
        Ok((
            Subset::new(Arc::clone(&dataset), train),
            Subset::new(dataset, valid),
        ))
    }
}

/// Returns the shuffled `(train, valid)` index partition of `0..len`.
pub fn split_indices(len: usize, valid_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let valid_len = ((len as f64) * valid_fraction).round() as usize;
    let valid_len = valid_len.min(len);
    let valid = indices.split_off(len - valid_len);
    (indices, valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::InMemDataset;

    #[test]
    fn split_is_deterministic_disjoint_and_complete() {
        let (train_a, valid_a) = split_indices(50, 0.2, 42);
        let (train_b, valid_b) = split_indices(50, 0.2, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(valid_a, valid_b);
        assert_eq!(train_a.len(), 40);
        assert_eq!(valid_a.len(), 10);

        let mut all: Vec<usize> = train_a.iter().chain(valid_a.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn different_seeds_give_different_partitions() {
        let (_, valid_a) = split_indices(100, 0.2, 1);
        let (_, valid_b) = split_indices(100, 0.2, 2);
        assert_ne!(valid_a, valid_b);
    }

    #[test]
    fn subset_reads_through_indices() {
        let dataset = Arc::new(InMemDataset::new(vec![10, 11, 12, 13]));
        let subset = Subset::new(Arc::clone(&dataset), vec![3, 1]);
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.get(0), Some(13));
        assert_eq!(subset.get(1), Some(11));
        assert_eq!(subset.get(2), None);

        let full = Subset::full(dataset);
        assert_eq!(full.len(), 4);
        assert_eq!(full.get(2), Some(12));
    }

    #[test]
    fn config_split_rejects_invalid_fraction() {
        let dataset = Arc::new(InMemDataset::new(vec![0u8; 4]));
        let err = SplitConfig::new()
            .with_valid_fraction(1.0)
            .split(dataset)
            .err();
        assert_eq!(err, Some(TrainError::InvalidSplitFraction(1.0)));
    }

    #[test]
    fn config_json_round_trip() {
        let config = SplitConfig::new().with_valid_fraction(0.1).with_seed(7);
        let json = serde_json::to_string(&config).unwrap();
        let back: SplitConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}

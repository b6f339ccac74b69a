use super::ImageItem;
use burn::data::dataset::{Dataset, InMemDataset};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Small in-memory classification dataset.
///
/// Each class `c` lights up the horizontal band of rows `c * height / num_classes ..`,
/// so that classes are separable, and a seeded noise is added on top.
pub struct SyntheticDataset {
    dataset: InMemDataset<ImageItem>,
}

impl SyntheticDataset {
    pub fn new(len: usize, num_classes: usize, [height, width]: [usize; 2], seed: u64) -> Self {
        assert!(num_classes > 0);
        let mut rng = StdRng::seed_from_u64(seed);
        let band = (height / num_classes).max(1);

        let items = (0..len)
            .map(|i| {
                let label = i % num_classes;
                let rows = (label * band)..((label + 1) * band);
                let image = (0..height * width)
                    .map(|p| {
                        let noise: f32 = rng.random_range(0.0..32.0);
                        if rows.contains(&(p / width)) {
                            223.0 + noise
                        } else {
                            noise
                        }
                    })
                    .collect();
                ImageItem::new(image, label)
            })
            .collect();

        Self {
            dataset: InMemDataset::new(items),
        }
    }
}

impl Dataset<ImageItem> for SyntheticDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_cycle_and_pixels_are_in_range() {
        let dataset = SyntheticDataset::new(10, 2, [8, 8], 0);
        assert_eq!(dataset.len(), 10);
        for i in 0..10 {
            let item = dataset.get(i).unwrap();
            assert_eq!(item.label, i % 2);
            assert_eq!(item.image.len(), 64);
            assert!(item.image.iter().all(|p| (0.0..=255.0).contains(p)));
        }
    }

    #[test]
    fn same_seed_same_items() {
        let a = SyntheticDataset::new(4, 2, [4, 4], 7);
        let b = SyntheticDataset::new(4, 2, [4, 4], 7);
        for i in 0..4 {
            assert_eq!(a.get(i), b.get(i));
        }
    }
}

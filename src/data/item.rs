use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// A single-channel image with its class label.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ImageItem {
    /// Image as a flat, row-major array of brightness values in between 0.0 and 255.0.
    ///
    /// # Shape
    /// [height * width]
    pub image: Vec<f32>,

    /// Class index of the image.
    pub label: usize,
}

impl ImageItem {
    pub fn new(image: Vec<f32>, label: usize) -> Self {
        Self { image, label }
    }
}

/// Brightness normalization applied by the [`ImageBatcher`].
///
/// The mappings are:
///
/// * `z = (value / 255 - mean) / std`,
/// * `value = (z * std + mean) * 255`.
#[derive(Config, Debug, PartialEq)]
pub struct NormalizationConfig {
    /// Defaults to mapping brightness into `[-1, 1]`.
    #[config(default = 0.5)]
    pub mean: f64,
    #[config(default = 0.5)]
    pub std: f64,
}

#[derive(Clone, Debug)]
pub struct ImageBatcher {
    pub height: usize,
    pub width: usize,
    pub normalization: NormalizationConfig,
}

impl ImageBatcher {
    pub fn new([height, width]: [usize; 2]) -> Self {
        Self {
            height,
            width,
            normalization: NormalizationConfig::new(),
        }
    }

    pub fn with_normalization(mut self, normalization: NormalizationConfig) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn num_pixels(&self) -> usize {
        self.height * self.width
    }
}

#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Normalized brightness, see [`NormalizationConfig`].
    ///
    /// # Shape
    /// [batch_size, 1, height, width]
    pub images: Tensor<B, 4>,
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn batch_size(&self) -> usize {
        let [batch_size] = self.targets.dims();
        batch_size
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let num_pixels = self.num_pixels();

        let (items_image, items_label): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|item| (item.image, item.label as i64))
            .unzip();
        let pixels: Vec<f32> = items_image.into_iter().flatten().collect();
        assert_eq!(
            pixels.len(),
            batch_size * num_pixels,
            "every image must have {num_pixels} pixels"
        );

        let images = TensorData::new(pixels, [batch_size * num_pixels]).convert::<B::FloatElem>();
        let images = Tensor::<B, 1>::from_data(images, device).reshape([
            batch_size,
            1,
            self.height,
            self.width,
        ]);
        let NormalizationConfig { mean, std } = self.normalization;
        let images = ((images / 255) - mean) / std;

        let targets = TensorData::new(items_label, [batch_size]).convert::<B::IntElem>();
        let targets = Tensor::<B, 1, Int>::from_data(targets, device);

        ImageBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn batch_normalizes_and_reshapes() {
        let device = Default::default();
        let batcher = ImageBatcher::new([2, 2]);
        let items = vec![
            ImageItem::new(vec![0.0, 255.0, 127.5, 0.0], 1),
            ImageItem::new(vec![255.0; 4], 0),
        ];

        let batch: ImageBatch<TestBackend> = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [2, 1, 2, 2]);
        assert_eq!(batch.batch_size(), 2);

        let images = batch.images.into_data().to_vec::<f32>().unwrap();
        let expected = [-1.0, 1.0, 0.0, -1.0, 1.0, 1.0, 1.0, 1.0];
        for (got, expected) in images.iter().zip(expected) {
            assert!((got - expected).abs() < 1e-6, "{got} != {expected}");
        }

        let targets = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![1, 0]);
    }

    #[test]
    fn custom_normalization() {
        let device = Default::default();
        let batcher = ImageBatcher::new([1, 2])
            .with_normalization(NormalizationConfig::new().with_mean(0.0).with_std(1.0));
        let batch: ImageBatch<TestBackend> =
            batcher.batch(vec![ImageItem::new(vec![0.0, 51.0], 0)], &device);
        let images = batch.images.into_data().to_vec::<f32>().unwrap();
        assert!((images[0] - 0.0).abs() < 1e-6);
        assert!((images[1] - 0.2).abs() < 1e-6);
    }
}

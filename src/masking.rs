//! Random occlusion of input pixels, used as a training-time regularizer.

use crate::error::{Result, TrainError};
use burn::prelude::*;
use burn::tensor::Distribution;

/// Checks that `ratio` is a valid occlusion fraction.
pub fn check_ratio(ratio: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(TrainError::InvalidMaskRatio(ratio))
    }
}

/// Draws a binary keep-mask where each pixel is occluded (0) with probability `ratio` and kept
/// (1) otherwise. The same decision applies to every channel of a pixel.
///
/// A ratio of 0 keeps everything and a ratio of 1 occludes everything.
///
/// # Shape
/// [batch, 1, height, width]
pub fn generate_mask<B: Backend>(
    batch: usize,
    [height, width]: [usize; 2],
    ratio: f64,
    device: &B::Device,
) -> Tensor<B, 4> {
    let shape = [batch, 1, height, width];
    if ratio <= 0.0 {
        return Tensor::ones(shape, device);
    }
    if ratio >= 1.0 {
        return Tensor::zeros(shape, device);
    }
    Tensor::<B, 4>::random(shape, Distribution::Uniform(0.0, 1.0), device)
        .greater_equal_elem(ratio)
        .float()
}

/// Multiplies `images` by `mask`, broadcasting the mask over the channels.
///
/// # Shapes
/// - images: `[batch, channels, height, width]`
/// - mask: `[batch, 1, height, width]`
/// - output: `[batch, channels, height, width]`
pub fn apply_mask<B: Backend>(images: Tensor<B, 4>, mask: Tensor<B, 4>) -> Tensor<B, 4> {
    let [batch, _channels, height, width] = images.dims();
    assert_eq!([batch, 1, height, width], mask.dims());
    images * mask
}

/// Occludes a random `ratio` of the pixels of `images`.
pub fn mask_images<B: Backend>(images: Tensor<B, 4>, ratio: f64) -> Tensor<B, 4> {
    let [batch, _channels, height, width] = images.dims();
    let mask = generate_mask(batch, [height, width], ratio, &images.device());
    apply_mask(images, mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn to_vec(t: Tensor<TestBackend, 4>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn ratio_zero_leaves_input_unchanged() {
        let device = Default::default();
        let images =
            Tensor::<TestBackend, 4>::random([3, 1, 6, 6], Distribution::Default, &device);
        let masked = mask_images(images.clone(), 0.0);
        assert_eq!(to_vec(images), to_vec(masked));
    }

    #[test]
    fn ratio_one_zeroes_input() {
        let device = Default::default();
        let images =
            Tensor::<TestBackend, 4>::random([3, 1, 6, 6], Distribution::Default, &device);
        let masked = mask_images(images, 1.0);
        assert!(to_vec(masked).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn mask_is_binary_and_close_to_ratio() {
        let device = Default::default();
        let mask = generate_mask::<TestBackend>(1, [100, 100], 0.3, &device);
        assert_eq!(mask.dims(), [1, 1, 100, 100]);
        let values = to_vec(mask);
        assert!(values.iter().all(|v| *v == 0.0 || *v == 1.0));
        let occluded = values.iter().filter(|v| **v == 0.0).count() as f64 / values.len() as f64;
        assert!((0.25..0.35).contains(&occluded), "occluded fraction {occluded}");
    }

    #[test]
    fn mask_broadcasts_over_channels() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 4>::ones([2, 3, 4, 4], &device);
        let mask = generate_mask::<TestBackend>(2, [4, 4], 1.0, &device);
        assert_eq!(apply_mask(images, mask).dims(), [2, 3, 4, 4]);
    }

    #[test]
    fn ratio_is_checked() {
        assert_eq!(check_ratio(0.2), Ok(0.2));
        assert_eq!(check_ratio(1.0), Ok(1.0));
        assert_eq!(check_ratio(1.5), Err(TrainError::InvalidMaskRatio(1.5)));
        assert!(check_ratio(f64::NAN).is_err());
        assert!(check_ratio(-0.1).is_err());
    }
}

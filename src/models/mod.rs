//! The compared classifiers.
//!
//! Every model maps single-channel images `[batch, 1, height, width]` to class scores
//! `[batch, num_classes]`.

mod baseline;
mod branching;
mod mage;

pub use baseline::{BaselineCnn, BaselineCnnConfig};
pub use branching::{BranchingCnn, BranchingCnnConfig};
pub use mage::{MageCnn, MageCnnConfig};

use crate::masking::apply_mask;
use burn::prelude::*;

/// A module classifying batches of single-channel images.
pub trait ImageClassifier<B: Backend>: Module<B> {
    /// # Shapes
    /// - images: `[batch, 1, height, width]`
    /// - output: `[batch, num_classes]`
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Applies a binary spatial `mask` (`[batch, 1, height, width]`) to the images before the
    /// forward pass.
    fn forward_masked(&self, images: Tensor<B, 4>, mask: Option<Tensor<B, 4>>) -> Tensor<B, 2> {
        match mask {
            Some(mask) => self.forward(apply_mask(images, mask)),
            None => self.forward(images),
        }
    }
}

/// Model configurations that can initialize their model.
pub trait ModelConfigExt<B: Backend>: Config {
    type Model: ImageClassifier<B>;
    fn init(&self, device: &B::Device) -> Self::Model;
}

/// Spatial size after `stages` 2x2 max-pools of stride 2.
pub fn pooled_size([height, width]: [usize; 2], stages: u32) -> [usize; 2] {
    let factor = 2usize.pow(stages);
    let pooled = [height / factor, width / factor];
    assert!(
        pooled[0] > 0 && pooled[1] > 0,
        "a {height}x{width} image is too small for {stages} pooling stages"
    );
    pooled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_size_floors() {
        assert_eq!(pooled_size([28, 28], 2), [7, 7]);
        assert_eq!(pooled_size([28, 28], 3), [3, 3]);
        assert_eq!(pooled_size([16, 32], 1), [8, 16]);
    }

    #[test]
    #[should_panic]
    fn pooled_size_rejects_vanishing_images() {
        pooled_size([4, 4], 3);
    }
}

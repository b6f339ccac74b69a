use super::{ImageClassifier, ModelConfigExt, pooled_size};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::*;

/// Two conv+pool stages followed by a single linear projection.
#[derive(Config, Debug)]
pub struct BaselineCnnConfig {
    #[config(default = 10)]
    pub num_classes: usize,
    /// `[height, width]` of the input images.
    #[config(default = "[28, 28]")]
    pub image_size: [usize; 2],
}

#[derive(Module, Debug)]
pub struct BaselineCnn<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub pool: MaxPool2d,
    pub activation: Relu,
    pub fc: Linear<B>,
}

impl BaselineCnnConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> BaselineCnn<B> {
        let [height, width] = pooled_size(self.image_size, 2);
        BaselineCnn {
            conv1: Conv2dConfig::new([1, 32], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            conv2: Conv2dConfig::new([32, 64], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
            fc: LinearConfig::new(64 * height * width, self.num_classes).init(device),
        }
    }
}

impl<B: Backend> ModelConfigExt<B> for BaselineCnnConfig {
    type Model = BaselineCnn<B>;

    fn init(&self, device: &B::Device) -> Self::Model {
        BaselineCnnConfig::init(self, device)
    }
}

impl<B: Backend> BaselineCnn<B> {
    /// # Shapes
    ///   - Input [batch, 1, height, width]
    ///   - Output [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, 1, _height, _width] = images.dims() else {
            panic!("expected single-channel images, got {:?}", images.dims())
        };

        let x = self.conv1.forward(images);
        let x = self.pool.forward(self.activation.forward(x));
        let x = self.conv2.forward(x);
        let x = self.pool.forward(self.activation.forward(x));

        let [_batch, channels, height, width] = x.dims();
        let x = x.reshape([batch, channels * height * width]);
        let x = self.fc.forward(x);
        debug_assert_eq!(batch, x.dims()[0]);
        x
    }
}

impl<B: Backend> ImageClassifier<B> for BaselineCnn<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        BaselineCnn::forward(self, images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn forward_shape() {
        let device = Default::default();
        let model = BaselineCnnConfig::new().init::<TestBackend>(&device);
        let images =
            Tensor::<TestBackend, 4>::random([3, 1, 28, 28], Distribution::Default, &device);
        assert_eq!(model.forward(images).dims(), [3, 10]);
    }

    #[test]
    fn parameter_count() {
        let device = Default::default();
        let model = BaselineCnnConfig::new().init::<TestBackend>(&device);
        // conv1: 32*1*3*3 + 32, conv2: 64*32*3*3 + 64, fc: 64*7*7*10 + 10
        let expected = (32 * 9 + 32) + (64 * 32 * 9 + 64) + (64 * 7 * 7 * 10 + 10);
        assert_eq!(expected, 50_186);
        assert_eq!(model.num_params(), expected);
    }

    #[test]
    fn other_sizes_and_classes() {
        let device = Default::default();
        let model = BaselineCnnConfig::new()
            .with_num_classes(2)
            .with_image_size([12, 8])
            .init::<TestBackend>(&device);
        let [fc_in, fc_out] = model.fc.weight.dims();
        assert_eq!([fc_in, fc_out], [64 * 3 * 2, 2]);
        let images = Tensor::<TestBackend, 4>::zeros([1, 1, 12, 8], &device);
        assert_eq!(model.forward(images).dims(), [1, 2]);
    }
}

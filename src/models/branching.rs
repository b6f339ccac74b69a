use super::{ImageClassifier, ModelConfigExt, pooled_size};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Initializer, Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::*;

/// Three parallel convolutions of different receptive fields, merged along the channels and
/// refined by two downsampling conv blocks.
#[derive(Config, Debug)]
pub struct BranchingCnnConfig {
    #[config(default = 10)]
    pub num_classes: usize,
    /// `[height, width]` of the input images.
    #[config(default = "[28, 28]")]
    pub image_size: [usize; 2],
    /// Channels produced by each branch.
    #[config(default = 32)]
    pub branch_channels: usize,
    /// Kernel sizes of the branches, each padded to keep the spatial size.
    #[config(default = "[3, 5, 7]")]
    pub branch_kernels: [usize; 3],
    #[config(default = 128)]
    pub merge_channels: usize,
    #[config(default = 256)]
    pub hidden_size: usize,
    /// Applied to the weights of every convolution and linear layer. Biases keep burn's
    /// default, uniform within `1 / sqrt(fan_in)`.
    #[config(default = "Initializer::XavierUniform { gain: 1.0 }")]
    pub initializer: Initializer,
}

#[derive(Module, Debug)]
pub struct BranchingCnn<B: Backend> {
    /// # Shape
    /// [3]
    pub branches: Vec<Conv2d<B>>,
    pub conv_merge: Conv2d<B>,
    pub conv_post_merge: Conv2d<B>,
    pub pool: MaxPool2d,
    pub activation: Relu,
    pub fc_hidden: Linear<B>,
    pub fc_out: Linear<B>,
}

impl BranchingCnnConfig {
    fn conv<B: Backend>(
        &self,
        channels: [usize; 2],
        kernel: usize,
        device: &B::Device,
    ) -> Conv2d<B> {
        let padding = kernel / 2;
        let mut conv = Conv2dConfig::new(channels, [kernel, kernel])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .init(device);
        let [channels_in, channels_out] = channels;
        let receptive = kernel * kernel;
        conv.weight = self.initializer.init_with(
            [channels_out, channels_in, kernel, kernel],
            Some(channels_in * receptive),
            Some(channels_out * receptive),
            device,
        );
        conv
    }

    fn linear<B: Backend>(&self, d_input: usize, d_output: usize, device: &B::Device) -> Linear<B> {
        let mut linear = LinearConfig::new(d_input, d_output).init(device);
        // row layout: [d_input, d_output]
        linear.weight =
            self.initializer
                .init_with([d_input, d_output], Some(d_input), Some(d_output), device);
        linear
    }

    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> BranchingCnn<B> {
        let [height, width] = pooled_size(self.image_size, 2);
        let merged_channels = self.branch_channels * self.branch_kernels.len();

        let branches = self
            .branch_kernels
            .iter()
            .map(|&kernel| {
                assert_eq!(kernel % 2, 1, "branch kernels must be odd");
                self.conv([1, self.branch_channels], kernel, device)
            })
            .collect();

        BranchingCnn {
            branches,
            conv_merge: self.conv([merged_channels, self.merge_channels], 3, device),
            conv_post_merge: self.conv([self.merge_channels, self.merge_channels], 3, device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
            fc_hidden: self.linear(self.merge_channels * height * width, self.hidden_size, device),
            fc_out: self.linear(self.hidden_size, self.num_classes, device),
        }
    }
}

impl<B: Backend> ModelConfigExt<B> for BranchingCnnConfig {
    type Model = BranchingCnn<B>;

    fn init(&self, device: &B::Device) -> Self::Model {
        BranchingCnnConfig::init(self, device)
    }
}

impl<B: Backend> BranchingCnn<B> {
    /// # Shapes
    ///   - Input [batch, 1, height, width]
    ///   - Output [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, 1, height, width] = images.dims() else {
            panic!("expected single-channel images, got {:?}", images.dims())
        };

        let branches = self
            .branches
            .iter()
            .map(|branch| self.activation.forward(branch.forward(images.clone())))
            .collect();
        let merged = Tensor::cat(branches, 1);
        let [_batch, merged_channels, merged_height, merged_width] = merged.dims();
        debug_assert_eq!([height, width], [merged_height, merged_width]);
        debug_assert_eq!(merged_channels, self.conv_merge.weight.dims()[1]);

        let x = self.conv_merge.forward(merged);
        let x = self.pool.forward(self.activation.forward(x));
        let x = self.conv_post_merge.forward(x);
        let x = self.pool.forward(self.activation.forward(x));

        let [_batch, channels, height, width] = x.dims();
        let x = x.reshape([batch, channels * height * width]);
        let x = self.activation.forward(self.fc_hidden.forward(x));
        self.fc_out.forward(x)
    }
}

impl<B: Backend> ImageClassifier<B> for BranchingCnn<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        BranchingCnn::forward(self, images)
    }
}

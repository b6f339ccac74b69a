use super::{ImageClassifier, ModelConfigExt, pooled_size};
use crate::attention::{SelfAttention2d, SelfAttention2dConfig};
use crate::masking::apply_mask;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::*;

/// Masked-attention CNN: three conv+pool stages, each refined by a [`SelfAttention2d`] block.
#[derive(Config, Debug)]
pub struct MageCnnConfig {
    #[config(default = 10)]
    pub num_classes: usize,
    /// `[height, width]` of the input images.
    #[config(default = "[28, 28]")]
    pub image_size: [usize; 2],
    /// Output channels of each stage.
    #[config(default = "[64, 128, 256]")]
    pub channels: [usize; 3],
    /// Channel reduction of the attention query/key projections.
    #[config(default = 8)]
    pub attention_reduction: usize,
    #[config(default = 0.3)]
    pub dropout: f64,
}

#[derive(Module, Debug)]
pub struct MageStage<B: Backend> {
    pub conv: Conv2d<B>,
    pub attention: SelfAttention2d<B>,
}

#[derive(Module, Debug)]
pub struct MageCnn<B: Backend> {
    /// # Shape
    /// [3]
    pub stages: Vec<MageStage<B>>,
    pub pool: MaxPool2d,
    pub activation: Relu,
    pub dropout: Dropout,
    pub fc: Linear<B>,
}

impl MageCnnConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MageCnn<B> {
        let [height, width] = pooled_size(self.image_size, self.channels.len() as u32);

        let mut in_channels = 1;
        let mut stages = Vec::with_capacity(self.channels.len());
        for &out_channels in &self.channels {
            let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device);
            let attention = SelfAttention2dConfig::new(out_channels)
                .with_reduction(self.attention_reduction)
                .init(device);
            stages.push(MageStage { conv, attention });
            in_channels = out_channels;
        }

        MageCnn {
            stages,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc: LinearConfig::new(in_channels * height * width, self.num_classes).init(device),
        }
    }
}

impl<B: Backend> ModelConfigExt<B> for MageCnnConfig {
    type Model = MageCnn<B>;

    fn init(&self, device: &B::Device) -> Self::Model {
        MageCnnConfig::init(self, device)
    }
}

impl<B: Backend> MageCnn<B> {
    /// `mask`: optional binary keep-mask applied to the images before the first convolution.
    ///
    /// # Shapes
    ///   - Input [batch, 1, height, width]
    ///   - Mask [batch, 1, height, width]
    ///   - Output [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>, mask: Option<Tensor<B, 4>>) -> Tensor<B, 2> {
        let [batch, 1, _height, _width] = images.dims() else {
            panic!("expected single-channel images, got {:?}", images.dims())
        };

        let mut x = match mask {
            Some(mask) => apply_mask(images, mask),
            None => images,
        };
        for stage in &self.stages {
            x = stage.conv.forward(x);
            x = self.pool.forward(self.activation.forward(x));
            x = stage.attention.forward(x);
        }

        let [_batch, channels, height, width] = x.dims();
        let x = x.reshape([batch, channels * height * width]);
        let x = self.dropout.forward(x);
        self.fc.forward(x)
    }
}

impl<B: Backend> ImageClassifier<B> for MageCnn<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        MageCnn::forward(self, images, None)
    }

    fn forward_masked(&self, images: Tensor<B, 4>, mask: Option<Tensor<B, 4>>) -> Tensor<B, 2> {
        MageCnn::forward(self, images, mask)
    }
}

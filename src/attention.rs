//! Gated self-attention over the spatial positions of a feature map.

use burn::module::{Content, DisplaySettings, ModuleDisplay, Param};
use burn::nn::Initializer;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;

/// Configuration to create a [SelfAttention2d](SelfAttention2d) block.
#[derive(Config, Debug)]
pub struct SelfAttention2dConfig {
    /// Number of channels of the input feature map.
    pub channels: usize,
    /// The query and key projections have `channels / reduction` channels (at least one).
    #[config(default = 8)]
    pub reduction: usize,
}

impl SelfAttention2dConfig {
    pub fn qk_channels(&self) -> usize {
        (self.channels / self.reduction).max(1)
    }

    /// Returns the initialized block.
    ///
    /// The gate starts at zero, so the block is initially the identity.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SelfAttention2d<B> {
        let qk_channels = self.qk_channels();
        SelfAttention2d {
            query: Conv2dConfig::new([self.channels, qk_channels], [1, 1]).init(device),
            key: Conv2dConfig::new([self.channels, qk_channels], [1, 1]).init(device),
            value: Conv2dConfig::new([self.channels, self.channels], [1, 1]).init(device),
            gamma: Initializer::Zeros.init([1], device),
        }
    }
}

/// Residual, gated self-attention across all `height * width` positions.
///
/// Where:
/// - `q`, `k`, `v` are 1x1 convolution projections of the input `x`
/// - `A = softmax(qᵀ k / sqrt(d))`, normalized over each row, with `d` the query/key channels
/// - `y = gamma * (v Aᵀ) + x`
///
/// The cost is quadratic in the number of positions.
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct SelfAttention2d<B: Backend> {
    pub query: Conv2d<B>,
    pub key: Conv2d<B>,
    pub value: Conv2d<B>,
    /// Learnable scalar blending the attention output into the input.
    ///
    /// # Shape
    /// [1]
    pub gamma: Param<Tensor<B, 1>>,
}

impl<B: Backend> SelfAttention2d<B> {
    /// Row-normalized attention weights, where row `i` weights every position for position `i`.
    ///
    /// # Shapes
    /// - input: `[batch, channels, height, width]`
    /// - output: `[batch, height * width, height * width]`
    pub fn attention_weights(&self, x: Tensor<B, 4>) -> Tensor<B, 3> {
        let [batch, _channels, height, width] = x.dims();
        let positions = height * width;
        let [qk_channels, _, _, _] = self.query.weight.dims();

        let query = self
            .query
            .forward(x.clone())
            .reshape([batch, qk_channels, positions])
            .swap_dims(1, 2);
        debug_assert_eq!([batch, positions, qk_channels], query.dims());
        let key = self.key.forward(x).reshape([batch, qk_channels, positions]);

        let scores = query.matmul(key) / (qk_channels as f64).sqrt();
        debug_assert_eq!([batch, positions, positions], scores.dims());
        softmax(scores, 2)
    }

    /// # Shapes
    /// - input: `[batch, channels, height, width]`
    /// - output: `[batch, channels, height, width]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();
        let positions = height * width;

        let attention = self.attention_weights(x.clone());
        let value = self
            .value
            .forward(x.clone())
            .reshape([batch, channels, positions]);

        // out[:, i] = Σ_j A[i, j] v[:, j]
        let out = value.matmul(attention.swap_dims(1, 2));
        debug_assert_eq!([batch, channels, positions], out.dims());
        let out = out.reshape([batch, channels, height, width]);

        let gamma = self.gamma.val().reshape([1, 1, 1, 1]);
        out * gamma + x
    }
}

impl<B: Backend> ModuleDisplay for SelfAttention2d<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        let [qk_channels, channels, _, _] = self.query.weight.dims();
        content
            .add("channels", &channels)
            .add("qk_channels", &qk_channels)
            .optional()
    }
}

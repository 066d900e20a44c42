//! # Sequence Attention
//!
//! Multi-head scaled dot-product attention over flattened spatial tokens, with
//! queries, keys and values built by depthwise convolutions instead of linear
//! projections.
//!
//! Each projection is `depthwise conv(3×3) → ReLU → LayerNorm over channels`.
//! Keys and values can use a different stride than queries, which shrinks the
//! key/value token set relative to the queries.
//!
//! The attention output is folded back with the query projection's own height
//! and width, so non-square maps are handled exactly.

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        conv::{Conv2d, Conv2dConfig},
        Dropout, DropoutConfig, LayerNorm, LayerNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Depthwise convolution → ReLU → channel LayerNorm.
#[derive(Module, Debug)]
struct ConvProjection<B: Backend> {
    conv: Conv2d<B>,
    relu: Relu,
    norm: LayerNorm<B>,
}

impl<B: Backend> ConvProjection<B> {
    fn new(
        channels: usize,
        kernel_size: usize,
        stride: usize,
        bias: bool,
        device: &Device<B>,
    ) -> Self {
        let padding = kernel_size / 2;
        Self {
            conv: Conv2dConfig::new([channels, channels], [kernel_size, kernel_size])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_groups(channels)
                .with_bias(bias)
                .init(device),
            relu: Relu::new(),
            norm: LayerNormConfig::new(channels)
                .with_epsilon(1e-5)
                .init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv.forward(x));
        let x = self.norm.forward(x.permute([0, 2, 3, 1]));
        x.permute([0, 3, 1, 2])
    }
}

/// Configuration for the `SequenceAttention` module.
#[derive(Config, Debug)]
pub struct SequenceAttentionConfig {
    /// Number of channels (embedding width of the attention).
    channels: usize,
    /// Number of attention heads. Must divide `channels`.
    num_heads: usize,
    /// Dropout applied to the folded attention output.
    #[config(default = "0.0")]
    proj_drop: f64,
    #[config(default = "3")]
    kernel_size: usize,
    /// Stride of the query projection.
    #[config(default = "1")]
    stride_q: usize,
    /// Stride of the key and value projections.
    #[config(default = "1")]
    stride_kv: usize,
    /// Bias of the projections and of the attention linears.
    #[config(default = "true")]
    attention_bias: bool,
}

impl SequenceAttentionConfig {
    /// Initializes a new `SequenceAttention` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SequenceAttention<B> {
        let projection = |stride| {
            ConvProjection::new(
                self.channels,
                self.kernel_size,
                stride,
                self.attention_bias,
                device,
            )
        };

        SequenceAttention {
            proj_q: projection(self.stride_q),
            proj_k: projection(self.stride_kv),
            proj_v: projection(self.stride_kv),
            attention: MultiHeadAttentionConfig::new(self.channels, self.num_heads)
                .with_dropout(0.0)
                .init(device),
            proj_drop: DropoutConfig::new(self.proj_drop).init(),
        }
    }
}

/// Convolutional-projection multi-head attention between two feature maps.
///
/// # Shapes
///   - x1 (query source): `[batch_size, channels, height, width]`
///   - x2 (key/value source): `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, height / stride_q, width / stride_q]` (rounded up)
#[derive(Module, Debug)]
pub struct SequenceAttention<B: Backend> {
    proj_q: ConvProjection<B>,
    proj_k: ConvProjection<B>,
    proj_v: ConvProjection<B>,
    attention: MultiHeadAttention<B>,
    proj_drop: Dropout,
}

impl<B: Backend> SequenceAttention<B> {
    /// Cross attention: queries from `x1`, keys and values from `x2`.
    pub fn forward(&self, x1: Tensor<B, 4>, x2: Tensor<B, 4>) -> Tensor<B, 4> {
        let q = self.proj_q.forward(x1);
        let k = self.proj_k.forward(x2.clone());
        let v = self.proj_v.forward(x2);

        let [b, c, h, w] = q.dims();
        let context = self
            .attention
            .forward(MhaInput::new(to_tokens(q), to_tokens(k), to_tokens(v)))
            .context;

        let x = context.swap_dims(1, 2).reshape([b, c, h, w]);
        self.proj_drop.forward(x)
    }

    /// Self attention over a single map.
    pub fn forward_self(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward(x.clone(), x)
    }
}

/// `[B, C, H, W]` → `[B, H*W, C]`.
fn to_tokens<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 3> {
    x.flatten::<3>(2, 3).swap_dims(1, 2)
}

//! # Pre-Norm Attention Blocks
//!
//! Residual transformer blocks operating directly on `[B, C, H, W]` maps:
//!
//! ```text
//! x = x + DropPath(Attention(BN(x)))
//! x = x + DropPath(Mlp(BN(x)))
//! ```
//!
//! The attention is either restricted to non-overlapping `p × p` windows (the
//! per-path blocks of the multi-path encoder) or global over the whole map (the
//! grid block that mixes the concatenated paths).

use burn::{
    nn::{BatchNorm, BatchNormConfig},
    prelude::*,
};
use burn_extra_ops::{DropPath, DropPathConfig};

use super::{
    mlp::{Mlp, MlpConfig},
    sequence_attention::{SequenceAttention, SequenceAttentionConfig},
};

/// Splits a feature map into non-overlapping `window_size × window_size` windows.
///
/// Height and width must be divisible by `window_size`.
///
/// # Shapes
///   - x: `[batch_size, channels, height, width]`
///   - output: `[batch_size * num_windows, channels, window_size, window_size]`
pub fn window_partition<B: Backend>(x: Tensor<B, 4>, window_size: usize) -> Tensor<B, 4> {
    let [b, c, h, w] = x.dims();
    let (nh, nw) = (h / window_size, w / window_size);

    x.reshape([b, c, nh, window_size, nw, window_size])
        .permute([0, 2, 4, 1, 3, 5])
        .reshape([b * nh * nw, c, window_size, window_size])
}

/// Inverse of [`window_partition`].
///
/// # Shapes
///   - windows: `[batch_size * num_windows, channels, window_size, window_size]`
///   - output: `[batch_size, channels, h, w]`
pub fn window_reverse<B: Backend>(
    windows: Tensor<B, 4>,
    window_size: usize,
    h: usize,
    w: usize,
) -> Tensor<B, 4> {
    let [total_windows, c, _, _] = windows.dims();
    let (nh, nw) = (h / window_size, w / window_size);
    let b = total_windows / (nh * nw);

    windows
        .reshape([b, nh, nw, c, window_size, window_size])
        .permute([0, 3, 1, 4, 2, 5])
        .reshape([b, c, h, w])
}

/// Configuration for the `AttentionBlock` module.
#[derive(Config, Debug)]
pub struct AttentionBlockConfig {
    /// Channel width of the block.
    channels: usize,
    /// Heads of the sequence attention.
    num_heads: usize,
    /// Width of the MLP hidden layer.
    mlp_hidden: usize,
    /// Attention window; `None` attends over the whole map.
    #[config(default = "None")]
    window_size: Option<usize>,
    /// Stochastic depth probability of both residual branches.
    #[config(default = "0.0")]
    drop_path: f64,
}

impl AttentionBlockConfig {
    /// Initializes a new `AttentionBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> AttentionBlock<B> {
        AttentionBlock {
            norm1: BatchNormConfig::new(self.channels).init(device),
            attn: SequenceAttentionConfig::new(self.channels, self.num_heads).init(device),
            norm2: BatchNormConfig::new(self.channels).init(device),
            mlp: MlpConfig::new(self.channels)
                .with_hidden_channels(Some(self.mlp_hidden))
                .init(device),
            drop_path: DropPathConfig::new()
                .with_drop_prob(self.drop_path)
                .init(device),
            window_size: self.window_size,
        }
    }
}

/// Pre-normalized attention + MLP residual block.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, height, width]`
#[derive(Module, Debug)]
pub struct AttentionBlock<B: Backend> {
    norm1: BatchNorm<B, 2>,
    attn: SequenceAttention<B>,
    norm2: BatchNorm<B, 2>,
    mlp: Mlp<B>,
    drop_path: DropPath<B>,
    window_size: Option<usize>,
}

impl<B: Backend> AttentionBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let attended = self.attention(self.norm1.forward(x.clone()));
        let x = x + self.drop_path.forward(attended);

        let mixed = self.mlp.forward(self.norm2.forward(x.clone()));
        x + self.drop_path.forward(mixed)
    }

    fn attention(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self.window_size {
            Some(window_size) => {
                let [_, _, h, w] = x.dims();
                let windows = window_partition(x, window_size);
                let windows = self.attn.forward_self(windows);
                window_reverse(windows, window_size, h, w)
            }
            None => self.attn.forward_self(x),
        }
    }
}

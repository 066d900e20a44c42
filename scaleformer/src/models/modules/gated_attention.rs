//! # Gated Attention Block
//!
//! Fuses a decoder state `g` with an encoder skip `x` through a single-channel
//! sigmoid gate: `q + v * sigmoid(bn(conv(relu(q + k))))`, where `q` is projected
//! from the skip and `k`, `v` from the decoder state.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Relu, Sigmoid,
    },
    prelude::*,
};

/// 1×1 convolution (with bias) followed by batch normalization.
#[derive(Module, Debug)]
struct PointwiseProjection<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> PointwiseProjection<B> {
    fn new(in_channels: usize, out_channels: usize, device: &Device<B>) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Configuration for the `GatedAttention` module.
#[derive(Config, Debug)]
pub struct GatedAttentionConfig {
    /// Channels of the decoder state (gate input).
    f_g: usize,
    /// Channels of the encoder skip (query input).
    f_l: usize,
    /// Common intermediate width.
    f_int: usize,
}

impl GatedAttentionConfig {
    /// Initializes a new `GatedAttention` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> GatedAttention<B> {
        GatedAttention {
            w_q: PointwiseProjection::new(self.f_l, self.f_int, device),
            w_k: PointwiseProjection::new(self.f_g, self.f_int, device),
            w_v: PointwiseProjection::new(self.f_g, self.f_int, device),
            psi: PointwiseProjection::new(self.f_int, 1, device),
            relu: Relu::new(),
            sigmoid: Sigmoid::new(),
        }
    }
}

/// Additive, sigmoid-gated fusion of a decoder state with an encoder skip.
///
/// # Shapes
///   - g: `[batch_size, f_g, height, width]`
///   - x: `[batch_size, f_l, height, width]`
///   - output: `[batch_size, f_int, height, width]`
#[derive(Module, Debug)]
pub struct GatedAttention<B: Backend> {
    w_q: PointwiseProjection<B>,
    w_k: PointwiseProjection<B>,
    w_v: PointwiseProjection<B>,
    psi: PointwiseProjection<B>,
    relu: Relu,
    sigmoid: Sigmoid,
}

impl<B: Backend> GatedAttention<B> {
    pub fn forward(&self, g: Tensor<B, 4>, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let (q, v, gate) = self.forward_parts(g, x);
        q + v * gate
    }

    /// Returns `(q, v, gate)`; the gate has a single channel.
    fn forward_parts(
        &self,
        g: Tensor<B, 4>,
        x: Tensor<B, 4>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        let q = self.w_q.forward(x);
        let k = self.w_k.forward(g.clone());
        let v = self.w_v.forward(g);

        let gate = self.relu.forward(q.clone() + k);
        let gate = self.sigmoid.forward(self.psi.forward(gate));
        (q, v, gate)
    }
}

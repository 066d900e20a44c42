//! # Multi-Scale Depthwise Fusion
//!
//! Three parallel depthwise convolutions (kernels 3, 5 and 7) with ReLU, fused
//! back to the input width by a pointwise `ConvBn` and added to the input.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d, Relu,
    },
    prelude::*,
};

use super::conv_bn::{ConvBn, ConvBnConfig};

/// Kernel sizes of the parallel depthwise branches.
pub const BRANCH_KERNELS: [usize; 3] = [3, 5, 7];

/// Configuration for the `MultiScaleFusion` module.
#[derive(Config, Debug)]
pub struct MultiScaleFusionConfig {
    /// Width of the fused feature map.
    channels: usize,
}

impl MultiScaleFusionConfig {
    /// Initializes a new `MultiScaleFusion` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MultiScaleFusion<B> {
        let channels = self.channels;
        let branches = BRANCH_KERNELS
            .iter()
            .map(|&k| {
                Conv2dConfig::new([channels, channels], [k, k])
                    .with_padding(PaddingConfig2d::Explicit(k / 2, k / 2))
                    .with_groups(channels)
                    .init(device)
            })
            .collect();

        MultiScaleFusion {
            branches,
            relu: Relu::new(),
            fuse: ConvBnConfig::new(BRANCH_KERNELS.len() * channels, channels).init(device),
        }
    }
}

/// `x + ConvBn(cat[relu(dw3(x)), relu(dw5(x)), relu(dw7(x))])`.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, height, width]`
#[derive(Module, Debug)]
pub struct MultiScaleFusion<B: Backend> {
    branches: Vec<Conv2d<B>>,
    relu: Relu,
    fuse: ConvBn<B>,
}

impl<B: Backend> MultiScaleFusion<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        x.clone() + self.context(x)
    }

    /// The projected multi-scale signal, without the residual.
    fn context(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let outputs = self
            .branches
            .iter()
            .map(|conv| self.relu.forward(conv.forward(x.clone())))
            .collect();
        self.fuse.forward(Tensor::cat(outputs, 1))
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{activation::relu, Distribution};
    use rstest::rstest;

    use super::*;
    use crate::tests::TestBackend;

    #[rstest]
    #[case([2, 16, 8, 8])]
    #[case([1, 24, 7, 7])]
    #[case([1, 8, 14, 6])]
    fn fusion_keeps_shape(#[case] shape: [usize; 4]) {
        let device = Default::default();
        let fusion = MultiScaleFusionConfig::new(shape[1]).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::random(shape, Distribution::Normal(0.0, 1.0), &device);

        assert_eq!(fusion.forward(x).dims(), shape);
    }

    #[test]
    fn fusion_is_residual_over_projected_branches() {
        let device = Default::default();
        let fusion = MultiScaleFusionConfig::new(12).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::random(
            [2, 12, 9, 9],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        // Branches in kernel order, each with its own ReLU, then the projection
        let [dw3, dw5, dw7] = [0, 1, 2].map(|idx| relu(fusion.branches[idx].forward(x.clone())));
        let projected = fusion.fuse.forward(Tensor::cat(vec![dw3, dw5, dw7], 1));
        let expected = x.clone() + projected;

        let diff = (fusion.forward(x) - expected).abs().max().into_scalar();
        assert!(diff < 1e-5, "residual mismatch: {diff}");
    }

    #[test]
    fn branches_are_depthwise() {
        let device = Default::default();
        let fusion = MultiScaleFusionConfig::new(6).init::<TestBackend>(&device);

        let shapes: Vec<[usize; 4]> = fusion
            .branches
            .iter()
            .map(|conv| conv.weight.val().dims())
            .collect();
        assert_eq!(shapes, vec![[6, 1, 3, 3], [6, 1, 5, 5], [6, 1, 7, 7]]);
    }
}

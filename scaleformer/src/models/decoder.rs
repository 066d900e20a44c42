//! # Decoder for ScaleFormer
//!
//! The decoder consumes the four encoder feature maps and the two shallow
//! full/half resolution maps and produces the segmentation logits together with
//! three deep-supervision maps.
//!
//! ## Key Components
//!
//! - `DecoderBlock`: normalize → (upsample) → conv → gated fusion with the skip →
//!   MLP → multi-scale depthwise fusion. Without upsampling it is the bottleneck.
//! - `Recalibration`: channel gate, spatial gate and a conv pair after every block.
//! - `AuxHead`: 1×1 classifier upsampled to the input resolution.
//! - `PlainDecoder`: upsample-conv, concatenation with a shallow map, conv pair.
//! - `SegmentationDecoder`: wires all of the above together.

use burn::{
    module::Ignored,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use super::modules::{
    ChannelAttention, ChannelAttentionConfig, ConvBnRelu, ConvBnReluConfig, GatedAttention,
    GatedAttentionConfig, Mlp, MlpConfig, MultiScaleFusion, MultiScaleFusionConfig,
    SpatialAttention, SpatialAttentionConfig,
};
use crate::{
    config::{ModelConfig, UpsampleMode, NUM_STAGES},
    error::ScaleFormerResult,
};

/// Doubles the spatial resolution.
fn upsample2x<B: Backend>(x: Tensor<B, 4>, mode: &UpsampleMode) -> Tensor<B, 4> {
    let [_, _, h, w] = x.dims();
    interpolate(
        x,
        [h * 2, w * 2],
        InterpolateOptions::new(mode.interpolate_mode()),
    )
}

/// Configuration for the `DecoderBlock` module.
#[derive(Config, Debug)]
pub struct DecoderBlockConfig {
    in_channels: usize,
    out_channels: usize,
    #[config(default = "4")]
    mlp_ratio: usize,
    /// Upsampling applied after the normalization; `None` builds the bottleneck.
    #[config(default = "None")]
    upsample: Option<UpsampleMode>,
}

impl DecoderBlockConfig {
    /// Initializes a new `DecoderBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DecoderBlock<B> {
        let channels = self.in_channels;

        DecoderBlock {
            norm: BatchNormConfig::new(channels).init(device),
            conv: Conv2dConfig::new([channels, channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            relu: Relu::new(),
            attn: GatedAttentionConfig::new(channels, channels, channels).init(device),
            mlp: MlpConfig::new(channels)
                .with_hidden_channels(Some(channels * self.mlp_ratio))
                .with_out_channels(Some(self.out_channels))
                .init(device),
            fusion: MultiScaleFusionConfig::new(self.out_channels).init(device),
            upsample: Ignored(self.upsample.clone()),
        }
    }
}

/// Attention-gated decoder block.
///
/// # Shapes
///   - x: `[batch_size, in_channels, height, width]`
///   - skip: `[batch_size, in_channels, s * height, s * width]`
///   - output: `[batch_size, out_channels, s * height, s * width]`,
///     `s = 2` when upsampling, `1` for the bottleneck
#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    norm: BatchNorm<B, 2>,
    conv: Conv2d<B>,
    relu: Relu,
    attn: GatedAttention<B>,
    mlp: Mlp<B>,
    fusion: MultiScaleFusion<B>,
    upsample: Ignored<Option<UpsampleMode>>,
}

impl<B: Backend> DecoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm.forward(x);
        let x = match &self.upsample.0 {
            Some(mode) => upsample2x(x, mode),
            None => x,
        };
        let x = self.relu.forward(self.conv.forward(x));

        let x = self.attn.forward(x, skip);
        let x = self.mlp.forward(x);
        self.fusion.forward(x)
    }
}

/// Configuration for the `ConvPair` module.
#[derive(Config, Debug)]
pub struct ConvPairConfig {
    in_channels: usize,
    out_channels: usize,
}

impl ConvPairConfig {
    /// Initializes a new `ConvPair` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvPair<B> {
        ConvPair {
            first: ConvBnReluConfig::new(self.in_channels, self.out_channels).init(device),
            second: ConvBnReluConfig::new(self.out_channels, self.out_channels).init(device),
        }
    }
}

/// Two 3×3 conv → BN → ReLU units.
#[derive(Module, Debug)]
pub struct ConvPair<B: Backend> {
    first: ConvBnRelu<B>,
    second: ConvBnRelu<B>,
}

impl<B: Backend> ConvPair<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.second.forward(self.first.forward(x))
    }
}

/// Configuration for the `Recalibration` module.
#[derive(Config, Debug)]
pub struct RecalibrationConfig {
    channels: usize,
    #[config(default = "4")]
    reduction: usize,
}

impl RecalibrationConfig {
    /// Initializes a new `Recalibration` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Recalibration<B> {
        Recalibration {
            channel: ChannelAttentionConfig::new(self.channels)
                .with_reduction(self.reduction)
                .init(device),
            convs: ConvPairConfig::new(self.channels, self.channels).init(device),
        }
    }
}

/// `x ← CA(x)·x; x ← SA(x)·x; x ← convs(x)`.
///
/// The spatial gate is passed in so that several recalibration points can share it.
#[derive(Module, Debug)]
pub struct Recalibration<B: Backend> {
    channel: ChannelAttention<B>,
    convs: ConvPair<B>,
}

impl<B: Backend> Recalibration<B> {
    pub fn forward(&self, x: Tensor<B, 4>, spatial: &SpatialAttention<B>) -> Tensor<B, 4> {
        let x = self.channel.forward(x.clone()) * x;
        let x = spatial.forward(x.clone()) * x;
        self.convs.forward(x)
    }
}

/// Configuration for the `AuxHead` module.
#[derive(Config, Debug)]
pub struct AuxHeadConfig {
    in_channels: usize,
    num_classes: usize,
}

impl AuxHeadConfig {
    /// Initializes a new `AuxHead` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> AuxHead<B> {
        AuxHead {
            conv: Conv2dConfig::new([self.in_channels, self.num_classes], [1, 1]).init(device),
            relu: Relu::new(),
        }
    }
}

/// Deep-supervision head: 1×1 conv → ReLU → nearest upsampling to `size`.
#[derive(Module, Debug)]
pub struct AuxHead<B: Backend> {
    conv: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> AuxHead<B> {
    pub fn forward(&self, x: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv.forward(x));
        interpolate(x, size, InterpolateOptions::new(InterpolateMode::Nearest))
    }
}

/// Configuration for the `PlainDecoder` module.
#[derive(Config, Debug)]
pub struct PlainDecoderConfig {
    /// Width of the decoder state.
    in_channels: usize,
    /// Width after concatenating the skip with the upsampled state.
    middle_channels: usize,
    out_channels: usize,
    #[config(default = "UpsampleMode::Bilinear")]
    upsample: UpsampleMode,
}

impl PlainDecoderConfig {
    /// Initializes a new `PlainDecoder` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> PlainDecoder<B> {
        let conv3x3 = |in_channels, out_channels| {
            Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };

        PlainDecoder {
            up: ConvBnReluConfig::new(self.in_channels, self.out_channels).init(device),
            conv1: conv3x3(self.middle_channels, self.out_channels),
            bn1: BatchNormConfig::new(self.out_channels).init(device),
            conv2: conv3x3(self.out_channels, self.out_channels),
            relu: Relu::new(),
            upsample: Ignored(self.upsample.clone()),
        }
    }
}

/// Upsample-conv, concatenation `[skip, up]`, then two convolutions.
///
/// # Shapes
///   - x: `[batch_size, in_channels, height, width]`
///   - skip: `[batch_size, middle_channels - out_channels, 2 * height, 2 * width]`
///   - output: `[batch_size, out_channels, 2 * height, 2 * width]`
#[derive(Module, Debug)]
pub struct PlainDecoder<B: Backend> {
    up: ConvBnRelu<B>,
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    relu: Relu,
    upsample: Ignored<UpsampleMode>,
}

impl<B: Backend> PlainDecoder<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.up.forward(upsample2x(x, &self.upsample.0));
        let x = Tensor::cat(vec![skip, x], 1);

        let x = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        self.relu.forward(self.conv2.forward(x))
    }
}

/// Configuration for the `ShallowBranch` module.
#[derive(Config, Debug)]
pub struct ShallowBranchConfig {
    in_channels: usize,
    /// `[full, half]` resolution widths.
    channels: [usize; 2],
}

impl ShallowBranchConfig {
    /// Initializes a new `ShallowBranch` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ShallowBranch<B> {
        let [full, half] = self.channels;
        ShallowBranch {
            down1: Conv2dConfig::new([self.in_channels, full], [1, 1]).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            down2: ConvPairConfig::new(full, half).init(device),
        }
    }
}

/// Shallow image features for the last two decoder stages.
#[derive(Module, Debug)]
pub struct ShallowBranch<B: Backend> {
    down1: Conv2d<B>,
    pool: MaxPool2d,
    down2: ConvPair<B>,
}

impl<B: Backend> ShallowBranch<B> {
    /// Returns the full and half resolution maps.
    pub fn forward(&self, x: Tensor<B, 4>) -> [Tensor<B, 4>; 2] {
        let ds1 = self.down1.forward(x);
        let ds2 = self.down2.forward(self.pool.forward(ds1.clone()));
        [ds1, ds2]
    }
}

/// Primary logits and the three deep-supervision maps, all at input resolution.
#[derive(Debug, Clone)]
pub struct SegmentationOutput<B: Backend> {
    /// `[batch_size, num_classes, height, width]`
    pub logits: Tensor<B, 4>,
    /// Auxiliary maps from the bottleneck and the first two decoder blocks.
    pub aux: [Tensor<B, 4>; 3],
}

impl<B: Backend> SegmentationOutput<B> {
    /// All four maps, primary first.
    pub fn into_array(self) -> [Tensor<B, 4>; 4] {
        let [aux1, aux2, aux3] = self.aux;
        [self.logits, aux1, aux2, aux3]
    }
}

/// Configuration for the `SegmentationDecoder` module.
#[derive(Config, Debug)]
pub struct SegmentationDecoderConfig {
    /// The main model configuration.
    config: ModelConfig,
}

impl SegmentationDecoderConfig {
    /// Initializes a new `SegmentationDecoder` module.
    ///
    /// # Errors
    ///
    /// Returns `Err(ScaleFormerError::UnsupportedKernelSize)` if the spatial gate kernel
    /// is not 3 or 7.
    pub fn init<B: Backend>(
        &self,
        device: &Device<B>,
    ) -> ScaleFormerResult<SegmentationDecoder<B>> {
        let decoder = &self.config.decoder;
        let e = &self.config.encoder.embed_dims;
        let [narrow, wide] = self.config.shallow_channels();
        let num_classes = self.config.num_classes;

        let block = |in_channels, out_channels, upsample: Option<UpsampleMode>| {
            DecoderBlockConfig::new(in_channels, out_channels)
                .with_mlp_ratio(decoder.mlp_ratio)
                .with_upsample(upsample)
                .init(device)
        };
        let upsample = Some(decoder.block_upsample.clone());

        let recalibrations = [e[3], e[2], e[1], e[0]]
            .into_iter()
            .map(|channels| {
                RecalibrationConfig::new(channels)
                    .with_reduction(decoder.channel_reduction)
                    .init(device)
            })
            .collect();

        let num_spatial = if decoder.share_spatial_attention {
            1
        } else {
            NUM_STAGES
        };
        let spatial = (0..num_spatial)
            .map(|_| {
                SpatialAttentionConfig::new()
                    .with_kernel_size(decoder.spatial_kernel_size)
                    .init(device)
            })
            .collect::<ScaleFormerResult<Vec<_>>>()?;

        let aux_heads = [e[3], e[2], e[1]]
            .into_iter()
            .map(|channels| AuxHeadConfig::new(channels, num_classes).init(device))
            .collect();

        let plain = |in_channels, middle_channels, out_channels| {
            PlainDecoderConfig::new(in_channels, middle_channels, out_channels)
                .with_upsample(decoder.plain_upsample.clone())
                .init(device)
        };

        Ok(SegmentationDecoder {
            bottleneck: block(e[3], e[3], None),
            blocks: vec![
                block(e[3], e[2], upsample.clone()),
                block(e[2], e[1], upsample.clone()),
                block(e[1], e[0], upsample),
            ],
            recalibrations,
            spatial,
            aux_heads,
            up_half: plain(wide, 2 * wide, wide),
            up_full: plain(wide, wide, narrow),
            classifier: Conv2dConfig::new([narrow, num_classes], [1, 1]).init(device),
        })
    }
}

/// Bottleneck, three gated decoder blocks with recalibration, two plain
/// upsampling stages and the classifier.
#[derive(Module, Debug)]
pub struct SegmentationDecoder<B: Backend> {
    bottleneck: DecoderBlock<B>,
    blocks: Vec<DecoderBlock<B>>,
    recalibrations: Vec<Recalibration<B>>,
    spatial: Vec<SpatialAttention<B>>,
    aux_heads: Vec<AuxHead<B>>,
    up_half: PlainDecoder<B>,
    up_full: PlainDecoder<B>,
    classifier: Conv2d<B>,
}

impl<B: Backend> SegmentationDecoder<B> {
    /// Decodes the encoder pyramid.
    ///
    /// `features` go from the finest (1/4) to the coarsest (1/32) map; `shallow`
    /// holds the full and half resolution maps of the shallow branch.
    pub fn forward(
        &self,
        features: [Tensor<B, 4>; NUM_STAGES],
        shallow: [Tensor<B, 4>; 2],
    ) -> SegmentationOutput<B> {
        let [x1, x2, x3, x4] = features;
        let [ds1, ds2] = shallow;
        let [_, _, h, w] = ds1.dims();
        let size = [h, w];

        let x = self.bottleneck.forward(x4.clone(), x4);
        let x = self.recalibrate(0, x);
        let aux1 = self.aux_heads[0].forward(x.clone(), size);

        let x = self.decode(0, x, x3);
        let aux2 = self.aux_heads[1].forward(x.clone(), size);

        let x = self.decode(1, x, x2);
        let aux3 = self.aux_heads[2].forward(x.clone(), size);

        let x = self.decode(2, x, x1);

        let x = self.up_half.forward(x, ds2);
        let x = self.up_full.forward(x, ds1);

        SegmentationOutput {
            logits: self.classifier.forward(x),
            aux: [aux1, aux2, aux3],
        }
    }

    fn decode(&self, idx: usize, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.blocks[idx].forward(x, skip);
        tracing::trace!("decoder block {idx}: {:?}", x.dims());
        self.recalibrate(idx + 1, x)
    }

    fn recalibrate(&self, idx: usize, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let spatial = &self.spatial[idx.min(self.spatial.len() - 1)];
        self.recalibrations[idx].forward(x, spatial)
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;
    use rstest::rstest;

    use super::*;
    use crate::{
        config::{DecoderConfig, EncoderConfig},
        tests::TestBackend,
    };

    fn random(shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::random(shape, Distribution::Normal(0.0, 1.0), &Default::default())
    }

    fn small_config() -> ModelConfig {
        ModelConfig::new().with_num_classes(3).with_encoder(
            EncoderConfig::new()
                .with_num_path(vec![2, 2, 2, 2])
                .with_num_layers(vec![1, 1, 1, 1])
                .with_embed_dims(vec![16, 24, 32, 48])
                .with_num_heads(vec![2, 2, 2, 2])
                .with_window_sizes(vec![vec![1, 2]; 4]),
        )
    }

    #[rstest]
    #[case(None, [2, 24, 4, 4])]
    #[case(Some(UpsampleMode::Nearest), [2, 24, 8, 8])]
    #[case(Some(UpsampleMode::Bilinear), [2, 24, 8, 8])]
    fn decoder_block_output_shape(
        #[case] upsample: Option<UpsampleMode>,
        #[case] expected: [usize; 4],
    ) {
        let device = Default::default();
        let block = DecoderBlockConfig::new(32, 24)
            .with_upsample(upsample.clone())
            .init::<TestBackend>(&device);

        let scale = if upsample.is_some() { 2 } else { 1 };
        let x = random([2, 32, 4, 4]);
        let skip = random([2, 32, 4 * scale, 4 * scale]);
        assert_eq!(block.forward(x, skip).dims(), expected);
    }

    #[test]
    fn plain_decoder_concatenates_skip() {
        let device = Default::default();
        let decoder = PlainDecoderConfig::new(16, 32, 16).init::<TestBackend>(&device);
        let output = decoder.forward(random([1, 16, 4, 4]), random([1, 16, 8, 8]));
        assert_eq!(output.dims(), [1, 16, 8, 8]);
        assert!(output.min().into_scalar() >= 0.0);
    }

    #[test]
    fn shallow_branch_gives_full_and_half_resolution() {
        let device = Default::default();
        let branch = ShallowBranchConfig::new(1, [8, 16]).init::<TestBackend>(&device);
        let [ds1, ds2] = branch.forward(random([2, 1, 32, 32]));
        assert_eq!(ds1.dims(), [2, 8, 32, 32]);
        assert_eq!(ds2.dims(), [2, 16, 16, 16]);
    }

    #[test]
    fn aux_head_upsamples_to_requested_size() {
        let device = Default::default();
        let head = AuxHeadConfig::new(32, 4).init::<TestBackend>(&device);
        let output = head.forward(random([1, 32, 2, 2]), [64, 64]);
        assert_eq!(output.dims(), [1, 4, 64, 64]);
        assert!(output.min().into_scalar() >= 0.0);
    }

    #[test]
    fn recalibration_keeps_shape() {
        let device = Default::default();
        let recalibration = RecalibrationConfig::new(16).init::<TestBackend>(&device);
        let spatial = SpatialAttentionConfig::new()
            .init::<TestBackend>(&device)
            .expect("default kernel is supported");
        let output = recalibration.forward(random([2, 16, 6, 6]), &spatial);
        assert_eq!(output.dims(), [2, 16, 6, 6]);
    }

    #[rstest]
    #[case(true, 1)]
    #[case(false, 4)]
    fn spatial_gate_sharing(#[case] shared: bool, #[case] expected: usize) {
        let device = Default::default();
        let config = small_config()
            .with_decoder(DecoderConfig::new().with_share_spatial_attention(shared));
        let decoder = SegmentationDecoderConfig::new(config)
            .init::<TestBackend>(&device)
            .expect("valid decoder");
        assert_eq!(decoder.spatial.len(), expected);
    }

    #[test]
    fn decoder_restores_input_resolution() {
        let device = Default::default();
        let decoder = SegmentationDecoderConfig::new(small_config())
            .init::<TestBackend>(&device)
            .expect("valid decoder");

        // Encoder widths are (e1, e2, e3, e3) at 1/4 .. 1/32 of a 64×64 input
        let features = [
            random([1, 24, 16, 16]),
            random([1, 32, 8, 8]),
            random([1, 48, 4, 4]),
            random([1, 48, 2, 2]),
        ];
        let shallow = [random([1, 8, 64, 64]), random([1, 16, 32, 32])];

        let output = decoder.forward(features, shallow);
        for map in output.into_array() {
            assert_eq!(map.dims(), [1, 3, 64, 64]);
        }
    }
}

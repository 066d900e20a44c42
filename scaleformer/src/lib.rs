//! # ScaleFormer
//!
//! A Burn implementation of ScaleFormer, a convolution/transformer hybrid for
//! medical image segmentation. A multi-path convolutional attention encoder
//! produces a four-level feature pyramid that an attention-gated decoder fuses
//! back into full-resolution logits, together with three deep-supervision maps.
//!
//! ```no_run
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use scaleformer_burn::{ModelConfig, ScaleFormerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = Default::default();
//! let model = ScaleFormerConfig::new(ModelConfig::new()).init::<NdArray>(&device)?;
//!
//! let image = Tensor::zeros([1, 1, 224, 224], &device);
//! let output = model.forward(image)?;
//! assert_eq!(output.logits.dims(), [1, 4, 224, 224]);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod models;

pub use config::*;
pub use error::{ScaleFormerError, ScaleFormerResult};
pub use models::{
    modules, ScaleFormer, ScaleFormerConfig, ScaleFormerRecord, SegmentationOutput,
};

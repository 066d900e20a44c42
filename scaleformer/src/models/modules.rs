mod conv_bn;
mod gated_attention;
mod mlp;
mod multi_scale;
mod patch_embed;
mod recalibration;
mod sequence_attention;
mod transformer_blocks;

pub use conv_bn::*;
pub use gated_attention::*;
pub use mlp::*;
pub use multi_scale::*;
pub use patch_embed::*;
pub use recalibration::*;
pub use sequence_attention::*;
pub use transformer_blocks::*;

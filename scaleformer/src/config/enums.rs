//! Enumeration types used in ScaleFormer configurations.

use burn::{
    prelude::*,
    tensor::ops::InterpolateMode,
};

/// Activation applied after a convolution + normalization unit.
#[derive(Config, Debug, PartialEq)]
pub enum Activation {
    /// No activation.
    Identity,
    /// Rectified linear unit.
    Relu,
    /// Gaussian error linear unit.
    Gelu,
    /// Hard swish, `x * relu6(x + 3) / 6`.
    HardSwish,
}

/// Interpolation used by the ×2 upsampling steps of the decoder.
#[derive(Config, Debug, PartialEq)]
pub enum UpsampleMode {
    /// Nearest-neighbour copy of each pixel.
    Nearest,
    /// Bilinear interpolation.
    Bilinear,
}

impl UpsampleMode {
    /// The matching Burn interpolation mode.
    #[must_use]
    pub const fn interpolate_mode(&self) -> InterpolateMode {
        match self {
            Self::Nearest => InterpolateMode::Nearest,
            Self::Bilinear => InterpolateMode::Bilinear,
        }
    }
}

//! # Model Architectures
//!
//! This module aggregates the components of the ScaleFormer architecture:
//!
//! - `modules`: building blocks such as `ConvBn`, the gated and sequence attention
//!   blocks, the recalibration gates and the multi-scale fusion.
//! - `encoder`: the stem and the hierarchical multi-path encoder stages.
//! - `decoder`: the bottleneck, the gated decoder blocks and the output heads.
//! - `scaleformer`: the top-level `ScaleFormer` model.

pub mod decoder;
pub mod encoder;
pub mod modules;
pub mod scaleformer;

pub use decoder::SegmentationOutput;
pub use scaleformer::{ScaleFormer, ScaleFormerConfig, ScaleFormerRecord};

//! Additional operations for the Burn deep learning framework
//!
//! This crate provides layers that ScaleFormer needs but core Burn does not
//! ship yet:
//! - [`DropPath`]: per-sample stochastic depth on residual branches.
//! - [`HardSwish`]: the activation of the stem and patch embedding blocks.

mod drop_path;
mod hard_swish;

pub use drop_path::{DropPath, DropPathConfig};
pub use hard_swish::HardSwish;

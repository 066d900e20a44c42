//! Compile-time backend selection for the ScaleFormer tools.
//!
//! `cuda` wins over `wgpu`; without either feature the tools run on the
//! NdArray CPU backend. With the `fusion` feature Burn fuses the GPU backends
//! itself, so nothing here changes.

use burn::prelude::*;
use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        pub type SelectedBackend = burn::backend::Cuda;
        pub const BACKEND_NAME: &str = "cuda";
    } else if #[cfg(feature = "wgpu")] {
        pub type SelectedBackend = burn::backend::Wgpu;
        pub const BACKEND_NAME: &str = "wgpu";
    } else {
        pub type SelectedBackend = burn::backend::NdArray;
        pub const BACKEND_NAME: &str = "ndarray";
    }
}

pub type SelectedDevice = Device<SelectedBackend>;

/// The default device of [`SelectedBackend`].
pub fn create_device() -> SelectedDevice {
    let device: SelectedDevice = Default::default();
    tracing::debug!(backend = BACKEND_NAME, ?device, "device ready");
    device
}

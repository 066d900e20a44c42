//! # Hard Swish Activation
//!
//! `x * relu6(x + 3) / 6`, the piecewise-linear approximation of swish used by
//! MobileNetV3-style blocks. Expressed through Burn's `hard_sigmoid` with
//! `alpha = 1/6` and `beta = 0.5`.

use burn::{prelude::*, tensor::activation::hard_sigmoid};

const ALPHA: f64 = 1.0 / 6.0;
const BETA: f64 = 0.5;

/// Applies hard swish element-wise.
fn hard_swish<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone() * hard_sigmoid(x, ALPHA, BETA)
}

/// Hard swish activation layer.
#[derive(Module, Clone, Debug, Default)]
pub struct HardSwish;

impl HardSwish {
    pub const fn new() -> Self {
        Self {}
    }

    pub fn forward<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        hard_swish(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::ndarray::NdArray, tensor::TensorData};

    type TestBackend = NdArray<f32>;

    #[test]
    fn hard_swish_matches_piecewise_definition() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 1>::from_data(
            TensorData::from([-4.0f32, -3.0, -1.5, 0.0, 1.5, 3.0, 4.0]),
            &device,
        );
        let expected = [0.0f32, 0.0, -0.375, 0.0, 1.125, 3.0, 4.0];

        let output = HardSwish::new().forward(input).into_data();
        let values = output.as_slice::<f32>().unwrap();

        for (value, expected) in values.iter().zip(expected) {
            assert!(
                (value - expected).abs() < 1e-5,
                "hard swish mismatch: {value} vs {expected}"
            );
        }
    }
}

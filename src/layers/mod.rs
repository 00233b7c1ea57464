pub mod affine;
pub mod layer;
pub mod softmax;

pub use affine::AffineTransform;
pub use layer::{Layer, TrainableLayer};
pub use softmax::SoftmaxLayer;

use crate::error::NetError;
use crate::math::Matrix;
use crate::optim::{TrainOptions, UpdateRule};

/// Closed set of layer variants a network is built from.
///
/// Model-combination ops dispatch by matching the variant tags, so mixing
/// incompatible variants is an explicit error instead of a failed downcast.
pub enum NetLayer {
    Affine(AffineTransform),
    Softmax(SoftmaxLayer),
}

impl NetLayer {
    pub fn input_dim(&self) -> usize {
        match self {
            NetLayer::Affine(l) => l.input_dim(),
            NetLayer::Softmax(l) => l.input_dim(),
        }
    }

    pub fn output_dim(&self) -> usize {
        match self {
            NetLayer::Affine(l) => l.output_dim(),
            NetLayer::Softmax(l) => l.output_dim(),
        }
    }

    pub fn propagate(&self, input: &Matrix) -> Matrix {
        match self {
            NetLayer::Affine(l) => l.propagate(input),
            NetLayer::Softmax(l) => l.propagate(input),
        }
    }

    pub fn backpropagate(&self, input: &Matrix, output: &Matrix, output_grad: &Matrix) -> Matrix {
        match self {
            NetLayer::Affine(l) => l.backpropagate(input, output, output_grad),
            NetLayer::Softmax(l) => l.backpropagate(input, output, output_grad),
        }
    }

    /// Update trainable variants; a no-op for parameter-free ones.
    pub fn update(&mut self, input: &Matrix, grad: &Matrix, rule: UpdateRule, opts: &TrainOptions) {
        if let NetLayer::Affine(l) = self {
            l.update(input, grad, rule, opts);
        }
    }

    pub fn scale(&mut self, factor: f32) {
        if let NetLayer::Affine(l) = self {
            l.scale(factor);
        }
    }

    /// `self += factor * other` for parameters of same-variant pairs.
    pub fn add_scaled(&mut self, factor: f32, other: &NetLayer) -> Result<(), NetError> {
        match (self, other) {
            (NetLayer::Affine(a), NetLayer::Affine(b)) => {
                a.add_scaled(factor, b);
                Ok(())
            }
            (NetLayer::Softmax(_), NetLayer::Softmax(_)) => Ok(()),
            _ => Err(NetError::TypeMismatch),
        }
    }

    pub fn num_params(&self) -> usize {
        match self {
            NetLayer::Affine(l) => l.num_params(),
            NetLayer::Softmax(_) => 0,
        }
    }
}

use std::io::{Read, Write};

use crate::error::NetError;
use crate::io::{TokenReader, TokenWriter};
use crate::math::Matrix;
use crate::optim::{TrainOptions, UpdateRule};

/// Common interface for network layers.
pub trait Layer {
    fn input_dim(&self) -> usize;

    fn output_dim(&self) -> usize;

    /// Forward pass over a batch-major activation matrix.
    fn propagate(&self, input: &Matrix) -> Matrix;

    /// Backward pass returning the gradient with respect to the layer input.
    ///
    /// `input` and `output` are the cached forward activations; variants that
    /// do not need them only check their shapes.
    fn backpropagate(&self, input: &Matrix, output: &Matrix, output_grad: &Matrix) -> Matrix;
}

/// Extension of [`Layer`] for variants that own trainable parameters.
pub trait TrainableLayer: Layer {
    /// Apply one parameter update from the minibatch `input` and the
    /// output-gradient `grad`, under the selected rule.
    fn update(&mut self, input: &Matrix, grad: &Matrix, rule: UpdateRule, opts: &TrainOptions);

    /// Multiply all parameters by `factor` in place.
    fn scale(&mut self, factor: f32);

    fn num_params(&self) -> usize;

    /// Flatten all parameters into one contiguous read-only snapshot.
    fn get_params(&self) -> Vec<f32>;

    fn write_data<W: Write>(&self, writer: &mut TokenWriter<W>) -> Result<(), NetError>;

    fn read_data<R: Read>(&mut self, reader: &mut TokenReader<R>) -> Result<(), NetError>;

    /// Human-readable parameter statistics.
    fn info(&self) -> String;

    /// Human-readable gradient (and, when present, accumulator) statistics.
    fn info_gradient(&self) -> String;
}

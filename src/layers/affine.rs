use std::io::{Read, Write};

use super::layer::{Layer, TrainableLayer};
use crate::error::NetError;
use crate::io::{TokenReader, TokenWriter};
use crate::math::{self, Matrix};
use crate::optim::{self, TrainOptions, UpdateRule};
use crate::rng::rng_from_env;

const TOKEN_LEARN_RATE_COEF: &str = "<LearnRateCoef>";
const TOKEN_MAX_GRAD: &str = "<MaxGrad>";
const TOKEN_PARAM_RANGE: &str = "<ParamRange>";
const TOKEN_AFFINE_ACCUS: &str = "<AffineAccus>";

/// Squared-gradient history for the adaptive update rules, together with the
/// derived per-element scales. Allocated on the first adaptive update or when
/// an accumulator block is read back, never deallocated afterwards.
pub struct AdaBuffers {
    pub linearity_accu: Matrix,
    pub bias_accu: Vec<f32>,
    linearity_scale: Matrix,
    bias_scale: Vec<f32>,
}

impl AdaBuffers {
    fn zeros(dim_out: usize, dim_in: usize) -> Self {
        Self {
            linearity_accu: Matrix::zeros(dim_out, dim_in),
            bias_accu: vec![0.0; dim_out],
            linearity_scale: Matrix::zeros(dim_out, dim_in),
            bias_scale: vec![0.0; dim_out],
        }
    }
}

/// Trainable affine transform: `output = input * linearity^T + bias`.
///
/// The weight matrix is stored (dim_out x dim_in); gradient buffers mirror
/// the parameter shapes and carry the momentum-blended, possibly clipped
/// gradient of the most recent update.
pub struct AffineTransform {
    dim_in: usize,
    dim_out: usize,

    linearity: Matrix,
    bias: Vec<f32>,

    linearity_corr: Matrix,
    bias_corr: Vec<f32>,

    ada: Option<AdaBuffers>,

    learn_rate_coef: f32,
    max_grad: f32,
}

impl AffineTransform {
    pub fn new(dim_in: usize, dim_out: usize) -> Self {
        Self {
            dim_in,
            dim_out,
            linearity: Matrix::zeros(dim_out, dim_in),
            bias: vec![0.0; dim_out],
            linearity_corr: Matrix::zeros(dim_out, dim_in),
            bias_corr: vec![0.0; dim_out],
            ada: None,
            learn_rate_coef: 1.0,
            max_grad: 0.0,
        }
    }

    /// Parse init options until end of stream, then randomize the parameters.
    ///
    /// Recognized options: `<ParamRange>`, `<LearnRateCoef>`, `<MaxGrad>`.
    /// Anything else fails the whole initialization.
    pub fn init_data<R: Read>(&mut self, reader: &mut TokenReader<R>) -> Result<(), NetError> {
        let mut param_range = 0.02f32;
        let mut learn_rate_coef = 1.0f32;
        let mut max_grad = 0.0f32;

        while !reader.at_eof()? {
            let token = reader.read_token()?;
            match token.as_str() {
                TOKEN_PARAM_RANGE => param_range = reader.read_f32()?,
                TOKEN_LEARN_RATE_COEF => learn_rate_coef = reader.read_f32()?,
                TOKEN_MAX_GRAD => max_grad = reader.read_f32()?,
                _ => return Err(NetError::Config(token)),
            }
        }

        let mut rng = rng_from_env();
        self.linearity = Matrix::uniform(self.dim_out, self.dim_in, param_range, &mut rng);
        self.bias = math::uniform_vec(self.dim_out, param_range, &mut rng);

        self.learn_rate_coef = learn_rate_coef;
        self.max_grad = max_grad;
        Ok(())
    }

    /// Restore the layer from a stream produced by [`Self::write_data`].
    ///
    /// Optional leading tags are peeked before they are consumed, so any
    /// subset of them may be absent; absent fields keep their current values.
    pub fn read_data<R: Read>(&mut self, reader: &mut TokenReader<R>) -> Result<(), NetError> {
        self.ada = None;

        while reader.peek_tag()? {
            let token = reader.read_token()?;
            match token.as_str() {
                TOKEN_LEARN_RATE_COEF => self.learn_rate_coef = reader.read_f32()?,
                TOKEN_MAX_GRAD => self.max_grad = reader.read_f32()?,
                TOKEN_AFFINE_ACCUS => {
                    let mut ada = AdaBuffers::zeros(self.dim_out, self.dim_in);
                    ada.linearity_accu = reader.read_matrix()?;
                    ada.bias_accu = reader.read_vector()?;
                    if ada.linearity_accu.rows != self.dim_out
                        || ada.linearity_accu.cols != self.dim_in
                        || ada.bias_accu.len() != self.dim_out
                    {
                        return Err(NetError::CorruptState(format!(
                            "accumulator dims {}x{}/{} do not match layer dims {}x{}",
                            ada.linearity_accu.rows,
                            ada.linearity_accu.cols,
                            ada.bias_accu.len(),
                            self.dim_out,
                            self.dim_in
                        )));
                    }
                    self.ada = Some(ada);
                }
                _ => {
                    return Err(NetError::CorruptState(format!(
                        "unexpected token {token} in affine layer data"
                    )))
                }
            }
        }

        let linearity = reader.read_matrix()?;
        let bias = reader.read_vector()?;
        if linearity.rows != self.dim_out || linearity.cols != self.dim_in {
            return Err(NetError::CorruptState(format!(
                "weight dims {}x{} do not match layer dims {}x{}",
                linearity.rows, linearity.cols, self.dim_out, self.dim_in
            )));
        }
        if bias.len() != self.dim_out {
            return Err(NetError::CorruptState(format!(
                "bias dim {} does not match layer dim {}",
                bias.len(),
                self.dim_out
            )));
        }
        self.linearity = linearity;
        self.bias = bias;

        log::debug!(
            "read affine layer {}x{} (accumulators: {})",
            self.dim_out,
            self.dim_in,
            self.ada.is_some()
        );
        Ok(())
    }

    pub fn write_data<W: Write>(&self, writer: &mut TokenWriter<W>) -> Result<(), NetError> {
        writer.write_token(TOKEN_LEARN_RATE_COEF)?;
        writer.write_f32(self.learn_rate_coef)?;
        writer.write_token(TOKEN_MAX_GRAD)?;
        writer.write_f32(self.max_grad)?;

        // scale buffers are derived state and stay out of the stream
        if let Some(ada) = &self.ada {
            writer.write_token(TOKEN_AFFINE_ACCUS)?;
            writer.write_matrix(&ada.linearity_accu)?;
            writer.write_vector(&ada.bias_accu)?;
        }

        writer.write_matrix(&self.linearity)?;
        writer.write_vector(&self.bias)?;
        Ok(())
    }

    pub fn propagate(&self, input: &Matrix) -> Matrix {
        assert_eq!(input.cols, self.dim_in);
        let mut out = Matrix::matmul(input, &self.linearity.transpose());
        out.add_to_rows(&self.bias);
        out
    }

    pub fn backpropagate(
        &self,
        input: &Matrix,
        output: &Matrix,
        output_grad: &Matrix,
    ) -> Matrix {
        assert_eq!(input.cols, self.dim_in);
        assert_eq!(output.cols, self.dim_out);
        assert_eq!(output_grad.cols, self.dim_out);
        Matrix::matmul(output_grad, &self.linearity)
    }

    pub fn update(&mut self, input: &Matrix, grad: &Matrix, rule: UpdateRule, opts: &TrainOptions) {
        assert_eq!(input.cols, self.dim_in);
        assert_eq!(grad.cols, self.dim_out);
        assert_eq!(input.rows, grad.rows);

        let lr = opts.learn_rate * self.learn_rate_coef;
        let mmt = opts.momentum;

        // momentum-blended raw gradient
        let grad_w = Matrix::matmul(&grad.transpose(), input);
        self.linearity_corr.scale(mmt);
        self.linearity_corr.add_scaled(1.0, &grad_w);
        let grad_b = grad.column_sums();
        math::scale_slice(&mut self.bias_corr, mmt);
        math::axpy(1.0, &grad_b, &mut self.bias_corr);

        if self.max_grad > 0.0 {
            self.linearity_corr.clamp(-self.max_grad, self.max_grad);
            math::clamp_slice(&mut self.bias_corr, -self.max_grad, self.max_grad);
        }

        match rule {
            UpdateRule::Sgd => {
                self.linearity.add_scaled(-lr, &self.linearity_corr);
                math::axpy(-lr, &self.bias_corr, &mut self.bias);
            }
            UpdateRule::AdaGrad | UpdateRule::RmsProp => {
                let (dim_out, dim_in) = (self.dim_out, self.dim_in);
                let ada = self
                    .ada
                    .get_or_insert_with(|| AdaBuffers::zeros(dim_out, dim_in));

                if rule == UpdateRule::AdaGrad {
                    optim::adagrad_accu_update(
                        &mut ada.linearity_accu.data,
                        &self.linearity_corr.data,
                    );
                    optim::adagrad_accu_update(&mut ada.bias_accu, &self.bias_corr);
                } else {
                    optim::rmsprop_accu_update(
                        &mut ada.linearity_accu.data,
                        &self.linearity_corr.data,
                    );
                    optim::rmsprop_accu_update(&mut ada.bias_accu, &self.bias_corr);
                }

                optim::accu_scale_compute(
                    &mut ada.linearity_scale.data,
                    &ada.linearity_accu.data,
                );
                optim::accu_scale_compute(&mut ada.bias_scale, &ada.bias_accu);

                self.linearity
                    .add_prod(-lr, &ada.linearity_scale, &self.linearity_corr);
                math::add_prod_slice(-lr, &ada.bias_scale, &self.bias_corr, &mut self.bias);
            }
        }
    }

    pub fn scale(&mut self, factor: f32) {
        self.linearity.scale(factor);
        math::scale_slice(&mut self.bias, factor);
    }

    /// `self += factor * other`, both layers must share dims.
    pub fn add_scaled(&mut self, factor: f32, other: &AffineTransform) {
        self.linearity.add_scaled(factor, &other.linearity);
        math::axpy(factor, &other.bias, &mut self.bias);
    }

    pub fn input_dim(&self) -> usize {
        self.dim_in
    }

    pub fn output_dim(&self) -> usize {
        self.dim_out
    }

    pub fn num_params(&self) -> usize {
        self.dim_out * self.dim_in + self.dim_out
    }

    /// Row-major weights followed by the bias, as one contiguous snapshot.
    pub fn get_params(&self) -> Vec<f32> {
        let mut params = Vec::with_capacity(self.num_params());
        params.extend_from_slice(&self.linearity.data);
        params.extend_from_slice(&self.bias);
        params
    }

    pub fn linearity(&self) -> &Matrix {
        &self.linearity
    }

    pub fn set_linearity(&mut self, linearity: &Matrix) {
        assert_eq!(linearity.rows, self.dim_out);
        assert_eq!(linearity.cols, self.dim_in);
        self.linearity = linearity.clone();
    }

    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    pub fn set_bias(&mut self, bias: &[f32]) {
        assert_eq!(bias.len(), self.dim_out);
        self.bias = bias.to_vec();
    }

    pub fn learn_rate_coef(&self) -> f32 {
        self.learn_rate_coef
    }

    pub fn max_grad(&self) -> f32 {
        self.max_grad
    }

    pub fn linearity_corr(&self) -> &Matrix {
        &self.linearity_corr
    }

    pub fn bias_corr(&self) -> &[f32] {
        &self.bias_corr
    }

    /// Adaptive accumulators, present once an adaptive rule has run or an
    /// accumulator block was read back.
    pub fn ada_buffers(&self) -> Option<&AdaBuffers> {
        self.ada.as_ref()
    }

    pub fn info(&self) -> String {
        format!(
            "\n  linearity{}\n  bias{}",
            math::moment_statistics(&self.linearity.data),
            math::moment_statistics(&self.bias)
        )
    }

    pub fn info_gradient(&self) -> String {
        let mut info = format!(
            "\n  linearity_corr{}\n  bias_corr{}",
            math::moment_statistics(&self.linearity_corr.data),
            math::moment_statistics(&self.bias_corr)
        );
        if let Some(ada) = &self.ada {
            info.push_str(&format!(
                "\n  linearity_accu{}\n  bias_accu{}",
                math::moment_statistics(&ada.linearity_accu.data),
                math::moment_statistics(&ada.bias_accu)
            ));
        }
        info
    }
}

impl Layer for AffineTransform {
    fn input_dim(&self) -> usize {
        AffineTransform::input_dim(self)
    }

    fn output_dim(&self) -> usize {
        AffineTransform::output_dim(self)
    }

    fn propagate(&self, input: &Matrix) -> Matrix {
        AffineTransform::propagate(self, input)
    }

    fn backpropagate(&self, input: &Matrix, output: &Matrix, output_grad: &Matrix) -> Matrix {
        AffineTransform::backpropagate(self, input, output, output_grad)
    }
}

impl TrainableLayer for AffineTransform {
    fn update(&mut self, input: &Matrix, grad: &Matrix, rule: UpdateRule, opts: &TrainOptions) {
        AffineTransform::update(self, input, grad, rule, opts)
    }

    fn scale(&mut self, factor: f32) {
        AffineTransform::scale(self, factor)
    }

    fn num_params(&self) -> usize {
        AffineTransform::num_params(self)
    }

    fn get_params(&self) -> Vec<f32> {
        AffineTransform::get_params(self)
    }

    fn write_data<W: Write>(&self, writer: &mut TokenWriter<W>) -> Result<(), NetError> {
        AffineTransform::write_data(self, writer)
    }

    fn read_data<R: Read>(&mut self, reader: &mut TokenReader<R>) -> Result<(), NetError> {
        AffineTransform::read_data(self, reader)
    }

    fn info(&self) -> String {
        AffineTransform::info(self)
    }

    fn info_gradient(&self) -> String {
        AffineTransform::info_gradient(self)
    }
}

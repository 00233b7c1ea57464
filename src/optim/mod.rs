use crate::math;

/// Epsilon added under the square root when converting accumulated squared
/// gradients into per-element scales. Fixed so that serialized accumulator
/// state behaves identically after a reload.
pub const EPSILON: f32 = 1e-8;

/// Exponential decay applied to the RMSProp squared-gradient average.
/// Fixed for the same reproducibility reason as [`EPSILON`].
pub const RMSPROP_DECAY: f32 = 0.9;

/// Parameter-update rule selected per minibatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateRule {
    Sgd,
    AdaGrad,
    RmsProp,
}

/// Hyperparameters handed to every update call by the trainer.
#[derive(Clone, Copy, Debug)]
pub struct TrainOptions {
    /// Global learning rate; layers apply their own coefficient on top.
    pub learn_rate: f32,
    /// Blend factor carrying the previous gradient into the current one.
    pub momentum: f32,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            learn_rate: 0.008,
            momentum: 0.0,
        }
    }
}

/// AdaGrad history: unbounded sum of squared gradients.
pub fn adagrad_accu_update(accu: &mut [f32], corr: &[f32]) {
    math::add_prod_slice(1.0, corr, corr, accu);
}

/// RMSProp history: exponential moving average of squared gradients.
pub fn rmsprop_accu_update(accu: &mut [f32], corr: &[f32]) {
    math::scale_slice(accu, RMSPROP_DECAY);
    math::add_prod_slice(1.0 - RMSPROP_DECAY, corr, corr, accu);
}

/// Derive the per-element step scale `1 / sqrt(accu + EPSILON)`.
pub fn accu_scale_compute(scale: &mut [f32], accu: &[f32]) {
    assert_eq!(scale.len(), accu.len());
    for (s, &a) in scale.iter_mut().zip(accu.iter()) {
        *s = 1.0 / (a + EPSILON).sqrt();
    }
}

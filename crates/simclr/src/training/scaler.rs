//! Backward + optimizer step strategies: full precision or dynamic loss scaling.
//!
//! Reduced precision in burn comes from the backend element type. Loss scaling
//! keeps small gradients representable there: the loss is multiplied by a
//! scale factor before `backward`, gradients are divided by it again before
//! the optimizer step, and the step is skipped when any gradient overflowed.

use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::training::watch::grad_norm;

/// Outcome of one backward + optimizer step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepUpdate {
    /// False when the step was skipped on overflow.
    pub applied: bool,
    /// Global L2 norm of the gradients after unscaling.
    pub grad_norm: f64,
}

/// Dynamic loss scale with growth and backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct GradScaler {
    scale: f64,
    growth_factor: f64,
    backoff_factor: f64,
    growth_interval: usize,
    growth_tracker: usize,
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new(65_536.0, 2.0, 0.5, 2000)
    }
}

impl GradScaler {
    pub fn new(init_scale: f64, growth_factor: f64, backoff_factor: f64, growth_interval: usize) -> Self {
        Self {
            scale: init_scale,
            growth_factor,
            backoff_factor,
            growth_interval: growth_interval.max(1),
            growth_tracker: 0,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Adjust the scale after a step.
    ///
    /// Overflow halves (backs off) the scale and resets the streak; every
    /// `growth_interval` consecutive clean steps grows it.
    pub fn update(&mut self, found_inf: bool) {
        if found_inf {
            self.scale *= self.backoff_factor;
            self.growth_tracker = 0;
            tracing::debug!(scale = self.scale, "Gradient overflow, backing off loss scale");
            return;
        }
        self.growth_tracker += 1;
        if self.growth_tracker == self.growth_interval {
            self.scale *= self.growth_factor;
            self.growth_tracker = 0;
        }
    }
}

/// Divides every registered gradient by the loss scale and flags non-finite values.
struct Unscale<'a> {
    grads: &'a mut GradientsParams,
    inv_scale: f64,
    found_inf: bool,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Unscale<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) else {
            return;
        };
        let grad = grad.mul_scalar(self.inv_scale);
        let magnitude: f64 = grad.clone().abs().sum().into_scalar().elem();
        if !magnitude.is_finite() {
            self.found_inf = true;
        }
        self.grads.register::<B::InnerBackend, D>(id, grad);
    }
}

/// How a step turns a loss into a parameter update. Chosen once per run.
#[derive(Debug, Clone, PartialEq)]
pub enum PrecisionStrategy {
    /// Plain `backward` + optimizer step.
    Full,
    /// Dynamic loss scaling; steps with overflowed gradients are skipped.
    Scaled(GradScaler),
}

impl PrecisionStrategy {
    pub fn from_flag(fp16_precision: bool) -> Self {
        if fp16_precision {
            Self::Scaled(GradScaler::default())
        } else {
            Self::Full
        }
    }

    /// Current loss scale (1.0 for full precision).
    pub fn scale(&self) -> f64 {
        match self {
            Self::Full => 1.0,
            Self::Scaled(scaler) => scaler.scale(),
        }
    }

    /// Backward pass and optimizer step.
    ///
    /// Returns the updated module, whether the update was applied, and the
    /// unscaled gradient norm.
    pub fn apply<B, M, O>(&mut self, loss: Tensor<B, 1>, model: M, optimizer: &mut O, lr: f64) -> (M, StepUpdate)
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        match self {
            Self::Full => {
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                let grad_norm = grad_norm(&model, &grads);
                let update = StepUpdate {
                    applied: true,
                    grad_norm,
                };
                (optimizer.step(lr, model, grads), update)
            }
            Self::Scaled(scaler) => {
                let scaled = loss.mul_scalar(scaler.scale());
                let mut grads = GradientsParams::from_grads(scaled.backward(), &model);
                let mut unscale = Unscale {
                    grads: &mut grads,
                    inv_scale: 1.0 / scaler.scale(),
                    found_inf: false,
                };
                model.visit(&mut unscale);
                let found_inf = unscale.found_inf;
                scaler.update(found_inf);
                let grad_norm = grad_norm(&model, &grads);
                let update = StepUpdate {
                    applied: !found_inf,
                    grad_norm,
                };
                if found_inf {
                    (model, update)
                } else {
                    (optimizer.step(lr, model, grads), update)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::nn::{Linear, LinearConfig};
    use burn::optim::SgdConfig;
    use burn::tensor::{Distribution, TensorData};

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn weights(model: &Linear<TestAutodiffBackend>) -> Vec<f32> {
        model.weight.val().into_data().to_vec().unwrap()
    }

    #[test]
    fn test_scaler_growth_and_backoff() {
        let mut scaler = GradScaler::new(8.0, 2.0, 0.5, 3);
        scaler.update(false);
        scaler.update(false);
        assert_eq!(scaler.scale(), 8.0);
        scaler.update(false);
        assert_eq!(scaler.scale(), 16.0, "grows after growth_interval clean steps");

        scaler.update(false);
        scaler.update(true);
        assert_eq!(scaler.scale(), 8.0, "overflow backs off");
        scaler.update(false);
        scaler.update(false);
        assert_eq!(scaler.scale(), 8.0, "overflow resets the growth streak");
        scaler.update(false);
        assert_eq!(scaler.scale(), 16.0);
    }

    #[test]
    fn test_from_flag() {
        assert_eq!(PrecisionStrategy::from_flag(false), PrecisionStrategy::Full);
        assert_eq!(PrecisionStrategy::from_flag(true).scale(), 65_536.0);
    }

    #[test]
    fn test_scaled_step_matches_full_step() {
        let device = Default::default();
        let model = LinearConfig::new(4, 3).init::<TestAutodiffBackend>(&device);
        let input = Tensor::<TestAutodiffBackend, 2>::random([5, 4], Distribution::Normal(0.0, 1.0), &device);

        let mut sgd_full = SgdConfig::new().init();
        let mut full = PrecisionStrategy::Full;
        let loss = model.forward(input.clone()).powf_scalar(2.0).mean();
        let (full_model, full_update) = full.apply(loss, model.clone(), &mut sgd_full, 0.1);
        assert!(full_update.applied);

        let mut sgd_scaled = SgdConfig::new().init();
        let mut scaled = PrecisionStrategy::Scaled(GradScaler::new(1024.0, 2.0, 0.5, 2000));
        let loss = model.forward(input).powf_scalar(2.0).mean();
        let (scaled_model, scaled_update) = scaled.apply(loss, model, &mut sgd_scaled, 0.1);
        assert!(scaled_update.applied);
        let rel = (full_update.grad_norm - scaled_update.grad_norm).abs() / full_update.grad_norm;
        assert!(rel < 1e-4, "grad norm is reported unscaled: {full_update:?} vs {scaled_update:?}");

        for (a, b) in weights(&full_model).iter().zip(weights(&scaled_model)) {
            assert!((a - b).abs() < 1e-4, "unscaled update should match: {a} vs {b}");
        }
    }

    #[test]
    fn test_overflow_skips_step_and_backs_off() {
        let device = Default::default();
        let model = LinearConfig::new(2, 1).init::<TestAutodiffBackend>(&device);
        let before = weights(&model);
        let input = Tensor::<TestAutodiffBackend, 2>::from_data(
            TensorData::from([[1.0e30_f32, 1.0e30]]),
            &device,
        );

        let mut sgd = SgdConfig::new().init();
        let mut strategy = PrecisionStrategy::Scaled(GradScaler::new(1.0e30, 2.0, 0.5, 2000));
        let loss = model.forward(input).sum();
        let (model, update) = strategy.apply(loss, model, &mut sgd, 0.1);

        assert!(!update.applied, "overflowed gradients must skip the step");
        assert!(!update.grad_norm.is_finite());
        assert_eq!(weights(&model), before);
        assert_eq!(strategy.scale(), 0.5e30);
    }
}

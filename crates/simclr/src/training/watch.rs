//! Parameter and gradient statistics reported alongside the training metrics.

use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

fn sum_of_squares<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f64 {
    tensor.powf_scalar(2.0).sum().into_scalar().elem()
}

struct GradSquares<'a> {
    grads: &'a GradientsParams,
    total: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradSquares<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.total += sum_of_squares(grad);
        }
    }
}

struct ParamSquares {
    total: f64,
}

impl<B: Backend> ModuleVisitor<B> for ParamSquares {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.total += sum_of_squares(tensor.clone());
    }
}

/// Global L2 norm over every gradient of `model` found in `grads`.
///
/// Non-finite when any gradient overflowed.
pub fn grad_norm<B: AutodiffBackend, M: AutodiffModule<B>>(model: &M, grads: &GradientsParams) -> f64 {
    let mut visitor = GradSquares { grads, total: 0.0 };
    model.visit(&mut visitor);
    visitor.total.sqrt()
}

/// Global L2 norm over every float parameter of `model`.
pub fn param_norm<B: Backend, M: Module<B>>(model: &M) -> f64 {
    let mut visitor = ParamSquares { total: 0.0 };
    model.visit(&mut visitor);
    visitor.total.sqrt()
}

// ============================================================
// Layer 5 — Global Gradient-Norm Clipping
// ============================================================
// Burn's built-in GradientClipping works per parameter tensor.
// Recurrent CTC training wants the global variant instead: the
// L2 norm is taken over ALL gradients together, and when it
// exceeds max_norm every gradient is scaled by the same factor
//
//     coef = max_norm / (‖g‖₂ + 1e-6)      applied only if coef < 1
//
// Both passes walk the model with a ModuleVisitor so the
// ParamIds line up with the entries in GradientsParams.

use burn::{
    module::{Module, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::marker::PhantomData;

const NORM_EPS: f64 = 1e-6;

struct SquaredNorm<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    total: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.total += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Rescale<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    coef: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.coef));
        }
    }
}

/// L2 norm over every gradient that belongs to `module`.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let mut visitor = SquaredNorm::<B> { grads, total: 0.0, _backend: PhantomData };
    module.visit(&mut visitor);
    visitor.total.sqrt()
}

/// Scale all gradients down so their global norm is at most `max_norm`.
/// Returns the norm measured before clipping.
pub fn clip_global_norm<B, M>(module: &M, mut grads: GradientsParams, max_norm: f64) -> (GradientsParams, f64)
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let norm = global_grad_norm::<B, M>(module, &grads);
    let coef = max_norm / (norm + NORM_EPS);
    if coef < 1.0 {
        tracing::debug!("Clipping gradients: norm={:.4} coef={:.4}", norm, coef);
        let mut visitor = Rescale::<B> { grads: &mut grads, coef, _backend: PhantomData };
        module.visit(&mut visitor);
    }
    (grads, norm)
}

//! Adaptive Gradient Algorithm (Adagrad).
//!
//! ```text
//! moment_out = moment + grad * grad
//! param_out  = param - learning_rate * grad / (sqrt(moment_out) + epsilon)
//! ```
//!
//! https://www.jmlr.org/papers/volume12/duchi11a/duchi11a.pdf
//!
//! The paper has no `epsilon`; it keeps the denominator away from zero while
//! `moment_out` is still zero. Non-finite inputs are not filtered.
use ndarray::Zip;

use crate::attribute::{get_attr, AttributeMap};
use crate::error::{OpError, Result};
use crate::ndarray_ext::{product, NdArrayView, NdArrayViewMut};
use crate::op::{
    ExecutionContext, InferShapeContext, OpDefinition, OpKernel, OperatorWithKernel, Place,
};
use crate::proto::OpProtoMaker;
use crate::registry::OpRegistry;
use crate::Float;

pub const PARAM: &str = "param";
pub const GRAD: &str = "grad";
pub const MOMENT: &str = "moment";
pub const LEARNING_RATE: &str = "learning_rate";
pub const PARAM_OUT: &str = "param_out";
pub const MOMENT_OUT: &str = "moment_out";
pub const EPSILON: &str = "epsilon";

/// Tensors with at least this many elements are updated on the rayon pool.
pub const PARALLEL_THRESHOLD: usize = 1 << 15;

/// Shape-checking half of the `adagrad` operator.
#[derive(Clone, Debug)]
pub struct AdagradOp {
    epsilon: f32,
}

impl AdagradOp {
    pub fn new(epsilon: f32) -> Self {
        AdagradOp { epsilon }
    }

    #[inline]
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
}

impl OperatorWithKernel for AdagradOp {
    fn infer_shape(&self, ctx: &mut dyn InferShapeContext) -> Result<()> {
        for slot in [PARAM, GRAD, MOMENT, LEARNING_RATE] {
            ctx.require_input(Self::TYPE, slot)?;
        }
        for slot in [PARAM_OUT, MOMENT_OUT] {
            ctx.require_output(Self::TYPE, slot)?;
        }

        let lr_dims = ctx.input_dim(LEARNING_RATE)?;
        if product(&lr_dims) != Some(1) {
            return Err(OpError::ShapeMismatch(format!(
                "learning_rate should have one element, got shape {:?}",
                lr_dims
            )));
        }
        let param_dims = ctx.input_dim(PARAM)?;
        for slot in [GRAD, MOMENT] {
            let dims = ctx.input_dim(slot)?;
            if dims != param_dims {
                return Err(OpError::ShapeMismatch(format!(
                    "param and {} of adagrad should have the same dimension: {:?} vs {:?}",
                    slot, param_dims, dims
                )));
            }
        }

        ctx.set_output_dim(PARAM_OUT, &param_dims)?;
        ctx.set_output_dim(MOMENT_OUT, &param_dims)
    }

    fn in_place_pairs(&self) -> &'static [(&'static str, &'static str)] {
        &[(PARAM, PARAM_OUT), (MOMENT, MOMENT_OUT)]
    }
}

impl OpDefinition for AdagradOp {
    const TYPE: &'static str = "adagrad";

    fn make_proto(maker: &mut OpProtoMaker) {
        maker
            .add_input(PARAM, "Input parameter")
            .add_input(GRAD, "Input gradient")
            .add_input(MOMENT, "Second moment")
            .add_input(LEARNING_RATE, "Learning rate of adagrad")
            .add_output(PARAM_OUT, "Output parameter")
            .add_output(MOMENT_OUT, "Output second moment");
        maker.add_attr::<f32>(EPSILON, "Constant for numerical stability");
        maker.add_comment(
            r"
Adaptive Gradient Algorithm (Adagrad).

moment_out = moment + grad * grad
param_out = param - learning_rate * grad / (sqrt(moment_out) + epsilon)

The original paper (http://www.jmlr.org/papers/volume12/duchi11a/duchi11a.pdf)
does not have the epsilon attribute. It is added here for numerical stability
by avoiding division by zero.
",
        );
    }

    fn create(attrs: &AttributeMap) -> Result<Self> {
        Ok(AdagradOp::new(get_attr(Self::TYPE, attrs, EPSILON)?))
    }
}

/// Numeric half of the `adagrad` operator.
#[derive(Clone, Debug)]
pub struct AdagradKernel<F: Float> {
    epsilon: F,
}

impl<F: Float> AdagradKernel<F> {
    pub fn new(epsilon: f32) -> Self {
        AdagradKernel {
            epsilon: <F as From<f32>>::from(epsilon),
        }
    }

    pub fn from_attrs(attrs: &AttributeMap) -> Result<Self> {
        Ok(Self::new(get_attr(AdagradOp::TYPE, attrs, EPSILON)?))
    }

    #[inline]
    pub fn epsilon(&self) -> F {
        self.epsilon
    }
}

impl<F: Float> OpKernel<F> for AdagradKernel<F> {
    fn compute(&self, ctx: &ExecutionContext<F>) -> Result<()> {
        // Every borrow is taken before the first write.
        let lr = ctx.input(LEARNING_RATE)?;
        let grad = ctx.input(GRAD)?;
        let param = if ctx.shares_buffer(PARAM, PARAM_OUT)? {
            None
        } else {
            Some(ctx.input(PARAM)?)
        };
        let moment = if ctx.shares_buffer(MOMENT, MOMENT_OUT)? {
            None
        } else {
            Some(ctx.input(MOMENT)?)
        };
        let mut param_out = ctx.output_mut(PARAM_OUT)?;
        let mut moment_out = ctx.output_mut(MOMENT_OUT)?;

        let lr = match lr.iter().next() {
            Some(&lr) => lr,
            None => {
                return Err(OpError::ShapeMismatch(
                    "learning_rate should have one element".to_string(),
                ))
            }
        };
        if let Some(param) = param {
            param_out.assign(&*param);
        }
        if let Some(moment) = moment {
            moment_out.assign(&*moment);
        }
        log::trace!("adagrad: {} elements, lr={}", grad.len(), lr);
        adagrad_update(
            param_out.view_mut(),
            grad.view(),
            moment_out.view_mut(),
            lr,
            self.epsilon,
        );
        Ok(())
    }
}

/// Applies one Adagrad step to `param` and `moment` in place.
///
/// # Panics
///
/// If `param`, `grad` and `moment` don't share one shape.
pub fn adagrad_update<F: Float>(
    param: NdArrayViewMut<F>,
    grad: NdArrayView<F>,
    moment: NdArrayViewMut<F>,
    lr: F,
    epsilon: F,
) {
    let parallel = grad.len() >= PARALLEL_THRESHOLD && rayon::current_num_threads() > 1;
    let zip = Zip::from(param).and(moment).and(grad);
    let step = move |p: &mut F, m: &mut F, &g: &F| {
        *m += g * g;
        *p -= lr * g / ((*m).sqrt() + epsilon);
    };
    if parallel {
        zip.par_for_each(step);
    } else {
        zip.for_each(step);
    }
}

/// Registers `adagrad` and its `f32` CPU kernel.
pub fn register(registry: &mut OpRegistry<f32>) -> Result<()> {
    registry.register_op_without_gradient::<AdagradOp>()?;
    registry.register_kernel(AdagradOp::TYPE, Place::Cpu, |attrs| {
        Ok(Box::new(AdagradKernel::<f32>::from_attrs(attrs)?))
    })
}

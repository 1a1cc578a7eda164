//! Instantiated operators and their execution against a [Scope].
use rustc_hash::FxHashMap;

use crate::error::{OpError, Result};
use crate::ndarray_ext::{self, Dims};
use crate::op::{
    ExecutionContext, InferShapeContext, KernelKey, OpKernel, OperatorWithKernel, Place,
};
use crate::op_desc::OpDesc;
use crate::scope::Scope;
use crate::Float;

/// An operator created by [crate::OpRegistry::create_op], ready to run.
pub struct Operator<F: Float> {
    pub(crate) desc: OpDesc,
    pub(crate) op: Box<dyn OperatorWithKernel>,
    pub(crate) kernels: FxHashMap<KernelKey, Box<dyn OpKernel<F>>>,
}

impl<F: Float> Operator<F> {
    #[inline]
    pub fn op_type(&self) -> &str {
        &self.desc.op_type
    }

    #[inline]
    pub fn desc(&self) -> &OpDesc {
        &self.desc
    }

    /// Runs shape inference alone on caller-provided metadata.
    pub fn infer_shape(&self, ctx: &mut dyn InferShapeContext) -> Result<()> {
        self.op.infer_shape(ctx)
    }

    /// Validates the invocation, allocates outputs, then runs the kernel
    /// registered for `place` and `F`.
    ///
    /// Outputs are left untouched when validation fails, no kernel exists or
    /// an output aliases a variable it may not share.
    pub fn run(&self, scope: &mut Scope<F>, place: Place) -> Result<()> {
        let key = KernelKey::new(F::DATA_TYPE, place);
        let pending = {
            let mut ctx = RuntimeInferShapeContext::new(&self.desc, scope);
            self.op.infer_shape(&mut ctx)?;
            ctx.pending
        };
        let kernel = self
            .kernels
            .get(&key)
            .ok_or_else(|| OpError::KernelNotFound {
                op: self.desc.op_type.clone(),
                key,
            })?;
        check_output_aliases(&self.desc, self.op.in_place_pairs())?;
        commit_output_dims(&self.desc, scope, pending)?;

        log::debug!("running `{}` with kernel {}", self.desc.op_type, key);
        kernel.compute(&ExecutionContext::new(&self.desc, scope))
    }
}

/// [InferShapeContext] backed by a scope.
///
/// Output shapes are only recorded here; [Operator::run] applies them once
/// inference succeeded.
pub(crate) struct RuntimeInferShapeContext<'a, F: Float> {
    desc: &'a OpDesc,
    scope: &'a Scope<F>,
    pending: Vec<(String, Dims)>,
}

impl<'a, F: Float> RuntimeInferShapeContext<'a, F> {
    pub(crate) fn new(desc: &'a OpDesc, scope: &'a Scope<F>) -> Self {
        RuntimeInferShapeContext {
            desc,
            scope,
            pending: Vec::new(),
        }
    }
}

impl<'a, F: Float> InferShapeContext for RuntimeInferShapeContext<'a, F> {
    fn has_input(&self, slot: &str) -> bool {
        self.desc
            .input(slot)
            .map_or(false, |var| self.scope.contains(var))
    }

    fn has_output(&self, slot: &str) -> bool {
        self.desc.output(slot).is_some()
    }

    fn input_dim(&self, slot: &str) -> Result<Dims> {
        let var = self.desc.input(slot).ok_or_else(|| OpError::MissingSlot {
            op: self.desc.op_type.clone(),
            slot: slot.to_string(),
        })?;
        let arr = self
            .scope
            .get(var)
            .ok_or_else(|| OpError::MissingVariable(var.to_string()))?;
        let dims = ndarray_ext::dims_of(&*arr.borrow());
        Ok(dims)
    }

    fn set_output_dim(&mut self, slot: &str, dims: &[usize]) -> Result<()> {
        if !self.has_output(slot) {
            return Err(OpError::MissingSlot {
                op: self.desc.op_type.clone(),
                slot: slot.to_string(),
            });
        }
        log::trace!("{}: {} <- {:?}", self.desc.op_type, slot, dims);
        self.pending.push((slot.to_string(), Dims::from_slice(dims)));
        Ok(())
    }
}

// Each output either has its own variable or shares it with its in-place
// partner input and nothing else.
fn check_output_aliases(desc: &OpDesc, in_place: &[(&str, &str)]) -> Result<()> {
    for (i, (out_slot, out_var)) in desc.outputs.iter().enumerate() {
        if let Some((other, _)) = desc
            .outputs
            .iter()
            .skip(i + 1)
            .find(|(_, var)| *var == out_var)
        {
            return Err(OpError::BorrowConflict(format!(
                "outputs `{}` and `{}` are both bound to `{}`",
                out_slot, other, out_var
            )));
        }
        for (in_slot, in_var) in desc.inputs.iter() {
            if in_var != out_var || in_place.contains(&(in_slot.as_str(), out_slot.as_str())) {
                continue;
            }
            return Err(OpError::BorrowConflict(format!(
                "output `{}` is bound to `{}`, the variable of input `{}`",
                out_slot, out_var, in_slot
            )));
        }
    }
    Ok(())
}

// Allocates zero-filled outputs whose shape differs from the inferred one.
// A variable also bound as an input is never reallocated.
fn commit_output_dims<F: Float>(
    desc: &OpDesc,
    scope: &mut Scope<F>,
    pending: Vec<(String, Dims)>,
) -> Result<()> {
    let mut resized = Vec::with_capacity(pending.len());
    for (slot, dims) in pending {
        // `pending` only holds bound slots
        let var = match desc.output(&slot) {
            Some(var) => var,
            None => continue,
        };
        let matches = scope
            .get(var)
            .map_or(false, |a| a.borrow().shape() == dims.as_slice());
        if matches {
            continue;
        }
        if desc.inputs.values().any(|v| v == var) {
            return Err(OpError::BorrowConflict(format!(
                "output `{}` aliases an input of shape other than {:?}",
                slot, dims
            )));
        }
        resized.push((var.to_string(), dims));
    }
    for (var, dims) in resized {
        log::trace!("allocating `{}` with shape {:?}", var, dims);
        scope.set(var, ndarray_ext::zeros::<F>(&dims));
    }
    Ok(())
}

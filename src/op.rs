//! Defining things related to operators and their kernels.
//!
//! # Implementing an operator
//!
//! An operator is split in two halves:
//!
//! - [OperatorWithKernel] checks the named slots of an invocation and infers
//!   the output shapes. It only sees shape metadata, through [InferShapeContext].
//! - [OpKernel] does the numeric work for one `(data type, place)` pair,
//!   reading and writing arrays through [ExecutionContext].
//!
//! ```
//! use adagrad_op as ag;
//! use ag::attribute::AttributeMap;
//! use ag::error::Result;
//! use ag::op::*;
//! use ag::proto::OpProtoMaker;
//!
//! // out = x * x
//! struct Square;
//!
//! impl OperatorWithKernel for Square {
//!     fn infer_shape(&self, ctx: &mut dyn InferShapeContext) -> Result<()> {
//!         ctx.require_input("square", "x")?;
//!         ctx.require_output("square", "out")?;
//!         let dims = ctx.input_dim("x")?;
//!         ctx.set_output_dim("out", &dims)
//!     }
//! }
//!
//! impl OpDefinition for Square {
//!     const TYPE: &'static str = "square";
//!
//!     fn make_proto(maker: &mut OpProtoMaker) {
//!         maker.add_input("x", "Input").add_output("out", "Squared input");
//!     }
//!
//!     fn create(_: &AttributeMap) -> Result<Self> {
//!         Ok(Square)
//!     }
//! }
//!
//! struct SquareKernel;
//!
//! impl<F: ag::Float> OpKernel<F> for SquareKernel {
//!     fn compute(&self, ctx: &ExecutionContext<F>) -> Result<()> {
//!         let x = ctx.input("x")?;
//!         let mut out = ctx.output_mut("out")?;
//!         out.zip_mut_with(&*x, |o, &a| *o = a * a);
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = ag::OpRegistry::<f32>::new();
//! registry.register_op_without_gradient::<Square>().unwrap();
//! registry
//!     .register_kernel("square", Place::Cpu, |_| Ok(Box::new(SquareKernel)))
//!     .unwrap();
//! ```
use std::cell::{Ref, RefMut};
use std::fmt;

use rustc_hash::FxHashMap;

use crate::attribute::AttributeMap;
use crate::error::{OpError, Result};
use crate::ndarray_ext::{Dims, NdArray};
use crate::op_desc::OpDesc;
use crate::proto::OpProtoMaker;
use crate::scope::{Scope, VarId};
use crate::Float;

/// Element type a kernel is specialized for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Fp32,
    Fp64,
}

/// Device a kernel runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Place {
    Cpu,
    Gpu(usize),
}

/// Identifies one kernel among those registered for an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelKey {
    pub data_type: DataType,
    pub place: Place,
}

impl KernelKey {
    #[inline]
    pub fn new(data_type: DataType, place: Place) -> Self {
        KernelKey { data_type, place }
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.data_type, self.place)
    }
}

/// Shape metadata of an invocation's named slots.
pub trait InferShapeContext {
    fn has_input(&self, slot: &str) -> bool;

    fn has_output(&self, slot: &str) -> bool;

    fn input_dim(&self, slot: &str) -> Result<Dims>;

    fn set_output_dim(&mut self, slot: &str, dims: &[usize]) -> Result<()>;

    /// Fails with `MissingSlot` unless input `slot` is present.
    fn require_input(&self, op: &str, slot: &str) -> Result<()> {
        if self.has_input(slot) {
            Ok(())
        } else {
            Err(OpError::MissingSlot {
                op: op.to_string(),
                slot: slot.to_string(),
            })
        }
    }

    /// Fails with `MissingSlot` unless output `slot` is present.
    fn require_output(&self, op: &str, slot: &str) -> Result<()> {
        if self.has_output(slot) {
            Ok(())
        } else {
            Err(OpError::MissingSlot {
                op: op.to_string(),
                slot: slot.to_string(),
            })
        }
    }
}

/// Map-backed [InferShapeContext] for inference without any array data.
///
/// ```
/// use adagrad_op::op::{InferShapeContext, MapInferShapeContext};
///
/// let mut ctx = MapInferShapeContext::new()
///     .with_input("x", &[2, 3])
///     .with_output("out");
/// assert!(ctx.has_input("x"));
/// ctx.set_output_dim("out", &[2, 3]).unwrap();
/// assert_eq!(ctx.output_dim("out").unwrap().as_slice(), &[2, 3]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MapInferShapeContext {
    inputs: FxHashMap<String, Dims>,
    outputs: FxHashMap<String, Option<Dims>>,
}

impl MapInferShapeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input<S: Into<String>>(mut self, slot: S, dims: &[usize]) -> Self {
        self.inputs.insert(slot.into(), Dims::from_slice(dims));
        self
    }

    /// Declares output `slot` with a shape still unknown.
    pub fn with_output<S: Into<String>>(mut self, slot: S) -> Self {
        self.outputs.insert(slot.into(), None);
        self
    }

    /// Inferred shape of output `slot`, if it has been set.
    pub fn output_dim(&self, slot: &str) -> Option<&Dims> {
        self.outputs.get(slot).and_then(|d| d.as_ref())
    }
}

impl InferShapeContext for MapInferShapeContext {
    fn has_input(&self, slot: &str) -> bool {
        self.inputs.contains_key(slot)
    }

    fn has_output(&self, slot: &str) -> bool {
        self.outputs.contains_key(slot)
    }

    fn input_dim(&self, slot: &str) -> Result<Dims> {
        self.inputs
            .get(slot)
            .cloned()
            .ok_or_else(|| OpError::MissingVariable(slot.to_string()))
    }

    fn set_output_dim(&mut self, slot: &str, dims: &[usize]) -> Result<()> {
        match self.outputs.get_mut(slot) {
            Some(d) => {
                *d = Some(Dims::from_slice(dims));
                Ok(())
            }
            None => Err(OpError::MissingVariable(slot.to_string())),
        }
    }
}

/// Shape-checking half of an operator.
pub trait OperatorWithKernel: Send + Sync {
    /// Validates the invocation's slots and sets the output shapes.
    ///
    /// Must not touch element data, and must not set any output shape unless
    /// every check passes.
    fn infer_shape(&self, ctx: &mut dyn InferShapeContext) -> Result<()>;

    /// `(input, output)` slot pairs whose variables may be the same.
    ///
    /// Any other output bound to an input's variable is rejected before the
    /// kernel runs.
    fn in_place_pairs(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }
}

/// Registration-side description of an operator type.
pub trait OpDefinition: OperatorWithKernel + Sized + 'static {
    /// Name under which the operator is registered.
    const TYPE: &'static str;

    /// Declares slots, attributes and doc comment.
    fn make_proto(maker: &mut OpProtoMaker);

    /// Builds an instance from attributes that already passed the checker.
    fn create(attrs: &AttributeMap) -> Result<Self>;
}

/// Numeric half of an operator for one element type and place.
pub trait OpKernel<F: Float>: Send + Sync {
    /// Runs after `OperatorWithKernel::infer_shape` succeeded, so every slot is
    /// bound and every output already has its inferred shape.
    fn compute(&self, ctx: &ExecutionContext<F>) -> Result<()>;
}

/// Context of a kernel's computation.
///
/// Arrays are borrowed from the scope slot by slot. An output bound to the same
/// variable as an input shares its buffer; borrowing such an input immutably
/// while the output is borrowed mutably fails with `BorrowConflict`.
pub struct ExecutionContext<'s, F: Float> {
    desc: &'s OpDesc,
    scope: &'s Scope<F>,
}

impl<'s, F: Float> ExecutionContext<'s, F> {
    #[inline]
    pub(crate) fn new(desc: &'s OpDesc, scope: &'s Scope<F>) -> Self {
        ExecutionContext { desc, scope }
    }

    fn resolve(&self, var: Option<&str>, slot: &str) -> Result<VarId> {
        let var = var.ok_or_else(|| OpError::MissingSlot {
            op: self.desc.op_type.clone(),
            slot: slot.to_string(),
        })?;
        self.scope
            .var_id(var)
            .ok_or_else(|| OpError::MissingVariable(var.to_string()))
    }

    #[inline]
    fn input_id(&self, slot: &str) -> Result<VarId> {
        self.resolve(self.desc.input(slot), slot)
    }

    #[inline]
    fn output_id(&self, slot: &str) -> Result<VarId> {
        self.resolve(self.desc.output(slot), slot)
    }

    /// Borrows the array bound to input `slot`.
    pub fn input(&self, slot: &str) -> Result<Ref<'s, NdArray<F>>> {
        let id = self.input_id(slot)?;
        self.scope
            .get_by_id(id)
            .try_borrow()
            .map_err(|_| OpError::BorrowConflict(format!("input `{}` is being written", slot)))
    }

    /// Mutably borrows the array bound to output `slot`.
    pub fn output_mut(&self, slot: &str) -> Result<RefMut<'s, NdArray<F>>> {
        let id = self.output_id(slot)?;
        self.scope.get_by_id(id).try_borrow_mut().map_err(|_| {
            OpError::BorrowConflict(format!("output `{}` is already borrowed", slot))
        })
    }

    /// True if output `out_slot` writes into the buffer of input `in_slot`.
    pub fn shares_buffer(&self, in_slot: &str, out_slot: &str) -> Result<bool> {
        Ok(self.input_id(in_slot)? == self.output_id(out_slot)?)
    }
}

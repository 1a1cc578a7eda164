//! Operator and kernel registration.
//!
//! A registry knows, per operator type, its [OpProto], its [AttrChecker], how
//! to construct it, whether it has a gradient operator, and which kernels are
//! available. Kernels are keyed by [KernelKey]; the data type half of the key
//! is the registry's element type.
use rustc_hash::FxHashMap;

use crate::attribute::{AttrChecker, AttributeMap};
use crate::error::{OpError, Result};
use crate::op::{KernelKey, OpDefinition, OpKernel, OperatorWithKernel, Place};
use crate::op_desc::OpDesc;
use crate::operator::Operator;
use crate::proto::{OpProto, OpProtoMaker};
use crate::Float;

/// Builds a kernel from an operator's checked attributes.
pub type KernelFactory<F> =
    Box<dyn Fn(&AttributeMap) -> Result<Box<dyn OpKernel<F>>> + Send + Sync>;

type OpCreator = fn(&AttributeMap) -> Result<Box<dyn OperatorWithKernel>>;

/// Everything the registry knows about one operator type.
pub struct OpInfo {
    pub proto: OpProto,
    pub checker: AttrChecker,
    creator: OpCreator,
    grad_op_type: Option<&'static str>,
}

impl OpInfo {
    #[inline]
    pub fn has_gradient(&self) -> bool {
        self.grad_op_type.is_some()
    }
}

fn create_boxed<T: OpDefinition>(attrs: &AttributeMap) -> Result<Box<dyn OperatorWithKernel>> {
    Ok(Box::new(T::create(attrs)?))
}

pub struct OpRegistry<F: Float> {
    ops: FxHashMap<String, OpInfo>,
    kernels: FxHashMap<String, FxHashMap<KernelKey, KernelFactory<F>>>,
}

impl<F: Float> Default for OpRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl OpRegistry<f32> {
    /// A registry holding the operators this crate ships, with their `f32`
    /// CPU kernels.
    pub fn with_builtin_ops() -> Result<Self> {
        let mut registry = Self::new();
        crate::ops::register_builtin_ops(&mut registry)?;
        Ok(registry)
    }
}

impl<F: Float> OpRegistry<F> {
    pub fn new() -> Self {
        OpRegistry {
            ops: FxHashMap::default(),
            kernels: FxHashMap::default(),
        }
    }

    /// Registers operator `T`. `grad_op_type` names its gradient operator.
    pub fn register_op<T: OpDefinition>(&mut self, grad_op_type: Option<&'static str>) -> Result<()> {
        if self.ops.contains_key(T::TYPE) {
            return Err(OpError::DuplicateRegistration(T::TYPE.to_string()));
        }
        let mut maker = OpProtoMaker::new(T::TYPE);
        T::make_proto(&mut maker);
        let (proto, checker) = maker.finish()?;
        log::debug!(
            "registered op `{}` ({} inputs, {} outputs, {} attrs)",
            T::TYPE,
            proto.inputs.len(),
            proto.outputs.len(),
            proto.attrs.len()
        );
        self.ops.insert(
            T::TYPE.to_string(),
            OpInfo {
                proto,
                checker,
                creator: create_boxed::<T>,
                grad_op_type,
            },
        );
        Ok(())
    }

    /// Registers a terminal operator, one with no gradient.
    #[inline]
    pub fn register_op_without_gradient<T: OpDefinition>(&mut self) -> Result<()> {
        self.register_op::<T>(None)
    }

    /// Registers the kernel of `op_type` for element type `F` on `place`.
    pub fn register_kernel<K>(&mut self, op_type: &str, place: Place, factory: K) -> Result<()>
    where
        K: Fn(&AttributeMap) -> Result<Box<dyn OpKernel<F>>> + Send + Sync + 'static,
    {
        if !self.ops.contains_key(op_type) {
            return Err(OpError::UnregisteredOp(op_type.to_string()));
        }
        let key = KernelKey::new(F::DATA_TYPE, place);
        let kernels = self.kernels.entry(op_type.to_string()).or_default();
        if kernels.contains_key(&key) {
            return Err(OpError::DuplicateRegistration(format!(
                "{} kernel {}",
                op_type, key
            )));
        }
        log::debug!("registered kernel {} for `{}`", key, op_type);
        kernels.insert(key, Box::new(factory));
        Ok(())
    }

    pub fn op_info(&self, op_type: &str) -> Result<&OpInfo> {
        self.ops
            .get(op_type)
            .ok_or_else(|| OpError::UnregisteredOp(op_type.to_string()))
    }

    #[inline]
    pub fn proto(&self, op_type: &str) -> Result<&OpProto> {
        self.op_info(op_type).map(|info| &info.proto)
    }

    pub fn has_kernel(&self, op_type: &str, key: KernelKey) -> bool {
        self.kernels
            .get(op_type)
            .map_or(false, |k| k.contains_key(&key))
    }

    /// Name of the gradient operator of `op_type`.
    pub fn grad_op_type(&self, op_type: &str) -> Result<&'static str> {
        self.op_info(op_type)?
            .grad_op_type
            .ok_or_else(|| OpError::NoGradient(op_type.to_string()))
    }

    /// Lists the registered operator types.
    pub fn op_types(&self) -> Vec<&str> {
        self.ops.keys().map(|k| k.as_str()).collect()
    }

    /// Checks `desc` against the proto and attribute checker of its type, then
    /// instantiates the operator together with all of its kernels.
    pub fn create_op(&self, desc: &OpDesc) -> Result<Operator<F>> {
        let info = self.op_info(&desc.op_type)?;
        let unknown = desc
            .inputs
            .keys()
            .find(|slot| !info.proto.has_input(slot))
            .or_else(|| {
                desc.outputs
                    .keys()
                    .find(|slot| !info.proto.has_output(slot))
            });
        if let Some(slot) = unknown {
            return Err(OpError::UnknownSlot {
                op: desc.op_type.clone(),
                slot: slot.clone(),
            });
        }

        let mut desc = desc.clone();
        info.checker.check(&info.proto.op_type, &mut desc.attrs)?;
        let op = (info.creator)(&desc.attrs)?;

        let mut kernels = FxHashMap::default();
        if let Some(factories) = self.kernels.get(&desc.op_type) {
            for (key, factory) in factories.iter() {
                kernels.insert(*key, factory(&desc.attrs)?);
            }
        }
        log::debug!(
            "created op `{}` with {} kernel(s)",
            desc.op_type,
            kernels.len()
        );
        Ok(Operator { desc, op, kernels })
    }
}

//! Operator registry with a shape-checked Adagrad update.
//!
//! Operators are described by a proto (named input/output slots and typed
//! attributes), validated by shape inference, and executed by per
//! `(data type, place)` kernels over arrays held in a [Scope].
//!
//! ```
//! use adagrad_op as ag;
//! use ag::ndarray;
//! use ag::op::Place;
//!
//! let registry = ag::OpRegistry::with_builtin_ops().unwrap();
//!
//! let mut scope = ag::Scope::<f32>::new();
//! scope.set("w", ndarray::arr1(&[1.0f32]));
//! scope.set("w@GRAD", ndarray::arr1(&[2.0f32]));
//! scope.set("w@MOMENT", ndarray::arr1(&[0.0f32]));
//! scope.set("lr", ndarray::arr0(0.1f32));
//!
//! // In place: outputs are bound to the input variables.
//! let desc = ag::OpDesc::new("adagrad")
//!     .set_input("param", "w")
//!     .set_input("grad", "w@GRAD")
//!     .set_input("moment", "w@MOMENT")
//!     .set_input("learning_rate", "lr")
//!     .set_output("param_out", "w")
//!     .set_output("moment_out", "w@MOMENT")
//!     .set_attr("epsilon", 1e-6f32);
//! let op = registry.create_op(&desc).unwrap();
//! op.run(&mut scope, Place::Cpu).unwrap();
//!
//! assert_eq!(scope.to_owned("w@MOMENT").unwrap(), ndarray::arr1(&[4.0f32]).into_dyn());
//! let w = scope.to_owned("w").unwrap();
//! assert!((w.sum() - 0.9).abs() < 1e-6);
//! ```
#[macro_use]
extern crate serde_derive;

pub use ndarray;

pub mod attribute;
pub mod error;
pub mod ndarray_ext;
pub mod op;
pub mod op_desc;
pub mod operator;
pub mod ops;
pub mod proto;
pub mod registry;
pub mod scope;

use std::fmt;

pub use crate::error::{OpError, Result};
pub use crate::ndarray_ext::NdArray;
pub use crate::op::{DataType, KernelKey, Place};
pub use crate::op_desc::OpDesc;
pub use crate::operator::Operator;
pub use crate::registry::OpRegistry;
pub use crate::scope::Scope;

/// Primitive type in this crate, which is actually a decorated `num_traits::Float`.
pub trait Float:
    num_traits::Float
    + num_traits::NumAssignOps
    + From<f32>
    + Copy
    + Send
    + Sync
    + fmt::Display
    + fmt::Debug
    + Sized
    + serde::Serialize
    + serde::de::DeserializeOwned
    + 'static
{
    /// Data type half of the [KernelKey] of kernels specialized for this type.
    const DATA_TYPE: DataType;
}

impl Float for f32 {
    const DATA_TYPE: DataType = DataType::Fp32;
}

impl Float for f64 {
    const DATA_TYPE: DataType = DataType::Fp64;
}

//! Errors raised while registering, creating, validating or running operators.
use std::fmt;

use crate::attribute::AttrType;
use crate::op::KernelKey;

pub type Result<T> = std::result::Result<T, OpError>;

/// Error in an operator's registration, shape inference or computation.
///
/// Every variant is raised before the operator writes anything to its outputs.
#[derive(Clone, Debug, PartialEq)]
pub enum OpError {
    /// A required input or output slot is not bound for this invocation.
    MissingSlot { op: String, slot: String },
    /// Dimensional or element-count disagreement between slots.
    ShapeMismatch(String),
    /// A required attribute was not given and has no default.
    MissingAttr { op: String, attr: String },
    AttrTypeMismatch {
        attr: String,
        expected: AttrType,
        got: AttrType,
    },
    /// The description binds a slot that the operator's proto doesn't declare.
    UnknownSlot { op: String, slot: String },
    UnregisteredOp(String),
    DuplicateRegistration(String),
    KernelNotFound { op: String, key: KernelKey },
    /// The operator was registered without a gradient operator.
    NoGradient(String),
    /// A slot is bound to a variable that doesn't exist in the scope.
    MissingVariable(String),
    /// Two slots resolve to the same variable in a way that can't be borrowed.
    BorrowConflict(String),
    /// Malformed operator description.
    Config(String),
}

impl std::error::Error for OpError {}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OpError::MissingSlot { op, slot } => {
                write!(f, "slot `{}` of op `{}` should not be null", slot, op)
            }
            OpError::ShapeMismatch(s) => write!(f, "shape mismatch: {}", s),
            OpError::MissingAttr { op, attr } => {
                write!(f, "attribute `{}` of op `{}` is required", attr, op)
            }
            OpError::AttrTypeMismatch {
                attr,
                expected,
                got,
            } => write!(
                f,
                "attribute `{}` expects {:?}, got {:?}",
                attr, expected, got
            ),
            OpError::UnknownSlot { op, slot } => {
                write!(f, "op `{}` has no slot named `{}`", op, slot)
            }
            OpError::UnregisteredOp(s) => write!(f, "op `{}` is not registered", s),
            OpError::DuplicateRegistration(s) => write!(f, "`{}` is already registered", s),
            OpError::KernelNotFound { op, key } => write!(
                f,
                "op `{}` has no kernel for {:?} on {:?}",
                op, key.data_type, key.place
            ),
            OpError::NoGradient(s) => write!(f, "op `{}` has no gradient op", s),
            OpError::MissingVariable(s) => write!(f, "variable `{}` is not in the scope", s),
            OpError::BorrowConflict(s) => write!(f, "borrow conflict: {}", s),
            OpError::Config(s) => write!(f, "bad op description: {}", s),
        }
    }
}

impl From<serde_json::Error> for OpError {
    fn from(e: serde_json::Error) -> Self {
        OpError::Config(e.to_string())
    }
}

//! Operators shipped with this crate.
pub mod adagrad;

pub use adagrad::{adagrad_update, AdagradKernel, AdagradOp};

use crate::error::Result;
use crate::registry::OpRegistry;

/// Registers every built-in operator and its `f32` CPU kernel.
pub fn register_builtin_ops(registry: &mut OpRegistry<f32>) -> Result<()> {
    adagrad::register(registry)
}

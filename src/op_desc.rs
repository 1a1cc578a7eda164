//! Description of one operator instance: its type, slot bindings and attributes.
//!
//! Slots are bound to variable names of a [crate::scope::Scope]. Binding an
//! output slot to the same variable as an input slot makes the op run in place.
//!
//! ```
//! use adagrad_op::op_desc::OpDesc;
//!
//! let desc = OpDesc::from_json(r#"{
//!     "type": "adagrad",
//!     "inputs": {"param": "w", "grad": "w@GRAD", "moment": "w@MOMENT", "learning_rate": "lr"},
//!     "outputs": {"param_out": "w", "moment_out": "w@MOMENT"},
//!     "attrs": {"epsilon": 1e-6}
//! }"#).unwrap();
//! assert_eq!(desc.input("grad"), Some("w@GRAD"));
//! ```
use std::collections::BTreeMap;

use crate::attribute::{Attribute, AttributeMap};
use crate::error::Result;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OpDesc {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub attrs: AttributeMap,
}

impl OpDesc {
    pub fn new<S: Into<String>>(op_type: S) -> Self {
        OpDesc {
            op_type: op_type.into(),
            ..Default::default()
        }
    }

    /// Binds input `slot` to the variable `var`.
    pub fn set_input<S: Into<String>, V: Into<String>>(mut self, slot: S, var: V) -> Self {
        self.inputs.insert(slot.into(), var.into());
        self
    }

    /// Binds output `slot` to the variable `var`.
    pub fn set_output<S: Into<String>, V: Into<String>>(mut self, slot: S, var: V) -> Self {
        self.outputs.insert(slot.into(), var.into());
        self
    }

    pub fn set_attr<S: Into<String>, A: Into<Attribute>>(mut self, name: S, value: A) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Variable bound to input `slot`.
    #[inline]
    pub fn input(&self, slot: &str) -> Option<&str> {
        self.inputs.get(slot).map(|s| s.as_str())
    }

    /// Variable bound to output `slot`.
    #[inline]
    pub fn output(&self, slot: &str) -> Option<&str> {
        self.outputs.get(slot).map(|s| s.as_str())
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

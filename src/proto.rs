//! Declarative description of an operator's slots and attributes.
use crate::attribute::{AttrChecker, AttrRuleBuilder, AttrType, AttrValue};
use crate::error::{OpError, Result};

/// A named input or output slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarProto {
    pub name: String,
    pub comment: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttrProto {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: AttrType,
    pub comment: String,
}

/// What an operator consumes, produces and is configured with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpProto {
    #[serde(rename = "type")]
    pub op_type: String,
    pub inputs: Vec<VarProto>,
    pub outputs: Vec<VarProto>,
    pub attrs: Vec<AttrProto>,
    pub comment: String,
}

impl OpProto {
    #[inline]
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|v| v.name == name)
    }

    #[inline]
    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|v| v.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds an [OpProto] and the matching [AttrChecker] side by side.
///
/// ```
/// use adagrad_op::proto::OpProtoMaker;
///
/// let mut maker = OpProtoMaker::new("scale");
/// maker.add_input("x", "Input tensor");
/// maker.add_output("out", "Scaled tensor");
/// maker.add_attr::<f32>("factor", "Scale factor").set_default(1.0);
/// maker.add_comment("out = factor * x");
/// let (proto, _checker) = maker.finish().unwrap();
/// assert!(proto.has_input("x"));
/// ```
pub struct OpProtoMaker {
    proto: OpProto,
    checker: AttrChecker,
}

impl OpProtoMaker {
    pub fn new<S: Into<String>>(op_type: S) -> Self {
        OpProtoMaker {
            proto: OpProto {
                op_type: op_type.into(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                attrs: Vec::new(),
                comment: String::new(),
            },
            checker: AttrChecker::new(),
        }
    }

    pub fn add_input<S: Into<String>>(&mut self, name: S, comment: &str) -> &mut Self {
        self.proto.inputs.push(VarProto {
            name: name.into(),
            comment: comment.to_string(),
        });
        self
    }

    pub fn add_output<S: Into<String>>(&mut self, name: S, comment: &str) -> &mut Self {
        self.proto.outputs.push(VarProto {
            name: name.into(),
            comment: comment.to_string(),
        });
        self
    }

    /// Declares an attribute. It is required unless a default is set on the
    /// returned builder.
    pub fn add_attr<T: AttrValue>(&mut self, name: &str, comment: &str) -> AttrRuleBuilder<T> {
        self.proto.attrs.push(AttrProto {
            name: name.to_string(),
            ty: T::TYPE,
            comment: comment.to_string(),
        });
        self.checker.add_attr::<T, _>(name)
    }

    pub fn add_comment(&mut self, comment: &str) -> &mut Self {
        self.proto.comment = comment.trim().to_string();
        self
    }

    /// Checks that no slot or attribute name is declared twice.
    pub fn finish(self) -> Result<(OpProto, AttrChecker)> {
        let mut names: Vec<&str> = Vec::new();
        let slots = self.proto.inputs.iter().chain(self.proto.outputs.iter());
        for name in slots
            .map(|v| v.name.as_str())
            .chain(self.proto.attrs.iter().map(|a| a.name.as_str()))
        {
            if names.contains(&name) {
                return Err(OpError::DuplicateRegistration(format!(
                    "{}.{}",
                    self.proto.op_type, name
                )));
            }
            names.push(name);
        }
        Ok((self.proto, self.checker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicated_slot() {
        let mut maker = OpProtoMaker::new("dup");
        maker.add_input("x", "").add_output("x", "");
        assert_eq!(
            maker.finish().unwrap_err(),
            OpError::DuplicateRegistration("dup.x".to_string())
        );
    }
}

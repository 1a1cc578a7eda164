//! Per-instance operator configuration.
//!
//! Attributes are fixed when an operator is created, unlike tensors which are
//! bound per invocation. Each registered op owns an [AttrChecker] built from its
//! proto; the checker fills defaults and rejects missing or mistyped values
//! before the op's constructor ever sees them.
use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::error::{OpError, Result};

/// Attributes keyed by name.
pub type AttributeMap = BTreeMap<String, Attribute>;

/// A single attribute value.
///
/// Serialized untagged, so JSON `1e-6` reads as `Float` and `3` as `Int`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attribute {
    Bool(bool),
    Int(i64),
    Float(f32),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    Bool,
    Int,
    Float,
    String,
    Ints,
    Floats,
}

impl Attribute {
    pub fn attr_type(&self) -> AttrType {
        match self {
            Attribute::Bool(_) => AttrType::Bool,
            Attribute::Int(_) => AttrType::Int,
            Attribute::Float(_) => AttrType::Float,
            Attribute::String(_) => AttrType::String,
            Attribute::Ints(_) => AttrType::Ints,
            Attribute::Floats(_) => AttrType::Floats,
        }
    }

    // Integers written where a float is declared are widened.
    fn coerce(self, ty: AttrType) -> Self {
        match (self, ty) {
            (Attribute::Int(i), AttrType::Float) => Attribute::Float(i as f32),
            (Attribute::Ints(v), AttrType::Floats) => {
                Attribute::Floats(v.into_iter().map(|i| i as f32).collect())
            }
            (a, _) => a,
        }
    }
}

/// Rust types that can be stored as an [Attribute].
pub trait AttrValue: Sized + Clone {
    const TYPE: AttrType;

    fn from_attr(attr: &Attribute) -> Option<Self>;

    fn into_attr(self) -> Attribute;
}

macro_rules! impl_attr_value {
    ($ty:ty, $variant:ident) => {
        impl AttrValue for $ty {
            const TYPE: AttrType = AttrType::$variant;

            #[inline]
            fn from_attr(attr: &Attribute) -> Option<Self> {
                match attr {
                    Attribute::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            #[inline]
            fn into_attr(self) -> Attribute {
                Attribute::$variant(self)
            }
        }

        impl From<$ty> for Attribute {
            fn from(v: $ty) -> Attribute {
                v.into_attr()
            }
        }
    };
}

impl_attr_value!(bool, Bool);
impl_attr_value!(i64, Int);
impl_attr_value!(f32, Float);
impl_attr_value!(String, String);
impl_attr_value!(Vec<i64>, Ints);
impl_attr_value!(Vec<f32>, Floats);

impl From<&str> for Attribute {
    fn from(v: &str) -> Attribute {
        Attribute::String(v.to_string())
    }
}

/// Looks up a typed attribute.
///
/// Expects `attrs` to have passed the op's [AttrChecker]; a missing or
/// mistyped value is still reported instead of panicking.
pub fn get_attr<T: AttrValue>(op: &str, attrs: &AttributeMap, name: &str) -> Result<T> {
    let attr = attrs.get(name).ok_or_else(|| OpError::MissingAttr {
        op: op.to_string(),
        attr: name.to_string(),
    })?;
    T::from_attr(attr).ok_or_else(|| OpError::AttrTypeMismatch {
        attr: name.to_string(),
        expected: T::TYPE,
        got: attr.attr_type(),
    })
}

#[derive(Clone, Debug)]
struct AttrRule {
    name: String,
    ty: AttrType,
    default: Option<Attribute>,
}

/// Validates attribute maps against an op's declared attributes.
#[derive(Clone, Debug, Default)]
pub struct AttrChecker {
    rules: Vec<AttrRule>,
}

/// Returned by [AttrChecker::add_attr] to attach a default value.
pub struct AttrRuleBuilder<'c, T: AttrValue> {
    rule: &'c mut AttrRule,
    phantom: PhantomData<T>,
}

impl<'c, T: AttrValue> AttrRuleBuilder<'c, T> {
    /// Makes the attribute optional.
    pub fn set_default(self, value: T) {
        self.rule.default = Some(value.into_attr());
    }
}

impl AttrChecker {
    pub fn new() -> Self {
        AttrChecker { rules: Vec::new() }
    }

    /// Declares a required attribute of type `T`.
    pub fn add_attr<T: AttrValue, S: Into<String>>(&mut self, name: S) -> AttrRuleBuilder<T> {
        self.rules.push(AttrRule {
            name: name.into(),
            ty: T::TYPE,
            default: None,
        });
        let last = self.rules.len() - 1;
        AttrRuleBuilder {
            rule: &mut self.rules[last],
            phantom: PhantomData,
        }
    }

    /// Fills defaults and checks presence and type of every declared attribute.
    ///
    /// Undeclared attributes are left as they are.
    pub fn check(&self, op: &str, attrs: &mut AttributeMap) -> Result<()> {
        for rule in self.rules.iter() {
            let value = match attrs.remove(&rule.name) {
                Some(v) => v.coerce(rule.ty),
                None => match rule.default {
                    Some(ref d) => d.clone(),
                    None => {
                        return Err(OpError::MissingAttr {
                            op: op.to_string(),
                            attr: rule.name.clone(),
                        })
                    }
                },
            };
            if value.attr_type() != rule.ty {
                return Err(OpError::AttrTypeMismatch {
                    attr: rule.name.clone(),
                    expected: rule.ty,
                    got: value.attr_type(),
                });
            }
            attrs.insert(rule.name.clone(), value);
        }
        Ok(())
    }
}

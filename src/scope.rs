//! ## Scope
//!
//! Caller-owned storage of named arrays. Operators borrow arrays from a scope
//! while they run and keep nothing afterwards, so state that must survive a
//! training step (e.g. an Adagrad accumulator) lives here.
//!
//! ```
//! use adagrad_op::ndarray_ext;
//! use adagrad_op::scope::Scope;
//!
//! let mut scope = Scope::<f32>::new();
//! scope.set("w", ndarray_ext::zeros(&[2, 3]));
//! assert!(scope.contains("w"));
//! assert_eq!(scope.get("w").unwrap().borrow().shape(), &[2, 3]);
//! ```
use std::cell::RefCell;

use rustc_hash::FxHashMap;

use crate::ndarray_ext::NdArray;
use crate::Float;

/// Index of a variable in its scope.
///
/// Two slots resolving to the same `VarId` share one buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VarId(pub(crate) usize);

#[derive(Clone, Default)]
pub struct Scope<F> {
    pub(crate) array_list: Vec<RefCell<NdArray<F>>>,
    pub(crate) name_to_id: FxHashMap<String, VarId>,
}

impl<F: Float> Scope<F> {
    pub fn new() -> Self {
        Scope {
            array_list: Vec::new(),
            name_to_id: FxHashMap::default(),
        }
    }

    /// Stores `v` under `name`, replacing the previous array if any.
    ///
    /// Replacing keeps the `VarId`.
    pub fn set<S: Into<String>, D: ndarray::Dimension>(
        &mut self,
        name: S,
        v: ndarray::Array<F, D>,
    ) -> VarId {
        let name = name.into();
        let v = v.into_dyn();
        match self.name_to_id.get(&name) {
            Some(&vid) => {
                *self.array_list[vid.0].get_mut() = v;
                vid
            }
            None => {
                let vid = VarId(self.array_list.len());
                self.array_list.push(RefCell::new(v));
                self.name_to_id.insert(name, vid);
                vid
            }
        }
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_id.contains_key(name)
    }

    #[inline]
    pub fn var_id(&self, name: &str) -> Option<VarId> {
        self.name_to_id.get(name).copied()
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&RefCell<NdArray<F>>> {
        self.var_id(name).map(|vid| self.get_by_id(vid))
    }

    #[inline]
    pub(crate) fn get_by_id(&self, vid: VarId) -> &RefCell<NdArray<F>> {
        &self.array_list[vid.0]
    }

    /// Clones the array stored under `name`.
    pub fn to_owned(&self, name: &str) -> Option<NdArray<F>> {
        self.get(name).map(|a| a.borrow().clone())
    }
}

#[test]
fn test_set_keeps_id() {
    let mut scope = Scope::<f64>::new();
    let a = scope.set("a", ndarray::arr1(&[1., 2.]));
    let b = scope.set("b", ndarray::arr0(0.));
    let a2 = scope.set("a", ndarray::arr2(&[[3.], [4.]]));
    assert_eq!(a, a2);
    assert_ne!(a, b);
    assert_eq!(scope.to_owned("a").unwrap().shape(), &[2, 1]);
    assert!(scope.get("c").is_none());
}

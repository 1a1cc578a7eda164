//! A small extension of rust-ndarray
//!
//! Array aliases, shape helpers and [ArrayRng], a seeded random array generator.
use std::cell::RefCell;
use std::marker::PhantomData;

use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_distr::{Normal, StandardNormal};
use rand_xorshift::XorShiftRng;
use smallvec::SmallVec;

use crate::Float;

pub type NdArray<T> = ndarray::Array<T, ndarray::IxDyn>;

pub type NdArrayView<'a, T> = ndarray::ArrayView<'a, T, ndarray::IxDyn>;

pub type NdArrayViewMut<'a, T> = ndarray::ArrayViewMut<'a, T, ndarray::IxDyn>;

/// Shape metadata. Most tensors have rank 4 or below.
pub type Dims = SmallVec<[usize; 4]>;

/// Number of elements of a tensor with shape `dims`.
///
/// The empty shape describes a scalar and has one element. `None` if the
/// count overflows `usize`.
#[inline]
pub fn product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

#[inline]
pub fn dims_of<T>(x: &NdArray<T>) -> Dims {
    SmallVec::from_slice(x.shape())
}

#[inline]
pub fn zeros<T: Float>(shape: &[usize]) -> NdArray<T> {
    NdArray::<T>::zeros(shape)
}

#[inline]
pub fn from_scalar<T: Float>(val: T) -> NdArray<T> {
    ndarray::arr0(val).into_dyn()
}

/// Creates ndarrays whose elements are random numbers.
///
/// This is a wrapper of an arbitrary `rand::Rng`; `default` seeds an
/// `XorShiftRng` with a fixed value so results are reproducible.
pub struct ArrayRng<T: Float, R: Rng = XorShiftRng> {
    phantom: PhantomData<T>,
    rng: RefCell<R>,
}

impl<T: Float> Default for ArrayRng<T> {
    fn default() -> Self {
        ArrayRng::new(XorShiftRng::seed_from_u64(42))
    }
}

impl<T: Float, R: Rng> ArrayRng<T, R> {
    pub fn new(rng: R) -> Self {
        ArrayRng {
            phantom: PhantomData,
            rng: RefCell::new(rng),
        }
    }

    /// Samples every element from `dist`.
    ///
    /// Panics if the element count of `shape` overflows `usize`.
    pub fn random_array<D: Distribution<f32>>(&self, shape: &[usize], dist: D) -> NdArray<T> {
        let len = product(shape).expect("shape size overflows usize");
        let mut rng = self.rng.borrow_mut();
        let buf = dist
            .sample_iter(&mut *rng)
            .take(len)
            .map(<T as From<f32>>::from)
            .collect::<Vec<T>>();
        // `buf` always has `len` elements
        NdArray::from_shape_vec(ndarray::IxDyn(shape), buf).unwrap()
    }

    pub fn standard_normal(&self, shape: &[usize]) -> NdArray<T> {
        self.random_array(shape, StandardNormal)
    }

    /// Panics if `stddev` is negative or not finite.
    pub fn normal(&self, shape: &[usize], mean: f32, stddev: f32) -> NdArray<T> {
        let dist = Normal::new(mean, stddev).expect("invalid normal distribution");
        self.random_array(shape, dist)
    }

    pub fn uniform(&self, shape: &[usize], lo: f32, hi: f32) -> NdArray<T> {
        self.random_array(shape, Uniform::new(lo, hi))
    }
}

#[test]
fn test_rng_shapes() {
    let rng = ArrayRng::<f32>::default();
    assert_eq!(rng.standard_normal(&[3, 2]).shape(), &[3, 2]);
    let u = rng.uniform(&[10], 0.5, 1.0);
    assert!(u.iter().all(|&a| (0.5..1.0).contains(&a)));
    assert_eq!(rng.normal(&[], 0., 1.).len(), 1);
}

#[test]
fn test_product_of_scalar_shape() {
    assert_eq!(product(&[]), Some(1));
    assert_eq!(product(&[4, 0]), Some(0));
    assert_eq!(product(&[2, 3]), Some(6));
}

#[test]
fn test_product_overflow() {
    assert_eq!(product(&[usize::MAX, 2]), None);
    assert_eq!(product(&[usize::MAX, 1]), Some(usize::MAX));
    assert_eq!(product(&[usize::MAX, 2, 0]), None);
}

use nalgebra::RealField;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

pub use nalgebra;

pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// A scalar that may flow through a residual computation.
///
/// Implemented by `f64` and by the dual numbers of `fekern::ad`, so that residual expressions,
/// material models and table lookups can be written once and evaluated either as plain values or
/// with derivatives attached. All derivative information is carried implicitly: for `f64` the
/// functions below are the ordinary real functions, for dual numbers they additionally apply the
/// chain rule.
///
/// Comparisons (`PartialEq`/`PartialOrd`, also against `f64`) only look at the value.
pub trait GenericReal:
    Clone
    + Debug
    + PartialEq
    + PartialOrd
    + PartialEq<f64>
    + PartialOrd<f64>
    + Send
    + Sync
    + 'static
    + From<f64>
    + num::Zero
    + num::One
    + Neg<Output = Self>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + AddAssign<f64>
    + MulAssign<f64>
{
    /// The plain value, without any derivative information.
    fn value(&self) -> f64;

    fn sqrt(&self) -> Self;
    fn exp(&self) -> Self;
    fn ln(&self) -> Self;
    fn powf(&self, exponent: f64) -> Self;
    fn powi(&self, exponent: i32) -> Self;
    fn abs(&self) -> Self;
    fn sin(&self) -> Self;
    fn cos(&self) -> Self;
    fn tanh(&self) -> Self;

    /// Whether the value (and any derivatives) are finite.
    fn is_finite(&self) -> bool;
}

impl GenericReal for f64 {
    fn value(&self) -> f64 {
        *self
    }

    fn sqrt(&self) -> Self {
        f64::sqrt(*self)
    }

    fn exp(&self) -> Self {
        f64::exp(*self)
    }

    fn ln(&self) -> Self {
        f64::ln(*self)
    }

    fn powf(&self, exponent: f64) -> Self {
        f64::powf(*self, exponent)
    }

    fn powi(&self, exponent: i32) -> Self {
        f64::powi(*self, exponent)
    }

    fn abs(&self) -> Self {
        f64::abs(*self)
    }

    fn sin(&self) -> Self {
        f64::sin(*self)
    }

    fn cos(&self) -> Self {
        f64::cos(*self)
    }

    fn tanh(&self) -> Self {
        f64::tanh(*self)
    }

    fn is_finite(&self) -> bool {
        f64::is_finite(*self)
    }
}

use crate::ad::derivatives::Derivatives;
use crate::ad::policy::report_imperfect_jacobian;
use crate::error::ADError;
use fekern_traits::GenericReal;
use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// A forward-mode dual number: a value together with its partial derivatives.
///
/// Every arithmetic operation combines the derivatives of its operands by the chain rule, so that
/// an expression built purely from dual numbers yields its exact first derivatives with respect
/// to all seeded slots alongside its value.
///
/// Comparison operators only look at the value. Code that branches on a dual number therefore
/// produces a Jacobian that is exact only if the branch condition does not itself depend smoothly
/// on the differentiated variables.
#[derive(Clone, Copy, Default)]
pub struct DualNumber<D> {
    value: f64,
    derivatives: D,
}

impl<D: Derivatives> DualNumber<D> {
    pub fn new(value: f64, derivatives: D) -> Self {
        Self { value, derivatives }
    }

    /// A value with vanishing derivatives.
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            derivatives: D::default(),
        }
    }

    /// An independent variable: the derivative with respect to `slot` is one.
    pub fn variable(value: f64, slot: usize) -> Self {
        Self::scaled_variable(value, slot, 1.0)
    }

    /// An independent variable whose derivative with respect to `slot` is `seed`.
    pub fn scaled_variable(value: f64, slot: usize, seed: f64) -> Self {
        let mut derivatives = D::default();
        derivatives.insert(slot, seed);
        Self { value, derivatives }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn derivatives(&self) -> &D {
        &self.derivatives
    }

    pub fn derivatives_mut(&mut self) -> &mut D {
        &mut self.derivatives
    }

    /// The partial derivative with respect to `slot`.
    pub fn derivative(&self, slot: usize) -> f64 {
        self.derivatives.get(slot)
    }

    /// Applies a scalar function with value `f_value` and derivative `f_prime` at `self.value`.
    pub fn chain(mut self, f_value: f64, f_prime: f64) -> Self {
        self.value = f_value;
        self.derivatives.scale(f_prime);
        self
    }

    /// Drops the derivatives of a value whose derivative is not implemented.
    ///
    /// Whether this is an error or merely a warning is governed by the current
    /// [`ADErrorPolicy`](crate::ad::ADErrorPolicy).
    pub fn imperfect_jacobian(&self, context: &str) -> Result<Self, ADError> {
        report_imperfect_jacobian(context)?;
        Ok(Self::constant(self.value))
    }

    pub fn exp(&self) -> Self {
        let e = self.value.exp();
        self.clone().chain(e, e)
    }

    pub fn ln(&self) -> Self {
        let x = self.value;
        self.clone().chain(x.ln(), 1.0 / x)
    }

    pub fn sqrt(&self) -> Self {
        let s = self.value.sqrt();
        self.clone().chain(s, 0.5 / s)
    }

    pub fn powf(&self, exponent: f64) -> Self {
        let x = self.value;
        self.clone()
            .chain(x.powf(exponent), exponent * x.powf(exponent - 1.0))
    }

    pub fn powi(&self, exponent: i32) -> Self {
        let x = self.value;
        let f_prime = if exponent == 0 {
            0.0
        } else {
            f64::from(exponent) * x.powi(exponent - 1)
        };
        self.clone().chain(x.powi(exponent), f_prime)
    }

    /// `self^exponent` for a dual exponent.
    ///
    /// d(a^b) = b a^(b-1) da + a^b ln(a) db
    pub fn pow(&self, exponent: &Self) -> Self {
        let (a, b) = (self.value, exponent.value);
        let value = a.powf(b);
        let mut derivatives = self.derivatives.clone();
        derivatives.scale(b * a.powf(b - 1.0));
        if exponent.derivatives != D::default() {
            derivatives.axpy(value * a.ln(), &exponent.derivatives);
        }
        Self { value, derivatives }
    }

    pub fn abs(&self) -> Self {
        let x = self.value;
        let sign = if x >= 0.0 { 1.0 } else { -1.0 };
        self.clone().chain(x.abs(), sign)
    }

    pub fn sin(&self) -> Self {
        let x = self.value;
        self.clone().chain(x.sin(), x.cos())
    }

    pub fn cos(&self) -> Self {
        let x = self.value;
        self.clone().chain(x.cos(), -x.sin())
    }

    pub fn tan(&self) -> Self {
        let t = self.value.tan();
        self.clone().chain(t, 1.0 + t * t)
    }

    pub fn tanh(&self) -> Self {
        let t = self.value.tanh();
        self.clone().chain(t, 1.0 - t * t)
    }

    pub fn atan(&self) -> Self {
        let x = self.value;
        self.clone().chain(x.atan(), 1.0 / (1.0 + x * x))
    }

    /// The larger of the two values, together with its derivatives.
    pub fn max(self, other: Self) -> Self {
        if other.value > self.value {
            other
        } else {
            self
        }
    }

    /// The smaller of the two values, together with its derivatives.
    pub fn min(self, other: Self) -> Self {
        if other.value < self.value {
            other
        } else {
            self
        }
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite() && self.derivatives.is_finite()
    }

    fn add_in_place(&mut self, other: &Self) {
        self.value += other.value;
        self.derivatives.axpy(1.0, &other.derivatives);
    }

    fn sub_in_place(&mut self, other: &Self) {
        self.value -= other.value;
        self.derivatives.axpy(-1.0, &other.derivatives);
    }

    fn mul_in_place(&mut self, other: &Self) {
        // d(ab) = b da + a db
        self.derivatives.scale(other.value);
        self.derivatives.axpy(self.value, &other.derivatives);
        self.value *= other.value;
    }

    fn div_in_place(&mut self, other: &Self) {
        // d(a/b) = da / b - a db / b^2
        let b = other.value;
        self.derivatives.scale(1.0 / b);
        self.derivatives.axpy(-self.value / (b * b), &other.derivatives);
        self.value /= b;
    }
}

impl<D: fmt::Debug> fmt::Debug for DualNumber<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualNumber")
            .field("value", &self.value)
            .field("derivatives", &self.derivatives)
            .finish()
    }
}

impl<D: Derivatives> fmt::Display for DualNumber<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.value)?;
        let mut first = true;
        let mut result = Ok(());
        self.derivatives.for_each_entry(|slot, d| {
            if result.is_ok() {
                result = if first {
                    write!(f, "{}: {}", slot, d)
                } else {
                    write!(f, ", {}: {}", slot, d)
                };
                first = false;
            }
        });
        result?;
        write!(f, "]")
    }
}

impl<D: Derivatives> From<f64> for DualNumber<D> {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl<D> PartialEq for DualNumber<D> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<D> PartialOrd for DualNumber<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl<D> PartialEq<f64> for DualNumber<D> {
    fn eq(&self, other: &f64) -> bool {
        self.value == *other
    }
}

impl<D> PartialOrd<f64> for DualNumber<D> {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.value.partial_cmp(other)
    }
}

impl<D> PartialEq<DualNumber<D>> for f64 {
    fn eq(&self, other: &DualNumber<D>) -> bool {
        *self == other.value
    }
}

impl<D> PartialOrd<DualNumber<D>> for f64 {
    fn partial_cmp(&self, other: &DualNumber<D>) -> Option<Ordering> {
        self.partial_cmp(&other.value)
    }
}

impl<D: Derivatives> Neg for DualNumber<D> {
    type Output = Self;

    fn neg(mut self) -> Self {
        self.value = -self.value;
        self.derivatives.scale(-1.0);
        self
    }
}

impl<'a, D: Derivatives> Neg for &'a DualNumber<D> {
    type Output = DualNumber<D>;

    fn neg(self) -> DualNumber<D> {
        -self.clone()
    }
}

macro_rules! impl_dual_binary_op {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $in_place:ident) => {
        impl<D: Derivatives> $trait for DualNumber<D> {
            type Output = Self;

            fn $method(mut self, rhs: Self) -> Self {
                self.$in_place(&rhs);
                self
            }
        }

        impl<'a, D: Derivatives> $trait<&'a DualNumber<D>> for DualNumber<D> {
            type Output = Self;

            fn $method(mut self, rhs: &'a DualNumber<D>) -> Self {
                self.$in_place(rhs);
                self
            }
        }

        impl<'a, D: Derivatives> $trait<DualNumber<D>> for &'a DualNumber<D> {
            type Output = DualNumber<D>;

            fn $method(self, rhs: DualNumber<D>) -> DualNumber<D> {
                let mut result = self.clone();
                result.$in_place(&rhs);
                result
            }
        }

        impl<'a, 'b, D: Derivatives> $trait<&'b DualNumber<D>> for &'a DualNumber<D> {
            type Output = DualNumber<D>;

            fn $method(self, rhs: &'b DualNumber<D>) -> DualNumber<D> {
                let mut result = self.clone();
                result.$in_place(rhs);
                result
            }
        }

        impl<D: Derivatives> $assign_trait for DualNumber<D> {
            fn $assign_method(&mut self, rhs: Self) {
                self.$in_place(&rhs);
            }
        }

        impl<'a, D: Derivatives> $assign_trait<&'a DualNumber<D>> for DualNumber<D> {
            fn $assign_method(&mut self, rhs: &'a DualNumber<D>) {
                self.$in_place(rhs);
            }
        }
    };
}

impl_dual_binary_op!(Add, add, AddAssign, add_assign, add_in_place);
impl_dual_binary_op!(Sub, sub, SubAssign, sub_assign, sub_in_place);
impl_dual_binary_op!(Mul, mul, MulAssign, mul_assign, mul_in_place);
impl_dual_binary_op!(Div, div, DivAssign, div_assign, div_in_place);

impl<D: Derivatives> AddAssign<f64> for DualNumber<D> {
    fn add_assign(&mut self, rhs: f64) {
        self.value += rhs;
    }
}

impl<D: Derivatives> SubAssign<f64> for DualNumber<D> {
    fn sub_assign(&mut self, rhs: f64) {
        self.value -= rhs;
    }
}

impl<D: Derivatives> MulAssign<f64> for DualNumber<D> {
    fn mul_assign(&mut self, rhs: f64) {
        self.value *= rhs;
        self.derivatives.scale(rhs);
    }
}

impl<D: Derivatives> DivAssign<f64> for DualNumber<D> {
    fn div_assign(&mut self, rhs: f64) {
        self.value /= rhs;
        self.derivatives.scale(1.0 / rhs);
    }
}

macro_rules! impl_dual_scalar_op {
    ($trait:ident, $method:ident, $assign_method:ident) => {
        impl<D: Derivatives> $trait<f64> for DualNumber<D> {
            type Output = Self;

            fn $method(mut self, rhs: f64) -> Self {
                self.$assign_method(rhs);
                self
            }
        }

        impl<'a, D: Derivatives> $trait<f64> for &'a DualNumber<D> {
            type Output = DualNumber<D>;

            fn $method(self, rhs: f64) -> DualNumber<D> {
                let mut result = self.clone();
                result.$assign_method(rhs);
                result
            }
        }
    };
}

impl_dual_scalar_op!(Add, add, add_assign);
impl_dual_scalar_op!(Sub, sub, sub_assign);
impl_dual_scalar_op!(Mul, mul, mul_assign);
impl_dual_scalar_op!(Div, div, div_assign);

impl<D: Derivatives> Add<DualNumber<D>> for f64 {
    type Output = DualNumber<D>;

    fn add(self, rhs: DualNumber<D>) -> DualNumber<D> {
        rhs + self
    }
}

impl<D: Derivatives> Sub<DualNumber<D>> for f64 {
    type Output = DualNumber<D>;

    fn sub(self, rhs: DualNumber<D>) -> DualNumber<D> {
        -rhs + self
    }
}

impl<D: Derivatives> Mul<DualNumber<D>> for f64 {
    type Output = DualNumber<D>;

    fn mul(self, rhs: DualNumber<D>) -> DualNumber<D> {
        rhs * self
    }
}

impl<D: Derivatives> Div<DualNumber<D>> for f64 {
    type Output = DualNumber<D>;

    fn div(self, rhs: DualNumber<D>) -> DualNumber<D> {
        // d(s/b) = -s db / b^2
        let b = rhs.value;
        rhs.chain(self / b, -self / (b * b))
    }
}

impl<'a, D: Derivatives> Add<&'a DualNumber<D>> for f64 {
    type Output = DualNumber<D>;

    fn add(self, rhs: &'a DualNumber<D>) -> DualNumber<D> {
        self + rhs.clone()
    }
}

impl<'a, D: Derivatives> Sub<&'a DualNumber<D>> for f64 {
    type Output = DualNumber<D>;

    fn sub(self, rhs: &'a DualNumber<D>) -> DualNumber<D> {
        self - rhs.clone()
    }
}

impl<'a, D: Derivatives> Mul<&'a DualNumber<D>> for f64 {
    type Output = DualNumber<D>;

    fn mul(self, rhs: &'a DualNumber<D>) -> DualNumber<D> {
        self * rhs.clone()
    }
}

impl<'a, D: Derivatives> Div<&'a DualNumber<D>> for f64 {
    type Output = DualNumber<D>;

    fn div(self, rhs: &'a DualNumber<D>) -> DualNumber<D> {
        self / rhs.clone()
    }
}

impl<D: Derivatives> Sum for DualNumber<D> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::constant(0.0), |acc, x| acc + x)
    }
}

impl<D: Derivatives> num::Zero for DualNumber<D> {
    fn zero() -> Self {
        Self::constant(0.0)
    }

    fn is_zero(&self) -> bool {
        self.value == 0.0 && self.derivatives == D::default()
    }
}

impl<D: Derivatives> num::One for DualNumber<D> {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl<D: Derivatives> GenericReal for DualNumber<D> {
    fn value(&self) -> f64 {
        self.value
    }

    fn sqrt(&self) -> Self {
        DualNumber::sqrt(self)
    }

    fn exp(&self) -> Self {
        DualNumber::exp(self)
    }

    fn ln(&self) -> Self {
        DualNumber::ln(self)
    }

    fn powf(&self, exponent: f64) -> Self {
        DualNumber::powf(self, exponent)
    }

    fn powi(&self, exponent: i32) -> Self {
        DualNumber::powi(self, exponent)
    }

    fn abs(&self) -> Self {
        DualNumber::abs(self)
    }

    fn sin(&self) -> Self {
        DualNumber::sin(self)
    }

    fn cos(&self) -> Self {
        DualNumber::cos(self)
    }

    fn tanh(&self) -> Self {
        DualNumber::tanh(self)
    }

    fn is_finite(&self) -> bool {
        DualNumber::is_finite(self)
    }
}

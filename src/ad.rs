//! Forward-mode automatic differentiation with dual numbers.
//!
//! A [`DualNumber`] carries a value together with the partial derivatives of that value with
//! respect to a set of independent variables, each identified by a derivative *slot*. Kernels seed
//! one slot per local degree of freedom and then evaluate their residual expression with
//! [`ADReal`], which yields the exact Jacobian row of the residual alongside its value.
//!
//! The storage of the derivatives is selected at compile time: by default derivatives are stored
//! in a dense stack array with [`AD_MAX_DOFS_PER_ELEM`] slots. With the `sparse-derivatives`
//! feature, derivatives are instead stored as a sorted list of nonzero entries.
mod derivatives;
mod dual;
mod policy;

pub use derivatives::{deriv_insert, Derivatives, NumberArray, SparseNumberArray};
pub use dual::DualNumber;
pub use policy::{ad_error_policy, imperfect_jacobian_count, ADErrorPolicy, ADErrorPolicyGuard};

/// The maximum number of local degrees of freedom that can be differentiated at once.
///
/// This is the number of slots of the dense derivative storage, and the maximum number of
/// nonzero derivatives in the sparse storage.
pub const AD_MAX_DOFS_PER_ELEM: usize = 64;

/// Derivative storage used by [`ADReal`].
#[cfg(not(feature = "sparse-derivatives"))]
pub type ADDerivatives = NumberArray<AD_MAX_DOFS_PER_ELEM>;

/// Derivative storage used by [`ADReal`].
#[cfg(feature = "sparse-derivatives")]
pub type ADDerivatives = SparseNumberArray;

/// The dual number type used throughout kernel assembly.
pub type ADReal = DualNumber<ADDerivatives>;

/// A dual number with a small, dense derivative array.
///
/// Useful for local differentiation problems (e.g. material models differentiating with respect
/// to a handful of tensor entries) that are independent of the element degrees of freedom.
pub type DenseDual<const N: usize> = DualNumber<NumberArray<N>>;

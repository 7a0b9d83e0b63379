/// Numerical differentiation with finite differences
pub mod calculus;

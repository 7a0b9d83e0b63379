//! Element and interface kernels for finite element residual and Jacobian assembly.
//!
//! Kernels compute the local residual and Jacobian contributions of a single weak form term on a
//! single element ([`kernels`]) or on the interface between two elements ([`interface`], [`czm`]).
//! Jacobians are either hand-coded or obtained by forward mode automatic differentiation
//! ([`ad`]). The [`assembly`] module provides the per-element evaluation contexts and a reference
//! driver scattering local contributions into global vectors and sparse matrices.
pub mod ad;
pub mod assembly;
pub mod config;
pub mod czm;
pub mod diagnostics;
pub mod error;
pub mod interface;
pub mod interpolation;
pub mod kernels;
pub mod material;
pub mod multi_index;

pub mod optimize {
    pub use fekern_optimize::*;
}

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use fekern_traits::GenericReal;

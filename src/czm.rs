//! Cohesive zone modeling: traction-separation interface kernels and materials.
//!
//! A cohesive zone couples the displacements on both sides of an interface through a traction
//! that depends on the displacement jump `u_neighbor - u_element`. Materials compute the traction
//! and its derivatives in the global frame and store them as material properties
//! ([`TRACTION_GLOBAL`], [`DTRACTION_DJUMP_GLOBAL`], and for finite strain
//! [`DPK1TRACTION_DF`]). One kernel is used per displacement component.
use crate::assembly::VariableId;
use crate::error::ConfigurationError;

mod kernels;
mod materials;

pub use kernels::{CzmSmallStrainKernel, CzmTotalLagrangianKernel};
pub use materials::{CzmSmallStrainMaterial, CzmTotalLagrangianMaterial};

/// Traction in the global frame, stored as `SVector<f64, D>`.
pub const TRACTION_GLOBAL: &str = "traction_global";

/// Derivative of the global traction with respect to the displacement jump, stored as
/// `SMatrix<f64, D, D>` with entry `(i, j) = dT_i / d jump_j`.
pub const DTRACTION_DJUMP_GLOBAL: &str = "dtraction_djump_global";

/// Derivative of the first Piola-Kirchhoff traction with respect to the interface deformation
/// gradient, stored as `[SMatrix<f64, D, D>; D]` with `[i][(j, l)] = dT_i / dF_jl`.
pub const DPK1TRACTION_DF: &str = "dpk1traction_dF";

/// Checks that one displacement variable is given per spatial dimension and returns them as an
/// array.
fn displacement_array<const D: usize>(displacements: &[VariableId]) -> Result<[VariableId; D], ConfigurationError> {
    displacements.try_into().map_err(|_| {
        ConfigurationError::new(
            "ndisp",
            format!(
                "number of displacements ({}) must equal the spatial dimension ({})",
                displacements.len(),
                D
            ),
        )
    })
}

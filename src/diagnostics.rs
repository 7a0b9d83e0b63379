//! Finite difference verification of kernel Jacobians.
//!
//! The analytic Jacobian of a kernel (hand-coded or obtained by automatic differentiation) is
//! compared column by column against central finite differences of its residual. Columns
//! correspond to the derivative slots of the context, so that derivatives with respect to
//! coupled variables are verified as well. Materials are recomputed for every perturbation.
use crate::assembly::buffers::{ElementBuffer, InterfaceBuffer};
use crate::interface::{DGJacobianType, DGResidualType, InterfaceKernel};
use crate::kernels::Kernel;
use crate::material::Material;
use fekern_optimize::calculus::{approximate_jacobian_fd_into, max_relative_difference, FiniteDifferenceScheme};
use log::debug;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};

/// An analytic Jacobian together with its finite difference approximation.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianComparison {
    pub analytic: DMatrix<f64>,
    pub finite_difference: DMatrix<f64>,
    /// Largest entry-wise difference relative to the largest analytic entry.
    pub max_relative_difference: f64,
}

impl JacobianComparison {
    pub fn new(analytic: DMatrix<f64>, finite_difference: DMatrix<f64>) -> Self {
        let max_relative_difference = max_relative_difference(&finite_difference, &analytic);
        Self {
            analytic,
            finite_difference,
            max_relative_difference,
        }
    }

    pub fn is_within(&self, tolerance: f64) -> bool {
        self.max_relative_difference <= tolerance
    }
}

/// Approximates the Jacobian of `residual` at `x` and compares it against `analytic`.
///
/// Errors returned by `residual` abort the approximation and are propagated.
pub fn compare_jacobian_fd(
    analytic: DMatrix<f64>,
    mut residual: impl FnMut(DVectorView<f64>, DVectorViewMut<f64>) -> eyre::Result<()>,
    x: &DVector<f64>,
    h: f64,
) -> eyre::Result<JacobianComparison> {
    let mut x = x.clone();
    let mut finite_difference = DMatrix::zeros(analytic.nrows(), analytic.ncols());
    let mut error = None;
    approximate_jacobian_fd_into(
        &mut finite_difference,
        |x, mut r| {
            if error.is_some() {
                return;
            }
            r.fill(0.0);
            if let Err(err) = residual(x, r) {
                error = Some(err);
            }
        },
        &mut x,
        h,
        FiniteDifferenceScheme::Central,
    );
    if let Some(err) = error {
        return Err(err);
    }
    let comparison = JacobianComparison::new(analytic, finite_difference);
    debug!(
        "Compared {}x{} Jacobian with finite differences: max relative difference {:e}",
        comparison.analytic.nrows(),
        comparison.analytic.ncols(),
        comparison.max_relative_difference
    );
    Ok(comparison)
}

/// Compares the Jacobian of an element kernel against finite differences.
///
/// Rows correspond to the degrees of freedom of the kernel's variable and columns to all
/// coefficients of the buffer in slot order. On return, the coefficients and material properties
/// of `buffer` are restored.
pub fn check_kernel_jacobian<const D: usize>(
    kernel: &dyn Kernel<D>,
    buffer: &mut ElementBuffer<D>,
    materials: &[&dyn Material<D>],
    h: f64,
) -> eyre::Result<JacobianComparison> {
    let coefficients = DVector::from_vec(buffer.coefficients());
    buffer.update_materials(materials)?;

    let analytic = {
        let ctx = buffer.context();
        let rows = ctx.field(kernel.variable())?.num_dofs();
        let mut jacobian = DMatrix::zeros(rows, ctx.num_slots());
        let mut offset = 0;
        for field in &ctx.fields {
            let cols = field.num_dofs();
            kernel.compute_off_diag_jacobian(&ctx, field.variable, jacobian.view_mut((0, offset), (rows, cols)))?;
            offset += cols;
        }
        jacobian
    };

    let comparison = compare_jacobian_fd(
        analytic,
        |x, residual| {
            buffer.set_coefficients(x.as_slice());
            buffer.update_materials(materials)?;
            kernel.compute_residual(&buffer.context(), residual)
        },
        &coefficients,
        h,
    );

    buffer.set_coefficients(coefficients.as_slice());
    buffer.update_materials(materials)?;
    comparison
}

/// Compares the Jacobian of an interface kernel against finite differences.
///
/// Rows correspond to the degrees of freedom of the kernel's variable on the element side,
/// followed by those of the neighbor variable on the neighbor side. Columns correspond to all
/// coefficients of the buffer in slot order (element side first). Only the element side materials
/// are recomputed. On return, the coefficients and material properties of `buffer` are restored.
pub fn check_interface_jacobian<const D: usize>(
    kernel: &dyn InterfaceKernel<D>,
    buffer: &mut InterfaceBuffer<D>,
    materials: &[&dyn Material<D>],
    h: f64,
) -> eyre::Result<JacobianComparison> {
    let coefficients = DVector::from_vec(buffer.coefficients());
    buffer.update_materials(materials)?;

    let analytic = {
        let ctx = buffer.context();
        let n_element = ctx.element.field(kernel.variable())?.num_dofs();
        let n_neighbor = ctx.neighbor.field(kernel.neighbor_variable())?.num_dofs();
        let mut jacobian = DMatrix::zeros(n_element + n_neighbor, ctx.num_slots());
        for test_side in DGResidualType::ALL {
            let (row_offset, rows) = match test_side {
                DGResidualType::Element => (0, n_element),
                DGResidualType::Neighbor => (n_element, n_neighbor),
            };
            let mut col_offset = 0;
            for trial_side in DGResidualType::ALL {
                for field in &ctx.side(trial_side).fields {
                    let cols = field.num_dofs();
                    kernel.compute_off_diag_jacobian(
                        &ctx,
                        DGJacobianType::from_sides(test_side, trial_side),
                        field.variable,
                        jacobian.view_mut((row_offset, col_offset), (rows, cols)),
                    )?;
                    col_offset += cols;
                }
            }
        }
        jacobian
    };

    let comparison = compare_jacobian_fd(
        analytic,
        |x, mut residual| {
            buffer.set_coefficients(x.as_slice());
            buffer.update_materials(materials)?;
            let ctx = buffer.context();
            let n_element = ctx.element.field(kernel.variable())?.num_dofs();
            let n = residual.len();
            kernel.compute_residual(&ctx, DGResidualType::Element, residual.rows_mut(0, n_element))?;
            kernel.compute_residual(
                &ctx,
                DGResidualType::Neighbor,
                residual.rows_mut(n_element, n - n_element),
            )
        },
        &coefficients,
        h,
    );

    buffer.set_coefficients(coefficients.as_slice());
    buffer.update_materials(materials)?;
    comparison
}


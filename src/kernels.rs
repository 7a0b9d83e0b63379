//! Element kernels: residual and Jacobian contributions of a single weak form term.
//!
//! Physics is written against small capability traits that only describe what happens at a
//! quadrature point ([`PrecomputedValueKernel`], [`ADPrecomputedValueKernel`],
//! [`ADGradientKernel`]). Generic wrappers ([`KernelValue`], [`ADKernelValue`], [`ADKernelGrad`],
//! [`ADTimeKernelGrad`]) turn them into [`Kernel`]s by supplying the quadrature and test function
//! loops.
use crate::ad::AD_MAX_DOFS_PER_ELEM;
use crate::assembly::save_in::SaveIn;
use crate::assembly::{ElementContext, ResidualTag, VariableId};
use crate::error::KernelError;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut};

mod grad;
pub mod library;
mod value;

pub use grad::{ADGradientKernel, ADKernelGrad, ADTimeKernelGrad};
pub use value::{ADKernelValue, ADPrecomputedValueKernel, KernelValue, PrecomputedValueKernel};

/// A kernel contributing to the residual and Jacobian of a single variable on an element.
///
/// All `compute_*` methods *add* into their output, whose dimensions must match the number of
/// local degrees of freedom of the kernel's variable (rows) and of the trial variable (columns).
pub trait Kernel<const D: usize>: Send + Sync {
    /// The variable whose residual the kernel contributes to.
    fn variable(&self) -> VariableId;

    /// Other variables the kernel's residual depends on.
    fn coupled_variables(&self) -> &[VariableId];

    /// The residual vector and Jacobian matrix this kernel contributes to.
    fn tag(&self) -> ResidualTag {
        ResidualTag::NonTime
    }

    /// Whether the Jacobian is obtained by automatic differentiation.
    fn is_ad(&self) -> bool;

    fn compute_residual(&self, ctx: &ElementContext<D>, residual: DVectorViewMut<f64>) -> eyre::Result<()>;

    /// The derivative of the residual with respect to the kernel's own variable.
    fn compute_jacobian(&self, ctx: &ElementContext<D>, jacobian: DMatrixViewMut<f64>) -> eyre::Result<()>;

    /// The derivative of the residual with respect to the variable `jvar`.
    ///
    /// For `jvar == self.variable()` this is the same as [`compute_jacobian`](Self::compute_jacobian).
    /// Variables that are not coupled to the kernel contribute nothing.
    fn compute_off_diag_jacobian(
        &self,
        ctx: &ElementContext<D>,
        jvar: VariableId,
        jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()>;
}

pub(crate) fn check_ad_capacity(num_slots: usize) -> Result<(), KernelError> {
    if num_slots > AD_MAX_DOFS_PER_ELEM {
        Err(KernelError::TooManyDofs {
            dofs: num_slots,
            capacity: AD_MAX_DOFS_PER_ELEM,
        })
    } else {
        Ok(())
    }
}

fn finish_residual(save_in: &SaveIn, dofs: &[usize], local: &DVector<f64>, mut output: DVectorViewMut<f64>) {
    assert_eq!(output.len(), local.len(), "Output vector dimension mismatch");
    output += local;
    save_in.save_residual(dofs, local);
}

fn finish_jacobian(
    save_in: Option<&SaveIn>,
    dofs: &[usize],
    local: &DMatrix<f64>,
    mut output: DMatrixViewMut<f64>,
) {
    assert_eq!(output.shape(), local.shape(), "Output matrix dimension mismatch");
    output += local;
    if let Some(save_in) = save_in {
        save_in.save_jacobian_diagonal(dofs, local);
    }
}

/// Local residual and Jacobian buffers that are resized, rather than reallocated, between
/// elements.
#[derive(Debug)]
pub(crate) struct LocalWorkspace {
    pub local_residual: DVector<f64>,
    pub local_jacobian: DMatrix<f64>,
    /// Per trial function and spatial component.
    pub buffer: Vec<f64>,
}

impl Default for LocalWorkspace {
    fn default() -> Self {
        Self {
            local_residual: DVector::zeros(0),
            local_jacobian: DMatrix::zeros(0, 0),
            buffer: Vec::new(),
        }
    }
}

impl LocalWorkspace {
    /// Resizes the local residual to `n` entries and zeros it.
    pub fn prepare_residual(&mut self, n: usize) {
        self.local_residual.resize_vertically_mut(n, 0.0);
        self.local_residual.fill(0.0);
    }

    /// Resizes the local Jacobian to `rows x cols` and zeros it.
    pub fn prepare_jacobian(&mut self, rows: usize, cols: usize) {
        self.local_jacobian.resize_mut(rows, cols, 0.0);
        self.local_jacobian.fill(0.0);
    }

    pub fn residual(&mut self, n: usize) -> DVectorViewMut<f64> {
        self.prepare_residual(n);
        DVectorViewMut::from(&mut self.local_residual)
    }

    pub fn jacobian(&mut self, rows: usize, cols: usize) -> DMatrixViewMut<f64> {
        self.prepare_jacobian(rows, cols);
        DMatrixViewMut::from(&mut self.local_jacobian)
    }
}

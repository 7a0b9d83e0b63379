use crate::ad::ADReal;
use crate::assembly::{InterfaceContext, InterfaceQp, TestFunction, VariableId};
use crate::error::KernelError;
use crate::interface::{side_variable, DGJacobianType, DGResidualType, InterfaceKernel};
use crate::kernels::check_ad_capacity;
use nalgebra::{DMatrixViewMut, DVectorViewMut};

/// An automatically differentiated interface kernel, written at a single quadrature point.
///
/// Only the residual of each side is provided. All four Jacobian blocks, with respect to the
/// kernel's own variables as well as its coupled variables, are read off its derivatives.
pub trait ADInterfaceQpKernel<const D: usize>: Send + Sync {
    fn variable(&self) -> VariableId;

    fn neighbor_variable(&self) -> VariableId {
        self.variable()
    }

    fn coupled_variables(&self) -> &[VariableId] {
        &[]
    }

    fn compute_qp_residual(
        &self,
        qp: &InterfaceQp<ADReal, D>,
        side: DGResidualType,
        test: &TestFunction<D>,
    ) -> Result<ADReal, KernelError>;
}

/// Turns an [`ADInterfaceQpKernel`] into an [`InterfaceKernel`].
#[derive(Debug, Clone)]
pub struct ADInterfaceKernel<K> {
    kernel: K,
}

impl<K> ADInterfaceKernel<K> {
    pub fn new(kernel: K) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

fn compute_ad_interface_block<K, const D: usize>(
    kernel: &K,
    ctx: &InterfaceContext<D>,
    jacobian_type: DGJacobianType,
    jvar: VariableId,
    mut jacobian: DMatrixViewMut<f64>,
) -> eyre::Result<()>
where
    K: ADInterfaceQpKernel<D>,
{
    let var = kernel.variable();
    let nvar = kernel.neighbor_variable();
    let test_side = jacobian_type.test_side();
    let trial_side = jacobian_type.trial_side();
    let test_field = ctx.side(test_side).field(side_variable(var, nvar, test_side))?;
    let trial_field = ctx.side(trial_side).field(jvar)?;
    let offset = ctx.slot_offset(jvar, trial_side)?;
    check_ad_capacity(ctx.num_slots())?;
    assert_eq!(
        jacobian.shape(),
        (test_field.num_dofs(), trial_field.num_dofs()),
        "Output matrix dimension mismatch"
    );

    for qp in 0..ctx.quadrature.num_quadrature_points() {
        let qp_ctx = ctx.qp_context::<ADReal>(qp, var, nvar, kernel.coupled_variables(), true)?;
        let jxw_coord = ctx.quadrature.jxw_coord(qp);
        for i in 0..test_field.num_dofs() {
            let test = test_field.shape.shape(i, qp);
            let residual = kernel.compute_qp_residual(&qp_ctx, test_side, &test)?;
            for j in 0..trial_field.num_dofs() {
                jacobian[(i, j)] += jxw_coord * residual.derivative(offset + j);
            }
        }
    }
    Ok(())
}

impl<K, const D: usize> InterfaceKernel<D> for ADInterfaceKernel<K>
where
    K: ADInterfaceQpKernel<D>,
{
    fn variable(&self) -> VariableId {
        self.kernel.variable()
    }

    fn neighbor_variable(&self) -> VariableId {
        self.kernel.neighbor_variable()
    }

    fn coupled_variables(&self) -> &[VariableId] {
        self.kernel.coupled_variables()
    }

    fn is_ad(&self) -> bool {
        true
    }

    fn compute_residual(
        &self,
        ctx: &InterfaceContext<D>,
        side: DGResidualType,
        mut residual: DVectorViewMut<f64>,
    ) -> eyre::Result<()> {
        let var = self.kernel.variable();
        let nvar = self.kernel.neighbor_variable();
        let test_field = ctx.side(side).field(side_variable(var, nvar, side))?;
        assert_eq!(residual.len(), test_field.num_dofs(), "Output vector dimension mismatch");

        for qp in 0..ctx.quadrature.num_quadrature_points() {
            let qp_ctx = ctx.qp_context::<ADReal>(qp, var, nvar, self.kernel.coupled_variables(), false)?;
            let jxw_coord = ctx.quadrature.jxw_coord(qp);
            for i in 0..test_field.num_dofs() {
                let test = test_field.shape.shape(i, qp);
                let value = self.kernel.compute_qp_residual(&qp_ctx, side, &test)?;
                residual[i] += jxw_coord * value.value();
            }
        }
        Ok(())
    }

    fn compute_jacobian(
        &self,
        ctx: &InterfaceContext<D>,
        jacobian_type: DGJacobianType,
        jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        let jvar = side_variable(
            self.kernel.variable(),
            self.kernel.neighbor_variable(),
            jacobian_type.trial_side(),
        );
        compute_ad_interface_block(&self.kernel, ctx, jacobian_type, jvar, jacobian)
    }

    fn compute_off_diag_jacobian(
        &self,
        ctx: &InterfaceContext<D>,
        jacobian_type: DGJacobianType,
        jvar: VariableId,
        jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        let own = side_variable(
            self.kernel.variable(),
            self.kernel.neighbor_variable(),
            jacobian_type.trial_side(),
        );
        if jvar == own || self.kernel.coupled_variables().contains(&jvar) {
            compute_ad_interface_block(&self.kernel, ctx, jacobian_type, jvar, jacobian)
        } else {
            Ok(())
        }
    }
}

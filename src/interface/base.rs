use crate::assembly::{InterfaceContext, InterfaceQp, TestFunction, TrialFunction, VariableId};
use crate::error::KernelError;
use crate::interface::{side_variable, DGJacobianType, DGResidualType, InterfaceKernel};
use nalgebra::{DMatrixViewMut, DVectorViewMut};

/// An interface kernel with hand-coded Jacobians, written at a single quadrature point.
///
/// `compute_qp_residual` is called with the test functions of the given side, `compute_qp_jacobian`
/// with the test functions of the block's test side and the trial functions (of the kernel's own
/// variable) of the block's trial side.
pub trait InterfaceQpKernel<const D: usize>: Send + Sync {
    fn variable(&self) -> VariableId;

    fn neighbor_variable(&self) -> VariableId {
        self.variable()
    }

    fn coupled_variables(&self) -> &[VariableId] {
        &[]
    }

    fn compute_qp_residual(
        &self,
        qp: &InterfaceQp<f64, D>,
        side: DGResidualType,
        test: &TestFunction<D>,
    ) -> Result<f64, KernelError>;

    fn compute_qp_jacobian(
        &self,
        qp: &InterfaceQp<f64, D>,
        jacobian_type: DGJacobianType,
        test: &TestFunction<D>,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError>;

    /// The Jacobian entry with respect to the coupled variable `jvar` on the block's trial side.
    fn compute_qp_off_diag_jacobian(
        &self,
        _qp: &InterfaceQp<f64, D>,
        _jacobian_type: DGJacobianType,
        _jvar: VariableId,
        _test: &TestFunction<D>,
        _trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        Ok(0.0)
    }
}

/// Turns an [`InterfaceQpKernel`] into an [`InterfaceKernel`].
#[derive(Debug, Clone)]
pub struct InterfaceKernelBase<K> {
    kernel: K,
}

impl<K> InterfaceKernelBase<K> {
    pub fn new(kernel: K) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

/// Which quadrature point function fills a Jacobian block.
#[derive(Clone, Copy)]
enum BlockKind {
    Own,
    Coupled(VariableId),
}

fn compute_block<K, const D: usize>(
    kernel: &K,
    ctx: &InterfaceContext<D>,
    jacobian_type: DGJacobianType,
    kind: BlockKind,
    mut jacobian: DMatrixViewMut<f64>,
) -> eyre::Result<()>
where
    K: InterfaceQpKernel<D>,
{
    let var = kernel.variable();
    let nvar = kernel.neighbor_variable();
    let coupled = kernel.coupled_variables();
    let test_side = jacobian_type.test_side();
    let trial_side = jacobian_type.trial_side();
    let test_field = ctx.side(test_side).field(side_variable(var, nvar, test_side))?;
    let jvar = match kind {
        BlockKind::Own => side_variable(var, nvar, trial_side),
        BlockKind::Coupled(jvar) => jvar,
    };
    let trial_field = ctx.side(trial_side).field(jvar)?;
    assert_eq!(
        jacobian.shape(),
        (test_field.num_dofs(), trial_field.num_dofs()),
        "Output matrix dimension mismatch"
    );

    for qp in 0..ctx.quadrature.num_quadrature_points() {
        let qp_ctx = ctx.qp_context::<f64>(qp, var, nvar, coupled, false)?;
        let jxw_coord = ctx.quadrature.jxw_coord(qp);
        for i in 0..test_field.num_dofs() {
            let test = test_field.shape.shape(i, qp);
            for j in 0..trial_field.num_dofs() {
                let trial = trial_field.shape.shape(j, qp);
                let value = match kind {
                    BlockKind::Own => kernel.compute_qp_jacobian(&qp_ctx, jacobian_type, &test, &trial)?,
                    BlockKind::Coupled(jvar) => {
                        kernel.compute_qp_off_diag_jacobian(&qp_ctx, jacobian_type, jvar, &test, &trial)?
                    }
                };
                jacobian[(i, j)] += jxw_coord * value;
            }
        }
    }
    Ok(())
}

impl<K, const D: usize> InterfaceKernel<D> for InterfaceKernelBase<K>
where
    K: InterfaceQpKernel<D>,
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
        false
    }

    fn compute_residual(
        &self,
        ctx: &InterfaceContext<D>,
        side: DGResidualType,
        mut residual: DVectorViewMut<f64>,
    ) -> eyre::Result<()> {
        let var = self.kernel.variable();
        let nvar = self.kernel.neighbor_variable();
        let coupled = self.kernel.coupled_variables();
        let test_field = ctx.side(side).field(side_variable(var, nvar, side))?;
        assert_eq!(residual.len(), test_field.num_dofs(), "Output vector dimension mismatch");

        for qp in 0..ctx.quadrature.num_quadrature_points() {
            let qp_ctx = ctx.qp_context::<f64>(qp, var, nvar, coupled, false)?;
            let jxw_coord = ctx.quadrature.jxw_coord(qp);
            for i in 0..test_field.num_dofs() {
                let test = test_field.shape.shape(i, qp);
                residual[i] += jxw_coord * self.kernel.compute_qp_residual(&qp_ctx, side, &test)?;
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
        compute_block(&self.kernel, ctx, jacobian_type, BlockKind::Own, jacobian)
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
        if jvar == own {
            self.compute_jacobian(ctx, jacobian_type, jacobian)
        } else if self.kernel.coupled_variables().contains(&jvar) {
            compute_block(&self.kernel, ctx, jacobian_type, BlockKind::Coupled(jvar), jacobian)
        } else {
            Ok(())
        }
    }
}

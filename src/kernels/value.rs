use crate::ad::ADReal;
use crate::assembly::save_in::SaveIn;
use crate::assembly::{ElementContext, QpContext, ResidualType, TestFunction, TrialFunction, VariableId};
use crate::error::KernelError;
use crate::kernels::{check_ad_capacity, finish_jacobian, finish_residual, Kernel, LocalWorkspace};
use davenport::{define_thread_local_workspace, with_thread_local_workspace};
use nalgebra::{DMatrixViewMut, DVectorViewMut};

/// A weak form term of the shape `value(q) * test_i(q)`.
///
/// Only the quadrature point value ("precomputed residual") needs to be provided. Its derivative
/// with respect to the coefficient of trial function `j` of the kernel's own variable is
/// `precompute_qp_jacobian`, and derivatives with respect to coupled variables are given by
/// `compute_qp_off_diag_jacobian` (which, unlike the other two, includes the test function).
pub trait PrecomputedValueKernel<const D: usize>: Send + Sync {
    fn variable(&self) -> VariableId;

    fn coupled_variables(&self) -> &[VariableId] {
        &[]
    }

    fn precompute_qp_residual(&self, qp: &QpContext<f64, D>) -> Result<f64, KernelError>;

    fn precompute_qp_jacobian(&self, _qp: &QpContext<f64, D>, _trial: &TrialFunction<D>) -> Result<f64, KernelError> {
        Ok(0.0)
    }

    fn compute_qp_off_diag_jacobian(
        &self,
        _qp: &QpContext<f64, D>,
        _jvar: VariableId,
        _test: &TestFunction<D>,
        _trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        Ok(0.0)
    }
}

/// A weak form term of the shape `value(q) * test_i(q)`, differentiated automatically.
///
/// The Jacobian (with respect to the kernel's variable as well as its coupled variables) is read
/// off the derivatives of the precomputed residual.
pub trait ADPrecomputedValueKernel<const D: usize>: Send + Sync {
    fn variable(&self) -> VariableId;

    fn coupled_variables(&self) -> &[VariableId] {
        &[]
    }

    fn precompute_qp_residual(&self, qp: &QpContext<ADReal, D>) -> Result<ADReal, KernelError>;
}

define_thread_local_workspace!(WORKSPACE);

/// Turns a [`PrecomputedValueKernel`] into a [`Kernel`].
///
/// The product of the quadrature weight and the precomputed value is formed once per quadrature
/// point (or once per quadrature point and trial function), and then multiplied by every test
/// function.
#[derive(Debug, Clone)]
pub struct KernelValue<K> {
    kernel: K,
    save_in: SaveIn,
}

impl<K> KernelValue<K> {
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            save_in: SaveIn::default(),
        }
    }

    pub fn with_save_in(mut self, save_in: SaveIn) -> Self {
        self.save_in = save_in;
        self
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

impl<K, const D: usize> Kernel<D> for KernelValue<K>
where
    K: PrecomputedValueKernel<D>,
{
    fn variable(&self) -> VariableId {
        self.kernel.variable()
    }

    fn coupled_variables(&self) -> &[VariableId] {
        self.kernel.coupled_variables()
    }

    fn is_ad(&self) -> bool {
        false
    }

    fn compute_residual(&self, ctx: &ElementContext<D>, residual: DVectorViewMut<f64>) -> eyre::Result<()> {
        let var = self.kernel.variable();
        let coupled = self.kernel.coupled_variables();
        let field = ctx.field(var)?;

        with_thread_local_workspace(&WORKSPACE, |ws: &mut LocalWorkspace| -> eyre::Result<()> {
            ws.prepare_residual(field.num_dofs());
            for qp in 0..ctx.quadrature.num_quadrature_points() {
                let qp_ctx = ctx.qp_context::<f64>(qp, var, coupled, false, ResidualType::Residual)?;
                let value = ctx.quadrature.jxw_coord(qp) * self.kernel.precompute_qp_residual(&qp_ctx)?;
                let test = field.shape.values_at(qp);
                // Target for auto vectorization
                for (r_i, test_i) in ws.local_residual.iter_mut().zip(test) {
                    *r_i += value * test_i;
                }
            }
            finish_residual(&self.save_in, field.dofs, &ws.local_residual, residual);
            Ok(())
        })
    }

    fn compute_jacobian(&self, ctx: &ElementContext<D>, jacobian: DMatrixViewMut<f64>) -> eyre::Result<()> {
        let var = self.kernel.variable();
        let coupled = self.kernel.coupled_variables();
        let field = ctx.field(var)?;
        let n = field.num_dofs();

        with_thread_local_workspace(&WORKSPACE, |ws: &mut LocalWorkspace| -> eyre::Result<()> {
            ws.prepare_jacobian(n, n);
            for qp in 0..ctx.quadrature.num_quadrature_points() {
                let qp_ctx = ctx.qp_context::<f64>(qp, var, coupled, false, ResidualType::Jacobian)?;
                let jxw_coord = ctx.quadrature.jxw_coord(qp);
                let test = field.shape.values_at(qp);
                for j in 0..n {
                    let trial = field.shape.shape(j, qp);
                    let value = jxw_coord * self.kernel.precompute_qp_jacobian(&qp_ctx, &trial)?;
                    // Target for auto vectorization
                    for (a_ij, test_i) in ws.local_jacobian.column_mut(j).iter_mut().zip(test) {
                        *a_ij += value * test_i;
                    }
                }
            }
            finish_jacobian(Some(&self.save_in), field.dofs, &ws.local_jacobian, jacobian);
            Ok(())
        })
    }

    fn compute_off_diag_jacobian(
        &self,
        ctx: &ElementContext<D>,
        jvar: VariableId,
        jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        let var = self.kernel.variable();
        if jvar == var {
            return self.compute_jacobian(ctx, jacobian);
        }
        let coupled = self.kernel.coupled_variables();
        if !coupled.contains(&jvar) {
            return Ok(());
        }

        let field = ctx.field(var)?;
        let jfield = ctx.field(jvar)?;
        with_thread_local_workspace(&WORKSPACE, |ws: &mut LocalWorkspace| -> eyre::Result<()> {
            ws.prepare_jacobian(field.num_dofs(), jfield.num_dofs());
            for qp in 0..ctx.quadrature.num_quadrature_points() {
                let qp_ctx = ctx.qp_context::<f64>(qp, var, coupled, false, ResidualType::Jacobian)?;
                let jxw_coord = ctx.quadrature.jxw_coord(qp);
                for i in 0..field.num_dofs() {
                    let test = field.shape.shape(i, qp);
                    for j in 0..jfield.num_dofs() {
                        let trial = jfield.shape.shape(j, qp);
                        ws.local_jacobian[(i, j)] +=
                            jxw_coord * self.kernel.compute_qp_off_diag_jacobian(&qp_ctx, jvar, &test, &trial)?;
                    }
                }
            }
            finish_jacobian(None, field.dofs, &ws.local_jacobian, jacobian);
            Ok(())
        })
    }
}

/// Turns an [`ADPrecomputedValueKernel`] into a [`Kernel`].
#[derive(Debug, Clone)]
pub struct ADKernelValue<K> {
    kernel: K,
    save_in: SaveIn,
}

impl<K> ADKernelValue<K> {
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            save_in: SaveIn::default(),
        }
    }

    pub fn with_save_in(mut self, save_in: SaveIn) -> Self {
        self.save_in = save_in;
        self
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Hand-coded Jacobians do not exist for automatically differentiated kernels.
    ///
    /// Always returns [`KernelError::UnsupportedOperation`].
    pub fn precompute_qp_jacobian(&self) -> Result<f64, KernelError> {
        Err(KernelError::UnsupportedOperation {
            kernel: "ADKernelValue",
            operation: "precompute_qp_jacobian",
        })
    }
}

fn compute_ad_value_jacobian<K, const D: usize>(
    kernel: &K,
    save_in: &SaveIn,
    ctx: &ElementContext<D>,
    jvar: VariableId,
    jacobian: DMatrixViewMut<f64>,
) -> eyre::Result<()>
where
    K: ADPrecomputedValueKernel<D>,
{
    let var = kernel.variable();
    let coupled = kernel.coupled_variables();
    let field = ctx.field(var)?;
    let jfield = ctx.field(jvar)?;
    let offset = ctx.slot_offset(jvar)?;
    check_ad_capacity(ctx.num_slots())?;

    with_thread_local_workspace(&WORKSPACE, |ws: &mut LocalWorkspace| -> eyre::Result<()> {
        ws.prepare_jacobian(field.num_dofs(), jfield.num_dofs());
        for qp in 0..ctx.quadrature.num_quadrature_points() {
            let qp_ctx = ctx.qp_context::<ADReal>(qp, var, coupled, true, ResidualType::Jacobian)?;
            let value = kernel.precompute_qp_residual(&qp_ctx)?;
            let jxw_coord = ctx.quadrature.jxw_coord(qp);
            let test = field.shape.values_at(qp);
            for j in 0..jfield.num_dofs() {
                let d_value = jxw_coord * value.derivative(offset + j);
                // Target for auto vectorization
                for (a_ij, test_i) in ws.local_jacobian.column_mut(j).iter_mut().zip(test) {
                    *a_ij += d_value * test_i;
                }
            }
        }
        let save_in = (jvar == var).then_some(save_in);
        finish_jacobian(save_in, field.dofs, &ws.local_jacobian, jacobian);
        Ok(())
    })
}

impl<K, const D: usize> Kernel<D> for ADKernelValue<K>
where
    K: ADPrecomputedValueKernel<D>,
{
    fn variable(&self) -> VariableId {
        self.kernel.variable()
    }

    fn coupled_variables(&self) -> &[VariableId] {
        self.kernel.coupled_variables()
    }

    fn is_ad(&self) -> bool {
        true
    }

    fn compute_residual(&self, ctx: &ElementContext<D>, residual: DVectorViewMut<f64>) -> eyre::Result<()> {
        let var = self.kernel.variable();
        let coupled = self.kernel.coupled_variables();
        let field = ctx.field(var)?;

        with_thread_local_workspace(&WORKSPACE, |ws: &mut LocalWorkspace| -> eyre::Result<()> {
            ws.prepare_residual(field.num_dofs());
            for qp in 0..ctx.quadrature.num_quadrature_points() {
                let qp_ctx = ctx.qp_context::<ADReal>(qp, var, coupled, false, ResidualType::Residual)?;
                let value = ctx.quadrature.jxw_coord(qp) * self.kernel.precompute_qp_residual(&qp_ctx)?.value();
                let test = field.shape.values_at(qp);
                // Target for auto vectorization
                for (r_i, test_i) in ws.local_residual.iter_mut().zip(test) {
                    *r_i += value * test_i;
                }
            }
            finish_residual(&self.save_in, field.dofs, &ws.local_residual, residual);
            Ok(())
        })
    }

    fn compute_jacobian(&self, ctx: &ElementContext<D>, jacobian: DMatrixViewMut<f64>) -> eyre::Result<()> {
        compute_ad_value_jacobian(&self.kernel, &self.save_in, ctx, self.kernel.variable(), jacobian)
    }

    fn compute_off_diag_jacobian(
        &self,
        ctx: &ElementContext<D>,
        jvar: VariableId,
        jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        if jvar == self.kernel.variable() || self.kernel.coupled_variables().contains(&jvar) {
            compute_ad_value_jacobian(&self.kernel, &self.save_in, ctx, jvar, jacobian)
        } else {
            Ok(())
        }
    }
}

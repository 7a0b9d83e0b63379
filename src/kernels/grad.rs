use crate::ad::ADReal;
use crate::assembly::save_in::SaveIn;
use crate::assembly::{ElementContext, QpContext, ResidualTag, ResidualType, VariableId};
use crate::error::KernelError;
use crate::kernels::{check_ad_capacity, finish_jacobian, finish_residual, Kernel, LocalWorkspace};
use davenport::{define_thread_local_workspace, with_thread_local_workspace};
use nalgebra::{DMatrixViewMut, DVectorViewMut, SVector};

/// A weak form term of the shape `flux(q) . grad test_i(q)`, differentiated automatically.
pub trait ADGradientKernel<const D: usize>: Send + Sync {
    fn variable(&self) -> VariableId;

    fn coupled_variables(&self) -> &[VariableId] {
        &[]
    }

    /// Runs once per quadrature point before the flux is evaluated.
    ///
    /// `qp.residual_type` tells whether the evaluation is for the residual or the Jacobian.
    fn init_qp_residual(&self, _qp: &mut QpContext<ADReal, D>) -> Result<(), KernelError> {
        Ok(())
    }

    /// The flux at a quadrature point.
    fn precompute_qp_residual(&self, qp: &QpContext<ADReal, D>) -> Result<SVector<ADReal, D>, KernelError>;
}

define_thread_local_workspace!(WORKSPACE);

fn evaluate_flux<K, const D: usize>(
    kernel: &K,
    ctx: &ElementContext<D>,
    qp: usize,
    residual_type: ResidualType,
    require_time_derivative: bool,
) -> Result<SVector<ADReal, D>, KernelError>
where
    K: ADGradientKernel<D>,
{
    let seeded = residual_type == ResidualType::Jacobian;
    let mut qp_ctx = ctx.qp_context::<ADReal>(qp, kernel.variable(), kernel.coupled_variables(), seeded, residual_type)?;
    if require_time_derivative {
        qp_ctx.u_dot()?;
    }
    kernel.init_qp_residual(&mut qp_ctx)?;
    kernel.precompute_qp_residual(&qp_ctx)
}

fn compute_grad_residual<K, const D: usize>(
    kernel: &K,
    save_in: &SaveIn,
    ctx: &ElementContext<D>,
    residual: DVectorViewMut<f64>,
    require_time_derivative: bool,
) -> eyre::Result<()>
where
    K: ADGradientKernel<D>,
{
    let field = ctx.field(kernel.variable())?;
    with_thread_local_workspace(&WORKSPACE, |ws: &mut LocalWorkspace| -> eyre::Result<()> {
        ws.prepare_residual(field.num_dofs());
        for qp in 0..ctx.quadrature.num_quadrature_points() {
            let flux = evaluate_flux(kernel, ctx, qp, ResidualType::Residual, require_time_derivative)?;
            let jxw_coord = ctx.quadrature.jxw_coord(qp);
            let flux: SVector<f64, D> = flux.map(|f| jxw_coord * f.value());
            let grad_test = field.shape.gradients_at(qp);
            // Target for auto vectorization
            for (r_i, grad_test_i) in ws.local_residual.iter_mut().zip(grad_test) {
                *r_i += flux.dot(grad_test_i);
            }
        }
        finish_residual(save_in, field.dofs, &ws.local_residual, residual);
        Ok(())
    })
}

fn compute_grad_jacobian<K, const D: usize>(
    kernel: &K,
    save_in: &SaveIn,
    ctx: &ElementContext<D>,
    jvar: VariableId,
    jacobian: DMatrixViewMut<f64>,
    require_time_derivative: bool,
) -> eyre::Result<()>
where
    K: ADGradientKernel<D>,
{
    let var = kernel.variable();
    let field = ctx.field(var)?;
    let jfield = ctx.field(jvar)?;
    let offset = ctx.slot_offset(jvar)?;
    check_ad_capacity(ctx.num_slots())?;
    let m = jfield.num_dofs();

    with_thread_local_workspace(&WORKSPACE, |ws: &mut LocalWorkspace| -> eyre::Result<()> {
        ws.prepare_jacobian(field.num_dofs(), m);
        ws.buffer.resize(D * m, 0.0);
        for qp in 0..ctx.quadrature.num_quadrature_points() {
            let flux = evaluate_flux(kernel, ctx, qp, ResidualType::Jacobian, require_time_derivative)?;
            let jxw_coord = ctx.quadrature.jxw_coord(qp);

            // Derivative of flux component k with respect to coefficient j at k * m + j
            let d_flux = &mut ws.buffer;
            for (k, flux_k) in flux.iter().enumerate() {
                for j in 0..m {
                    d_flux[k * m + j] = jxw_coord * flux_k.derivative(offset + j);
                }
            }

            for (i, grad_test_i) in field.shape.gradients_at(qp).iter().enumerate() {
                for j in 0..m {
                    let mut a_ij = 0.0;
                    for k in 0..D {
                        a_ij += grad_test_i[k] * d_flux[k * m + j];
                    }
                    ws.local_jacobian[(i, j)] += a_ij;
                }
            }
        }
        let save_in = (jvar == var).then_some(save_in);
        finish_jacobian(save_in, field.dofs, &ws.local_jacobian, jacobian);
        Ok(())
    })
}

fn is_coupled<K: ADGradientKernel<D>, const D: usize>(kernel: &K, jvar: VariableId) -> bool {
    jvar == kernel.variable() || kernel.coupled_variables().contains(&jvar)
}

/// Turns an [`ADGradientKernel`] into a [`Kernel`].
///
/// The flux is evaluated once per quadrature point and then contracted with the gradient of every
/// test function. The Jacobian is obtained by differentiating the flux.
#[derive(Debug, Clone)]
pub struct ADKernelGrad<K> {
    kernel: K,
    save_in: SaveIn,
}

impl<K> ADKernelGrad<K> {
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

impl<K, const D: usize> Kernel<D> for ADKernelGrad<K>
where
    K: ADGradientKernel<D>,
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
        compute_grad_residual(&self.kernel, &self.save_in, ctx, residual, false)
    }

    fn compute_jacobian(&self, ctx: &ElementContext<D>, jacobian: DMatrixViewMut<f64>) -> eyre::Result<()> {
        compute_grad_jacobian(&self.kernel, &self.save_in, ctx, self.kernel.variable(), jacobian, false)
    }

    fn compute_off_diag_jacobian(
        &self,
        ctx: &ElementContext<D>,
        jvar: VariableId,
        jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        if is_coupled(&self.kernel, jvar) {
            compute_grad_jacobian(&self.kernel, &self.save_in, ctx, jvar, jacobian, false)
        } else {
            Ok(())
        }
    }
}

/// Turns an [`ADGradientKernel`] whose flux depends on the time derivative of its variable into a
/// [`Kernel`] contributing to the time residual and Jacobian.
///
/// The time derivative is available as `qp.u.dot` (and `qp.u.grad_dot`), seeded with `du_dot_du`.
/// Evaluating on an element without time derivative coefficients fails with
/// [`KernelError::MissingTimeDerivative`].
#[derive(Debug, Clone)]
pub struct ADTimeKernelGrad<K> {
    kernel: K,
    save_in: SaveIn,
}

impl<K> ADTimeKernelGrad<K> {
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

impl<K, const D: usize> Kernel<D> for ADTimeKernelGrad<K>
where
    K: ADGradientKernel<D>,
{
    fn variable(&self) -> VariableId {
        self.kernel.variable()
    }

    fn coupled_variables(&self) -> &[VariableId] {
        self.kernel.coupled_variables()
    }

    fn tag(&self) -> ResidualTag {
        ResidualTag::Time
    }

    fn is_ad(&self) -> bool {
        true
    }

    fn compute_residual(&self, ctx: &ElementContext<D>, residual: DVectorViewMut<f64>) -> eyre::Result<()> {
        compute_grad_residual(&self.kernel, &self.save_in, ctx, residual, true)
    }

    fn compute_jacobian(&self, ctx: &ElementContext<D>, jacobian: DMatrixViewMut<f64>) -> eyre::Result<()> {
        compute_grad_jacobian(&self.kernel, &self.save_in, ctx, self.kernel.variable(), jacobian, true)
    }

    fn compute_off_diag_jacobian(
        &self,
        ctx: &ElementContext<D>,
        jvar: VariableId,
        jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        if is_coupled(&self.kernel, jvar) {
            compute_grad_jacobian(&self.kernel, &self.save_in, ctx, jvar, jacobian, true)
        } else {
            Ok(())
        }
    }
}

use crate::assembly::{InterfaceQp, TestFunction, TrialFunction, VariableId};
use crate::czm::{displacement_array, DPK1TRACTION_DF, DTRACTION_DJUMP_GLOBAL, TRACTION_GLOBAL};
use crate::error::{ConfigurationError, KernelError};
use crate::interface::{DGJacobianType, DGResidualType, InterfaceQpKernel};
use nalgebra::{SMatrix, SVector};

/// Interface kernel for one component of the traction of a small strain cohesive zone.
///
/// The residual is `-T[c] test` on the element side and `+T[c] test` on the neighbor side, with
/// `T` the material property [`TRACTION_GLOBAL`]. The displacements of all components must be
/// given, and the kernel couples to the components other than its own.
#[derive(Debug, Clone, PartialEq)]
pub struct CzmSmallStrainKernel<const D: usize> {
    displacements: [VariableId; D],
    component: usize,
    coupled: Vec<VariableId>,
}

impl<const D: usize> CzmSmallStrainKernel<D> {
    pub fn new(displacements: &[VariableId], component: usize) -> Result<Self, ConfigurationError> {
        let displacements = displacement_array::<D>(displacements)?;
        if component >= D {
            return Err(ConfigurationError::new(
                "component",
                format!("component {} is out of range for {} displacements", component, D),
            ));
        }
        let coupled = displacements
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != component)
            .map(|(_, &v)| v)
            .collect();
        Ok(Self {
            displacements,
            component,
            coupled,
        })
    }

    pub fn component(&self) -> usize {
        self.component
    }

    pub fn displacements(&self) -> &[VariableId; D] {
        &self.displacements
    }

    /// The displacement component of a variable, if it is one of the displacements.
    fn component_of(&self, jvar: VariableId) -> Option<usize> {
        self.displacements.iter().position(|&v| v == jvar)
    }

    /// `dT[c]/d jump[j]`, combined with test and trial functions.
    fn jump_jacobian(
        &self,
        qp: &InterfaceQp<f64, D>,
        jacobian_type: DGJacobianType,
        j: usize,
        test: &TestFunction<D>,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        let dtraction_djump = qp.property_as::<SMatrix<f64, D, D>>(DTRACTION_DJUMP_GLOBAL, DGResidualType::Element)?;
        let d = dtraction_djump[(self.component, j)];
        let value = match jacobian_type {
            DGJacobianType::ElementElement => d * test.value * trial.value,
            DGJacobianType::ElementNeighbor => -d * test.value * trial.value,
            DGJacobianType::NeighborElement => -d * test.value * trial.value,
            DGJacobianType::NeighborNeighbor => d * test.value * trial.value,
        };
        debug_assert!(value.is_finite());
        Ok(value)
    }
}

impl<const D: usize> InterfaceQpKernel<D> for CzmSmallStrainKernel<D> {
    fn variable(&self) -> VariableId {
        self.displacements[self.component]
    }

    fn coupled_variables(&self) -> &[VariableId] {
        &self.coupled
    }

    fn compute_qp_residual(
        &self,
        qp: &InterfaceQp<f64, D>,
        side: DGResidualType,
        test: &TestFunction<D>,
    ) -> Result<f64, KernelError> {
        let traction = qp.property_as::<SVector<f64, D>>(TRACTION_GLOBAL, DGResidualType::Element)?;
        let t = traction[self.component];
        let value = match side {
            DGResidualType::Element => -t * test.value,
            DGResidualType::Neighbor => t * test.value,
        };
        debug_assert!(value.is_finite());
        Ok(value)
    }

    fn compute_qp_jacobian(
        &self,
        qp: &InterfaceQp<f64, D>,
        jacobian_type: DGJacobianType,
        test: &TestFunction<D>,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        self.jump_jacobian(qp, jacobian_type, self.component, test, trial)
    }

    fn compute_qp_off_diag_jacobian(
        &self,
        qp: &InterfaceQp<f64, D>,
        jacobian_type: DGJacobianType,
        jvar: VariableId,
        test: &TestFunction<D>,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        match self.component_of(jvar) {
            Some(j) => self.jump_jacobian(qp, jacobian_type, j, test, trial),
            None => Ok(0.0),
        }
    }
}

/// Interface kernel for one component of the first Piola-Kirchhoff traction of a total
/// Lagrangian cohesive zone.
///
/// In addition to the jump contributions of [`CzmSmallStrainKernel`], the Jacobian accounts for
/// the dependence of the traction on the interface deformation gradient
/// `F = I + (grad u + grad u_neighbor) / 2` through the material property [`DPK1TRACTION_DF`].
#[derive(Debug, Clone, PartialEq)]
pub struct CzmTotalLagrangianKernel<const D: usize> {
    small_strain: CzmSmallStrainKernel<D>,
}

impl<const D: usize> CzmTotalLagrangianKernel<D> {
    pub fn new(displacements: &[VariableId], component: usize) -> Result<Self, ConfigurationError> {
        Ok(Self {
            small_strain: CzmSmallStrainKernel::new(displacements, component)?,
        })
    }

    pub fn component(&self) -> usize {
        self.small_strain.component
    }

    /// The contribution of the deformation gradient, `sum_l dT[c]/dF[j][l] grad_phi[l] / 2`.
    fn deformation_jacobian(
        &self,
        qp: &InterfaceQp<f64, D>,
        j: usize,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        let dpk1_df = qp.property_as::<[SMatrix<f64, D, D>; D]>(DPK1TRACTION_DF, DGResidualType::Element)?;
        let dpk1_df = &dpk1_df[self.small_strain.component];
        let mut value = 0.0;
        for l in 0..D {
            value += dpk1_df[(j, l)] * 0.5 * trial.gradient[l];
        }
        debug_assert!(value.is_finite());
        Ok(value)
    }

    fn total_jacobian(
        &self,
        qp: &InterfaceQp<f64, D>,
        jacobian_type: DGJacobianType,
        j: usize,
        test: &TestFunction<D>,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        let jump = self
            .small_strain
            .jump_jacobian(qp, jacobian_type, j, test, trial)?;
        let deformation = self.deformation_jacobian(qp, j, trial)? * test.value;
        let value = match jacobian_type.test_side() {
            DGResidualType::Element => jump - deformation,
            DGResidualType::Neighbor => jump + deformation,
        };
        debug_assert!(value.is_finite());
        Ok(value)
    }
}

impl<const D: usize> InterfaceQpKernel<D> for CzmTotalLagrangianKernel<D> {
    fn variable(&self) -> VariableId {
        self.small_strain.displacements[self.small_strain.component]
    }

    fn coupled_variables(&self) -> &[VariableId] {
        &self.small_strain.coupled
    }

    fn compute_qp_residual(
        &self,
        qp: &InterfaceQp<f64, D>,
        side: DGResidualType,
        test: &TestFunction<D>,
    ) -> Result<f64, KernelError> {
        self.small_strain.compute_qp_residual(qp, side, test)
    }

    fn compute_qp_jacobian(
        &self,
        qp: &InterfaceQp<f64, D>,
        jacobian_type: DGJacobianType,
        test: &TestFunction<D>,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        self.total_jacobian(qp, jacobian_type, self.small_strain.component, test, trial)
    }

    fn compute_qp_off_diag_jacobian(
        &self,
        qp: &InterfaceQp<f64, D>,
        jacobian_type: DGJacobianType,
        jvar: VariableId,
        test: &TestFunction<D>,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        match self.small_strain.component_of(jvar) {
            Some(j) => self.total_jacobian(qp, jacobian_type, j, test, trial),
            None => Ok(0.0),
        }
    }
}

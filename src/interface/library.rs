//! A small library of interface kernels.
//!
//! Kernels with both a hand-coded and an automatically differentiated flavor implement
//! [`InterfaceQpKernel`] as well as [`ADInterfaceQpKernel`], and are wrapped in
//! [`InterfaceKernelBase`](super::InterfaceKernelBase) or [`ADInterfaceKernel`](super::ADInterfaceKernel).
use crate::ad::ADReal;
use crate::assembly::{InterfaceQp, TestFunction, TrialFunction, VariableId};
use crate::error::{ConfigurationError, KernelError};
use crate::interface::{ADInterfaceQpKernel, DGJacobianType, DGResidualType, InterfaceQpKernel};
use fekern_traits::GenericReal;

/// Distributes a scalar interface flux onto both sides: `+flux` on the element side and `-flux` on
/// the neighbor side.
fn signed<T: GenericReal>(flux: T, side: DGResidualType) -> T {
    match side {
        DGResidualType::Element => flux,
        DGResidualType::Neighbor => -flux,
    }
}

/// Sign of a Jacobian block of a flux distributed with [`signed`], where the flux depends on the
/// element value with a positive and on the neighbor value with a negative sign.
fn block_sign(jacobian_type: DGJacobianType) -> f64 {
    match jacobian_type {
        DGJacobianType::ElementElement | DGJacobianType::NeighborNeighbor => 1.0,
        DGJacobianType::ElementNeighbor | DGJacobianType::NeighborElement => -1.0,
    }
}

fn check_non_negative(parameter: &str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::new(
            parameter,
            format!("must be finite and non-negative, got {}", value),
        ))
    }
}

/// Weakly enforces continuity across the interface with the penalty flux `penalty (u - u_neighbor)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyInterfaceDiffusion {
    variable: VariableId,
    neighbor_variable: VariableId,
    penalty: f64,
}

impl PenaltyInterfaceDiffusion {
    pub fn new(variable: VariableId, neighbor_variable: VariableId, penalty: f64) -> Result<Self, ConfigurationError> {
        check_non_negative("penalty", penalty)?;
        Ok(Self {
            variable,
            neighbor_variable,
            penalty,
        })
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    fn flux<T: GenericReal, const D: usize>(&self, qp: &InterfaceQp<T, D>) -> T {
        (qp.u.value.clone() - qp.u_neighbor.value.clone()) * self.penalty
    }
}

impl<const D: usize> InterfaceQpKernel<D> for PenaltyInterfaceDiffusion {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn neighbor_variable(&self) -> VariableId {
        self.neighbor_variable
    }

    fn compute_qp_residual(
        &self,
        qp: &InterfaceQp<f64, D>,
        side: DGResidualType,
        test: &TestFunction<D>,
    ) -> Result<f64, KernelError> {
        Ok(signed(self.flux(qp), side) * test.value)
    }

    fn compute_qp_jacobian(
        &self,
        _qp: &InterfaceQp<f64, D>,
        jacobian_type: DGJacobianType,
        test: &TestFunction<D>,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        Ok(block_sign(jacobian_type) * self.penalty * test.value * trial.value)
    }
}

impl<const D: usize> ADInterfaceQpKernel<D> for PenaltyInterfaceDiffusion {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn neighbor_variable(&self) -> VariableId {
        self.neighbor_variable
    }

    fn compute_qp_residual(
        &self,
        qp: &InterfaceQp<ADReal, D>,
        side: DGResidualType,
        test: &TestFunction<D>,
    ) -> Result<ADReal, KernelError> {
        Ok(signed(self.flux(qp), side) * test.value)
    }
}

/// Flux continuity across an interface between materials of different diffusivity.
///
/// The interface flux is the average `-(D grad u . n + D_n grad u_n . n) / 2` of the diffusive
/// fluxes of both sides. `D` is read from the element side materials and `D_n` from the neighbor
/// side materials, both from a property named `diffusivity` unless configured otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDiffusion {
    pub variable: VariableId,
    pub neighbor_variable: VariableId,
    pub diffusivity: String,
    pub neighbor_diffusivity: String,
}

impl InterfaceDiffusion {
    pub fn new(variable: VariableId, neighbor_variable: VariableId) -> Self {
        Self {
            variable,
            neighbor_variable,
            diffusivity: "diffusivity".to_string(),
            neighbor_diffusivity: "diffusivity".to_string(),
        }
    }

    pub fn with_diffusivity(mut self, name: impl Into<String>) -> Self {
        self.diffusivity = name.into();
        self
    }

    pub fn with_neighbor_diffusivity(mut self, name: impl Into<String>) -> Self {
        self.neighbor_diffusivity = name.into();
        self
    }

    fn flux<T: GenericReal, const D: usize>(&self, qp: &InterfaceQp<T, D>) -> Result<T, KernelError> {
        let d = qp.property(&self.diffusivity, DGResidualType::Element)?;
        let d_neighbor = qp.property(&self.neighbor_diffusivity, DGResidualType::Neighbor)?;
        let normal_gradient = |gradient: &nalgebra::SVector<T, D>| -> T {
            gradient
                .iter()
                .zip(qp.normal.iter())
                .fold(T::zero(), |acc, (g, &n)| acc + g.clone() * n)
        };
        let element_flux = d * normal_gradient(&qp.u.gradient);
        let neighbor_flux = d_neighbor * normal_gradient(&qp.u_neighbor.gradient);
        Ok(-(element_flux + neighbor_flux) * 0.5)
    }
}

impl<const D: usize> InterfaceQpKernel<D> for InterfaceDiffusion {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn neighbor_variable(&self) -> VariableId {
        self.neighbor_variable
    }

    fn compute_qp_residual(
        &self,
        qp: &InterfaceQp<f64, D>,
        side: DGResidualType,
        test: &TestFunction<D>,
    ) -> Result<f64, KernelError> {
        Ok(signed(self.flux(qp)?, side) * test.value)
    }

    fn compute_qp_jacobian(
        &self,
        qp: &InterfaceQp<f64, D>,
        jacobian_type: DGJacobianType,
        test: &TestFunction<D>,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        let normal_gradient = trial.gradient.dot(&qp.normal);
        let value = match jacobian_type.trial_side() {
            DGResidualType::Element => -0.5 * qp.property(&self.diffusivity, DGResidualType::Element)? * normal_gradient,
            DGResidualType::Neighbor => {
                -0.5 * qp.property(&self.neighbor_diffusivity, DGResidualType::Neighbor)? * normal_gradient
            }
        };
        Ok(signed(value, jacobian_type.test_side()) * test.value)
    }
}

impl<const D: usize> ADInterfaceQpKernel<D> for InterfaceDiffusion {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn neighbor_variable(&self) -> VariableId {
        self.neighbor_variable
    }

    fn compute_qp_residual(
        &self,
        qp: &InterfaceQp<ADReal, D>,
        side: DGResidualType,
        test: &TestFunction<D>,
    ) -> Result<ADReal, KernelError> {
        Ok(signed(self.flux(qp)?, side) * test.value)
    }
}

/// A first order reversible reaction `u <-> u_neighbor` at the interface.
///
/// The reaction rate is `kf u - kb u_neighbor`, with the forward and backward rate constants read
/// from element side material properties (by default named `kf` and `kb`).
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceReaction {
    pub variable: VariableId,
    pub neighbor_variable: VariableId,
    pub forward_rate: String,
    pub backward_rate: String,
}

impl InterfaceReaction {
    pub fn new(variable: VariableId, neighbor_variable: VariableId) -> Self {
        Self {
            variable,
            neighbor_variable,
            forward_rate: "kf".to_string(),
            backward_rate: "kb".to_string(),
        }
    }

    pub fn with_rates(mut self, forward_rate: impl Into<String>, backward_rate: impl Into<String>) -> Self {
        self.forward_rate = forward_rate.into();
        self.backward_rate = backward_rate.into();
        self
    }

    fn rates<T: GenericReal, const D: usize>(&self, qp: &InterfaceQp<T, D>) -> Result<(T, T), KernelError> {
        let kf = qp.property(&self.forward_rate, DGResidualType::Element)?;
        let kb = qp.property(&self.backward_rate, DGResidualType::Element)?;
        Ok((kf, kb))
    }

    fn rate<T: GenericReal, const D: usize>(&self, qp: &InterfaceQp<T, D>) -> Result<T, KernelError> {
        let (kf, kb) = self.rates(qp)?;
        Ok(kf * qp.u.value.clone() - kb * qp.u_neighbor.value.clone())
    }
}

impl<const D: usize> InterfaceQpKernel<D> for InterfaceReaction {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn neighbor_variable(&self) -> VariableId {
        self.neighbor_variable
    }

    fn compute_qp_residual(
        &self,
        qp: &InterfaceQp<f64, D>,
        side: DGResidualType,
        test: &TestFunction<D>,
    ) -> Result<f64, KernelError> {
        Ok(signed(self.rate(qp)?, side) * test.value)
    }

    fn compute_qp_jacobian(
        &self,
        qp: &InterfaceQp<f64, D>,
        jacobian_type: DGJacobianType,
        test: &TestFunction<D>,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        let (kf, kb) = self.rates(qp)?;
        let rate_derivative = match jacobian_type.trial_side() {
            DGResidualType::Element => kf,
            DGResidualType::Neighbor => kb,
        };
        Ok(block_sign(jacobian_type) * rate_derivative * test.value * trial.value)
    }
}

impl<const D: usize> ADInterfaceQpKernel<D> for InterfaceReaction {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn neighbor_variable(&self) -> VariableId {
        self.neighbor_variable
    }

    fn compute_qp_residual(
        &self,
        qp: &InterfaceQp<ADReal, D>,
        side: DGResidualType,
        test: &TestFunction<D>,
    ) -> Result<ADReal, KernelError> {
        Ok(signed(self.rate(qp)?, side) * test.value)
    }
}

/// Penalty enforcement of a Freundlich isotherm `u_neighbor = K u^(1/n)` at the interface.
///
/// The residual is `penalty (K u^(1/n) - u_neighbor)`. The element side variable must be positive.
#[derive(Debug, Clone, PartialEq)]
pub struct FreundlichPenaltyInterface {
    variable: VariableId,
    neighbor_variable: VariableId,
    penalty: f64,
    freundlich_k: f64,
    freundlich_n: f64,
}

impl FreundlichPenaltyInterface {
    pub fn new(
        variable: VariableId,
        neighbor_variable: VariableId,
        penalty: f64,
        freundlich_k: f64,
        freundlich_n: f64,
    ) -> Result<Self, ConfigurationError> {
        check_non_negative("penalty", penalty)?;
        if !(freundlich_n.is_finite() && freundlich_n > 0.0) {
            return Err(ConfigurationError::new(
                "freundlich_n",
                format!("must be finite and positive, got {}", freundlich_n),
            ));
        }
        if !freundlich_k.is_finite() {
            return Err(ConfigurationError::new("freundlich_k", "must be finite"));
        }
        Ok(Self {
            variable,
            neighbor_variable,
            penalty,
            freundlich_k,
            freundlich_n,
        })
    }

    /// The plain penalty flux `penalty (u - u_neighbor)`.
    ///
    /// It is computed alongside the Freundlich flux but does not contribute to the residual.
    pub fn subresidual<T: GenericReal>(&self, u: &T, u_neighbor: &T) -> T {
        (u.clone() - u_neighbor.clone()) * self.penalty
    }

    /// The Freundlich flux `penalty (K u^(1/n) - u_neighbor)`.
    pub fn flux<T: GenericReal>(&self, u: &T, u_neighbor: &T) -> T {
        let equilibrium = u.powf(1.0 / self.freundlich_n) * self.freundlich_k;
        (equilibrium - u_neighbor.clone()) * self.penalty
    }
}

impl<const D: usize> ADInterfaceQpKernel<D> for FreundlichPenaltyInterface {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn neighbor_variable(&self) -> VariableId {
        self.neighbor_variable
    }

    fn compute_qp_residual(
        &self,
        qp: &InterfaceQp<ADReal, D>,
        side: DGResidualType,
        test: &TestFunction<D>,
    ) -> Result<ADReal, KernelError> {
        Ok(signed(self.flux(&qp.u.value, &qp.u_neighbor.value), side) * test.value)
    }
}

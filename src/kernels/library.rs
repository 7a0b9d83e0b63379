//! A small library of element kernels.
//!
//! Kernels that come in a hand-coded and an automatically differentiated flavor implement both
//! the plain and the AD capability trait, and are wrapped in [`KernelValue`](super::KernelValue)
//! or [`ADKernelValue`](super::ADKernelValue) respectively.
use crate::ad::ADReal;
use crate::assembly::{QpContext, TestFunction, TrialFunction, VariableId};
use crate::error::{ConfigurationError, KernelError};
use crate::interpolation::MultiDimensionalInterpolation;
use crate::kernels::{ADGradientKernel, ADPrecomputedValueKernel, PrecomputedValueKernel};
use nalgebra::SVector;
use serde::{Deserialize, Serialize};

/// Linear reaction term `rate * u`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    pub variable: VariableId,
    pub rate: f64,
}

impl<const D: usize> PrecomputedValueKernel<D> for Reaction {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn precompute_qp_residual(&self, qp: &QpContext<f64, D>) -> Result<f64, KernelError> {
        Ok(self.rate * qp.u.value)
    }

    fn precompute_qp_jacobian(&self, _qp: &QpContext<f64, D>, trial: &TrialFunction<D>) -> Result<f64, KernelError> {
        Ok(self.rate * trial.value)
    }
}

impl<const D: usize> ADPrecomputedValueKernel<D> for Reaction {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn precompute_qp_residual(&self, qp: &QpContext<ADReal, D>) -> Result<ADReal, KernelError> {
        Ok(qp.u.value.clone() * self.rate)
    }
}

/// A constant volumetric source, contributing `-value` to the residual.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyForce {
    pub variable: VariableId,
    pub value: f64,
}

impl<const D: usize> PrecomputedValueKernel<D> for BodyForce {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn precompute_qp_residual(&self, _qp: &QpContext<f64, D>) -> Result<f64, KernelError> {
        Ok(-self.value)
    }
}

/// A source proportional to another variable, `-coefficient * v`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoupledForce {
    variable: VariableId,
    coupled: [VariableId; 1],
    coefficient: f64,
}

impl CoupledForce {
    pub fn new(variable: VariableId, coupled: VariableId, coefficient: f64) -> Self {
        Self {
            variable,
            coupled: [coupled],
            coefficient,
        }
    }

    pub fn coupled_variable(&self) -> VariableId {
        self.coupled[0]
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }
}

impl<const D: usize> PrecomputedValueKernel<D> for CoupledForce {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn coupled_variables(&self) -> &[VariableId] {
        &self.coupled
    }

    fn precompute_qp_residual(&self, qp: &QpContext<f64, D>) -> Result<f64, KernelError> {
        let v = qp.coupled(self.coupled[0])?;
        Ok(-self.coefficient * v.value)
    }

    fn compute_qp_off_diag_jacobian(
        &self,
        _qp: &QpContext<f64, D>,
        jvar: VariableId,
        test: &TestFunction<D>,
        trial: &TrialFunction<D>,
    ) -> Result<f64, KernelError> {
        if jvar == self.coupled[0] {
            Ok(-self.coefficient * trial.value * test.value)
        } else {
            Ok(0.0)
        }
    }
}

impl<const D: usize> ADPrecomputedValueKernel<D> for CoupledForce {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn coupled_variables(&self) -> &[VariableId] {
        &self.coupled
    }

    fn precompute_qp_residual(&self, qp: &QpContext<ADReal, D>) -> Result<ADReal, KernelError> {
        let v = qp.coupled(self.coupled[0])?;
        Ok(v.value.clone() * -self.coefficient)
    }
}

/// A scalar coefficient that is either constant or read from a material property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coefficient {
    Constant(f64),
    Property(String),
}

impl Coefficient {
    pub fn evaluate<const D: usize>(&self, qp: &QpContext<ADReal, D>) -> Result<ADReal, KernelError> {
        match self {
            Self::Constant(value) => Ok(ADReal::from(*value)),
            Self::Property(name) => qp.property(name),
        }
    }
}

impl From<f64> for Coefficient {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

/// Diffusion with flux `coefficient * grad u`.
///
/// A property coefficient stored as [`ADReal`] contributes its derivatives to the Jacobian.
#[derive(Debug, Clone, PartialEq)]
pub struct Diffusion {
    pub variable: VariableId,
    pub coefficient: Coefficient,
}

impl<const D: usize> ADGradientKernel<D> for Diffusion {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn precompute_qp_residual(&self, qp: &QpContext<ADReal, D>) -> Result<SVector<ADReal, D>, KernelError> {
        let coefficient = self.coefficient.evaluate(qp)?;
        Ok(qp.u.gradient.map(|g| g * coefficient.clone()))
    }
}

/// Nonlinear diffusion with flux `D(u) grad u`, where `D` is tabulated over `u`.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedDiffusion {
    variable: VariableId,
    table: MultiDimensionalInterpolation,
}

impl TabulatedDiffusion {
    pub fn new(variable: VariableId, table: MultiDimensionalInterpolation) -> Result<Self, ConfigurationError> {
        if !table.is_configured() {
            return Err(ConfigurationError::new("table", "interpolation table has no data"));
        }
        if table.original_dim() != 1 {
            return Err(ConfigurationError::new(
                "table",
                format!("diffusivity must be tabulated over one axis, got {}", table.original_dim()),
            ));
        }
        Ok(Self { variable, table })
    }

    pub fn table(&self) -> &MultiDimensionalInterpolation {
        &self.table
    }
}

impl<const D: usize> ADGradientKernel<D> for TabulatedDiffusion {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn precompute_qp_residual(&self, qp: &QpContext<ADReal, D>) -> Result<SVector<ADReal, D>, KernelError> {
        let diffusivity = self
            .table
            .multi_linear_interpolation(std::slice::from_ref(&qp.u.value))?;
        Ok(qp.u.gradient.map(|g| g * diffusivity.clone()))
    }
}

/// The diffusive term `coefficient * grad(du/dt)`, as appears e.g. in pseudo-parabolic equations.
///
/// Wrap in [`ADTimeKernelGrad`](super::ADTimeKernelGrad).
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDiffusion {
    pub variable: VariableId,
    pub coefficient: f64,
}

impl<const D: usize> ADGradientKernel<D> for TimeDiffusion {
    fn variable(&self) -> VariableId {
        self.variable
    }

    fn precompute_qp_residual(&self, qp: &QpContext<ADReal, D>) -> Result<SVector<ADReal, D>, KernelError> {
        let grad_dot = qp.u.grad_dot()?;
        Ok(grad_dot.map(|g| g * self.coefficient))
    }
}

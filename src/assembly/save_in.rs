//! Copies of kernel contributions saved into auxiliary variables.
use nalgebra::{DMatrix, DVector};
use parking_lot::Mutex;
use std::sync::Arc;

/// A global auxiliary variable that kernels may save their local contributions into.
///
/// Several threads may scatter into the same auxiliary variable concurrently, so the values are
/// protected by a lock which is only held for the duration of a single scatter.
#[derive(Debug)]
pub struct AuxVariable {
    name: String,
    values: Mutex<DVector<f64>>,
}

impl AuxVariable {
    pub fn new(name: impl Into<String>, num_dofs: usize) -> Self {
        Self {
            name: name.into(),
            values: Mutex::new(DVector::zeros(num_dofs)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A copy of the current values.
    pub fn values(&self) -> DVector<f64> {
        self.values.lock().clone()
    }

    pub fn reset(&self) {
        self.values.lock().fill(0.0);
    }

    /// Adds `local[i]` to the global entry `dofs[i]`.
    pub fn scatter_add(&self, dofs: &[usize], local: impl IntoIterator<Item = f64>) {
        let mut values = self.values.lock();
        for (&dof, value) in dofs.iter().zip(local) {
            values[dof] += value;
        }
    }
}

/// The auxiliary variables a kernel saves its residual and Jacobian diagonal into.
#[derive(Debug, Clone, Default)]
pub struct SaveIn {
    residual: Vec<Arc<AuxVariable>>,
    jacobian_diagonal: Vec<Arc<AuxVariable>>,
}

impl SaveIn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_residual(mut self, aux: Arc<AuxVariable>) -> Self {
        self.residual.push(aux);
        self
    }

    pub fn with_jacobian_diagonal(mut self, aux: Arc<AuxVariable>) -> Self {
        self.jacobian_diagonal.push(aux);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.residual.is_empty() && self.jacobian_diagonal.is_empty()
    }

    pub fn save_residual(&self, dofs: &[usize], local_residual: &DVector<f64>) {
        for aux in &self.residual {
            aux.scatter_add(dofs, local_residual.iter().copied());
        }
    }

    pub fn save_jacobian_diagonal(&self, dofs: &[usize], local_jacobian: &DMatrix<f64>) {
        for aux in &self.jacobian_diagonal {
            aux.scatter_add(dofs, local_jacobian.diagonal().iter().copied());
        }
    }
}

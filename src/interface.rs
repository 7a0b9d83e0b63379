//! Discontinuous Galerkin interface kernels.
//!
//! An interface kernel couples a variable on the element side of an interface to a (possibly
//! different) variable on the neighbor side. Its residual has one part per side, and its Jacobian
//! consists of four blocks, one per combination of test function side and trial function side,
//! enumerated by [`DGJacobianType`].
//!
//! As for element kernels, physics is written against small quadrature point traits
//! ([`InterfaceQpKernel`], [`ADInterfaceQpKernel`]) which the wrappers [`InterfaceKernelBase`] and
//! [`ADInterfaceKernel`] turn into [`InterfaceKernel`]s.
use crate::assembly::{InterfaceContext, VariableId};
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut};
use serde::{Deserialize, Serialize};

mod ad;
mod base;
pub mod library;

pub use ad::{ADInterfaceKernel, ADInterfaceQpKernel};
pub use base::{InterfaceKernelBase, InterfaceQpKernel};

/// The side of the interface a residual contribution belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DGResidualType {
    Element,
    Neighbor,
}

impl DGResidualType {
    pub const ALL: [DGResidualType; 2] = [DGResidualType::Element, DGResidualType::Neighbor];
}

/// A Jacobian block of an interface kernel: the first side is that of the test functions, the
/// second that of the trial functions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DGJacobianType {
    ElementElement,
    ElementNeighbor,
    NeighborElement,
    NeighborNeighbor,
}

impl DGJacobianType {
    pub const ALL: [DGJacobianType; 4] = [
        DGJacobianType::ElementElement,
        DGJacobianType::ElementNeighbor,
        DGJacobianType::NeighborElement,
        DGJacobianType::NeighborNeighbor,
    ];

    pub fn from_sides(test_side: DGResidualType, trial_side: DGResidualType) -> Self {
        use DGResidualType::*;
        match (test_side, trial_side) {
            (Element, Element) => Self::ElementElement,
            (Element, Neighbor) => Self::ElementNeighbor,
            (Neighbor, Element) => Self::NeighborElement,
            (Neighbor, Neighbor) => Self::NeighborNeighbor,
        }
    }

    /// The side of the test functions (rows of the block).
    pub fn test_side(&self) -> DGResidualType {
        match self {
            Self::ElementElement | Self::ElementNeighbor => DGResidualType::Element,
            Self::NeighborElement | Self::NeighborNeighbor => DGResidualType::Neighbor,
        }
    }

    /// The side of the trial functions (columns of the block).
    pub fn trial_side(&self) -> DGResidualType {
        match self {
            Self::ElementElement | Self::NeighborElement => DGResidualType::Element,
            Self::ElementNeighbor | Self::NeighborNeighbor => DGResidualType::Neighbor,
        }
    }
}

/// Local residuals of an interface kernel on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceResiduals {
    pub element: DVector<f64>,
    pub neighbor: DVector<f64>,
}

impl InterfaceResiduals {
    pub fn get(&self, side: DGResidualType) -> &DVector<f64> {
        match side {
            DGResidualType::Element => &self.element,
            DGResidualType::Neighbor => &self.neighbor,
        }
    }
}

/// The four local Jacobian blocks of an interface kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceJacobianBlocks {
    pub element_element: DMatrix<f64>,
    pub element_neighbor: DMatrix<f64>,
    pub neighbor_element: DMatrix<f64>,
    pub neighbor_neighbor: DMatrix<f64>,
}

impl InterfaceJacobianBlocks {
    pub fn get(&self, jacobian_type: DGJacobianType) -> &DMatrix<f64> {
        match jacobian_type {
            DGJacobianType::ElementElement => &self.element_element,
            DGJacobianType::ElementNeighbor => &self.element_neighbor,
            DGJacobianType::NeighborElement => &self.neighbor_element,
            DGJacobianType::NeighborNeighbor => &self.neighbor_neighbor,
        }
    }

    pub fn get_mut(&mut self, jacobian_type: DGJacobianType) -> &mut DMatrix<f64> {
        match jacobian_type {
            DGJacobianType::ElementElement => &mut self.element_element,
            DGJacobianType::ElementNeighbor => &mut self.element_neighbor,
            DGJacobianType::NeighborElement => &mut self.neighbor_element,
            DGJacobianType::NeighborNeighbor => &mut self.neighbor_neighbor,
        }
    }

    /// Assembles the blocks into a single matrix with element side rows (columns) first.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let m_e = self.element_element.nrows();
        let n_e = self.element_element.ncols();
        let rows = m_e + self.neighbor_neighbor.nrows();
        let cols = n_e + self.neighbor_neighbor.ncols();
        let mut dense = DMatrix::zeros(rows, cols);
        dense
            .view_mut((0, 0), self.element_element.shape())
            .copy_from(&self.element_element);
        dense
            .view_mut((0, n_e), self.element_neighbor.shape())
            .copy_from(&self.element_neighbor);
        dense
            .view_mut((m_e, 0), self.neighbor_element.shape())
            .copy_from(&self.neighbor_element);
        dense
            .view_mut((m_e, n_e), self.neighbor_neighbor.shape())
            .copy_from(&self.neighbor_neighbor);
        dense
    }
}

/// A kernel contributing to the residual and Jacobian on both sides of an interface.
///
/// The residual of side `Element` belongs to [`variable`](Self::variable) on the element side, the
/// residual of side `Neighbor` to [`neighbor_variable`](Self::neighbor_variable) on the neighbor
/// side. All `compute_*` methods *add* into their output.
pub trait InterfaceKernel<const D: usize>: Send + Sync {
    fn variable(&self) -> VariableId;

    fn neighbor_variable(&self) -> VariableId;

    fn coupled_variables(&self) -> &[VariableId];

    fn is_ad(&self) -> bool;

    fn compute_residual(
        &self,
        ctx: &InterfaceContext<D>,
        side: DGResidualType,
        residual: DVectorViewMut<f64>,
    ) -> eyre::Result<()>;

    /// A Jacobian block with respect to the kernel's own variable on the trial side.
    fn compute_jacobian(
        &self,
        ctx: &InterfaceContext<D>,
        jacobian_type: DGJacobianType,
        jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()>;

    /// A Jacobian block with respect to `jvar` on the trial side.
    ///
    /// If `jvar` is the kernel's own variable on the trial side (`variable` for trial side
    /// `Element`, `neighbor_variable` for trial side `Neighbor`), this is the same as
    /// [`compute_jacobian`](Self::compute_jacobian). Variables that are neither own nor coupled
    /// variables contribute nothing.
    fn compute_off_diag_jacobian(
        &self,
        ctx: &InterfaceContext<D>,
        jacobian_type: DGJacobianType,
        jvar: VariableId,
        jacobian: DMatrixViewMut<f64>,
    ) -> eyre::Result<()>;

    /// The residuals of both sides.
    fn compute_residuals(&self, ctx: &InterfaceContext<D>) -> eyre::Result<InterfaceResiduals> {
        let mut element = DVector::zeros(ctx.element.field(self.variable())?.num_dofs());
        let mut neighbor = DVector::zeros(ctx.neighbor.field(self.neighbor_variable())?.num_dofs());
        self.compute_residual(ctx, DGResidualType::Element, DVectorViewMut::from(&mut element))?;
        self.compute_residual(ctx, DGResidualType::Neighbor, DVectorViewMut::from(&mut neighbor))?;
        Ok(InterfaceResiduals { element, neighbor })
    }

    /// The four Jacobian blocks with respect to the kernel's own variables.
    fn compute_jacobian_blocks(&self, ctx: &InterfaceContext<D>) -> eyre::Result<InterfaceJacobianBlocks> {
        let n_element = ctx.element.field(self.variable())?.num_dofs();
        let n_neighbor = ctx.neighbor.field(self.neighbor_variable())?.num_dofs();
        let mut blocks = InterfaceJacobianBlocks {
            element_element: DMatrix::zeros(n_element, n_element),
            element_neighbor: DMatrix::zeros(n_element, n_neighbor),
            neighbor_element: DMatrix::zeros(n_neighbor, n_element),
            neighbor_neighbor: DMatrix::zeros(n_neighbor, n_neighbor),
        };
        for jacobian_type in DGJacobianType::ALL {
            let block = blocks.get_mut(jacobian_type);
            self.compute_jacobian(ctx, jacobian_type, DMatrixViewMut::from(block))?;
        }
        Ok(blocks)
    }
}

/// The variable a kernel's residual on the given side belongs to.
pub(crate) fn side_variable(variable: VariableId, neighbor_variable: VariableId, side: DGResidualType) -> VariableId {
    match side {
        DGResidualType::Element => variable,
        DGResidualType::Neighbor => neighbor_variable,
    }
}

//! A reference driver assembling global residuals and Jacobians from element and interface
//! contexts.
use crate::assembly::{ElementContext, InterfaceContext, ResidualTag};
use crate::interface::{side_variable, DGJacobianType, DGResidualType, InterfaceKernel};
use crate::kernels::{Kernel, LocalWorkspace};
use log::debug;
use nalgebra::{DMatrix, DVector, DVectorView};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::cell::RefCell;
use thread_local::ThreadLocal;

/// Copies the global coefficients with the given indices into `local`.
pub fn gather_global_to_local<'a>(global: impl Into<DVectorView<'a, f64>>, local: &mut [f64], indices: &[usize]) {
    let global = global.into();
    assert_eq!(local.len(), indices.len(), "Must have one index per local coefficient");
    for (local_i, &global_i) in local.iter_mut().zip(indices) {
        *local_i = global[global_i];
    }
}

/// Global residual vectors, one per [`ResidualTag`].
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedResiduals {
    pub non_time: DVector<f64>,
    pub time: DVector<f64>,
}

impl TaggedResiduals {
    pub fn zeros(num_dofs: usize) -> Self {
        Self {
            non_time: DVector::zeros(num_dofs),
            time: DVector::zeros(num_dofs),
        }
    }

    pub fn get(&self, tag: ResidualTag) -> &DVector<f64> {
        match tag {
            ResidualTag::NonTime => &self.non_time,
            ResidualTag::Time => &self.time,
        }
    }

    pub fn get_mut(&mut self, tag: ResidualTag) -> &mut DVector<f64> {
        match tag {
            ResidualTag::NonTime => &mut self.non_time,
            ResidualTag::Time => &mut self.time,
        }
    }

    /// The sum of all tagged residuals.
    pub fn total(&self) -> DVector<f64> {
        &self.non_time + &self.time
    }

    fn accumulate(&mut self, other: &TaggedResiduals) {
        self.non_time += &other.non_time;
        self.time += &other.time;
    }
}

/// Global Jacobian matrices, one per [`ResidualTag`].
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedJacobians {
    pub non_time: CsrMatrix<f64>,
    pub time: CsrMatrix<f64>,
}

impl TaggedJacobians {
    pub fn get(&self, tag: ResidualTag) -> &CsrMatrix<f64> {
        match tag {
            ResidualTag::NonTime => &self.non_time,
            ResidualTag::Time => &self.time,
        }
    }
}

/// Jacobian entries in coordinate form, one list per tag. Duplicates are summed on conversion.
#[derive(Debug, Default)]
struct TaggedTriplets {
    non_time: Vec<(usize, usize, f64)>,
    time: Vec<(usize, usize, f64)>,
}

impl TaggedTriplets {
    fn get_mut(&mut self, tag: ResidualTag) -> &mut Vec<(usize, usize, f64)> {
        match tag {
            ResidualTag::NonTime => &mut self.non_time,
            ResidualTag::Time => &mut self.time,
        }
    }

    fn push_block(&mut self, tag: ResidualTag, row_dofs: &[usize], col_dofs: &[usize], block: &DMatrix<f64>) {
        let triplets = self.get_mut(tag);
        for (j, &col) in col_dofs.iter().enumerate() {
            for (i, &row) in row_dofs.iter().enumerate() {
                triplets.push((row, col, block[(i, j)]));
            }
        }
    }
}

fn triplets_to_csr<'a>(num_dofs: usize, triplets: impl Iterator<Item = &'a (usize, usize, f64)>) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(num_dofs, num_dofs);
    for &(i, j, v) in triplets {
        coo.push(i, j, v);
    }
    CsrMatrix::from(&coo)
}

/// Assembles global residuals and Jacobians of a set of kernels and interface kernels.
///
/// A kernel is active on every element whose context contains its variable, an interface kernel
/// on every interface whose sides contain its variables. Interface kernels contribute to the
/// non-time residual.
///
/// The parallel methods distribute elements and interfaces over the rayon thread pool. Every
/// worker thread accumulates into its own global buffers, which are summed at the end.
pub struct Assembler<const D: usize> {
    num_dofs: usize,
    kernels: Vec<Box<dyn Kernel<D>>>,
    interface_kernels: Vec<Box<dyn InterfaceKernel<D>>>,
    workspace: ThreadLocal<RefCell<LocalWorkspace>>,
}

impl<const D: usize> Assembler<D> {
    pub fn new(num_dofs: usize) -> Self {
        Self {
            num_dofs,
            kernels: Vec::new(),
            interface_kernels: Vec::new(),
            workspace: ThreadLocal::new(),
        }
    }

    pub fn with_kernel(mut self, kernel: Box<dyn Kernel<D>>) -> Self {
        self.kernels.push(kernel);
        self
    }

    pub fn with_interface_kernel(mut self, kernel: Box<dyn InterfaceKernel<D>>) -> Self {
        self.interface_kernels.push(kernel);
        self
    }

    pub fn add_kernel(&mut self, kernel: Box<dyn Kernel<D>>) {
        self.kernels.push(kernel);
    }

    pub fn add_interface_kernel(&mut self, kernel: Box<dyn InterfaceKernel<D>>) {
        self.interface_kernels.push(kernel);
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn kernels(&self) -> &[Box<dyn Kernel<D>>] {
        &self.kernels
    }

    pub fn interface_kernels(&self) -> &[Box<dyn InterfaceKernel<D>>] {
        &self.interface_kernels
    }

    pub fn assemble_residual(
        &self,
        elements: &[ElementContext<D>],
        interfaces: &[InterfaceContext<D>],
    ) -> eyre::Result<TaggedResiduals> {
        debug!(
            "Assembling residual over {} elements and {} interfaces",
            elements.len(),
            interfaces.len()
        );
        let ws = &mut *self.workspace.get_or_default().borrow_mut();
        let mut residuals = TaggedResiduals::zeros(self.num_dofs);
        for ctx in elements {
            self.add_element_residual(ctx, ws, &mut residuals)?;
        }
        for ctx in interfaces {
            self.add_interface_residual(ctx, ws, &mut residuals)?;
        }
        Ok(residuals)
    }

    pub fn par_assemble_residual(
        &self,
        elements: &[ElementContext<D>],
        interfaces: &[InterfaceContext<D>],
    ) -> eyre::Result<TaggedResiduals> {
        debug!(
            "Assembling residual in parallel over {} elements and {} interfaces",
            elements.len(),
            interfaces.len()
        );
        let accumulators: ThreadLocal<RefCell<TaggedResiduals>> = ThreadLocal::new();
        let num_dofs = self.num_dofs;

        elements.par_iter().try_for_each(|ctx| {
            let ws = &mut *self.workspace.get_or_default().borrow_mut();
            let residuals = &mut *accumulators
                .get_or(|| RefCell::new(TaggedResiduals::zeros(num_dofs)))
                .borrow_mut();
            self.add_element_residual(ctx, ws, residuals)
        })?;
        interfaces.par_iter().try_for_each(|ctx| {
            let ws = &mut *self.workspace.get_or_default().borrow_mut();
            let residuals = &mut *accumulators
                .get_or(|| RefCell::new(TaggedResiduals::zeros(num_dofs)))
                .borrow_mut();
            self.add_interface_residual(ctx, ws, residuals)
        })?;

        let mut residuals = TaggedResiduals::zeros(self.num_dofs);
        for thread_residuals in accumulators {
            residuals.accumulate(&thread_residuals.into_inner());
        }
        Ok(residuals)
    }

    pub fn assemble_jacobian(
        &self,
        elements: &[ElementContext<D>],
        interfaces: &[InterfaceContext<D>],
    ) -> eyre::Result<TaggedJacobians> {
        debug!(
            "Assembling Jacobian over {} elements and {} interfaces",
            elements.len(),
            interfaces.len()
        );
        let ws = &mut *self.workspace.get_or_default().borrow_mut();
        let mut triplets = TaggedTriplets::default();
        for ctx in elements {
            self.add_element_jacobian(ctx, ws, &mut triplets)?;
        }
        for ctx in interfaces {
            self.add_interface_jacobian(ctx, ws, &mut triplets)?;
        }
        Ok(TaggedJacobians {
            non_time: triplets_to_csr(self.num_dofs, triplets.non_time.iter()),
            time: triplets_to_csr(self.num_dofs, triplets.time.iter()),
        })
    }

    pub fn par_assemble_jacobian(
        &self,
        elements: &[ElementContext<D>],
        interfaces: &[InterfaceContext<D>],
    ) -> eyre::Result<TaggedJacobians> {
        debug!(
            "Assembling Jacobian in parallel over {} elements and {} interfaces",
            elements.len(),
            interfaces.len()
        );
        let accumulators: ThreadLocal<RefCell<TaggedTriplets>> = ThreadLocal::new();

        elements.par_iter().try_for_each(|ctx| {
            let ws = &mut *self.workspace.get_or_default().borrow_mut();
            let triplets = &mut *accumulators.get_or_default().borrow_mut();
            self.add_element_jacobian(ctx, ws, triplets)
        })?;
        interfaces.par_iter().try_for_each(|ctx| {
            let ws = &mut *self.workspace.get_or_default().borrow_mut();
            let triplets = &mut *accumulators.get_or_default().borrow_mut();
            self.add_interface_jacobian(ctx, ws, triplets)
        })?;

        let per_thread: Vec<TaggedTriplets> = accumulators
            .into_iter()
            .map(RefCell::into_inner)
            .collect();
        Ok(TaggedJacobians {
            non_time: triplets_to_csr(self.num_dofs, per_thread.iter().flat_map(|t| t.non_time.iter())),
            time: triplets_to_csr(self.num_dofs, per_thread.iter().flat_map(|t| t.time.iter())),
        })
    }

    fn add_element_residual(
        &self,
        ctx: &ElementContext<D>,
        ws: &mut LocalWorkspace,
        residuals: &mut TaggedResiduals,
    ) -> eyre::Result<()> {
        for kernel in &self.kernels {
            let field = match ctx.field(kernel.variable()) {
                Ok(field) => field,
                Err(_) => continue,
            };
            kernel.compute_residual(ctx, ws.residual(field.num_dofs()))?;
            let global = residuals.get_mut(kernel.tag());
            for (&dof, r) in field.dofs.iter().zip(ws.local_residual.iter()) {
                global[dof] += *r;
            }
        }
        Ok(())
    }

    fn add_element_jacobian(
        &self,
        ctx: &ElementContext<D>,
        ws: &mut LocalWorkspace,
        triplets: &mut TaggedTriplets,
    ) -> eyre::Result<()> {
        for kernel in &self.kernels {
            let field = match ctx.field(kernel.variable()) {
                Ok(field) => field,
                Err(_) => continue,
            };
            for jfield in &ctx.fields {
                let block = ws.jacobian(field.num_dofs(), jfield.num_dofs());
                kernel.compute_off_diag_jacobian(ctx, jfield.variable, block)?;
                triplets.push_block(kernel.tag(), field.dofs, jfield.dofs, &ws.local_jacobian);
            }
        }
        Ok(())
    }

    fn add_interface_residual(
        &self,
        ctx: &InterfaceContext<D>,
        ws: &mut LocalWorkspace,
        residuals: &mut TaggedResiduals,
    ) -> eyre::Result<()> {
        for kernel in &self.interface_kernels {
            if !is_active(kernel.as_ref(), ctx) {
                continue;
            }
            for side in DGResidualType::ALL {
                let variable = side_variable(kernel.variable(), kernel.neighbor_variable(), side);
                let field = ctx.side(side).field(variable)?;
                kernel.compute_residual(ctx, side, ws.residual(field.num_dofs()))?;
                let global = residuals.get_mut(ResidualTag::NonTime);
                for (&dof, r) in field.dofs.iter().zip(ws.local_residual.iter()) {
                    global[dof] += *r;
                }
            }
        }
        Ok(())
    }

    fn add_interface_jacobian(
        &self,
        ctx: &InterfaceContext<D>,
        ws: &mut LocalWorkspace,
        triplets: &mut TaggedTriplets,
    ) -> eyre::Result<()> {
        for kernel in &self.interface_kernels {
            if !is_active(kernel.as_ref(), ctx) {
                continue;
            }
            for jacobian_type in DGJacobianType::ALL {
                let test_side = jacobian_type.test_side();
                let variable = side_variable(kernel.variable(), kernel.neighbor_variable(), test_side);
                let field = ctx.side(test_side).field(variable)?;
                for jfield in &ctx.side(jacobian_type.trial_side()).fields {
                    let block = ws.jacobian(field.num_dofs(), jfield.num_dofs());
                    kernel.compute_off_diag_jacobian(ctx, jacobian_type, jfield.variable, block)?;
                    triplets.push_block(ResidualTag::NonTime, field.dofs, jfield.dofs, &ws.local_jacobian);
                }
            }
        }
        Ok(())
    }
}

fn is_active<const D: usize>(kernel: &dyn InterfaceKernel<D>, ctx: &InterfaceContext<D>) -> bool {
    ctx.element.field(kernel.variable()).is_ok() && ctx.neighbor.field(kernel.neighbor_variable()).is_ok()
}

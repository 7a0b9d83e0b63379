//! Per-element evaluation context, owned buffers and the reference assembly driver.
//!
//! Kernels never own solution or shape function data: the caller describes each element (or
//! interface) with an [`ElementContext`] or [`InterfaceContext`] that borrows the quadrature data,
//! shape function tables, local solution coefficients and material properties. The owned
//! counterparts in [`buffers`] are convenient when the data is produced on the fly.
pub mod buffers;
pub mod global;
pub mod local;
pub mod save_in;

pub use local::{
    CoupledValues, ElementContext, FieldData, FieldScalar, FieldValues, InterfaceContext, InterfaceQp, QpContext, QuadratureData,
    ResidualTag, ResidualType, ShapeFunctionTable, ShapeValue, SideContext, TestFunction, TimeDerivativeData,
    TrialFunction, VariableId,
};

//! Error types.
//!
//! Construction-time problems are reported as [`ConfigurationError`], problems with tabulated data
//! as [`InterpolationError`] or [`MultiIndexError`], and problems detected while evaluating a
//! kernel as [`KernelError`]. Assembly routines return `eyre::Result`, into which all of these
//! convert.
use crate::assembly::VariableId;
use std::fmt;
use std::fmt::{Display, Formatter};

/// A kernel, material or table could not be constructed from the given parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationError {
    parameter: String,
    message: String,
}

impl ConfigurationError {
    pub fn new(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// The name of the offending parameter.
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid parameter `{}`: {}", self.parameter, self.message)
    }
}

impl std::error::Error for ConfigurationError {}

/// Malformed interpolation table or query.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum InterpolationError {
    /// The number of base point axes does not match the dimension of the data.
    DimensionMismatch { base_point_axes: usize, data_dim: usize },
    /// An axis has a different number of base points than the data has entries along that axis.
    PointCountMismatch { axis: usize, points: usize, extent: usize },
    /// The base points of an axis are not strictly increasing.
    NotStrictlyIncreasing { axis: usize, index: usize, previous: f64, next: f64 },
    /// An axis has no base points at all.
    EmptyAxis { axis: usize },
    /// The query point has the wrong number of coordinates.
    QueryDimensionMismatch { expected: usize, actual: usize },
    /// The interpolation was used before any data was provided.
    NotConfigured,
    /// A non-degenerate axis of a stored table has fewer than two base points.
    TooFewPoints { axis: usize, points: usize },
    /// The degenerate axis flags of a stored table do not match its base points.
    DegenerateIndexMismatch { active_axes: usize, base_point_axes: usize },
    /// A stored table has no active axes, but no collapsed value either.
    MissingCollapsedValue,
}

impl Display for InterpolationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch {
                base_point_axes,
                data_dim,
            } => write!(
                f,
                "Number of base point axes ({}) does not match the dimension of the data ({})",
                base_point_axes, data_dim
            ),
            Self::PointCountMismatch { axis, points, extent } => write!(
                f,
                "Axis {} has {} base points, but the data has extent {} along this axis",
                axis, points, extent
            ),
            Self::NotStrictlyIncreasing {
                axis,
                index,
                previous,
                next,
            } => write!(
                f,
                "Base points of axis {} are not strictly increasing: point {} ({}) does not exceed point {} ({})",
                axis,
                index,
                next,
                index - 1,
                previous
            ),
            Self::EmptyAxis { axis } => write!(f, "Axis {} has no base points", axis),
            Self::QueryDimensionMismatch { expected, actual } => write!(
                f,
                "Query point has {} coordinates, but the table has dimension {}",
                actual, expected
            ),
            Self::NotConfigured => write!(f, "Interpolation table has not been set up with data"),
            Self::TooFewPoints { axis, points } => write!(
                f,
                "Axis {} has {} base points, but a non-degenerate axis needs at least two",
                axis, points
            ),
            Self::DegenerateIndexMismatch {
                active_axes,
                base_point_axes,
            } => write!(
                f,
                "Degenerate axis flags leave {} active axes, but the table has {} base point axes",
                active_axes, base_point_axes
            ),
            Self::MissingCollapsedValue => write!(f, "Table without active axes has no collapsed value"),
        }
    }
}

impl std::error::Error for InterpolationError {}

/// Invalid operation on a [`MultiIndex`](crate::multi_index::MultiIndex).
#[derive(Debug)]
#[non_exhaustive]
pub enum MultiIndexError {
    /// The flat data does not have the number of entries implied by the shape.
    DataLengthMismatch { expected: usize, actual: usize },
    /// `resize` must preserve the dimensionality.
    DimensionMismatch { expected: usize, actual: usize },
    /// The arguments to `slice` do not describe a valid slice.
    InvalidSlice { message: String },
    /// A serialized multi-index could not be read.
    Io(std::io::Error),
}

impl Display for MultiIndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataLengthMismatch { expected, actual } => write!(
                f,
                "Data has {} entries, but the shape requires {} entries",
                actual, expected
            ),
            Self::DimensionMismatch { expected, actual } => write!(
                f,
                "Cannot change the dimension of a multi-index from {} to {}",
                expected, actual
            ),
            Self::InvalidSlice { message } => write!(f, "Invalid slice: {}", message),
            Self::Io(err) => write!(f, "Failed to read or write multi-index data: {}", err),
        }
    }
}

impl std::error::Error for MultiIndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MultiIndexError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Errors raised by automatic differentiation.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ADError {
    /// Derivatives were dropped because the derivative of an operation is not implemented.
    ImperfectJacobian { context: String },
}

impl Display for ADError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImperfectJacobian { context } => write!(
                f,
                "Imperfect Jacobian in {}: derivatives are not available. \
                 Use ADErrorPolicy::Warn to continue with an inexact Jacobian",
                context
            ),
        }
    }
}

impl std::error::Error for ADError {}

/// Errors raised while evaluating a kernel on an element or interface.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum KernelError {
    /// The operation is not supported by this kernel.
    UnsupportedOperation { kernel: &'static str, operation: &'static str },
    /// A variable required by the kernel is not present in the evaluation context.
    MissingVariable { variable: VariableId },
    /// A material property is not present, or has a different type than requested.
    MissingMaterialProperty { name: String },
    /// The kernel requires the time derivative of a variable, but none was provided.
    MissingTimeDerivative { variable: VariableId },
    /// More local degrees of freedom than a dual number can differentiate.
    TooManyDofs { dofs: usize, capacity: usize },
    /// A tabulated quantity could not be evaluated.
    Interpolation(InterpolationError),
}

impl Display for KernelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedOperation { kernel, operation } => {
                write!(f, "{} does not support {}", kernel, operation)
            }
            Self::MissingVariable { variable } => {
                write!(f, "Variable {} is not available in the evaluation context", variable)
            }
            Self::MissingMaterialProperty { name } => {
                write!(f, "Material property `{}` is not available with the requested type", name)
            }
            Self::MissingTimeDerivative { variable } => {
                write!(f, "Time derivative of variable {} is not available", variable)
            }
            Self::TooManyDofs { dofs, capacity } => write!(
                f,
                "Cannot differentiate with respect to {} local degrees of freedom (capacity {})",
                dofs, capacity
            ),
            Self::Interpolation(err) => write!(f, "Failed to evaluate tabulated data: {}", err),
        }
    }
}

impl std::error::Error for KernelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Interpolation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InterpolationError> for KernelError {
    fn from(err: InterpolationError) -> Self {
        Self::Interpolation(err)
    }
}

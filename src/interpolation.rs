//! Multilinear interpolation of tabulated data on rectilinear grids.
use crate::error::InterpolationError;
use crate::multi_index::MultiIndex;
use fekern_traits::GenericReal;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
struct Table {
    /// Base points of the axes that were not elided.
    base_points: Vec<Vec<f64>>,
    /// Values on the grid spanned by the non-elided axes.
    data: MultiIndex<f64>,
    degenerate_index: Vec<bool>,
    /// The sole value of a table in which every axis is degenerate.
    collapsed: Option<f64>,
}

#[derive(Deserialize)]
struct RawTable {
    base_points: Vec<Vec<f64>>,
    data: MultiIndex<f64>,
    degenerate_index: Vec<bool>,
    collapsed: Option<f64>,
}

impl TryFrom<RawTable> for Table {
    type Error = InterpolationError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        let active_axes = raw
            .degenerate_index
            .iter()
            .filter(|&&degenerate| !degenerate)
            .count();
        if raw.collapsed.is_some() {
            if active_axes != 0 || !raw.base_points.is_empty() {
                return Err(InterpolationError::DegenerateIndexMismatch {
                    active_axes,
                    base_point_axes: raw.base_points.len(),
                });
            }
        } else {
            if active_axes == 0 {
                return Err(InterpolationError::MissingCollapsedValue);
            }
            if active_axes != raw.base_points.len() {
                return Err(InterpolationError::DegenerateIndexMismatch {
                    active_axes,
                    base_point_axes: raw.base_points.len(),
                });
            }
            validate_grid(&raw.base_points, &raw.data)?;
            if let Some((axis, points)) = raw
                .base_points
                .iter()
                .enumerate()
                .find(|(_, points)| points.len() < 2)
            {
                return Err(InterpolationError::TooFewPoints {
                    axis,
                    points: points.len(),
                });
            }
        }
        Ok(Self {
            base_points: raw.base_points,
            data: raw.data,
            degenerate_index: raw.degenerate_index,
            collapsed: raw.collapsed,
        })
    }
}

/// Checks that `data` spans the grid given by `base_points`.
fn validate_grid(base_points: &[Vec<f64>], data: &MultiIndex<f64>) -> Result<(), InterpolationError> {
    if base_points.len() != data.dim() {
        return Err(InterpolationError::DimensionMismatch {
            base_point_axes: base_points.len(),
            data_dim: data.dim(),
        });
    }

    for (axis, (points, &extent)) in base_points.iter().zip(data.shape()).enumerate() {
        if points.len() != extent {
            return Err(InterpolationError::PointCountMismatch {
                axis,
                points: points.len(),
                extent,
            });
        }
        if points.is_empty() {
            return Err(InterpolationError::EmptyAxis { axis });
        }
        for (index, pair) in points.windows(2).enumerate() {
            if !(pair[0] < pair[1]) {
                return Err(InterpolationError::NotStrictlyIncreasing {
                    axis,
                    index: index + 1,
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }
    }
    Ok(())
}

/// Piecewise multilinear interpolation of values tabulated on an N-dimensional rectilinear grid.
///
/// Axes with a single base point are *degenerate*: they are removed from the table when the data
/// is set, and the corresponding query coordinates are ignored. If all axes are degenerate, the
/// table collapses to a single value which is returned for any query.
///
/// Queries outside the grid are not extrapolated. Each coordinate is clamped to the range of its
/// axis, so the interpolant saturates at the boundary values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiDimensionalInterpolation {
    table: Option<Table>,
}

impl MultiDimensionalInterpolation {
    /// An interpolation object without data.
    ///
    /// Querying it fails with [`InterpolationError::NotConfigured`] until
    /// [`set_data`](Self::set_data) is called.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(base_points: Vec<Vec<f64>>, data: MultiIndex<f64>) -> Result<Self, InterpolationError> {
        let mut interpolation = Self::new();
        interpolation.set_data(base_points, data)?;
        Ok(interpolation)
    }

    /// Replaces the tabulated data.
    ///
    /// `base_points[d]` holds the strictly increasing grid coordinates along axis `d`, and `data`
    /// must have shape `[base_points[0].len(), base_points[1].len(), ...]`. If the input is
    /// invalid, an error is returned and the previous table is left untouched.
    pub fn set_data(&mut self, base_points: Vec<Vec<f64>>, data: MultiIndex<f64>) -> Result<(), InterpolationError> {
        validate_grid(&base_points, &data)?;

        let degenerate_index: Vec<bool> = base_points.iter().map(|points| points.len() == 1).collect();
        let degenerate_axes: Vec<usize> = degenerate_index
            .iter()
            .enumerate()
            .filter(|(_, &degenerate)| degenerate)
            .map(|(axis, _)| axis)
            .collect();

        let table = if degenerate_axes.len() == degenerate_index.len() {
            debug!(
                "All {} axes of interpolation table are degenerate, collapsing to a single value",
                degenerate_index.len()
            );
            Table {
                collapsed: Some(data.data()[0]),
                base_points: Vec::new(),
                data,
                degenerate_index,
            }
        } else if degenerate_axes.is_empty() {
            Table {
                base_points,
                data,
                degenerate_index,
                collapsed: None,
            }
        } else {
            debug!(
                "Eliding degenerate axes {:?} of interpolation table with shape {:?}",
                degenerate_axes,
                data.shape()
            );
            let zeros = vec![0; degenerate_axes.len()];
            let data = data
                .slice(&degenerate_axes, &zeros)
                .expect("Degenerate axes always have a valid slice at index 0");
            let base_points = base_points
                .into_iter()
                .zip(&degenerate_index)
                .filter(|(_, &degenerate)| !degenerate)
                .map(|(points, _)| points)
                .collect();
            Table {
                base_points,
                data,
                degenerate_index,
                collapsed: None,
            }
        };

        self.table = Some(table);
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.table.is_some()
    }

    /// The dimension of the table as given to [`set_data`](Self::set_data).
    pub fn original_dim(&self) -> usize {
        self.table
            .as_ref()
            .map(|table| table.degenerate_index.len())
            .unwrap_or(0)
    }

    /// The number of axes that were not elided.
    pub fn dim(&self) -> usize {
        self.table
            .as_ref()
            .map(|table| table.base_points.len())
            .unwrap_or(0)
    }

    /// For each original axis, whether it was elided because it has a single base point.
    pub fn degenerate_index(&self) -> &[bool] {
        self.table
            .as_ref()
            .map(|table| table.degenerate_index.as_slice())
            .unwrap_or(&[])
    }

    /// Base points of the axes that were not elided.
    pub fn base_points(&self) -> &[Vec<f64>] {
        self.table
            .as_ref()
            .map(|table| table.base_points.as_slice())
            .unwrap_or(&[])
    }

    fn table(&self) -> Result<&Table, InterpolationError> {
        self.table.as_ref().ok_or(InterpolationError::NotConfigured)
    }

    /// Finds the grid cell containing the given point.
    ///
    /// `values` holds one coordinate per non-elided axis. For each axis, `indices` receives the
    /// index `i` with `base_points[i] <= x < base_points[i + 1]`. Coordinates below the first
    /// base point are clamped to it (index `0`), coordinates at or above the last base point are
    /// clamped to it (index `len - 2`).
    pub fn linear_search<T: GenericReal>(
        &self,
        values: &mut [T],
        indices: &mut [usize],
    ) -> Result<(), InterpolationError> {
        let table = self.table()?;
        let dim = table.base_points.len();
        for len in [values.len(), indices.len()] {
            if len != dim {
                return Err(InterpolationError::QueryDimensionMismatch {
                    expected: dim,
                    actual: len,
                });
            }
        }
        for ((points, x), index) in table.base_points.iter().zip(values).zip(indices) {
            *index = linear_search_axis(points, x);
        }
        Ok(())
    }

    /// Evaluates the multilinear interpolant at `x`.
    ///
    /// `x` must have one coordinate per original axis, including degenerate axes (whose
    /// coordinates are ignored).
    pub fn multi_linear_interpolation<T: GenericReal>(&self, x: &[T]) -> Result<T, InterpolationError> {
        let table = self.table()?;
        let original_dim = table.degenerate_index.len();
        if x.len() != original_dim {
            return Err(InterpolationError::QueryDimensionMismatch {
                expected: original_dim,
                actual: x.len(),
            });
        }

        if let Some(value) = table.collapsed {
            return Ok(T::from(value));
        }

        let mut coords: Vec<T> = x
            .iter()
            .zip(&table.degenerate_index)
            .filter(|(_, &degenerate)| !degenerate)
            .map(|(x_d, _)| x_d.clone())
            .collect();
        let dim = coords.len();
        let mut indices = vec![0; dim];
        self.linear_search(&mut coords, &mut indices)?;

        let mut corner = vec![0; dim];
        let mut result = T::zero();
        for corner_id in 0..(1usize << dim) {
            let mut weight = T::one();
            for d in 0..dim {
                let points = &table.base_points[d];
                let i = indices[d];
                // Each corner is weighted by the distance of x to the opposite corner
                if corner_id & (1 << d) == 0 {
                    corner[d] = i;
                    weight *= T::from(points[i + 1]) - coords[d].clone();
                } else {
                    corner[d] = i + 1;
                    weight *= coords[d].clone() - points[i];
                }
            }
            result += weight * table.data[corner.as_slice()];
        }

        let volume: f64 = table
            .base_points
            .iter()
            .zip(&indices)
            .map(|(points, &i)| points[i + 1] - points[i])
            .product();
        Ok(result / volume)
    }
}

fn linear_search_axis<T: GenericReal>(points: &[f64], x: &mut T) -> usize {
    debug_assert!(points.len() >= 2);
    let n = points.len();
    if *x < points[0] {
        *x = T::from(points[0]);
        return 0;
    }
    if *x >= points[n - 1] {
        *x = T::from(points[n - 1]);
        return n - 2;
    }
    points
        .windows(2)
        .position(|pair| *x >= pair[0] && *x < pair[1])
        .unwrap_or(n - 2)
}

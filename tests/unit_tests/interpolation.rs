use fekern::ad::DenseDual;
use fekern::error::InterpolationError;
use fekern::interpolation::MultiDimensionalInterpolation;
use fekern::multi_index::MultiIndex;
use matrixcompare::assert_scalar_eq;
use proptest::prelude::*;

/// A trilinear function, which multilinear interpolation reproduces exactly.
fn trilinear(x: f64, y: f64, z: f64) -> f64 {
    1.0 + 2.0 * x - 3.0 * y + 0.5 * z + x * y * z
}

fn grid() -> Vec<Vec<f64>> {
    vec![vec![0.0, 0.5, 2.0], vec![-1.0, 0.0, 0.25, 1.0, 3.0], vec![1.0, 2.0, 4.0, 8.0]]
}

fn tabulate(base_points: &[Vec<f64>], f: impl Fn(&[f64]) -> f64) -> MultiIndex<f64> {
    let shape: Vec<usize> = base_points.iter().map(Vec::len).collect();
    let mut data = MultiIndex::new(&shape);
    let entries: Vec<_> = data.iter_indexed().map(|(indices, _)| indices).collect();
    for indices in entries {
        let x: Vec<f64> = indices
            .iter()
            .zip(base_points)
            .map(|(&i, points)| points[i])
            .collect();
        data[indices.as_slice()] = f(&x);
    }
    data
}

fn trilinear_table() -> MultiDimensionalInterpolation {
    let base_points = grid();
    let data = tabulate(&base_points, |x| trilinear(x[0], x[1], x[2]));
    MultiDimensionalInterpolation::from_data(base_points, data).unwrap()
}

#[test]
fn reproduces_values_at_base_points() {
    let table = trilinear_table();
    assert_eq!(table.dim(), 3);
    assert_eq!(table.original_dim(), 3);
    for &x in &grid()[0] {
        for &y in &grid()[1] {
            for &z in &grid()[2] {
                let value = table.multi_linear_interpolation(&[x, y, z]).unwrap();
                assert_scalar_eq!(value, trilinear(x, y, z), comp = abs, tol = 1e-12);
            }
        }
    }
}

fn nonlinear(x: &[f64]) -> f64 {
    x[0] * x[0] + 3.0 * x[1] - 5.0 * x[2].sqrt()
}

#[test]
fn nonlinear_data_is_interpolated_cellwise() {
    // f = x^2 + 3y - 5 sqrt(z) sampled on a 3 x 5 x 4 grid
    let base_points = grid();
    let data = tabulate(&base_points, nonlinear);
    let table = MultiDimensionalInterpolation::from_data(base_points, data).unwrap();

    // The query lies in the cell [0.5, 2] x [0, 0.25] x [2, 4]. The expected value is the
    // trilinear form through the eight sampled corner values of this cell.
    let (x, y, z) = (1.1, 0.1, 3.0);
    let (x0, x1, y0, y1, z0, z1) = (0.5, 2.0, 0.0, 0.25, 2.0, 4.0);
    let (tx, ty, tz) = ((x - x0) / (x1 - x0), (y - y0) / (y1 - y0), (z - z0) / (z1 - z0));
    let mut expected = 0.0;
    for (cx, wx) in [(x0, 1.0 - tx), (x1, tx)] {
        for (cy, wy) in [(y0, 1.0 - ty), (y1, ty)] {
            for (cz, wz) in [(z0, 1.0 - tz), (z1, tz)] {
                expected += wx * wy * wz * nonlinear(&[cx, cy, cz]);
            }
        }
    }
    let value = table.multi_linear_interpolation(&[x, y, z]).unwrap();
    assert_scalar_eq!(value, expected, comp = abs, tol = 1e-12);
    // The sampled form differs from the continuous function inside the cell
    assert!((value - nonlinear(&[x, y, z])).abs() > 1e-3);

    let mut coords = [x, y, z];
    let mut indices = [0; 3];
    table.linear_search(&mut coords, &mut indices).unwrap();
    assert_eq!(indices, [1, 1, 1]);
}

#[test]
fn queries_outside_the_grid_are_clamped() {
    let table = trilinear_table();
    let value = table.multi_linear_interpolation(&[-1.0, 10.0, 2.0]).unwrap();
    assert_scalar_eq!(value, trilinear(0.0, 3.0, 2.0), comp = abs, tol = 1e-12);

    let mut coords = [5.0, -7.0, 8.0];
    let mut indices = [0; 3];
    table.linear_search(&mut coords, &mut indices).unwrap();
    assert_eq!(coords, [2.0, -1.0, 8.0]);
    assert_eq!(indices, [1, 0, 2]);
}

#[test]
fn derivatives_flow_through_the_interpolant() {
    type Dual = DenseDual<3>;
    let table = trilinear_table();
    let (x, y, z) = (0.3, 0.6, 5.0);
    let query = [Dual::variable(x, 0), Dual::variable(y, 1), Dual::variable(z, 2)];
    let value = table.multi_linear_interpolation(&query).unwrap();
    assert_scalar_eq!(value.value(), trilinear(x, y, z), comp = abs, tol = 1e-12);
    assert_scalar_eq!(value.derivative(0), 2.0 + y * z, comp = abs, tol = 1e-12);
    assert_scalar_eq!(value.derivative(1), -3.0 + x * z, comp = abs, tol = 1e-12);
    assert_scalar_eq!(value.derivative(2), 0.5 + x * y, comp = abs, tol = 1e-12);

    // A clamped coordinate no longer influences the value
    let query = [Dual::variable(x, 0), Dual::variable(4.0, 1), Dual::variable(z, 2)];
    let value = table.multi_linear_interpolation(&query).unwrap();
    assert_eq!(value.derivative(1), 0.0);
    assert_scalar_eq!(value.derivative(0), 2.0 + 3.0 * z, comp = abs, tol = 1e-12);
}

#[test]
fn degenerate_axes_are_elided() {
    let base_points = vec![vec![0.0, 1.0], vec![5.0], vec![0.0, 2.0, 4.0]];
    let data = tabulate(&base_points, |x| x[0] + x[2]);
    let table = MultiDimensionalInterpolation::from_data(base_points, data).unwrap();
    assert_eq!(table.original_dim(), 3);
    assert_eq!(table.dim(), 2);
    assert_eq!(table.degenerate_index(), &[false, true, false]);
    assert_eq!(table.base_points(), &[vec![0.0, 1.0], vec![0.0, 2.0, 4.0]]);

    // The coordinate of the degenerate axis is ignored
    for y in [-100.0, 5.0, 100.0] {
        let value = table.multi_linear_interpolation(&[0.5, y, 3.0]).unwrap();
        assert_scalar_eq!(value, 3.5, comp = abs, tol = 1e-14);
    }
}

#[test]
fn fully_degenerate_table_collapses() {
    let data = MultiIndex::from_data(&[1, 1], vec![4.5]).unwrap();
    let table = MultiDimensionalInterpolation::from_data(vec![vec![2.0], vec![3.0]], data).unwrap();
    assert_eq!(table.dim(), 0);
    assert_eq!(table.original_dim(), 2);
    assert_eq!(table.multi_linear_interpolation(&[-1.0, 7.0]).unwrap(), 4.5);
}

#[test]
fn invalid_data_is_rejected_and_leaves_table_unchanged() {
    let mut table = trilinear_table();
    let reference = table.clone();

    let result = table.set_data(vec![vec![0.0, 1.0]], MultiIndex::new(&[2, 2]));
    assert_eq!(
        result,
        Err(InterpolationError::DimensionMismatch {
            base_point_axes: 1,
            data_dim: 2
        })
    );

    let result = table.set_data(vec![vec![0.0, 1.0, 2.0]], MultiIndex::new(&[2]));
    assert_eq!(
        result,
        Err(InterpolationError::PointCountMismatch {
            axis: 0,
            points: 3,
            extent: 2
        })
    );

    let result = table.set_data(vec![vec![0.0, 1.0], vec![0.0, 2.0, 2.0]], MultiIndex::new(&[2, 3]));
    assert_eq!(
        result,
        Err(InterpolationError::NotStrictlyIncreasing {
            axis: 1,
            index: 2,
            previous: 2.0,
            next: 2.0
        })
    );

    let result = table.set_data(vec![vec![]], MultiIndex::new(&[0]));
    assert_eq!(result, Err(InterpolationError::EmptyAxis { axis: 0 }));

    assert_eq!(table, reference);
}

#[test]
fn queries_are_validated() {
    let unconfigured = MultiDimensionalInterpolation::new();
    assert!(!unconfigured.is_configured());
    assert_eq!(
        unconfigured.multi_linear_interpolation(&[0.0]),
        Err(InterpolationError::NotConfigured)
    );

    let table = trilinear_table();
    assert!(table.is_configured());
    assert_eq!(
        table.multi_linear_interpolation(&[0.0, 1.0]),
        Err(InterpolationError::QueryDimensionMismatch {
            expected: 3,
            actual: 2
        })
    );

    // The mismatching length is reported, also when it is the number of indices
    let mut coords = [0.0; 3];
    assert_eq!(
        table.linear_search(&mut coords, &mut [0; 4]),
        Err(InterpolationError::QueryDimensionMismatch {
            expected: 3,
            actual: 4
        })
    );
}

#[test]
fn serde_json_preserves_the_table() {
    let table = trilinear_table();
    let json = serde_json::to_string(&table).unwrap();
    let deserialized: MultiDimensionalInterpolation = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, table);
    let query = [1.1, 0.1, 3.0];
    assert_eq!(
        deserialized.multi_linear_interpolation(&query),
        table.multi_linear_interpolation(&query)
    );
}

#[test]
fn deserialized_tables_with_degenerate_axes_evaluate() {
    let data = MultiIndex::from_data(&[2, 1], vec![1.0, 3.0]).unwrap();
    let table = MultiDimensionalInterpolation::from_data(vec![vec![0.0, 1.0], vec![5.0]], data).unwrap();
    let json = serde_json::to_string(&table).unwrap();
    let deserialized: MultiDimensionalInterpolation = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.degenerate_index(), &[false, true]);
    assert_eq!(deserialized.multi_linear_interpolation(&[0.5, -2.0]), Ok(2.0));

    let data = MultiIndex::from_data(&[1, 1], vec![7.0]).unwrap();
    let table = MultiDimensionalInterpolation::from_data(vec![vec![0.0], vec![1.0]], data).unwrap();
    let json = serde_json::to_string(&table).unwrap();
    let deserialized: MultiDimensionalInterpolation = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.multi_linear_interpolation(&[3.0, 4.0]), Ok(7.0));
}

#[test]
fn malformed_stored_tables_are_rejected() {
    let cases = [
        // A non-degenerate axis with a single base point
        (
            r#"{"table":{"base_points":[[0.0]],"data":{"shape":[1],"data":[1.0]},
                "degenerate_index":[false],"collapsed":null}}"#,
            "at least two",
        ),
        // Every axis flagged as degenerate, but no collapsed value
        (
            r#"{"table":{"base_points":[[0.0,1.0]],"data":{"shape":[2],"data":[1.0,2.0]},
                "degenerate_index":[true],"collapsed":null}}"#,
            "no collapsed value",
        ),
        // More active axes than base point axes
        (
            r#"{"table":{"base_points":[[0.0,1.0]],"data":{"shape":[2],"data":[1.0,2.0]},
                "degenerate_index":[false,false],"collapsed":null}}"#,
            "active axes",
        ),
        (
            r#"{"table":{"base_points":[[1.0,0.0]],"data":{"shape":[2],"data":[1.0,2.0]},
                "degenerate_index":[false],"collapsed":null}}"#,
            "not strictly increasing",
        ),
        (
            r#"{"table":{"base_points":[[0.0,1.0,2.0]],"data":{"shape":[2],"data":[1.0,2.0]},
                "degenerate_index":[false],"collapsed":null}}"#,
            "extent",
        ),
    ];
    for (json, message) in cases {
        let result = serde_json::from_str::<MultiDimensionalInterpolation>(json);
        let err = result.err().expect("Malformed table must not deserialize");
        assert!(err.to_string().contains(message), "{}", err);
    }
}

proptest! {
    #[test]
    fn trilinear_functions_are_reproduced_exactly(
        x in -0.5f64..2.5,
        y in -1.5f64..3.5,
        z in 0.5f64..9.0,
    ) {
        let table = trilinear_table();
        let clamp = |v: f64, lo: f64, hi: f64| v.max(lo).min(hi);
        let expected = trilinear(clamp(x, 0.0, 2.0), clamp(y, -1.0, 3.0), clamp(z, 1.0, 8.0));
        let value = table.multi_linear_interpolation(&[x, y, z]).unwrap();
        prop_assert!((value - expected).abs() <= 1e-10);
    }
}

use nalgebra::{Vector1, Vector2};

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Gauss-Legendre points and weights on `[-1, 1]` for one to three points.
pub fn gauss_points_1d(n: usize) -> Vec<(f64, f64)> {
    match n {
        1 => vec![(0.0, 2.0)],
        2 => {
            let x = 1.0 / f64::sqrt(3.0);
            vec![(-x, 1.0), (x, 1.0)]
        }
        3 => {
            let x = f64::sqrt(3.0 / 5.0);
            vec![(-x, 5.0 / 9.0), (0.0, 8.0 / 9.0), (x, 5.0 / 9.0)]
        }
        _ => panic!("Gauss rules are only available for 1 to 3 points"),
    }
}

/// Tensor product Gauss points and weights on `[-1, 1]^2`.
pub fn gauss_points_2d(n: usize) -> Vec<(Vector2<f64>, f64)> {
    let rule = gauss_points_1d(n);
    let mut points = Vec::with_capacity(n * n);
    for &(y, wy) in &rule {
        for &(x, wx) in &rule {
            points.push((Vector2::new(x, y), wx * wy));
        }
    }
    points
}

/// Value and gradient of the linear Lagrange basis function `j` on `[-1, 1]`.
///
/// Node 0 sits at `-1`, node 1 at `1`.
pub fn linear_basis_1d(j: usize, xi: f64) -> (f64, Vector1<f64>) {
    let sign = [-1.0, 1.0][j];
    (0.5 * (1.0 + sign * xi), Vector1::new(0.5 * sign))
}

/// Vertices of the reference quadrilateral, counter-clockwise starting at `(-1, -1)`.
pub const QUAD_VERTICES: [[f64; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

/// Value and gradient of the bilinear basis function `j` on `[-1, 1]^2`.
pub fn quad4_basis(j: usize, xi: &Vector2<f64>) -> (f64, Vector2<f64>) {
    let [a, b] = QUAD_VERTICES[j];
    let value = 0.25 * (1.0 + a * xi.x) * (1.0 + b * xi.y);
    let gradient = Vector2::new(0.25 * a * (1.0 + b * xi.y), 0.25 * b * (1.0 + a * xi.x));
    (value, gradient)
}

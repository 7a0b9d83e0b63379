use fekern_optimize::calculus::*;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};

fn polynomial(x: DVectorView<f64>, mut f: DVectorViewMut<f64>) {
    assert_eq!(x.len(), 2);
    let (x1, x2) = (x[0], x[1]);
    f[0] = x1 * x2 + 3.0;
    f[1] = x1 * x1 + x2 * x2 + x1 + 5.0;
}

#[test]
fn approximate_jacobian_simple_function() {
    let mut x = DVector::from_column_slice(&[3.0, 4.0]);
    let j = approximate_jacobian_fd(2, polynomial, &mut x, 1e-6);

    // J = [   x2           x1 ]
    //     [ 2*x1 + 1     2*x2 ]
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 2,
                                           &[4.0, 3.0,
                                             7.0, 8.0]);

    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-6);
    // The input must be left untouched
    assert_eq!(x, DVector::from_column_slice(&[3.0, 4.0]));
}

#[test]
fn forward_differences_are_first_order_accurate() {
    let mut x = DVector::from_column_slice(&[3.0, 4.0]);
    let h = 1e-7;
    let j = approximate_jacobian_fd_with_scheme(2, polynomial, &mut x, h, FiniteDifferenceScheme::Forward);
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 2,
                                           &[4.0, 3.0,
                                             7.0, 8.0]);
    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-5);
}

#[test]
fn test_approximate_gradient_fd() {
    // Define some function f and its gradient
    let f = |x: DVectorView<f64>| {
        let (x, y, z) = (x[0], x[1], x[2]);
        3.0 * x * x * x + 3.0 * x * y - 5.0 * z * z + 2.0
    };
    let f_grad = |x: &DVector<f64>| {
        let (x, y, z) = (x[0], x[1], x[2]);
        DVector::from_column_slice(&[9.0 * x * x + 3.0 * y, 3.0 * x, -10.0 * z])
    };

    let mut x = DVector::from_column_slice(&[3.0, 4.0, 5.0]);
    let f_grad_fd = approximate_gradient_fd(f, &mut x, 1e-6);

    assert_matrix_eq!(f_grad_fd, f_grad(&x), comp = abs, tol = 1e-6);
}

#[test]
fn max_relative_difference_scales_with_reference() {
    let reference = DMatrix::from_row_slice(1, 2, &[10.0, -20.0]);
    let approximate = DMatrix::from_row_slice(1, 2, &[10.0, -19.0]);
    assert_scalar_eq!(max_relative_difference(&approximate, &reference), 0.05, comp = abs, tol = 1e-14);

    let zero = DMatrix::zeros(1, 2);
    assert_scalar_eq!(max_relative_difference(&approximate, &zero), 19.0, comp = abs, tol = 1e-14);
}

use fekern_traits::Real;
use log::debug;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use numeric_literals::replace_float_literals;

/// Finite difference stencil used for numerical differentiation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum FiniteDifferenceScheme {
    /// `(f(x + h e_i) - f(x)) / h`, one extra evaluation per column.
    Forward,
    /// `(f(x + h e_i) - f(x - h e_i)) / 2h`, two evaluations per column but second-order accurate.
    #[default]
    Central,
}

/// Approximates the derivative of the function `f: R^n -> R` with central finite differences.
///
/// The parameter `h` determines the step size of the finite difference approximation.
///
/// The vector `x` is mutable in order to contain intermediate computations, but upon returning,
/// its content remains unchanged.
pub fn approximate_gradient_fd<'a, T>(
    mut f: impl FnMut(DVectorView<T>) -> T,
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) -> DVector<T>
where
    T: Real,
{
    let x = x.into();
    let mut df = DMatrix::zeros(1, x.len());
    approximate_jacobian_fd_into_(
        DMatrixViewMut::from(&mut df),
        |x, mut f_x| f_x[0] = f(x),
        x,
        h,
        FiniteDifferenceScheme::Central,
    );
    df.transpose().column(0).into_owned()
}

/// Approximates the Jacobian of the function $f: \mathbb{R}^n \rightarrow \mathbb{R}^m$
/// with central finite differences.
///
/// The Jacobian matrix is the $m \times n$ matrix whose entries are given by
/// $$ J_{ij} := \pd{f_i}{x_j}.$$
///
/// The parameter `h` determines the step size of the finite difference approximation.
pub fn approximate_jacobian_fd<'a, T>(
    m: usize,
    f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) -> DMatrix<T>
where
    T: Real,
{
    approximate_jacobian_fd_with_scheme(m, f, x, h, FiniteDifferenceScheme::Central)
}

/// Same as [`approximate_jacobian_fd`], but with a configurable finite difference stencil.
pub fn approximate_jacobian_fd_with_scheme<'a, T>(
    m: usize,
    f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
    scheme: FiniteDifferenceScheme,
) -> DMatrix<T>
where
    T: Real,
{
    let x = x.into();
    let n = x.len();
    let mut jacobian = DMatrix::zeros(m, n);
    approximate_jacobian_fd_into_(DMatrixViewMut::from(&mut jacobian), f, x, h, scheme);
    jacobian
}

/// Approximates the Jacobian of the function $f: \mathbb{R}^n \rightarrow \mathbb{R}^m$
/// with finite differences.
///
/// Same as [`approximate_jacobian_fd_with_scheme`], but stores the result in the provided
/// output matrix. The number of rows of the output determines $m$.
pub fn approximate_jacobian_fd_into<'a, T>(
    jacobian: impl Into<DMatrixViewMut<'a, T>>,
    f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
    scheme: FiniteDifferenceScheme,
) where
    T: Real,
{
    approximate_jacobian_fd_into_(jacobian.into(), f, x.into(), h, scheme);
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn approximate_jacobian_fd_into_<T>(
    mut j: DMatrixViewMut<T>,
    mut f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    mut x: DVectorViewMut<T>,
    h: T,
    scheme: FiniteDifferenceScheme,
) where
    T: Real,
{
    let m = j.nrows();
    let n = x.len();
    assert_eq!(n, j.ncols(), "Jacobian must have one column per input variable");
    debug!("Approximating {}x{} Jacobian with {:?} differences", m, n, scheme);

    // Buffers to hold f(x + e_i h) and f(x - e_i h) (or f(x) for forward differences)
    let mut f_plus = DVector::zeros(m);
    let mut f_minus = DVector::zeros(m);

    if scheme == FiniteDifferenceScheme::Forward {
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_minus));
    }

    for i in 0..n {
        let xi = x[i];
        x[i] = xi + h;
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_plus));
        let denominator = match scheme {
            FiniteDifferenceScheme::Forward => h,
            FiniteDifferenceScheme::Central => {
                x[i] = xi - h;
                f(DVectorView::from(&x), DVectorViewMut::from(&mut f_minus));
                2.0 * h
            }
        };
        x[i] = xi;

        let mut df_dxi = j.column_mut(i);
        df_dxi.copy_from(&f_plus);
        df_dxi -= &f_minus;
        df_dxi /= denominator;
    }
}

/// Largest entry-wise difference between two matrices, relative to the largest entry of
/// `reference` (or absolute, if `reference` vanishes).
pub fn max_relative_difference<T>(approximate: &DMatrix<T>, reference: &DMatrix<T>) -> T
where
    T: Real,
{
    assert_eq!(approximate.shape(), reference.shape(), "Matrix dimensions must agree");
    let scale = reference.amax();
    let diff = (approximate - reference).amax();
    if scale > T::zero() {
        diff / scale
    } else {
        diff
    }
}

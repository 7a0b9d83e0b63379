use super::fixtures::{element_buffer, quad4_field, quad4_mass_matrix, quad4_quadrature, quad4_stiffness_matrix, U, V};
use fekern::assembly::buffers::{ElementBuffer, FieldBuffer};
use fekern::assembly::save_in::{AuxVariable, SaveIn};
use fekern::assembly::{ResidualTag, ShapeFunctionTable, VariableId};
use fekern::diagnostics::check_kernel_jacobian;
use fekern::error::KernelError;
use fekern::interpolation::MultiDimensionalInterpolation;
use fekern::kernels::library::{
    BodyForce, Coefficient, CoupledForce, Diffusion, Reaction, TabulatedDiffusion, TimeDiffusion,
};
use fekern::kernels::{ADKernelGrad, ADKernelValue, ADTimeKernelGrad, Kernel, KernelValue};
use fekern::material::{ConstantMaterial, Material, TableCoordinates, TabulatedMaterial};
use fekern::multi_index::MultiIndex;
use fekern::nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut, Vector2};
use matrixcompare::assert_matrix_eq;
use std::sync::Arc;

const U_COEFFS: [f64; 4] = [0.3, 0.7, 0.6, 0.2];
const V_COEFFS: [f64; 4] = [1.0, -0.5, 0.25, 2.0];

fn residual(kernel: &dyn Kernel<2>, buffer: &ElementBuffer<2>) -> DVector<f64> {
    let ctx = buffer.context();
    let n = ctx.field(kernel.variable()).unwrap().num_dofs();
    let mut r = DVector::zeros(n);
    kernel
        .compute_residual(&ctx, DVectorViewMut::from(&mut r))
        .unwrap();
    r
}

fn jacobian(kernel: &dyn Kernel<2>, buffer: &ElementBuffer<2>, jvar: VariableId) -> DMatrix<f64> {
    let ctx = buffer.context();
    let rows = ctx.field(kernel.variable()).unwrap().num_dofs();
    let cols = ctx.field(jvar).unwrap().num_dofs();
    let mut a = DMatrix::zeros(rows, cols);
    kernel
        .compute_off_diag_jacobian(&ctx, jvar, DMatrixViewMut::from(&mut a))
        .unwrap();
    a
}

fn single_field_buffer() -> ElementBuffer<2> {
    element_buffer(-1.0, vec![quad4_field(U, U_COEFFS, 0)])
}

fn coupled_buffer() -> ElementBuffer<2> {
    element_buffer(-1.0, vec![quad4_field(U, U_COEFFS, 0), quad4_field(V, V_COEFFS, 4)])
}

fn reaction_kernels(rate: f64) -> Vec<Box<dyn Kernel<2>>> {
    vec![
        Box::new(KernelValue::new(Reaction { variable: U, rate })),
        Box::new(ADKernelValue::new(Reaction { variable: U, rate })),
    ]
}

#[test]
fn reaction_assembles_scaled_mass_matrix() {
    let rate = 2.5;
    let buffer = single_field_buffer();
    let u = DVector::from_column_slice(&U_COEFFS);
    let expected_jacobian = quad4_mass_matrix() * rate;

    for kernel in reaction_kernels(rate) {
        let r = residual(kernel.as_ref(), &buffer);
        assert_matrix_eq!(r, &expected_jacobian * &u, comp = abs, tol = 1e-12);

        let ctx = buffer.context();
        let mut a = DMatrix::zeros(4, 4);
        kernel
            .compute_jacobian(&ctx, DMatrixViewMut::from(&mut a))
            .unwrap();
        assert_matrix_eq!(a, expected_jacobian, comp = abs, tol = 1e-12);
    }
}

#[test]
fn compute_methods_add_into_their_output() {
    let buffer = single_field_buffer();
    let kernel = KernelValue::new(Reaction { variable: U, rate: 1.0 });
    let ctx = buffer.context();
    let mut r = DVector::from_element(4, 1.0);
    kernel
        .compute_residual(&ctx, DVectorViewMut::from(&mut r))
        .unwrap();
    let expected = quad4_mass_matrix() * DVector::from_column_slice(&U_COEFFS) + DVector::from_element(4, 1.0);
    assert_matrix_eq!(r, expected, comp = abs, tol = 1e-12);
}

#[test]
fn reaction_jacobians_agree_with_finite_differences() {
    for kernel in reaction_kernels(-0.75) {
        let mut buffer = single_field_buffer();
        let comparison = check_kernel_jacobian(kernel.as_ref(), &mut buffer, &[], 1e-6).unwrap();
        assert!(comparison.is_within(1e-7), "{:?}", comparison);
        assert_eq!(buffer.coefficients(), U_COEFFS.to_vec());
    }
}

#[test]
fn body_force_is_a_constant_source() {
    let buffer = single_field_buffer();
    let kernel = KernelValue::new(BodyForce { variable: U, value: 3.0 });
    // Each bilinear basis function integrates to one on the square of side length two
    let r = residual(&kernel, &buffer);
    assert_matrix_eq!(r, DVector::from_element(4, -3.0), comp = abs, tol = 1e-12);
    assert_matrix_eq!(jacobian(&kernel, &buffer, U), DMatrix::<f64>::zeros(4, 4), comp = abs, tol = 0.0);
}

#[test]
fn coupled_force_off_diagonal_jacobian() {
    let c = 1.5;
    let buffer = coupled_buffer();
    let kernels: Vec<Box<dyn Kernel<2>>> = vec![
        Box::new(KernelValue::new(CoupledForce::new(U, V, c))),
        Box::new(ADKernelValue::new(CoupledForce::new(U, V, c))),
    ];
    for kernel in kernels {
        assert_eq!(kernel.coupled_variables(), &[V]);

        let r = residual(kernel.as_ref(), &buffer);
        let expected = quad4_mass_matrix() * DVector::from_column_slice(&V_COEFFS) * (-c);
        assert_matrix_eq!(r, expected, comp = abs, tol = 1e-12);

        assert_matrix_eq!(jacobian(kernel.as_ref(), &buffer, U), DMatrix::<f64>::zeros(4, 4), comp = abs, tol = 1e-14);
        assert_matrix_eq!(jacobian(kernel.as_ref(), &buffer, V), quad4_mass_matrix() * (-c), comp = abs, tol = 1e-12);
        // Variables the kernel is not coupled to contribute nothing
        let mut a = DMatrix::zeros(4, 4);
        kernel
            .compute_off_diag_jacobian(&buffer.context(), VariableId(7), DMatrixViewMut::from(&mut a))
            .unwrap();
        assert_eq!(a, DMatrix::<f64>::zeros(4, 4));

        let mut buffer = coupled_buffer();
        let comparison = check_kernel_jacobian(kernel.as_ref(), &mut buffer, &[], 1e-6).unwrap();
        assert_eq!(comparison.analytic.shape(), (4, 8));
        assert!(comparison.is_within(1e-7), "{:?}", comparison);
    }
}

#[test]
fn coupled_force_requires_the_coupled_variable() {
    let buffer = single_field_buffer();
    let kernel = KernelValue::new(CoupledForce::new(U, V, 1.0));
    let mut r = DVector::zeros(4);
    let err = kernel
        .compute_residual(&buffer.context(), DVectorViewMut::from(&mut r))
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<KernelError>(),
        Some(&KernelError::MissingVariable { variable: V })
    );
}

#[test]
fn diffusion_assembles_scaled_stiffness_matrix() {
    let buffer = single_field_buffer();
    let kernel = ADKernelGrad::new(Diffusion {
        variable: U,
        coefficient: Coefficient::Constant(0.5),
    });
    let expected = quad4_stiffness_matrix() * 0.5;
    assert_matrix_eq!(jacobian(&kernel, &buffer, U), expected, comp = abs, tol = 1e-12);
    assert_matrix_eq!(
        residual(&kernel, &buffer),
        &expected * DVector::from_column_slice(&U_COEFFS),
        comp = abs,
        tol = 1e-12
    );
}

#[test]
fn diffusion_reads_coefficient_from_material() {
    let mut buffer = single_field_buffer();
    let material = ConstantMaterial::new().with_property("diffusivity", 0.5);
    buffer.update_materials(&[&material]).unwrap();
    let kernel = ADKernelGrad::new(Diffusion {
        variable: U,
        coefficient: Coefficient::Property("diffusivity".to_string()),
    });
    assert_matrix_eq!(jacobian(&kernel, &buffer, U), quad4_stiffness_matrix() * 0.5, comp = abs, tol = 1e-12);

    // Without the material, the property is missing
    buffer.update_materials(&[]).unwrap();
    let mut r = DVector::zeros(4);
    let err = kernel
        .compute_residual(&buffer.context(), DVectorViewMut::from(&mut r))
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<KernelError>(),
        Some(&KernelError::MissingMaterialProperty {
            name: "diffusivity".to_string()
        })
    );
}

fn diffusivity_table() -> MultiDimensionalInterpolation {
    let data = MultiIndex::from_data(&[3], vec![1.0, 2.0, 4.0]).unwrap();
    MultiDimensionalInterpolation::from_data(vec![vec![0.0, 1.0, 2.0]], data).unwrap()
}

#[test]
fn diffusion_with_differentiated_material_property() {
    let kernel = ADKernelGrad::new(Diffusion {
        variable: U,
        coefficient: Coefficient::Property("diffusivity".to_string()),
    });

    let ad_material = TabulatedMaterial::<2>::new("diffusivity", diffusivity_table(), TableCoordinates::Variables(vec![U]))
        .unwrap()
        .with_ad(true);
    let materials: [&dyn Material<2>; 1] = [&ad_material];
    let mut buffer = single_field_buffer();
    let comparison = check_kernel_jacobian(&kernel, &mut buffer, &materials, 1e-6).unwrap();
    assert!(comparison.is_within(1e-7), "{:?}", comparison);

    // A plain property hides the dependence of the diffusivity on u from the Jacobian
    let plain_material = ad_material.clone().with_ad(false);
    let materials: [&dyn Material<2>; 1] = [&plain_material];
    let comparison = check_kernel_jacobian(&kernel, &mut buffer, &materials, 1e-6).unwrap();
    assert!(!comparison.is_within(1e-3), "{:?}", comparison);
}

#[test]
fn tabulated_diffusion_agrees_with_finite_differences() {
    let kernel = ADKernelGrad::new(TabulatedDiffusion::new(U, diffusivity_table()).unwrap());
    let mut buffer = single_field_buffer();
    let comparison = check_kernel_jacobian(&kernel, &mut buffer, &[], 1e-6).unwrap();
    assert!(comparison.is_within(1e-7), "{:?}", comparison);
}

#[test]
fn tabulated_diffusion_requires_one_dimensional_table() {
    let data = MultiIndex::from_data(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let table = MultiDimensionalInterpolation::from_data(vec![vec![0.0, 1.0], vec![0.0, 1.0]], data).unwrap();
    let err = TabulatedDiffusion::new(U, table).unwrap_err();
    assert_eq!(err.parameter(), "table");

    let err = TabulatedDiffusion::new(U, MultiDimensionalInterpolation::new()).unwrap_err();
    assert_eq!(err.parameter(), "table");
}

fn time_buffer(du_dot_du: f64) -> ElementBuffer<2> {
    let field = quad4_field(U, U_COEFFS, 0).with_time_derivative(vec![0.1, -0.2, 0.4, 0.0], du_dot_du);
    element_buffer(-1.0, vec![field])
}

#[test]
fn time_diffusion_contributes_to_time_residual() {
    let du_dot_du = 10.0;
    let kernel = ADTimeKernelGrad::new(TimeDiffusion {
        variable: U,
        coefficient: 2.0,
    });
    assert_eq!(Kernel::<2>::tag(&kernel), ResidualTag::Time);
    assert!(Kernel::<2>::is_ad(&kernel));

    let mut buffer = time_buffer(du_dot_du);
    let u_dot = DVector::from_column_slice(&[0.1, -0.2, 0.4, 0.0]);
    let r = residual(&kernel, &buffer);
    assert_matrix_eq!(r, quad4_stiffness_matrix() * u_dot * 2.0, comp = abs, tol = 1e-12);

    let expected_jacobian = quad4_stiffness_matrix() * (2.0 * du_dot_du);
    assert_matrix_eq!(jacobian(&kernel, &buffer, U), expected_jacobian, comp = abs, tol = 1e-11);

    let comparison = check_kernel_jacobian(&kernel, &mut buffer, &[], 1e-6).unwrap();
    assert!(comparison.is_within(1e-7), "{:?}", comparison);
    // The time derivative coefficients are restored along with the solution
    assert_matrix_eq!(residual(&kernel, &buffer), r, comp = abs, tol = 1e-12);
}

#[test]
fn time_kernel_without_time_derivative_fails() {
    let buffer = single_field_buffer();
    let kernel = ADTimeKernelGrad::new(TimeDiffusion {
        variable: U,
        coefficient: 1.0,
    });
    let mut r = DVector::zeros(4);
    let err = kernel
        .compute_residual(&buffer.context(), DVectorViewMut::from(&mut r))
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<KernelError>(),
        Some(&KernelError::MissingTimeDerivative { variable: U })
    );
}

#[test]
fn ad_value_kernel_has_no_hand_coded_jacobian() {
    let kernel = ADKernelValue::new(Reaction { variable: U, rate: 1.0 });
    assert_eq!(
        kernel.precompute_qp_jacobian(),
        Err(KernelError::UnsupportedOperation {
            kernel: "ADKernelValue",
            operation: "precompute_qp_jacobian"
        })
    );
}

#[test]
fn ad_jacobian_rejects_too_many_dofs() {
    let n = 65;
    let table = ShapeFunctionTable::from_fn(n, 4, |_, _| (1.0 / n as f64, Vector2::zeros()));
    let field = FieldBuffer::new(U, vec![1.0; n], table, (0..n).collect());
    let buffer = ElementBuffer::new(quad4_quadrature(-1.0), vec![field]);
    let kernel = ADKernelValue::new(Reaction { variable: U, rate: 1.0 });

    // The residual does not need derivatives
    let r = residual(&kernel, &buffer);
    assert_eq!(r.len(), n);

    let mut a = DMatrix::zeros(n, n);
    let err = kernel
        .compute_jacobian(&buffer.context(), DMatrixViewMut::from(&mut a))
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<KernelError>(),
        Some(&KernelError::TooManyDofs { dofs: 65, capacity: 64 })
    );
}

#[test]
fn thread_local_buffers_follow_element_size() {
    // A single constant shape function on the square [-1, 1]^2 of area four
    let table = ShapeFunctionTable::from_fn(1, 4, |_, _| (1.0, Vector2::zeros()));
    let small = ElementBuffer::new(quad4_quadrature(-1.0), vec![FieldBuffer::new(U, vec![0.5], table, vec![0])]);
    let large = single_field_buffer();
    let rate = 2.0;
    let u = DVector::from_column_slice(&U_COEFFS);

    for kernel in reaction_kernels(rate) {
        // Alternate between element sizes, so that stale entries in reused buffers would show up
        for _ in 0..2 {
            let kernel = kernel.as_ref();
            let expected = quad4_mass_matrix() * rate;
            assert_matrix_eq!(residual(kernel, &large), &expected * &u, comp = abs, tol = 1e-12);
            assert_matrix_eq!(jacobian(kernel, &large, U), expected, comp = abs, tol = 1e-12);
            assert_matrix_eq!(residual(kernel, &small), DVector::from_element(1, 4.0), comp = abs, tol = 1e-12);
            assert_matrix_eq!(jacobian(kernel, &small, U), DMatrix::from_element(1, 1, 8.0), comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn save_in_receives_residual_and_jacobian_diagonal() {
    let rate = 2.0;
    let residual_aux = Arc::new(AuxVariable::new("saved_residual", 8));
    let diagonal_aux = Arc::new(AuxVariable::new("saved_diagonal", 8));
    let save_in = SaveIn::new()
        .with_residual(residual_aux.clone())
        .with_jacobian_diagonal(diagonal_aux.clone());
    let kernels: Vec<Box<dyn Kernel<2>>> = vec![
        Box::new(KernelValue::new(Reaction { variable: U, rate }).with_save_in(save_in.clone())),
        Box::new(ADKernelValue::new(Reaction { variable: U, rate }).with_save_in(save_in)),
    ];
    let buffer = element_buffer(-1.0, vec![quad4_field(U, U_COEFFS, 2)]);
    let local_residual = quad4_mass_matrix() * DVector::from_column_slice(&U_COEFFS) * rate;

    for kernel in kernels {
        residual_aux.reset();
        diagonal_aux.reset();
        residual(kernel.as_ref(), &buffer);
        jacobian(kernel.as_ref(), &buffer, U);

        let saved = residual_aux.values();
        assert_eq!(saved.rows(0, 2), DVector::<f64>::zeros(2));
        assert_matrix_eq!(saved.rows(2, 4), local_residual, comp = abs, tol = 1e-12);
        assert_eq!(saved.rows(6, 2), DVector::<f64>::zeros(2));

        let diagonal = diagonal_aux.values();
        assert_matrix_eq!(diagonal.rows(2, 4), DVector::from_element(4, rate * 4.0 / 9.0), comp = abs, tol = 1e-12);
    }
    assert_eq!(residual_aux.name(), "saved_residual");
}

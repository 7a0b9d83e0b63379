use crate::unit_tests::fixtures::{element_buffer, face_field, interface_buffer, quad4_field, quad4_quadrature, U, V};
use fekern::ad::{ADReal, DenseDual};
use fekern::assembly::buffers::{ElementBuffer, FieldBuffer};
use fekern::assembly::{ResidualType, ShapeFunctionTable, VariableId};
use fekern::error::KernelError;
use fekern::interface::DGResidualType::{Element, Neighbor};
use fekern::nalgebra::Vector2;
use matrixcompare::assert_scalar_eq;

/// Nodal values of `1 + 2x + 3y` on `[-1, 1]^2`.
const LINEAR_COEFFS: [f64; 4] = [-4.0, 0.0, 6.0, 2.0];

#[test]
fn shape_function_table_is_quadrature_point_major() {
    let table = ShapeFunctionTable::<2>::from_fn(3, 2, |j, qp| ((10 * qp + j) as f64, Vector2::new(j as f64, qp as f64)));
    assert_eq!(table.num_functions(), 3);
    assert_eq!(table.num_quadrature_points(), 2);
    assert_eq!(table.values_at(1), &[10.0, 11.0, 12.0]);
    assert_eq!(table.gradient(2, 1), &Vector2::new(2.0, 1.0));
    assert_eq!(table.shape(1, 0).value, 1.0);

    let empty = ShapeFunctionTable::<2>::zeros(0, 4);
    assert_eq!(empty.num_quadrature_points(), 0);
}

#[test]
fn fields_reproduce_linear_functions() {
    let buffer = element_buffer(-1.0, vec![quad4_field(U, LINEAR_COEFFS, 0)]);
    let ctx = buffer.context();
    let field = ctx.field(U).unwrap();
    for (qp, x) in ctx.quadrature.points().iter().enumerate() {
        let values = field.evaluate::<f64>(qp, None);
        assert_eq!(values.variable, U);
        assert_scalar_eq!(values.value, 1.0 + 2.0 * x.x + 3.0 * x.y, comp = abs, tol = 1e-14);
        assert_scalar_eq!(values.gradient.x, 2.0, comp = abs, tol = 1e-14);
        assert_scalar_eq!(values.gradient.y, 3.0, comp = abs, tol = 1e-14);
        assert_eq!(values.dot(), Err(KernelError::MissingTimeDerivative { variable: U }));
    }
}

#[test]
fn seeded_evaluation_places_derivatives_in_slots() {
    let buffer = element_buffer(-1.0, vec![quad4_field(U, LINEAR_COEFFS, 0)]);
    let ctx = buffer.context();
    let field = ctx.field(U).unwrap();
    let qp = 3;
    let values = field.evaluate::<DenseDual<8>>(qp, Some(4));
    assert_scalar_eq!(values.value.value(), field.evaluate::<f64>(qp, None).value, comp = abs, tol = 1e-14);
    for j in 0..4 {
        assert_eq!(values.value.derivative(j), 0.0);
        assert_eq!(values.value.derivative(4 + j), field.shape.value(j, qp));
        assert_eq!(values.gradient[1].derivative(4 + j), field.shape.gradient(j, qp)[1]);
    }
}

#[test]
fn time_derivatives_are_scaled_by_du_dot_du() {
    let field = quad4_field(U, LINEAR_COEFFS, 0).with_time_derivative(vec![1.0, 2.0, 3.0, 4.0], 10.0);
    let buffer = element_buffer(-1.0, vec![field]);
    let ctx = buffer.context();
    let field = ctx.field(U).unwrap();
    let values = field.evaluate::<DenseDual<4>>(0, Some(0));
    let dot = values.dot().unwrap();
    let expected: f64 = (0..4)
        .map(|j| (j + 1) as f64 * field.shape.value(j, 0))
        .sum();
    assert_scalar_eq!(dot.value(), expected, comp = abs, tol = 1e-14);
    for j in 0..4 {
        assert_scalar_eq!(dot.derivative(j), 10.0 * field.shape.value(j, 0), comp = abs, tol = 1e-14);
    }
    assert!(values.grad_dot().is_ok());
}

#[test]
fn element_context_lays_out_slots_in_field_order() {
    let buffer = element_buffer(
        -1.0,
        vec![quad4_field(V, [0.0; 4], 10), quad4_field(U, LINEAR_COEFFS, 20)],
    );
    let ctx = buffer.context();
    assert_eq!(ctx.num_slots(), 8);
    assert_eq!(ctx.slot_offset(V), Ok(0));
    assert_eq!(ctx.slot_offset(U), Ok(4));
    assert_eq!(ctx.field(U).unwrap().dofs, &[20, 21, 22, 23]);
    assert_eq!(
        ctx.field(VariableId(7)).err(),
        Some(KernelError::MissingVariable { variable: VariableId(7) })
    );

    let qp = ctx
        .qp_context::<ADReal>(0, U, &[V], true, ResidualType::Jacobian)
        .unwrap();
    assert_eq!(qp.residual_type, ResidualType::Jacobian);
    assert_eq!(qp.u.value.derivative(4), ctx.field(U).unwrap().shape.value(0, 0));
    assert_eq!(qp.coupled(V).unwrap().value.derivative(0), ctx.field(V).unwrap().shape.value(0, 0));
    assert!(qp.coupled(U).is_err());
}

#[test]
fn plain_properties_convert_to_dual_numbers() {
    let mut buffer = element_buffer(-1.0, vec![quad4_field(U, LINEAR_COEFFS, 0)]);
    buffer.materials.insert("k", vec![2.0; 4]);
    let ctx = buffer.context();
    let qp = ctx
        .qp_context::<ADReal>(1, U, &[], true, ResidualType::Residual)
        .unwrap();
    let k = qp.property("k").unwrap();
    assert_eq!(k.value(), 2.0);
    assert_eq!(k.derivative(0), 0.0);
    assert_eq!(
        qp.property("missing").err(),
        Some(KernelError::MissingMaterialProperty {
            name: "missing".to_string()
        })
    );
}

#[test]
#[should_panic]
fn element_context_rejects_inconsistent_shape_tables() {
    let field = FieldBuffer::new(U, vec![0.0; 4], ShapeFunctionTable::zeros(4, 3), vec![0, 1, 2, 3]);
    let buffer = ElementBuffer::new(quad4_quadrature(-1.0), vec![field]);
    let _ = buffer.context();
}

#[test]
fn interface_context_numbers_neighbor_slots_after_element_slots() {
    let buffer = interface_buffer(
        vec![face_field(U, Element, [1.0; 4], 0), face_field(V, Element, [2.0; 4], 4)],
        vec![face_field(U, Neighbor, [3.0; 4], 8)],
    );
    let ctx = buffer.context();
    assert_eq!(ctx.num_slots(), 12);
    assert_eq!(ctx.slot_offset(V, Element), Ok(4));
    assert_eq!(ctx.slot_offset(U, Neighbor), Ok(8));
    assert!(ctx.slot_offset(V, Neighbor).is_err());

    let qp = ctx.qp_context::<f64>(0, U, U, &[V], false).unwrap();
    assert_eq!(qp.normal, Vector2::new(1.0, 0.0));
    assert_scalar_eq!(qp.u.value, 1.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(qp.u_neighbor.value, 3.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(qp.coupled(V, Element).unwrap().value, 2.0, comp = abs, tol = 1e-14);
    assert_eq!(
        qp.coupled(V, Neighbor).err(),
        Some(KernelError::MissingVariable { variable: V })
    );
}

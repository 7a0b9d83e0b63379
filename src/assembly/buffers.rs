//! Owned storage for element and interface data.
//!
//! The contexts in [`local`](crate::assembly::local) only borrow their data. The buffers here own
//! it and hand out contexts on demand, which is convenient when element data is generated on the
//! fly, and required when solution coefficients are perturbed (e.g. for finite difference checks).
use crate::assembly::local::{
    ElementContext, FieldData, InterfaceContext, QuadratureData, ShapeFunctionTable, SideContext, VariableId,
};
use crate::material::{compute_material_properties, Material, MaterialInput, MaterialProperties};
use crate::error::KernelError;
use nalgebra::SVector;

/// A buffer for storing quadrature data.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureBuffer<const D: usize> {
    jxw: Vec<f64>,
    coord: Vec<f64>,
    points: Vec<SVector<f64, D>>,
    normals: Vec<SVector<f64, D>>,
}

impl<const D: usize> QuadratureBuffer<D> {
    /// Quadrature with unit coordinate scaling and no normals.
    pub fn new(jxw: Vec<f64>, points: Vec<SVector<f64, D>>) -> Self {
        assert_eq!(jxw.len(), points.len(), "Must have one point per quadrature point");
        let coord = vec![1.0; jxw.len()];
        Self {
            jxw,
            coord,
            points,
            normals: Vec::new(),
        }
    }

    pub fn with_coord(mut self, coord: Vec<f64>) -> Self {
        assert_eq!(coord.len(), self.jxw.len(), "Must have one scaling per quadrature point");
        self.coord = coord;
        self
    }

    pub fn with_normals(mut self, normals: Vec<SVector<f64, D>>) -> Self {
        assert_eq!(normals.len(), self.jxw.len(), "Must have one normal per quadrature point");
        self.normals = normals;
        self
    }

    pub fn num_quadrature_points(&self) -> usize {
        self.jxw.len()
    }

    pub fn as_data(&self) -> QuadratureData<'_, D> {
        QuadratureData::new(&self.jxw, &self.coord, &self.points, &self.normals)
    }
}

/// Owned data of a single field on an element (side).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBuffer<const D: usize> {
    variable: VariableId,
    coefficients: Vec<f64>,
    time_derivative: Option<(Vec<f64>, f64)>,
    shape: ShapeFunctionTable<D>,
    dofs: Vec<usize>,
}

impl<const D: usize> FieldBuffer<D> {
    pub fn new(variable: VariableId, coefficients: Vec<f64>, shape: ShapeFunctionTable<D>, dofs: Vec<usize>) -> Self {
        assert_eq!(
            coefficients.len(),
            shape.num_functions(),
            "Must have one coefficient per shape function"
        );
        assert_eq!(coefficients.len(), dofs.len(), "Must have one dof index per coefficient");
        Self {
            variable,
            coefficients,
            time_derivative: None,
            shape,
            dofs,
        }
    }

    pub fn with_time_derivative(mut self, coefficients: Vec<f64>, du_dot_du: f64) -> Self {
        assert_eq!(coefficients.len(), self.coefficients.len());
        self.time_derivative = Some((coefficients, du_dot_du));
        self
    }

    pub fn variable(&self) -> VariableId {
        self.variable
    }

    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn coefficients_mut(&mut self) -> &mut [f64] {
        &mut self.coefficients
    }

    /// Time derivative coefficients, if any.
    pub fn time_coefficients_mut(&mut self) -> Option<&mut [f64]> {
        self.time_derivative
            .as_mut()
            .map(|(coefficients, _)| coefficients.as_mut_slice())
    }

    pub fn as_field_data(&self) -> FieldData<'_, D> {
        let field = FieldData::new(self.variable, &self.coefficients, &self.shape, &self.dofs);
        match &self.time_derivative {
            Some((coefficients, du_dot_du)) => field.with_time_derivative(coefficients, *du_dot_du),
            None => field,
        }
    }
}

fn field_data<const D: usize>(fields: &[FieldBuffer<D>]) -> Vec<FieldData<'_, D>> {
    fields.iter().map(FieldBuffer::as_field_data).collect()
}

/// Owned data of a single element.
#[derive(Debug)]
pub struct ElementBuffer<const D: usize> {
    pub quadrature: QuadratureBuffer<D>,
    pub fields: Vec<FieldBuffer<D>>,
    pub materials: MaterialProperties,
}

impl<const D: usize> ElementBuffer<D> {
    pub fn new(quadrature: QuadratureBuffer<D>, fields: Vec<FieldBuffer<D>>) -> Self {
        Self {
            quadrature,
            fields,
            materials: MaterialProperties::new(),
        }
    }

    /// All local coefficients in slot order.
    pub fn coefficients(&self) -> Vec<f64> {
        self.fields
            .iter()
            .flat_map(|field| field.coefficients().iter().copied())
            .collect()
    }

    /// Overwrites all local coefficients, given in slot order.
    ///
    /// Time derivative coefficients are shifted by `du_dot_du` times the change of the solution
    /// coefficients.
    pub fn set_coefficients(&mut self, coefficients: &[f64]) {
        set_coefficients(&mut self.fields, coefficients);
    }

    /// Recomputes the material properties from the current field values.
    pub fn update_materials(&mut self, materials: &[&dyn Material<D>]) -> Result<(), KernelError> {
        let fields = field_data(&self.fields);
        let input = MaterialInput::new(self.quadrature.as_data(), &fields);
        let properties = compute_material_properties(materials, &input)?;
        self.materials = properties;
        Ok(())
    }

    pub fn context(&self) -> ElementContext<'_, D> {
        ElementContext::new(self.quadrature.as_data(), field_data(&self.fields), &self.materials)
    }
}

fn set_coefficients<const D: usize>(fields: &mut [FieldBuffer<D>], coefficients: &[f64]) -> usize {
    let mut offset = 0;
    for field in fields {
        let n = field.coefficients.len();
        let new_coefficients = &coefficients[offset..offset + n];
        // Time derivatives follow the solution with slope du_dot_du
        if let Some((time_coefficients, du_dot_du)) = &mut field.time_derivative {
            let old_coefficients = &field.coefficients;
            for ((dot, old), new) in time_coefficients
                .iter_mut()
                .zip(old_coefficients)
                .zip(new_coefficients)
            {
                *dot += *du_dot_du * (new - old);
            }
        }
        field.coefficients.copy_from_slice(new_coefficients);
        offset += n;
    }
    offset
}

/// Owned data of a single interface.
#[derive(Debug)]
pub struct InterfaceBuffer<const D: usize> {
    pub quadrature: QuadratureBuffer<D>,
    pub element_fields: Vec<FieldBuffer<D>>,
    pub neighbor_fields: Vec<FieldBuffer<D>>,
    pub element_materials: MaterialProperties,
    pub neighbor_materials: MaterialProperties,
}

impl<const D: usize> InterfaceBuffer<D> {
    pub fn new(
        quadrature: QuadratureBuffer<D>,
        element_fields: Vec<FieldBuffer<D>>,
        neighbor_fields: Vec<FieldBuffer<D>>,
    ) -> Self {
        Self {
            quadrature,
            element_fields,
            neighbor_fields,
            element_materials: MaterialProperties::new(),
            neighbor_materials: MaterialProperties::new(),
        }
    }

    /// All local coefficients in slot order (element side first).
    pub fn coefficients(&self) -> Vec<f64> {
        self.element_fields
            .iter()
            .chain(&self.neighbor_fields)
            .flat_map(|field| field.coefficients().iter().copied())
            .collect()
    }

    /// Overwrites all local coefficients, given in slot order (element side first).
    pub fn set_coefficients(&mut self, coefficients: &[f64]) {
        let n = set_coefficients(&mut self.element_fields, coefficients);
        set_coefficients(&mut self.neighbor_fields, &coefficients[n..]);
    }

    /// Recomputes the element side material properties from the current field values on both
    /// sides of the interface.
    pub fn update_materials(&mut self, materials: &[&dyn Material<D>]) -> Result<(), KernelError> {
        let element_fields = field_data(&self.element_fields);
        let neighbor_fields = field_data(&self.neighbor_fields);
        let input = MaterialInput::new(self.quadrature.as_data(), &element_fields).with_neighbor(&neighbor_fields);
        let properties = compute_material_properties(materials, &input)?;
        self.element_materials = properties;
        Ok(())
    }

    pub fn context(&self) -> InterfaceContext<'_, D> {
        InterfaceContext::new(
            self.quadrature.as_data(),
            SideContext::new(field_data(&self.element_fields), &self.element_materials),
            SideContext::new(field_data(&self.neighbor_fields), &self.neighbor_materials),
        )
    }
}

//! Material property registry and simple material models.
//!
//! Materials compute named, quadrature-point indexed properties before kernels run. Kernels look
//! properties up by name through [`QpContext::property`](crate::assembly::QpContext::property)
//! (or the interface equivalent).
use crate::ad::ADReal;
use crate::assembly::{FieldData, FieldScalar, QuadratureData, VariableId};
use crate::error::{ConfigurationError, KernelError};
use crate::interpolation::MultiDimensionalInterpolation;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Named material properties, each stored as one value per quadrature point.
///
/// Properties are type-erased: a property can hold plain values (`f64`, vectors, matrices) or
/// dual numbers, and is retrieved with the type it was stored with.
#[derive(Debug, Default)]
pub struct MaterialProperties {
    properties: FxHashMap<String, Box<dyn Any + Send + Sync>>,
}

impl MaterialProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a property, replacing any existing property with the same name.
    pub fn insert<P>(&mut self, name: impl Into<String>, values: Vec<P>)
    where
        P: Send + Sync + 'static,
    {
        self.properties.insert(name.into(), Box::new(values));
    }

    /// Returns the property column `name`, creating it with `num_quadrature_points` copies of
    /// `initial` if it does not exist (or has a different type).
    pub fn declare<P>(&mut self, name: &str, num_quadrature_points: usize, initial: P) -> &mut Vec<P>
    where
        P: Clone + Send + Sync + 'static,
    {
        let entry = self
            .properties
            .entry(name.to_string())
            .or_insert_with(|| Box::new(vec![initial.clone(); num_quadrature_points]) as Box<dyn Any + Send + Sync>);
        if !entry.is::<Vec<P>>() {
            *entry = Box::new(vec![initial; num_quadrature_points]);
        }
        entry
            .downcast_mut()
            .expect("Internal error: Property was just created with the requested type")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// All values of a property.
    pub fn column<P: 'static>(&self, name: &str) -> Result<&[P], KernelError> {
        self.properties
            .get(name)
            .and_then(|values| values.downcast_ref::<Vec<P>>())
            .map(Vec::as_slice)
            .ok_or_else(|| KernelError::MissingMaterialProperty { name: name.to_string() })
    }

    /// The value of a property at a single quadrature point.
    pub fn get<P: 'static>(&self, name: &str, qp: usize) -> Result<&P, KernelError> {
        self.column::<P>(name)?
            .get(qp)
            .ok_or_else(|| KernelError::MissingMaterialProperty { name: name.to_string() })
    }

    /// Moves all properties of `other` into `self`, replacing properties with the same name.
    pub fn extend(&mut self, other: MaterialProperties) {
        self.properties.extend(other.properties);
    }
}

/// Input available to a material when computing its properties.
///
/// For volume materials, `neighbor_fields` is empty. When materials produce dual numbers, slots
/// are assigned to `fields` followed by `neighbor_fields`, which must therefore be given in the
/// same order as in the context the kernels are evaluated with.
#[derive(Debug, Clone, Copy)]
pub struct MaterialInput<'a, const D: usize> {
    pub quadrature: QuadratureData<'a, D>,
    pub fields: &'a [FieldData<'a, D>],
    pub neighbor_fields: &'a [FieldData<'a, D>],
}

impl<'a, const D: usize> MaterialInput<'a, D> {
    pub fn new(quadrature: QuadratureData<'a, D>, fields: &'a [FieldData<'a, D>]) -> Self {
        Self {
            quadrature,
            fields,
            neighbor_fields: &[],
        }
    }

    pub fn with_neighbor(mut self, neighbor_fields: &'a [FieldData<'a, D>]) -> Self {
        self.neighbor_fields = neighbor_fields;
        self
    }

    /// Finds a field on the element side and its first derivative slot.
    pub fn field(&self, variable: VariableId) -> Result<(usize, &'a FieldData<'a, D>), KernelError> {
        find_with_offset(self.fields, variable, 0)
    }

    /// Finds a field on the neighbor side and its first derivative slot.
    pub fn neighbor_field(&self, variable: VariableId) -> Result<(usize, &'a FieldData<'a, D>), KernelError> {
        let offset = self.fields.iter().map(FieldData::num_dofs).sum();
        find_with_offset(self.neighbor_fields, variable, offset)
    }
}

fn find_with_offset<'a, const D: usize>(
    fields: &'a [FieldData<'a, D>],
    variable: VariableId,
    mut offset: usize,
) -> Result<(usize, &'a FieldData<'a, D>), KernelError> {
    for field in fields {
        if field.variable == variable {
            return Ok((offset, field));
        }
        offset += field.num_dofs();
    }
    Err(KernelError::MissingVariable { variable })
}

/// A material model computing quadrature point properties.
pub trait Material<const D: usize>: Send + Sync {
    fn compute_properties(
        &self,
        input: &MaterialInput<D>,
        properties: &mut MaterialProperties,
    ) -> Result<(), KernelError>;
}

/// Computes the properties of all given materials into a single registry.
pub fn compute_material_properties<const D: usize>(
    materials: &[&dyn Material<D>],
    input: &MaterialInput<D>,
) -> Result<MaterialProperties, KernelError> {
    let mut properties = MaterialProperties::new();
    for material in materials {
        material.compute_properties(input, &mut properties)?;
    }
    Ok(properties)
}

/// Spatially constant, plain material properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantMaterial {
    pub properties: Vec<(String, f64)>,
}

impl ConstantMaterial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, name: impl Into<String>, value: f64) -> Self {
        self.properties.push((name.into(), value));
        self
    }
}

impl<const D: usize> Material<D> for ConstantMaterial {
    fn compute_properties(
        &self,
        input: &MaterialInput<D>,
        properties: &mut MaterialProperties,
    ) -> Result<(), KernelError> {
        let n = input.quadrature.num_quadrature_points();
        for (name, value) in &self.properties {
            properties.insert(name.clone(), vec![*value; n]);
        }
        Ok(())
    }
}

/// The quantities a tabulated property is a function of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableCoordinates {
    /// The physical coordinates of the quadrature point.
    Position,
    /// The values of the given variables (on the element side).
    Variables(Vec<VariableId>),
}

/// A material property interpolated from a table.
///
/// When the property is a function of variables and `ad` is set, the property is stored as
/// [`ADReal`] and carries derivatives with respect to the coefficients of those variables, so that
/// kernels consuming it obtain exact Jacobians. Otherwise the property is stored as `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabulatedMaterial<const D: usize> {
    name: String,
    table: MultiDimensionalInterpolation,
    coordinates: TableCoordinates,
    ad: bool,
}

impl<const D: usize> TabulatedMaterial<D> {
    /// A tabulated property named `name`.
    ///
    /// The table must have one axis per coordinate: one per variable, or `D` for
    /// [`TableCoordinates::Position`].
    pub fn new(
        name: impl Into<String>,
        table: MultiDimensionalInterpolation,
        coordinates: TableCoordinates,
    ) -> Result<Self, ConfigurationError> {
        if !table.is_configured() {
            return Err(ConfigurationError::new("table", "interpolation table has no data"));
        }
        let (dim, what) = match &coordinates {
            TableCoordinates::Position => (D, "spatial coordinates"),
            TableCoordinates::Variables(variables) => (variables.len(), "variables"),
        };
        if dim != table.original_dim() {
            return Err(ConfigurationError::new(
                "coordinates",
                format!(
                    "table has dimension {}, but {} {} were given",
                    table.original_dim(),
                    dim,
                    what
                ),
            ));
        }
        Ok(Self {
            name: name.into(),
            table,
            coordinates,
            ad: false,
        })
    }

    pub fn with_ad(mut self, ad: bool) -> Self {
        self.ad = ad;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn evaluate<T: FieldScalar>(
        &self,
        input: &MaterialInput<D>,
        qp: usize,
        seeded: bool,
    ) -> Result<T, KernelError> {
        let x: Vec<T> = match &self.coordinates {
            TableCoordinates::Position => input.quadrature.points()[qp]
                .iter()
                .map(|&x| T::from(x))
                .collect(),
            TableCoordinates::Variables(variables) => variables
                .iter()
                .map(|&v| -> Result<T, KernelError> {
                    let (offset, field) = input.field(v)?;
                    Ok(field.evaluate::<T>(qp, seeded.then_some(offset)).value)
                })
                .collect::<Result<_, _>>()?,
        };
        Ok(self.table.multi_linear_interpolation(&x)?)
    }
}

impl<const D: usize> Material<D> for TabulatedMaterial<D> {
    fn compute_properties(
        &self,
        input: &MaterialInput<D>,
        properties: &mut MaterialProperties,
    ) -> Result<(), KernelError> {
        let n = input.quadrature.num_quadrature_points();
        let is_ad = self.ad && matches!(self.coordinates, TableCoordinates::Variables(_));
        if is_ad {
            let values = (0..n)
                .map(|qp| self.evaluate::<ADReal>(input, qp, true))
                .collect::<Result<Vec<_>, _>>()?;
            properties.insert(self.name.clone(), values);
        } else {
            let values = (0..n)
                .map(|qp| self.evaluate::<f64>(input, qp, false))
                .collect::<Result<Vec<_>, _>>()?;
            properties.insert(self.name.clone(), values);
        }
        Ok(())
    }
}

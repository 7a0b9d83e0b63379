use crate::ad::{Derivatives, DualNumber};
use crate::error::KernelError;
use crate::interface::DGResidualType;
use crate::material::MaterialProperties;
use fekern_traits::GenericReal;
use nalgebra::SVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Identifies a solution variable (field).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableId(pub usize);

impl Display for VariableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The global residual vector (and Jacobian matrix) a kernel contributes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResidualTag {
    /// Contributions from steady-state terms.
    #[default]
    NonTime,
    /// Contributions from terms involving time derivatives.
    Time,
}

/// What quantity the current quadrature point evaluation contributes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResidualType {
    Residual,
    Jacobian,
}

/// Quadrature data for a single element or interface side.
///
/// `jxw[q]` is the quadrature weight multiplied by the determinant of the Jacobian of the
/// reference-to-physical map, `coord[q]` the coordinate system scaling (e.g. `2 pi r` in
/// axisymmetric problems, otherwise one). For interface sides, `normals[q]` is the outward unit
/// normal of the element side.
#[derive(Debug, Copy, Clone)]
pub struct QuadratureData<'a, const D: usize> {
    jxw: &'a [f64],
    coord: &'a [f64],
    points: &'a [SVector<f64, D>],
    normals: &'a [SVector<f64, D>],
}

impl<'a, const D: usize> QuadratureData<'a, D> {
    /// # Panics
    ///
    /// Panics if the arrays do not all have the same length. `normals` may be empty.
    pub fn new(
        jxw: &'a [f64],
        coord: &'a [f64],
        points: &'a [SVector<f64, D>],
        normals: &'a [SVector<f64, D>],
    ) -> Self {
        assert_eq!(jxw.len(), coord.len(), "Coordinate scaling must have one entry per quadrature point");
        assert_eq!(jxw.len(), points.len(), "Must have one point per quadrature point");
        assert!(
            normals.is_empty() || normals.len() == jxw.len(),
            "Normals must either be absent or given for every quadrature point"
        );
        Self {
            jxw,
            coord,
            points,
            normals,
        }
    }

    pub fn num_quadrature_points(&self) -> usize {
        self.jxw.len()
    }

    pub fn jxw(&self) -> &'a [f64] {
        self.jxw
    }

    pub fn coord(&self) -> &'a [f64] {
        self.coord
    }

    pub fn points(&self) -> &'a [SVector<f64, D>] {
        self.points
    }

    pub fn normals(&self) -> &'a [SVector<f64, D>] {
        self.normals
    }

    /// The combined integration factor `JxW * coord` of a quadrature point.
    pub fn jxw_coord(&self, qp: usize) -> f64 {
        self.jxw[qp] * self.coord[qp]
    }

    pub fn normal(&self, qp: usize) -> SVector<f64, D> {
        self.normals.get(qp).copied().unwrap_or_else(SVector::zeros)
    }
}

/// Value and gradient of a shape function at a quadrature point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ShapeValue<const D: usize> {
    pub value: f64,
    pub gradient: SVector<f64, D>,
}

/// A test function evaluated at a quadrature point.
pub type TestFunction<const D: usize> = ShapeValue<D>;

/// A trial function evaluated at a quadrature point.
pub type TrialFunction<const D: usize> = ShapeValue<D>;

/// Values and physical gradients of all shape functions of a field at all quadrature points.
///
/// Stored quadrature-point major, so that the values of all functions at a single quadrature
/// point are contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeFunctionTable<const D: usize> {
    num_functions: usize,
    values: Vec<f64>,
    gradients: Vec<SVector<f64, D>>,
}

impl<const D: usize> ShapeFunctionTable<D> {
    pub fn zeros(num_functions: usize, num_quadrature_points: usize) -> Self {
        Self {
            num_functions,
            values: vec![0.0; num_functions * num_quadrature_points],
            gradients: vec![SVector::zeros(); num_functions * num_quadrature_points],
        }
    }

    /// Builds the table from a function returning the value and gradient of shape function `j`
    /// at quadrature point `qp`.
    pub fn from_fn(
        num_functions: usize,
        num_quadrature_points: usize,
        mut f: impl FnMut(usize, usize) -> (f64, SVector<f64, D>),
    ) -> Self {
        let mut table = Self::zeros(num_functions, num_quadrature_points);
        for qp in 0..num_quadrature_points {
            for j in 0..num_functions {
                let (value, gradient) = f(j, qp);
                table.set(j, qp, value, gradient);
            }
        }
        table
    }

    pub fn num_functions(&self) -> usize {
        self.num_functions
    }

    pub fn num_quadrature_points(&self) -> usize {
        if self.num_functions == 0 {
            0
        } else {
            self.values.len() / self.num_functions
        }
    }

    pub fn set(&mut self, j: usize, qp: usize, value: f64, gradient: SVector<f64, D>) {
        let idx = qp * self.num_functions + j;
        self.values[idx] = value;
        self.gradients[idx] = gradient;
    }

    pub fn value(&self, j: usize, qp: usize) -> f64 {
        self.values[qp * self.num_functions + j]
    }

    pub fn gradient(&self, j: usize, qp: usize) -> &SVector<f64, D> {
        &self.gradients[qp * self.num_functions + j]
    }

    pub fn shape(&self, j: usize, qp: usize) -> ShapeValue<D> {
        ShapeValue {
            value: self.value(j, qp),
            gradient: *self.gradient(j, qp),
        }
    }

    /// Values of all shape functions at the given quadrature point.
    pub fn values_at(&self, qp: usize) -> &[f64] {
        let n = self.num_functions;
        &self.values[qp * n..(qp + 1) * n]
    }

    /// Gradients of all shape functions at the given quadrature point.
    pub fn gradients_at(&self, qp: usize) -> &[SVector<f64, D>] {
        let n = self.num_functions;
        &self.gradients[qp * n..(qp + 1) * n]
    }
}

/// Local coefficients of the time derivative of a field.
#[derive(Debug, Copy, Clone)]
pub struct TimeDerivativeData<'a> {
    pub coefficients: &'a [f64],
    /// Derivative of the time derivative coefficients with respect to the solution coefficients
    /// (e.g. `1 / dt` for backward Euler).
    pub du_dot_du: f64,
}

/// A field (variable) restricted to one element or element side.
#[derive(Debug, Copy, Clone)]
pub struct FieldData<'a, const D: usize> {
    pub variable: VariableId,
    pub coefficients: &'a [f64],
    pub time_derivative: Option<TimeDerivativeData<'a>>,
    pub shape: &'a ShapeFunctionTable<D>,
    /// Global degree of freedom indices of the local coefficients.
    pub dofs: &'a [usize],
}

impl<'a, const D: usize> FieldData<'a, D> {
    /// # Panics
    ///
    /// Panics if the number of coefficients, shape functions and dofs are not the same.
    pub fn new(
        variable: VariableId,
        coefficients: &'a [f64],
        shape: &'a ShapeFunctionTable<D>,
        dofs: &'a [usize],
    ) -> Self {
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

    pub fn with_time_derivative(mut self, coefficients: &'a [f64], du_dot_du: f64) -> Self {
        assert_eq!(
            coefficients.len(),
            self.coefficients.len(),
            "Time derivative must have one coefficient per shape function"
        );
        self.time_derivative = Some(TimeDerivativeData {
            coefficients,
            du_dot_du,
        });
        self
    }

    pub fn num_dofs(&self) -> usize {
        self.coefficients.len()
    }

    /// Evaluates the field at a quadrature point.
    ///
    /// If `slot_offset` is given, the coefficient of shape function `j` is treated as the
    /// independent variable in derivative slot `slot_offset + j`.
    pub fn evaluate<T: FieldScalar>(&self, qp: usize, slot_offset: Option<usize>) -> FieldValues<T, D> {
        let phi = self.shape.values_at(qp);
        let grad_phi = self.shape.gradients_at(qp);
        let seed = |factor| slot_offset.map(|offset| (offset, factor));

        let value = T::combine(self.coefficients, phi.iter().copied(), seed(1.0));
        let gradient = SVector::from_fn(|k, _| {
            T::combine(self.coefficients, grad_phi.iter().map(|g| g[k]), seed(1.0))
        });
        let (dot, grad_dot) = match &self.time_derivative {
            Some(time) => {
                let dot = T::combine(time.coefficients, phi.iter().copied(), seed(time.du_dot_du));
                let grad_dot = SVector::from_fn(|k, _| {
                    T::combine(time.coefficients, grad_phi.iter().map(|g| g[k]), seed(time.du_dot_du))
                });
                (Some(dot), Some(grad_dot))
            }
            None => (None, None),
        };

        FieldValues {
            variable: self.variable,
            value,
            gradient,
            dot,
            grad_dot,
        }
    }
}

/// A field evaluated at a quadrature point.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValues<T, const D: usize> {
    pub variable: VariableId,
    pub value: T,
    pub gradient: SVector<T, D>,
    /// Time derivative, if the field has time derivative coefficients.
    pub dot: Option<T>,
    pub grad_dot: Option<SVector<T, D>>,
}

impl<T, const D: usize> FieldValues<T, D> {
    pub fn dot(&self) -> Result<&T, KernelError> {
        self.dot.as_ref().ok_or(KernelError::MissingTimeDerivative {
            variable: self.variable,
        })
    }

    pub fn grad_dot(&self) -> Result<&SVector<T, D>, KernelError> {
        self.grad_dot
            .as_ref()
            .ok_or(KernelError::MissingTimeDerivative {
                variable: self.variable,
            })
    }
}

/// A scalar type that fields can be evaluated in.
///
/// Evaluating a field in `f64` gives plain values, evaluating it in a dual number additionally
/// yields the derivatives with respect to the field coefficients.
pub trait FieldScalar: GenericReal {
    /// Computes `sum_j coefficients[j] * weights[j]`.
    ///
    /// If `seed` is `Some((offset, factor))`, the derivative with respect to coefficient `j` is
    /// `factor * weights[j]` and is stored in slot `offset + j`.
    fn combine(coefficients: &[f64], weights: impl Iterator<Item = f64>, seed: Option<(usize, f64)>) -> Self;
}

impl FieldScalar for f64 {
    fn combine(coefficients: &[f64], weights: impl Iterator<Item = f64>, _seed: Option<(usize, f64)>) -> Self {
        coefficients.iter().zip(weights).map(|(c, w)| c * w).sum()
    }
}

impl<Deriv: Derivatives> FieldScalar for DualNumber<Deriv> {
    fn combine(coefficients: &[f64], weights: impl Iterator<Item = f64>, seed: Option<(usize, f64)>) -> Self {
        let mut value = 0.0;
        let mut derivatives = Deriv::default();
        for (j, (c, w)) in coefficients.iter().zip(weights).enumerate() {
            value += c * w;
            if let Some((offset, factor)) = seed {
                derivatives.insert(offset + j, factor * w);
            }
        }
        DualNumber::new(value, derivatives)
    }
}

/// Looks up a material property and converts it to the requested scalar type.
///
/// A column stored as `T` is used directly. Otherwise a plain `f64` column is converted (with
/// vanishing derivatives).
pub(crate) fn generic_property<T: GenericReal>(
    materials: &MaterialProperties,
    name: &str,
    qp: usize,
) -> Result<T, KernelError> {
    if let Ok(value) = materials.get::<T>(name, qp) {
        return Ok(value.clone());
    }
    materials.get::<f64>(name, qp).map(|&value| T::from(value))
}

/// Everything a kernel may use at a single quadrature point of an element.
#[derive(Debug)]
pub struct QpContext<'c, T, const D: usize> {
    pub qp: usize,
    pub point: SVector<f64, D>,
    pub residual_type: ResidualType,
    /// The kernel's own variable.
    pub u: FieldValues<T, D>,
    /// The coupled variables declared by the kernel, in declaration order.
    pub coupled: Vec<FieldValues<T, D>>,
    pub materials: &'c MaterialProperties,
}

impl<'c, T: GenericReal, const D: usize> QpContext<'c, T, D> {
    pub fn coupled(&self, variable: VariableId) -> Result<&FieldValues<T, D>, KernelError> {
        self.coupled
            .iter()
            .find(|values| values.variable == variable)
            .ok_or(KernelError::MissingVariable { variable })
    }

    /// Time derivative of the kernel's own variable.
    pub fn u_dot(&self) -> Result<&T, KernelError> {
        self.u.dot()
    }

    /// A material property at this quadrature point, converted to the scalar type `T`.
    pub fn property(&self, name: &str) -> Result<T, KernelError> {
        generic_property(self.materials, name, self.qp)
    }

    /// A material property of arbitrary type at this quadrature point.
    pub fn property_as<P: 'static>(&self, name: &str) -> Result<&'c P, KernelError> {
        self.materials.get::<P>(name, self.qp)
    }
}

/// Values of a coupled variable on both sides of an interface.
#[derive(Debug, Clone)]
pub struct CoupledValues<T, const D: usize> {
    pub variable: VariableId,
    pub element: Option<FieldValues<T, D>>,
    pub neighbor: Option<FieldValues<T, D>>,
}

/// Everything an interface kernel may use at a single quadrature point of an interface.
#[derive(Debug)]
pub struct InterfaceQp<'c, T, const D: usize> {
    pub qp: usize,
    pub point: SVector<f64, D>,
    /// Outward unit normal of the element side.
    pub normal: SVector<f64, D>,
    /// The kernel's variable on the element side.
    pub u: FieldValues<T, D>,
    /// The kernel's neighbor variable on the neighbor side.
    pub u_neighbor: FieldValues<T, D>,
    pub coupled: Vec<CoupledValues<T, D>>,
    pub materials: &'c MaterialProperties,
    pub neighbor_materials: &'c MaterialProperties,
}

impl<'c, T: GenericReal, const D: usize> InterfaceQp<'c, T, D> {
    pub fn coupled(&self, variable: VariableId, side: DGResidualType) -> Result<&FieldValues<T, D>, KernelError> {
        let coupled = self
            .coupled
            .iter()
            .find(|values| values.variable == variable);
        let values = coupled.and_then(|values| match side {
            DGResidualType::Element => values.element.as_ref(),
            DGResidualType::Neighbor => values.neighbor.as_ref(),
        });
        values.ok_or(KernelError::MissingVariable { variable })
    }

    /// A material property of the given side, converted to the scalar type `T`.
    pub fn property(&self, name: &str, side: DGResidualType) -> Result<T, KernelError> {
        generic_property(self.side_materials(side), name, self.qp)
    }

    pub fn property_as<P: 'static>(&self, name: &str, side: DGResidualType) -> Result<&'c P, KernelError> {
        self.side_materials(side).get::<P>(name, self.qp)
    }

    fn side_materials(&self, side: DGResidualType) -> &'c MaterialProperties {
        match side {
            DGResidualType::Element => self.materials,
            DGResidualType::Neighbor => self.neighbor_materials,
        }
    }
}

fn find_field<'f, 'a, const D: usize>(
    fields: &'f [FieldData<'a, D>],
    variable: VariableId,
) -> Result<(usize, &'f FieldData<'a, D>), KernelError> {
    let mut offset = 0;
    for field in fields {
        if field.variable == variable {
            return Ok((offset, field));
        }
        offset += field.num_dofs();
    }
    Err(KernelError::MissingVariable { variable })
}

/// The data needed to evaluate kernels on a single element.
///
/// When kernels are differentiated, each local coefficient is assigned a derivative slot: the
/// fields are laid out one after the other in the order given here.
#[derive(Debug, Clone)]
pub struct ElementContext<'a, const D: usize> {
    pub quadrature: QuadratureData<'a, D>,
    pub fields: Vec<FieldData<'a, D>>,
    pub materials: &'a MaterialProperties,
}

impl<'a, const D: usize> ElementContext<'a, D> {
    pub fn new(quadrature: QuadratureData<'a, D>, fields: Vec<FieldData<'a, D>>, materials: &'a MaterialProperties) -> Self {
        for field in &fields {
            assert_eq!(
                field.shape.num_quadrature_points(),
                quadrature.num_quadrature_points(),
                "Shape function table of variable {} has the wrong number of quadrature points",
                field.variable
            );
        }
        Self {
            quadrature,
            fields,
            materials,
        }
    }

    pub fn field(&self, variable: VariableId) -> Result<&FieldData<'a, D>, KernelError> {
        find_field(&self.fields, variable).map(|(_, field)| field)
    }

    /// The first derivative slot of the given variable.
    pub fn slot_offset(&self, variable: VariableId) -> Result<usize, KernelError> {
        find_field(&self.fields, variable).map(|(offset, _)| offset)
    }

    /// The total number of local degrees of freedom.
    pub fn num_slots(&self) -> usize {
        self.fields.iter().map(FieldData::num_dofs).sum()
    }

    /// Evaluates the kernel's variable and its coupled variables at a quadrature point.
    ///
    /// With `seeded`, field coefficients are seeded as independent variables according to the
    /// slot layout of this context.
    pub fn qp_context<T: FieldScalar>(
        &self,
        qp: usize,
        variable: VariableId,
        coupled: &[VariableId],
        seeded: bool,
        residual_type: ResidualType,
    ) -> Result<QpContext<'a, T, D>, KernelError> {
        let evaluate = |variable| -> Result<FieldValues<T, D>, KernelError> {
            let (offset, field) = find_field(&self.fields, variable)?;
            Ok(field.evaluate(qp, seeded.then_some(offset)))
        };
        Ok(QpContext {
            qp,
            point: self.quadrature.points()[qp],
            residual_type,
            u: evaluate(variable)?,
            coupled: coupled
                .iter()
                .map(|&v| evaluate(v))
                .collect::<Result<_, _>>()?,
            materials: self.materials,
        })
    }
}

/// Fields and material properties of one side of an interface.
#[derive(Debug, Clone)]
pub struct SideContext<'a, const D: usize> {
    pub fields: Vec<FieldData<'a, D>>,
    pub materials: &'a MaterialProperties,
}

impl<'a, const D: usize> SideContext<'a, D> {
    pub fn new(fields: Vec<FieldData<'a, D>>, materials: &'a MaterialProperties) -> Self {
        Self { fields, materials }
    }

    pub fn field(&self, variable: VariableId) -> Result<&FieldData<'a, D>, KernelError> {
        find_field(&self.fields, variable).map(|(_, field)| field)
    }

    pub fn num_slots(&self) -> usize {
        self.fields.iter().map(FieldData::num_dofs).sum()
    }
}

/// The data needed to evaluate interface kernels on a single interface (side pair).
///
/// Derivative slots are assigned to all element side fields first, followed by all neighbor side
/// fields.
#[derive(Debug, Clone)]
pub struct InterfaceContext<'a, const D: usize> {
    /// Quadrature on the interface, with normals pointing out of the element.
    pub quadrature: QuadratureData<'a, D>,
    pub element: SideContext<'a, D>,
    pub neighbor: SideContext<'a, D>,
}

impl<'a, const D: usize> InterfaceContext<'a, D> {
    pub fn new(quadrature: QuadratureData<'a, D>, element: SideContext<'a, D>, neighbor: SideContext<'a, D>) -> Self {
        assert_eq!(
            quadrature.normals().len(),
            quadrature.num_quadrature_points(),
            "Interface quadrature requires a normal at every quadrature point"
        );
        Self {
            quadrature,
            element,
            neighbor,
        }
    }

    pub fn side(&self, side: DGResidualType) -> &SideContext<'a, D> {
        match side {
            DGResidualType::Element => &self.element,
            DGResidualType::Neighbor => &self.neighbor,
        }
    }

    /// The first derivative slot of a variable on the given side.
    pub fn slot_offset(&self, variable: VariableId, side: DGResidualType) -> Result<usize, KernelError> {
        match side {
            DGResidualType::Element => find_field(&self.element.fields, variable).map(|(offset, _)| offset),
            DGResidualType::Neighbor => find_field(&self.neighbor.fields, variable)
                .map(|(offset, _)| self.element.num_slots() + offset),
        }
    }

    pub fn num_slots(&self) -> usize {
        self.element.num_slots() + self.neighbor.num_slots()
    }

    fn evaluate_on_side<T: FieldScalar>(
        &self,
        qp: usize,
        variable: VariableId,
        side: DGResidualType,
        seeded: bool,
    ) -> Result<FieldValues<T, D>, KernelError> {
        let field = self.side(side).field(variable)?;
        let offset = if seeded {
            Some(self.slot_offset(variable, side)?)
        } else {
            None
        };
        Ok(field.evaluate(qp, offset))
    }

    /// Evaluates the kernel's variables at a quadrature point of the interface.
    ///
    /// Coupled variables are evaluated on every side on which they are present.
    pub fn qp_context<T: FieldScalar>(
        &self,
        qp: usize,
        variable: VariableId,
        neighbor_variable: VariableId,
        coupled: &[VariableId],
        seeded: bool,
    ) -> Result<InterfaceQp<'a, T, D>, KernelError> {
        let coupled = coupled
            .iter()
            .map(|&v| CoupledValues {
                variable: v,
                element: self
                    .evaluate_on_side(qp, v, DGResidualType::Element, seeded)
                    .ok(),
                neighbor: self
                    .evaluate_on_side(qp, v, DGResidualType::Neighbor, seeded)
                    .ok(),
            })
            .collect();
        Ok(InterfaceQp {
            qp,
            point: self.quadrature.points()[qp],
            normal: self.quadrature.normal(qp),
            u: self.evaluate_on_side(qp, variable, DGResidualType::Element, seeded)?,
            u_neighbor: self.evaluate_on_side(qp, neighbor_variable, DGResidualType::Neighbor, seeded)?,
            coupled,
            materials: self.element.materials,
            neighbor_materials: self.neighbor.materials,
        })
    }
}

use crate::ad::DenseDual;
use crate::assembly::VariableId;
use crate::czm::{displacement_array, DPK1TRACTION_DF, DTRACTION_DJUMP_GLOBAL, TRACTION_GLOBAL};
use crate::error::{ConfigurationError, KernelError};
use crate::material::{Material, MaterialInput, MaterialProperties};
use fekern_traits::GenericReal;
use nalgebra::{SMatrix, SVector};

/// Linear elastic traction-separation law in the local frame of the interface.
///
/// With unit normal `n`, the jump is split into its normal part `(n . jump) n` and its tangential
/// remainder, which are scaled by the normal and tangential stiffness respectively.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LinearTractionSeparation {
    normal_stiffness: f64,
    tangent_stiffness: f64,
}

impl LinearTractionSeparation {
    fn new(normal_stiffness: f64, tangent_stiffness: f64) -> Result<Self, ConfigurationError> {
        for (parameter, value) in [("normal_stiffness", normal_stiffness), ("tangent_stiffness", tangent_stiffness)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigurationError::new(
                    parameter,
                    format!("must be finite and non-negative, got {}", value),
                ));
            }
        }
        Ok(Self {
            normal_stiffness,
            tangent_stiffness,
        })
    }

    fn stiffness<const D: usize>(&self, normal: &SVector<f64, D>) -> SMatrix<f64, D, D> {
        let nn = normal * normal.transpose();
        nn * self.normal_stiffness + (SMatrix::<f64, D, D>::identity() - nn) * self.tangent_stiffness
    }
}

/// Local displacement data of a cohesive zone at a quadrature point.
struct JumpData<const D: usize> {
    jump: SVector<f64, D>,
    /// Row `i` holds the gradient of displacement component `i`.
    element_gradient: SMatrix<f64, D, D>,
    neighbor_gradient: SMatrix<f64, D, D>,
}

fn evaluate_jump<const D: usize>(
    input: &MaterialInput<D>,
    displacements: &[VariableId; D],
    qp: usize,
) -> Result<JumpData<D>, KernelError> {
    let mut data: JumpData<D> = JumpData {
        jump: SVector::zeros(),
        element_gradient: SMatrix::zeros(),
        neighbor_gradient: SMatrix::zeros(),
    };
    for (i, &variable) in displacements.iter().enumerate() {
        let (_, element_field) = input.field(variable)?;
        let (_, neighbor_field) = input.neighbor_field(variable)?;
        let u = element_field.evaluate::<f64>(qp, None);
        let u_neighbor = neighbor_field.evaluate::<f64>(qp, None);
        data.jump[i] = u_neighbor.value - u.value;
        data.element_gradient
            .row_mut(i)
            .copy_from(&u.gradient.transpose());
        data.neighbor_gradient
            .row_mut(i)
            .copy_from(&u_neighbor.gradient.transpose());
    }
    Ok(data)
}

/// Small strain cohesive zone with a linear elastic traction-separation law.
///
/// Computes [`TRACTION_GLOBAL`] and [`DTRACTION_DJUMP_GLOBAL`] from the displacement jump and the
/// interface normal.
#[derive(Debug, Clone, PartialEq)]
pub struct CzmSmallStrainMaterial<const D: usize> {
    displacements: [VariableId; D],
    law: LinearTractionSeparation,
}

impl<const D: usize> CzmSmallStrainMaterial<D> {
    pub fn new(
        displacements: &[VariableId],
        normal_stiffness: f64,
        tangent_stiffness: f64,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            displacements: displacement_array::<D>(displacements)?,
            law: LinearTractionSeparation::new(normal_stiffness, tangent_stiffness)?,
        })
    }
}

impl<const D: usize> Material<D> for CzmSmallStrainMaterial<D> {
    fn compute_properties(
        &self,
        input: &MaterialInput<D>,
        properties: &mut MaterialProperties,
    ) -> Result<(), KernelError> {
        let n = input.quadrature.num_quadrature_points();
        let mut tractions = Vec::with_capacity(n);
        let mut stiffnesses = Vec::with_capacity(n);
        for qp in 0..n {
            let data = evaluate_jump(input, &self.displacements, qp)?;
            let stiffness = self.law.stiffness(&input.quadrature.normal(qp));
            tractions.push(stiffness * data.jump);
            stiffnesses.push(stiffness);
        }
        properties.insert(TRACTION_GLOBAL, tractions);
        properties.insert(DTRACTION_DJUMP_GLOBAL, stiffnesses);
        Ok(())
    }
}

/// The largest number of deformation gradient entries the area ratio is differentiated for.
const MAX_DEFORMATION_GRADIENT_ENTRIES: usize = 9;

type AreaDual = DenseDual<MAX_DEFORMATION_GRADIENT_ENTRIES>;

/// The cofactor matrix `det(F) F^-T` of a matrix of dimension at most three.
fn cofactor<T: GenericReal, const D: usize>(f: &[[T; D]; D]) -> [[T; D]; D] {
    let mut cof: [[T; D]; D] = std::array::from_fn(|_| std::array::from_fn(|_| T::zero()));
    match D {
        1 => cof[0][0] = T::one(),
        2 => {
            for i in 0..2 {
                for j in 0..2 {
                    let minor = f[1 - i][1 - j].clone();
                    cof[i][j] = if (i + j) % 2 == 0 { minor } else { -minor };
                }
            }
        }
        3 => {
            for i in 0..3 {
                for j in 0..3 {
                    let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
                    let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
                    cof[i][j] = f[i1][j1].clone() * f[i2][j2].clone() - f[i1][j2].clone() * f[i2][j1].clone();
                }
            }
        }
        _ => unreachable!("Cofactors are only implemented for dimensions up to three"),
    }
    cof
}

/// The Nanson area ratio `|cof(F) N|` and its derivative with respect to `F`.
fn area_ratio<const D: usize>(
    deformation_gradient: &SMatrix<f64, D, D>,
    reference_normal: &SVector<f64, D>,
) -> (f64, SMatrix<f64, D, D>) {
    let f: [[AreaDual; D]; D] =
        std::array::from_fn(|i| std::array::from_fn(|j| AreaDual::variable(deformation_gradient[(i, j)], i * D + j)));
    let cof = cofactor(&f);
    let mut squared_norm = AreaDual::from(0.0);
    for row in &cof {
        let mut component = AreaDual::from(0.0);
        for (cof_ij, n_j) in row.iter().zip(reference_normal.iter()) {
            component += cof_ij.clone() * *n_j;
        }
        squared_norm += component.clone() * component;
    }
    let ratio = squared_norm.sqrt();
    let d_ratio = SMatrix::from_fn(|i, j| ratio.derivative(i * D + j));
    (ratio.value(), d_ratio)
}

/// Total Lagrangian cohesive zone with a linear elastic traction-separation law.
///
/// The traction-separation law is evaluated with the reference normal, and the resulting traction
/// is scaled by the area ratio `|cof(F) N|` between deformed and reference interface, with
/// interface deformation gradient `F = I + (grad u + grad u_neighbor) / 2`. Computes
/// [`TRACTION_GLOBAL`] (the first Piola-Kirchhoff traction), [`DTRACTION_DJUMP_GLOBAL`] and
/// [`DPK1TRACTION_DF`], the latter by differentiating the area ratio with dense dual numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct CzmTotalLagrangianMaterial<const D: usize> {
    displacements: [VariableId; D],
    law: LinearTractionSeparation,
}

impl<const D: usize> CzmTotalLagrangianMaterial<D> {
    pub fn new(
        displacements: &[VariableId],
        normal_stiffness: f64,
        tangent_stiffness: f64,
    ) -> Result<Self, ConfigurationError> {
        if D * D > MAX_DEFORMATION_GRADIENT_ENTRIES {
            return Err(ConfigurationError::new(
                "ndisp",
                format!("total Lagrangian cohesive zones support at most three dimensions, got {}", D),
            ));
        }
        Ok(Self {
            displacements: displacement_array::<D>(displacements)?,
            law: LinearTractionSeparation::new(normal_stiffness, tangent_stiffness)?,
        })
    }
}

impl<const D: usize> Material<D> for CzmTotalLagrangianMaterial<D> {
    fn compute_properties(
        &self,
        input: &MaterialInput<D>,
        properties: &mut MaterialProperties,
    ) -> Result<(), KernelError> {
        let n = input.quadrature.num_quadrature_points();
        let mut tractions = Vec::with_capacity(n);
        let mut stiffnesses = Vec::with_capacity(n);
        let mut dpk1_df = Vec::with_capacity(n);
        for qp in 0..n {
            let data = evaluate_jump(input, &self.displacements, qp)?;
            let normal = input.quadrature.normal(qp);
            let deformation_gradient =
                SMatrix::<f64, D, D>::identity() + (data.element_gradient + data.neighbor_gradient) * 0.5;
            let (ratio, d_ratio) = area_ratio(&deformation_gradient, &normal);

            let stiffness = self.law.stiffness(&normal);
            let traction = stiffness * data.jump;
            tractions.push(traction * ratio);
            stiffnesses.push(stiffness * ratio);
            let d_traction: [SMatrix<f64, D, D>; D] = std::array::from_fn(|i| d_ratio * traction[i]);
            dpk1_df.push(d_traction);
        }
        properties.insert(TRACTION_GLOBAL, tractions);
        properties.insert(DTRACTION_DJUMP_GLOBAL, stiffnesses);
        properties.insert(DPK1TRACTION_DF, dpk1_df);
        Ok(())
    }
}

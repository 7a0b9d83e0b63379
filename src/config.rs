//! Serializable descriptions of kernels, interface kernels and materials.
//!
//! Each configuration is validated and turned into a trait object by its `build` method. Where a
//! kernel exists both with hand-coded and automatically differentiated Jacobians, the `use_ad`
//! flag selects the variant.
use crate::assembly::VariableId;
use crate::czm::{CzmSmallStrainKernel, CzmSmallStrainMaterial, CzmTotalLagrangianKernel, CzmTotalLagrangianMaterial};
use crate::error::ConfigurationError;
use crate::interface::library::{
    FreundlichPenaltyInterface, InterfaceDiffusion, InterfaceReaction, PenaltyInterfaceDiffusion,
};
use crate::interface::{ADInterfaceKernel, ADInterfaceQpKernel, InterfaceKernel, InterfaceKernelBase, InterfaceQpKernel};
use crate::interpolation::MultiDimensionalInterpolation;
use crate::kernels::library::{BodyForce, Coefficient, CoupledForce, Diffusion, Reaction, TabulatedDiffusion, TimeDiffusion};
use crate::kernels::{ADKernelGrad, ADKernelValue, ADTimeKernelGrad, Kernel, KernelValue};
use crate::material::{ConstantMaterial, Material, TableCoordinates, TabulatedMaterial};
use crate::multi_index::MultiIndex;
use log::debug;
use serde::{Deserialize, Serialize};

/// Tabulated data on a rectilinear grid.
///
/// `data` holds the values in row-major order, i.e. the last axis varies fastest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabulatedPropertyConfig {
    pub base_points: Vec<Vec<f64>>,
    pub data: Vec<f64>,
}

impl TabulatedPropertyConfig {
    pub fn build(&self) -> Result<MultiDimensionalInterpolation, ConfigurationError> {
        let shape: Vec<usize> = self.base_points.iter().map(Vec::len).collect();
        let data = MultiIndex::from_data(&shape, self.data.clone())
            .map_err(|err| ConfigurationError::new("data", err.to_string()))?;
        MultiDimensionalInterpolation::from_data(self.base_points.clone(), data)
            .map_err(|err| ConfigurationError::new("base_points", err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KernelConfig {
    Reaction {
        variable: VariableId,
        rate: f64,
        #[serde(default)]
        use_ad: bool,
    },
    BodyForce {
        variable: VariableId,
        value: f64,
    },
    CoupledForce {
        variable: VariableId,
        coupled: VariableId,
        coefficient: f64,
        #[serde(default)]
        use_ad: bool,
    },
    Diffusion {
        variable: VariableId,
        coefficient: Coefficient,
    },
    TabulatedDiffusion {
        variable: VariableId,
        table: TabulatedPropertyConfig,
    },
    TimeDiffusion {
        variable: VariableId,
        coefficient: f64,
    },
}

impl KernelConfig {
    pub fn build<const D: usize>(&self) -> Result<Box<dyn Kernel<D>>, ConfigurationError> {
        let kernel: Box<dyn Kernel<D>> = match self {
            Self::Reaction { variable, rate, use_ad } => {
                let reaction = Reaction {
                    variable: *variable,
                    rate: *rate,
                };
                if *use_ad {
                    Box::new(ADKernelValue::new(reaction))
                } else {
                    Box::new(KernelValue::new(reaction))
                }
            }
            Self::BodyForce { variable, value } => Box::new(KernelValue::new(BodyForce {
                variable: *variable,
                value: *value,
            })),
            Self::CoupledForce {
                variable,
                coupled,
                coefficient,
                use_ad,
            } => {
                if variable == coupled {
                    return Err(ConfigurationError::new(
                        "coupled",
                        "a kernel cannot be coupled to its own variable",
                    ));
                }
                let force = CoupledForce::new(*variable, *coupled, *coefficient);
                if *use_ad {
                    Box::new(ADKernelValue::new(force))
                } else {
                    Box::new(KernelValue::new(force))
                }
            }
            Self::Diffusion { variable, coefficient } => Box::new(ADKernelGrad::new(Diffusion {
                variable: *variable,
                coefficient: coefficient.clone(),
            })),
            Self::TabulatedDiffusion { variable, table } => {
                Box::new(ADKernelGrad::new(TabulatedDiffusion::new(*variable, table.build()?)?))
            }
            Self::TimeDiffusion { variable, coefficient } => Box::new(ADTimeKernelGrad::new(TimeDiffusion {
                variable: *variable,
                coefficient: *coefficient,
            })),
        };
        debug!(
            "Built kernel {:?} for variable {} (AD: {})",
            self,
            kernel.variable(),
            kernel.is_ad()
        );
        Ok(kernel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InterfaceKernelConfig {
    PenaltyInterfaceDiffusion {
        variable: VariableId,
        /// Defaults to `variable`.
        #[serde(default)]
        neighbor_variable: Option<VariableId>,
        penalty: f64,
        #[serde(default)]
        use_ad: bool,
    },
    InterfaceDiffusion {
        variable: VariableId,
        #[serde(default)]
        neighbor_variable: Option<VariableId>,
        #[serde(default)]
        diffusivity: Option<String>,
        #[serde(default)]
        neighbor_diffusivity: Option<String>,
        #[serde(default)]
        use_ad: bool,
    },
    InterfaceReaction {
        variable: VariableId,
        #[serde(default)]
        neighbor_variable: Option<VariableId>,
        #[serde(default)]
        forward_rate: Option<String>,
        #[serde(default)]
        backward_rate: Option<String>,
        #[serde(default)]
        use_ad: bool,
    },
    FreundlichPenaltyInterface {
        variable: VariableId,
        #[serde(default)]
        neighbor_variable: Option<VariableId>,
        penalty: f64,
        freundlich_k: f64,
        freundlich_n: f64,
    },
    CzmSmallStrain {
        displacements: Vec<VariableId>,
        component: usize,
    },
    CzmTotalLagrangian {
        displacements: Vec<VariableId>,
        component: usize,
    },
}

fn boxed_interface_kernel<K, const D: usize>(kernel: K, use_ad: bool) -> Box<dyn InterfaceKernel<D>>
where
    K: InterfaceQpKernel<D> + ADInterfaceQpKernel<D> + 'static,
{
    if use_ad {
        Box::new(ADInterfaceKernel::new(kernel))
    } else {
        Box::new(InterfaceKernelBase::new(kernel))
    }
}

impl InterfaceKernelConfig {
    pub fn build<const D: usize>(&self) -> Result<Box<dyn InterfaceKernel<D>>, ConfigurationError> {
        let kernel: Box<dyn InterfaceKernel<D>> = match self {
            Self::PenaltyInterfaceDiffusion {
                variable,
                neighbor_variable,
                penalty,
                use_ad,
            } => {
                let neighbor_variable = neighbor_variable.unwrap_or(*variable);
                let kernel = PenaltyInterfaceDiffusion::new(*variable, neighbor_variable, *penalty)?;
                boxed_interface_kernel(kernel, *use_ad)
            }
            Self::InterfaceDiffusion {
                variable,
                neighbor_variable,
                diffusivity,
                neighbor_diffusivity,
                use_ad,
            } => {
                let mut kernel = InterfaceDiffusion::new(*variable, neighbor_variable.unwrap_or(*variable));
                if let Some(name) = diffusivity {
                    kernel = kernel.with_diffusivity(name.clone());
                }
                if let Some(name) = neighbor_diffusivity {
                    kernel = kernel.with_neighbor_diffusivity(name.clone());
                }
                boxed_interface_kernel(kernel, *use_ad)
            }
            Self::InterfaceReaction {
                variable,
                neighbor_variable,
                forward_rate,
                backward_rate,
                use_ad,
            } => {
                let mut kernel = InterfaceReaction::new(*variable, neighbor_variable.unwrap_or(*variable));
                if let Some(name) = forward_rate {
                    kernel.forward_rate = name.clone();
                }
                if let Some(name) = backward_rate {
                    kernel.backward_rate = name.clone();
                }
                boxed_interface_kernel(kernel, *use_ad)
            }
            Self::FreundlichPenaltyInterface {
                variable,
                neighbor_variable,
                penalty,
                freundlich_k,
                freundlich_n,
            } => Box::new(ADInterfaceKernel::new(FreundlichPenaltyInterface::new(
                *variable,
                neighbor_variable.unwrap_or(*variable),
                *penalty,
                *freundlich_k,
                *freundlich_n,
            )?)),
            Self::CzmSmallStrain {
                displacements,
                component,
            } => Box::new(InterfaceKernelBase::new(CzmSmallStrainKernel::<D>::new(
                displacements,
                *component,
            )?)),
            Self::CzmTotalLagrangian {
                displacements,
                component,
            } => Box::new(InterfaceKernelBase::new(CzmTotalLagrangianKernel::<D>::new(
                displacements,
                *component,
            )?)),
        };
        debug!(
            "Built interface kernel {:?} for variables {} / {} (AD: {})",
            self,
            kernel.variable(),
            kernel.neighbor_variable(),
            kernel.is_ad()
        );
        Ok(kernel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MaterialConfig {
    Constant {
        properties: Vec<(String, f64)>,
    },
    Tabulated {
        name: String,
        table: TabulatedPropertyConfig,
        coordinates: TableCoordinates,
        #[serde(default)]
        use_ad: bool,
    },
    CzmSmallStrain {
        displacements: Vec<VariableId>,
        normal_stiffness: f64,
        tangent_stiffness: f64,
    },
    CzmTotalLagrangian {
        displacements: Vec<VariableId>,
        normal_stiffness: f64,
        tangent_stiffness: f64,
    },
}

impl MaterialConfig {
    pub fn build<const D: usize>(&self) -> Result<Box<dyn Material<D>>, ConfigurationError> {
        let material: Box<dyn Material<D>> = match self {
            Self::Constant { properties } => Box::new(ConstantMaterial {
                properties: properties.clone(),
            }),
            Self::Tabulated {
                name,
                table,
                coordinates,
                use_ad,
            } => Box::new(
                TabulatedMaterial::<D>::new(name.clone(), table.build()?, coordinates.clone())?.with_ad(*use_ad),
            ),
            Self::CzmSmallStrain {
                displacements,
                normal_stiffness,
                tangent_stiffness,
            } => Box::new(CzmSmallStrainMaterial::<D>::new(
                displacements,
                *normal_stiffness,
                *tangent_stiffness,
            )?),
            Self::CzmTotalLagrangian {
                displacements,
                normal_stiffness,
                tangent_stiffness,
            } => Box::new(CzmTotalLagrangianMaterial::<D>::new(
                displacements,
                *normal_stiffness,
                *tangent_stiffness,
            )?),
        };
        debug!("Built material {:?}", self);
        Ok(material)
    }
}

use super::fixtures::{element_buffer, quad4_field, quad4_mass_matrix, U, V};
use fekern::assembly::{ResidualTag, VariableId};
use fekern::config::{InterfaceKernelConfig, KernelConfig, MaterialConfig, TabulatedPropertyConfig};
use fekern::kernels::library::Coefficient;
use fekern::kernels::Kernel;
use fekern::interpolation::MultiDimensionalInterpolation;
use fekern::material::{TableCoordinates, TabulatedMaterial};
use fekern::multi_index::MultiIndex;
use fekern::nalgebra::{DVector, DVectorViewMut};
use matrixcompare::assert_matrix_eq;

#[test]
fn kernels_deserialize_from_tagged_json() {
    let json = r#"[
        { "type": "Reaction", "variable": 0, "rate": 2.0 },
        { "type": "Reaction", "variable": 0, "rate": 2.0, "use_ad": true },
        { "type": "CoupledForce", "variable": 0, "coupled": 1, "coefficient": 0.5 },
        { "type": "Diffusion", "variable": 1, "coefficient": "diffusivity" },
        { "type": "Diffusion", "variable": 1, "coefficient": 1.5 },
        { "type": "TimeDiffusion", "variable": 0, "coefficient": 1.0 }
    ]"#;
    let configs: Vec<KernelConfig> = serde_json::from_str(json).unwrap();
    assert_eq!(
        configs[0],
        KernelConfig::Reaction {
            variable: U,
            rate: 2.0,
            use_ad: false
        }
    );
    assert_eq!(
        configs[3],
        KernelConfig::Diffusion {
            variable: V,
            coefficient: Coefficient::Property("diffusivity".to_string())
        }
    );
    assert_eq!(
        configs[4],
        KernelConfig::Diffusion {
            variable: V,
            coefficient: Coefficient::Constant(1.5)
        }
    );

    let kernels: Vec<_> = configs
        .iter()
        .map(|config| config.build::<2>().unwrap())
        .collect();
    let ad: Vec<bool> = kernels.iter().map(|k| k.is_ad()).collect();
    assert_eq!(ad, vec![false, true, false, true, true, true]);
    assert_eq!(kernels[2].variable(), U);
    assert_eq!(kernels[2].coupled_variables(), &[V]);
    assert_eq!(kernels[5].tag(), ResidualTag::Time);
    assert_eq!(kernels[0].tag(), ResidualTag::NonTime);
}

#[test]
fn built_kernels_compute_residuals() {
    let coefficients = [0.3, 0.7, 0.6, 0.2];
    let buffer = element_buffer(-1.0, vec![quad4_field(U, coefficients, 0)]);
    let expected = quad4_mass_matrix() * DVector::from_column_slice(&coefficients) * 2.0;
    for use_ad in [false, true] {
        let kernel = KernelConfig::Reaction {
            variable: U,
            rate: 2.0,
            use_ad,
        }
        .build::<2>()
        .unwrap();
        let mut residual = DVector::zeros(4);
        kernel
            .compute_residual(&buffer.context(), DVectorViewMut::from(&mut residual))
            .unwrap();
        assert_matrix_eq!(residual, expected, comp = abs, tol = 1e-12);
    }
}

#[test]
fn kernel_configuration_errors() {
    let config = KernelConfig::CoupledForce {
        variable: U,
        coupled: U,
        coefficient: 1.0,
        use_ad: false,
    };
    let err = config.build::<2>().err().unwrap();
    assert_eq!(err.parameter(), "coupled");

    let config = KernelConfig::TabulatedDiffusion {
        variable: U,
        table: TabulatedPropertyConfig {
            base_points: vec![vec![0.0, 1.0]],
            data: vec![1.0, 2.0, 3.0],
        },
    };
    let err = config.build::<2>().err().unwrap();
    assert_eq!(err.parameter(), "data");

    let config = KernelConfig::TabulatedDiffusion {
        variable: U,
        table: TabulatedPropertyConfig {
            base_points: vec![vec![1.0, 0.0]],
            data: vec![1.0, 2.0],
        },
    };
    let err = config.build::<2>().err().unwrap();
    assert_eq!(err.parameter(), "base_points");
}

#[test]
fn interface_kernels_deserialize_and_build() {
    let json = r#"[
        { "type": "PenaltyInterfaceDiffusion", "variable": 0, "penalty": 1000.0 },
        { "type": "InterfaceDiffusion", "variable": 0, "neighbor_variable": 1, "use_ad": true },
        { "type": "InterfaceReaction", "variable": 1, "forward_rate": "k_on" },
        { "type": "FreundlichPenaltyInterface", "variable": 0, "penalty": 10.0,
          "freundlich_k": 2.0, "freundlich_n": 1.5 },
        { "type": "CzmSmallStrain", "displacements": [0, 1], "component": 1 },
        { "type": "CzmTotalLagrangian", "displacements": [0, 1], "component": 0 }
    ]"#;
    let configs: Vec<InterfaceKernelConfig> = serde_json::from_str(json).unwrap();
    assert_eq!(
        configs[2],
        InterfaceKernelConfig::InterfaceReaction {
            variable: V,
            neighbor_variable: None,
            forward_rate: Some("k_on".to_string()),
            backward_rate: None,
            use_ad: false
        }
    );

    let kernels: Vec<_> = configs
        .iter()
        .map(|config| config.build::<2>().unwrap())
        .collect();
    let variables: Vec<_> = kernels
        .iter()
        .map(|k| (k.variable(), k.neighbor_variable(), k.is_ad()))
        .collect();
    assert_eq!(
        variables,
        vec![
            (U, U, false),
            (U, V, true),
            (V, V, false),
            (U, U, true),
            (V, V, false),
            (U, U, false),
        ]
    );
    assert_eq!(kernels[4].coupled_variables(), &[U]);
}

#[test]
fn interface_kernel_configuration_errors() {
    let config = InterfaceKernelConfig::PenaltyInterfaceDiffusion {
        variable: U,
        neighbor_variable: None,
        penalty: f64::NAN,
        use_ad: false,
    };
    assert_eq!(config.build::<2>().err().unwrap().parameter(), "penalty");

    let config = InterfaceKernelConfig::CzmSmallStrain {
        displacements: vec![U, V],
        component: 0,
    };
    assert_eq!(config.build::<3>().err().unwrap().parameter(), "ndisp");

    let config = InterfaceKernelConfig::FreundlichPenaltyInterface {
        variable: U,
        neighbor_variable: None,
        penalty: 1.0,
        freundlich_k: 1.0,
        freundlich_n: -2.0,
    };
    assert_eq!(config.build::<2>().err().unwrap().parameter(), "freundlich_n");
}

#[test]
fn materials_deserialize_and_build() {
    let json = r#"[
        { "type": "Constant", "properties": [["diffusivity", 2.0], ["kf", 1.0]] },
        { "type": "Tabulated", "name": "diffusivity",
          "table": { "base_points": [[0.0, 1.0]], "data": [1.0, 3.0] },
          "coordinates": { "Variables": [0] }, "use_ad": true },
        { "type": "Tabulated", "name": "source",
          "table": { "base_points": [[-1.0, 1.0], [-1.0, 1.0]], "data": [0.0, 1.0, 2.0, 3.0] },
          "coordinates": "Position" },
        { "type": "CzmSmallStrain", "displacements": [0, 1],
          "normal_stiffness": 100.0, "tangent_stiffness": 10.0 }
    ]"#;
    let configs: Vec<MaterialConfig> = serde_json::from_str(json).unwrap();
    match &configs[1] {
        MaterialConfig::Tabulated {
            coordinates, use_ad, ..
        } => {
            assert_eq!(coordinates, &TableCoordinates::Variables(vec![VariableId(0)]));
            assert!(*use_ad);
        }
        other => panic!("unexpected material configuration {:?}", other),
    }
    for config in &configs {
        assert!(config.build::<2>().is_ok(), "{:?}", config);
    }
}

#[test]
fn material_configuration_errors() {
    let config = MaterialConfig::Tabulated {
        name: "diffusivity".to_string(),
        table: TabulatedPropertyConfig {
            base_points: vec![vec![0.0, 1.0]],
            data: vec![1.0, 3.0],
        },
        coordinates: TableCoordinates::Variables(vec![U, V]),
        use_ad: false,
    };
    assert_eq!(config.build::<2>().err().unwrap().parameter(), "coordinates");

    let config = MaterialConfig::CzmTotalLagrangian {
        displacements: vec![U, V],
        normal_stiffness: 1.0,
        tangent_stiffness: -1.0,
    };
    assert_eq!(config.build::<2>().err().unwrap().parameter(), "tangent_stiffness");
}

#[test]
fn position_tables_must_match_the_spatial_dimension() {
    let config = MaterialConfig::Tabulated {
        name: "source".to_string(),
        table: TabulatedPropertyConfig {
            base_points: vec![vec![-1.0, 1.0], vec![-1.0, 1.0]],
            data: vec![0.0, 1.0, 2.0, 3.0],
        },
        coordinates: TableCoordinates::Position,
        use_ad: false,
    };
    assert!(config.build::<2>().is_ok());
    let err = config.build::<3>().err().unwrap();
    assert_eq!(err.parameter(), "coordinates");
    assert!(err.message().contains("3 spatial coordinates"), "{}", err);

    let table = MultiDimensionalInterpolation::from_data(
        vec![vec![0.0, 1.0]],
        MultiIndex::from_data(&[2], vec![1.0, 2.0]).unwrap(),
    )
    .unwrap();
    assert!(TabulatedMaterial::<1>::new("source", table.clone(), TableCoordinates::Position).is_ok());
    assert_eq!(
        TabulatedMaterial::<2>::new("source", table, TableCoordinates::Position)
            .err()
            .unwrap()
            .parameter(),
        "coordinates"
    );
}

use fekern::error::MultiIndexError;
use fekern::multi_index::MultiIndex;
use proptest::prelude::*;

fn arange_3x4x2() -> MultiIndex<f64> {
    MultiIndex::from_data(&[3, 4, 2], (0..24).map(f64::from).collect()).unwrap()
}

#[test]
fn row_major_layout() {
    let m = arange_3x4x2();
    assert_eq!(m.dim(), 3);
    assert_eq!(m.len(), 24);
    assert_eq!(m.stride(), &[8, 2, 1]);
    assert_eq!(m[&[0, 0, 1]], 1.0);
    assert_eq!(m[&[0, 1, 0]], 2.0);
    assert_eq!(m[&[2, 3, 1]], 23.0);
    assert_eq!(m.flat_index(&[1, 2, 1]), 13);
    assert_eq!(m.indices_of(13), vec![1, 2, 1]);

    assert_eq!(m.get(&[2, 3, 1]), Some(&23.0));
    assert_eq!(m.get(&[3, 0, 0]), None);
    assert_eq!(m.get(&[0, 0]), None);
}

#[test]
fn iter_indexed_visits_entries_in_flat_order() {
    let m = MultiIndex::from_data(&[2, 2], vec!['a', 'b', 'c', 'd']).unwrap();
    let entries: Vec<_> = m.iter_indexed().map(|(idx, &c)| (idx, c)).collect();
    assert_eq!(
        entries,
        vec![
            (vec![0, 0], 'a'),
            (vec![0, 1], 'b'),
            (vec![1, 0], 'c'),
            (vec![1, 1], 'd')
        ]
    );
}

#[test]
fn from_data_rejects_wrong_length() {
    let result = MultiIndex::from_data(&[2, 3], vec![0.0; 5]);
    assert!(matches!(
        result,
        Err(MultiIndexError::DataLengthMismatch { expected: 6, actual: 5 })
    ));
}

#[test]
fn index_mut_writes_through() {
    let mut m = MultiIndex::<i32>::new(&[2, 3]);
    m[&[1, 2]] = 7;
    let indices: &[usize] = &[0, 1];
    m[indices] = 3;
    assert_eq!(m.data(), &[0, 3, 0, 0, 0, 7]);
}

#[test]
fn resize_preserves_overlapping_entries() {
    let mut m = arange_3x4x2();
    m.resize(&[2, 5, 2]).unwrap();
    assert_eq!(m.shape(), &[2, 5, 2]);
    assert_eq!(m.len(), 20);
    for i in 0..2 {
        for j in 0..4 {
            for k in 0..2 {
                assert_eq!(m[&[i, j, k]], (8 * i + 2 * j + k) as f64);
            }
        }
        assert_eq!(m[&[i, 4, 0]], 0.0);
        assert_eq!(m[&[i, 4, 1]], 0.0);
    }
}

#[test]
fn resize_cannot_change_dimension() {
    let mut m = arange_3x4x2();
    let result = m.resize(&[24]);
    assert!(matches!(
        result,
        Err(MultiIndexError::DimensionMismatch { expected: 3, actual: 1 })
    ));
    assert_eq!(m, arange_3x4x2());
}

#[test]
fn assign_replaces_shape_and_contents() {
    let mut m = arange_3x4x2();
    m.assign(&[2, 2], -1.0);
    assert_eq!(m.shape(), &[2, 2]);
    assert_eq!(m.stride(), &[2, 1]);
    assert_eq!(m.data(), &[-1.0; 4]);
}

#[test]
fn slice_fixes_dimensions() {
    let m = arange_3x4x2();

    let s = m.slice(&[1], &[2]).unwrap();
    assert_eq!(s.shape(), &[3, 2]);
    assert_eq!(s.data(), &[4.0, 5.0, 12.0, 13.0, 20.0, 21.0]);

    let s = m.slice(&[2, 0], &[1, 1]).unwrap();
    assert_eq!(s.shape(), &[4]);
    assert_eq!(s.data(), &[9.0, 11.0, 13.0, 15.0]);

    let s = m.slice(&[0, 1, 2], &[2, 3, 0]).unwrap();
    assert_eq!(s.dim(), 0);
    assert_eq!(s.data(), &[22.0]);
}

#[test]
fn slice_rejects_invalid_arguments() {
    let m = arange_3x4x2();
    for (dimensions, indices) in [
        (vec![0], vec![0, 1]),
        (vec![3], vec![0]),
        (vec![1, 1], vec![0, 0]),
        (vec![1], vec![4]),
    ] {
        let result = m.slice(&dimensions, &indices);
        assert!(
            matches!(result, Err(MultiIndexError::InvalidSlice { .. })),
            "slice({:?}, {:?}) should fail",
            dimensions,
            indices
        );
    }
}

#[test]
fn store_and_load() {
    let m = arange_3x4x2();
    let mut bytes = Vec::new();
    m.data_store(&mut bytes).unwrap();
    // u32 dimension, three u32 extents, u32 length and 24 f64 entries
    assert_eq!(bytes.len(), 4 + 3 * 4 + 4 + 24 * 8);

    let loaded = MultiIndex::<f64>::data_load(&mut bytes.as_slice()).unwrap();
    assert_eq!(loaded, m);
}

#[test]
fn load_reports_truncated_input() {
    let m = arange_3x4x2();
    let mut bytes = Vec::new();
    m.data_store(&mut bytes).unwrap();
    bytes.truncate(bytes.len() - 3);
    let result = MultiIndex::<f64>::data_load(&mut bytes.as_slice());
    assert!(matches!(result, Err(MultiIndexError::Io(_))));
}

#[test]
fn serde_json_recomputes_stride() {
    let m = arange_3x4x2();
    let json = serde_json::to_string(&m).unwrap();
    assert!(!json.contains("stride"));
    let deserialized: MultiIndex<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, m);

    let invalid = r#"{ "shape": [2, 2], "data": [1.0, 2.0, 3.0] }"#;
    assert!(serde_json::from_str::<MultiIndex<f64>>(invalid).is_err());
}

proptest! {
    #[test]
    fn flat_index_and_indices_of_are_inverse(shape in prop::collection::vec(1usize..5, 1..4), seed in any::<usize>()) {
        let m = MultiIndex::<u8>::new(&shape);
        let flat = seed % m.len();
        let indices = m.indices_of(flat);
        prop_assert_eq!(m.flat_index(&indices), flat);
    }
}

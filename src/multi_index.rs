//! Dense N-dimensional arrays with flat row-major storage.
use crate::error::MultiIndexError;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::io::{Read, Write};
use std::ops::{Index, IndexMut};

/// A dense N-dimensional array stored as a flat vector.
///
/// Entries are laid out in row-major order: the last index varies fastest. The flat index of
/// a multi-index `(i_0, ..., i_{d-1})` is `sum_k i_k * stride[k]`, where
/// `stride[k] = prod_{k' > k} shape[k']`.
///
/// Bounds of individual indices are only checked in debug builds when indexing with
/// `multi_index[&[i, j, k]]`. Use [`MultiIndex::get`] for checked access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMultiIndex<T>")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct MultiIndex<T> {
    shape: Vec<usize>,
    #[serde(skip_serializing)]
    stride: Vec<usize>,
    data: Vec<T>,
}

#[derive(Deserialize)]
struct RawMultiIndex<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T> TryFrom<RawMultiIndex<T>> for MultiIndex<T> {
    type Error = MultiIndexError;

    fn try_from(raw: RawMultiIndex<T>) -> Result<Self, Self::Error> {
        Self::from_data(&raw.shape, raw.data)
    }
}

fn compute_stride(shape: &[usize]) -> Vec<usize> {
    let mut stride = vec![1; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        stride[d] = stride[d + 1] * shape[d + 1];
    }
    stride
}

impl<T> MultiIndex<T> {
    /// Creates a multi-index from its shape and its flat, row-major data.
    pub fn from_data(shape: &[usize], data: Vec<T>) -> Result<Self, MultiIndexError> {
        let expected = shape.iter().product();
        if data.len() != expected {
            return Err(MultiIndexError::DataLengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            stride: compute_stride(shape),
            data,
        })
    }

    /// The number of dimensions.
    pub fn dim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn stride(&self) -> &[usize] {
        &self.stride
    }

    /// The total number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Computes the flat index of the given multi-index.
    ///
    /// Out-of-bounds indices are only detected in debug builds.
    pub fn flat_index(&self, indices: &[usize]) -> usize {
        debug_assert_eq!(
            indices.len(),
            self.dim(),
            "Number of indices must match the dimension of the multi-index"
        );
        debug_assert!(
            indices.iter().zip(&self.shape).all(|(i, n)| i < n),
            "Index {:?} out of bounds for shape {:?}",
            indices,
            self.shape
        );
        indices.iter().zip(&self.stride).map(|(i, s)| i * s).sum()
    }

    /// Computes the multi-index corresponding to the given flat index.
    pub fn indices_of(&self, flat_index: usize) -> Vec<usize> {
        let mut indices = vec![0; self.dim()];
        populate_indices(&self.stride, flat_index, &mut indices);
        indices
    }

    /// Checked access to an entry.
    pub fn get(&self, indices: &[usize]) -> Option<&T> {
        let in_bounds =
            indices.len() == self.dim() && indices.iter().zip(&self.shape).all(|(i, n)| i < n);
        in_bounds.then(|| &self.data[self.flat_index(indices)])
    }

    /// Iterates over all entries together with their multi-indices, in flat order.
    pub fn iter_indexed(&self) -> impl Iterator<Item = (Vec<usize>, &T)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(move |(flat, entry)| (self.indices_of(flat), entry))
    }
}

impl<T: Clone + Default> MultiIndex<T> {
    /// Creates a multi-index of the given shape with all entries set to `T::default()`.
    pub fn new(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            stride: compute_stride(shape),
            data: vec![T::default(); len],
        }
    }

    /// Changes the extents of the multi-index without changing its dimension.
    ///
    /// Entries whose multi-index remains in bounds keep their value, new entries are set to
    /// `T::default()`.
    pub fn resize(&mut self, shape: &[usize]) -> Result<(), MultiIndexError> {
        if shape.len() != self.dim() {
            return Err(MultiIndexError::DimensionMismatch {
                expected: self.dim(),
                actual: shape.len(),
            });
        }
        if shape == self.shape.as_slice() {
            return Ok(());
        }

        let mut resized = Self::new(shape);
        let mut indices = vec![0; shape.len()];
        for (flat, entry) in resized.data.iter_mut().enumerate() {
            populate_indices(&resized.stride, flat, &mut indices);
            if indices.iter().zip(&self.shape).all(|(i, n)| i < n) {
                *entry = self.data[self.flat_index(&indices)].clone();
            }
        }
        *self = resized;
        Ok(())
    }

    /// Replaces the contents by `value` repeated over the given (arbitrary) shape.
    pub fn assign(&mut self, shape: &[usize], value: T) {
        self.shape = shape.to_vec();
        self.stride = compute_stride(shape);
        self.data = vec![value; shape.iter().product()];
    }

    /// Extracts the sub-array obtained by fixing each dimension in `dimensions` at the
    /// corresponding entry of `indices`.
    ///
    /// The result has dimension `self.dim() - dimensions.len()` and contains the remaining axes
    /// in their original order. Fixing every dimension yields a zero-dimensional multi-index with
    /// a single entry.
    pub fn slice(&self, dimensions: &[usize], indices: &[usize]) -> Result<Self, MultiIndexError> {
        if dimensions.len() != indices.len() {
            return Err(MultiIndexError::InvalidSlice {
                message: format!(
                    "{} dimensions were given, but {} indices",
                    dimensions.len(),
                    indices.len()
                ),
            });
        }

        // For each original axis, the fixed index (if any)
        let mut fixed = vec![None; self.dim()];
        for (&d, &i) in dimensions.iter().zip(indices) {
            if d >= self.dim() {
                return Err(MultiIndexError::InvalidSlice {
                    message: format!("dimension {} exceeds the dimension {}", d, self.dim()),
                });
            }
            if fixed[d].is_some() {
                return Err(MultiIndexError::InvalidSlice {
                    message: format!("dimension {} was given more than once", d),
                });
            }
            if i >= self.shape[d] {
                return Err(MultiIndexError::InvalidSlice {
                    message: format!(
                        "index {} out of bounds for extent {} of dimension {}",
                        i, self.shape[d], d
                    ),
                });
            }
            fixed[d] = Some(i);
        }

        let shape: Vec<usize> = self
            .shape
            .iter()
            .zip(&fixed)
            .filter(|(_, f)| f.is_none())
            .map(|(&n, _)| n)
            .collect();
        let mut sliced = Self::new(&shape);
        let mut sliced_indices = vec![0; shape.len()];
        let mut full_indices = vec![0; self.dim()];
        for (flat, entry) in sliced.data.iter_mut().enumerate() {
            populate_indices(&sliced.stride, flat, &mut sliced_indices);
            let mut free = sliced_indices.iter();
            for (full, f) in full_indices.iter_mut().zip(&fixed) {
                *full = match f {
                    Some(i) => *i,
                    None => *free.next().unwrap_or(&0),
                };
            }
            *entry = self.data[self.flat_index(&full_indices)].clone();
        }
        Ok(sliced)
    }
}

fn populate_indices(stride: &[usize], mut flat_index: usize, indices: &mut [usize]) {
    for (index, s) in indices.iter_mut().zip(stride) {
        *index = flat_index / s;
        flat_index %= s;
    }
}

impl<'a, T> Index<&'a [usize]> for MultiIndex<T> {
    type Output = T;

    fn index(&self, indices: &'a [usize]) -> &T {
        &self.data[self.flat_index(indices)]
    }
}

impl<'a, T> IndexMut<&'a [usize]> for MultiIndex<T> {
    fn index_mut(&mut self, indices: &'a [usize]) -> &mut T {
        let flat = self.flat_index(indices);
        &mut self.data[flat]
    }
}

impl<'a, T, const N: usize> Index<&'a [usize; N]> for MultiIndex<T> {
    type Output = T;

    fn index(&self, indices: &'a [usize; N]) -> &T {
        &self[indices.as_slice()]
    }
}

impl<'a, T, const N: usize> IndexMut<&'a [usize; N]> for MultiIndex<T> {
    fn index_mut(&mut self, indices: &'a [usize; N]) -> &mut T {
        &mut self[indices.as_slice()]
    }
}

/// Entry types that can be written to and read from a byte stream in little-endian order.
pub trait StorableEntry: Sized {
    fn write_le(&self, writer: &mut dyn Write) -> std::io::Result<()>;
    fn read_le(reader: &mut dyn Read) -> std::io::Result<Self>;
}

macro_rules! impl_storable_entry {
    ($($t:ty),*) => {
        $(
            impl StorableEntry for $t {
                fn write_le(&self, writer: &mut dyn Write) -> std::io::Result<()> {
                    writer.write_all(&self.to_le_bytes())
                }

                fn read_le(reader: &mut dyn Read) -> std::io::Result<Self> {
                    let mut bytes = [0u8; std::mem::size_of::<$t>()];
                    reader.read_exact(&mut bytes)?;
                    Ok(<$t>::from_le_bytes(bytes))
                }
            }
        )*
    };
}

impl_storable_entry!(f32, f64, i32, i64, u32, u64);

fn write_len(writer: &mut dyn Write, len: usize) -> Result<(), MultiIndexError> {
    let len = u32::try_from(len).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("length {} does not fit in the serialized u32 length prefix", len),
        )
    })?;
    len.write_le(writer)?;
    Ok(())
}

fn read_len(reader: &mut dyn Read) -> Result<usize, MultiIndexError> {
    Ok(u32::read_le(reader)? as usize)
}

impl<T: StorableEntry> MultiIndex<T> {
    /// Writes the multi-index to a byte stream.
    ///
    /// The format is the shape followed by the flat data, each written as a `u32` length followed
    /// by the entries. Shape extents are written as `u32`. All numbers are little-endian.
    pub fn data_store(&self, writer: &mut dyn Write) -> Result<(), MultiIndexError> {
        write_len(writer, self.shape.len())?;
        for &extent in &self.shape {
            write_len(writer, extent)?;
        }
        write_len(writer, self.data.len())?;
        for entry in &self.data {
            entry.write_le(writer)?;
        }
        Ok(())
    }

    /// Reads a multi-index previously written with [`MultiIndex::data_store`].
    pub fn data_load(reader: &mut dyn Read) -> Result<Self, MultiIndexError> {
        let dim = read_len(reader)?;
        let shape = (0..dim)
            .map(|_| read_len(reader))
            .collect::<Result<Vec<_>, _>>()?;
        let len = read_len(reader)?;
        let data = (0..len)
            .map(|_| T::read_le(reader))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_data(&shape, data)
    }
}

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Storage for the partial derivatives of a dual number.
///
/// A derivative container maps a derivative *slot* (the local index of an independent variable)
/// to the partial derivative with respect to that variable. Slots that have never been written
/// are implicitly zero.
///
/// Dense and sparse containers must be functionally indistinguishable: the choice only affects
/// memory footprint and performance.
pub trait Derivatives: Clone + Debug + Default + PartialEq + Send + Sync + 'static {
    /// The largest number of slots (dense) or nonzero entries (sparse) the container can hold.
    const CAPACITY: usize;

    /// Returns the partial derivative stored in `slot`, or zero if there is none.
    fn get(&self, slot: usize) -> f64;

    /// Stores `value` in `slot`, overwriting any previous entry.
    ///
    /// # Panics
    ///
    /// Panics if the container capacity is exceeded.
    fn insert(&mut self, slot: usize, value: f64);

    /// Multiplies every derivative by `factor`.
    fn scale(&mut self, factor: f64);

    /// Computes `self += a * x`.
    fn axpy(&mut self, a: f64, x: &Self);

    /// Calls `f(slot, derivative)` for every stored entry in ascending slot order.
    fn for_each_entry(&self, f: impl FnMut(usize, f64));

    /// Removes all derivatives.
    fn clear(&mut self);

    fn is_finite(&self) -> bool {
        let mut finite = true;
        self.for_each_entry(|_, d| finite &= d.is_finite());
        finite
    }
}

/// Seeds (or overwrites) a derivative slot.
///
/// Typically used with `value = 1.0` to mark an independent variable before it enters an
/// expression.
pub fn deriv_insert<D: Derivatives>(derivatives: &mut D, slot: usize, value: f64) {
    derivatives.insert(slot, value);
}

/// A dense, fixed-capacity derivative array.
///
/// Every slot below `N` is stored explicitly. Lives entirely on the stack and is `Copy`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberArray<const N: usize> {
    data: [f64; N],
}

/// `factor * d`, except that a vanishing derivative stays zero even for an infinite factor.
///
/// Both containers use this rule, so that untouched slots of a dense array and missing entries
/// of a sparse one agree at singular points such as `sqrt(0)`.
#[inline(always)]
fn scaled(factor: f64, d: f64) -> f64 {
    if d == 0.0 {
        0.0
    } else {
        factor * d
    }
}

impl<const N: usize> Default for NumberArray<N> {
    fn default() -> Self {
        Self { data: [0.0; N] }
    }
}

impl<const N: usize> NumberArray<N> {
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

impl<const N: usize> Derivatives for NumberArray<N> {
    const CAPACITY: usize = N;

    fn get(&self, slot: usize) -> f64 {
        self.data.get(slot).copied().unwrap_or(0.0)
    }

    fn insert(&mut self, slot: usize, value: f64) {
        assert!(
            slot < N,
            "Derivative slot {} exceeds the dense derivative capacity {}",
            slot,
            N
        );
        self.data[slot] = value;
    }

    fn scale(&mut self, factor: f64) {
        for d in &mut self.data {
            *d = scaled(factor, *d);
        }
    }

    fn axpy(&mut self, a: f64, x: &Self) {
        for (d, x_d) in self.data.iter_mut().zip(&x.data) {
            *d += scaled(a, *x_d);
        }
    }

    fn for_each_entry(&self, mut f: impl FnMut(usize, f64)) {
        for (slot, &d) in self.data.iter().enumerate() {
            if d != 0.0 {
                f(slot, d);
            }
        }
    }

    fn clear(&mut self) {
        self.data = [0.0; N];
    }

    fn is_finite(&self) -> bool {
        self.data.iter().all(|d| d.is_finite())
    }
}

/// A sparse derivative container with a bounded number of nonzero entries.
///
/// Entries are stored as a list of (slot, derivative) pairs sorted by slot, so that binary
/// operations are linear-time merges. The number of stored entries may never exceed
/// [`AD_MAX_DOFS_PER_ELEM`](crate::ad::AD_MAX_DOFS_PER_ELEM), but slot indices themselves are
/// unbounded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparseNumberArray {
    slots: Vec<usize>,
    values: Vec<f64>,
}

impl SparseNumberArray {
    pub fn nnz(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    fn check_capacity(&self) {
        assert!(
            self.slots.len() <= Self::CAPACITY,
            "Sparse derivative container exceeded its capacity of {} entries",
            Self::CAPACITY
        );
    }
}

impl PartialEq for SparseNumberArray {
    fn eq(&self, other: &Self) -> bool {
        // Explicitly stored zeros compare equal to missing entries
        let mut equal = true;
        self.for_each_entry(|slot, d| equal &= other.get(slot) == d);
        other.for_each_entry(|slot, d| equal &= self.get(slot) == d);
        equal
    }
}

impl Derivatives for SparseNumberArray {
    const CAPACITY: usize = crate::ad::AD_MAX_DOFS_PER_ELEM;

    fn get(&self, slot: usize) -> f64 {
        match self.slots.binary_search(&slot) {
            Ok(idx) => self.values[idx],
            Err(_) => 0.0,
        }
    }

    fn insert(&mut self, slot: usize, value: f64) {
        match self.slots.binary_search(&slot) {
            Ok(idx) => self.values[idx] = value,
            Err(idx) => {
                self.slots.insert(idx, slot);
                self.values.insert(idx, value);
                self.check_capacity();
            }
        }
    }

    fn scale(&mut self, factor: f64) {
        for d in &mut self.values {
            *d = scaled(factor, *d);
        }
    }

    fn axpy(&mut self, a: f64, x: &Self) {
        if x.slots.is_empty() {
            return;
        }
        if self.slots.is_empty() {
            self.slots.clone_from(&x.slots);
            self.values = x.values.iter().map(|&x_d| scaled(a, x_d)).collect();
            return;
        }

        // Merge the two sorted slot lists
        let mut slots = Vec::with_capacity(self.slots.len() + x.slots.len());
        let mut values = Vec::with_capacity(self.slots.len() + x.slots.len());
        let (mut i, mut j) = (0, 0);
        while i < self.slots.len() || j < x.slots.len() {
            let self_slot = self.slots.get(i).copied().unwrap_or(usize::MAX);
            let x_slot = x.slots.get(j).copied().unwrap_or(usize::MAX);
            if self_slot < x_slot {
                slots.push(self_slot);
                values.push(self.values[i]);
                i += 1;
            } else if x_slot < self_slot {
                slots.push(x_slot);
                values.push(scaled(a, x.values[j]));
                j += 1;
            } else {
                slots.push(self_slot);
                values.push(self.values[i] + scaled(a, x.values[j]));
                i += 1;
                j += 1;
            }
        }
        self.slots = slots;
        self.values = values;
        self.check_capacity();
    }

    fn for_each_entry(&self, mut f: impl FnMut(usize, f64)) {
        for (&slot, &d) in self.slots.iter().zip(&self.values) {
            f(slot, d);
        }
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.values.clear();
    }
}

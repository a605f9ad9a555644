use std::ops::{Index, IndexMut};

/// A fixed-size numeric buffer with indexed access and bulk reset.
///
/// Used for per-neuron activation/output snapshots during a think step and
/// for the trainer's transient delta and gradient accumulators. Indices are
/// neuron or link slot numbers, so a store is always sized to the owning
/// network's slot count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueStore {
    values: Vec<f64>,
}

impl ValueStore {
    pub fn zeros(len: usize) -> ValueStore {
        ValueStore { values: vec![0.0; len] }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Zeroes every value, keeping the allocation.
    pub fn reset(&mut self) {
        for v in &mut self.values {
            *v = 0.0;
        }
    }

    /// Resizes to `len` slots, zero-filling new ones.
    pub fn resize(&mut self, len: usize) {
        self.values.resize(len, 0.0);
    }

    /// Drops the backing storage entirely.
    pub fn clear(&mut self) {
        self.values.clear();
        self.values.shrink_to_fit();
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

impl Index<usize> for ValueStore {
    type Output = f64;

    fn index(&self, idx: usize) -> &f64 {
        &self.values[idx]
    }
}

impl IndexMut<usize> for ValueStore {
    fn index_mut(&mut self, idx: usize) -> &mut f64 {
        &mut self.values[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_zeroes_in_place() {
        let mut store = ValueStore::zeros(3);
        store[0] = 1.5;
        store[2] = -0.25;
        store.reset();
        assert_eq!(store.as_slice(), &[0.0, 0.0, 0.0]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn resize_preserves_existing_values() {
        let mut store = ValueStore::zeros(2);
        store[1] = 4.0;
        store.resize(4);
        assert_eq!(store.as_slice(), &[0.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn clear_releases_storage() {
        let mut store = ValueStore::zeros(8);
        store.clear();
        assert!(store.is_empty());
    }
}

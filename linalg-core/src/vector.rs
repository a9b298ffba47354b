use crate::field::Field;
use crate::traits::VectorLike;
use std::ops::Index;

/// Fixed-length, immutable sequence of field elements.
///
/// Operations never mutate a vector; providers return new ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector<E: Field> {
    data: Vec<E>,
}

impl<E: Field> Vector<E> {
    pub fn from_vec(data: Vec<E>) -> Self {
        Self { data }
    }

    /// Creates a vector of `dimension` zeros.
    pub fn zeros(dimension: usize) -> Self {
        Self {
            data: vec![E::zero(); dimension],
        }
    }

    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    pub fn get(&self, index: usize) -> Option<&E> {
        self.data.get(index)
    }

    pub fn as_slice(&self) -> &[E] {
        &self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.data.iter()
    }

    pub fn into_vec(self) -> Vec<E> {
        self.data
    }

    /// Zero-copy view in device format, when the scalar allows it.
    pub fn as_real_slice(&self) -> Option<&[f64]> {
        E::as_real_slice(&self.data)
    }
}

impl<E: Field> From<Vec<E>> for Vector<E> {
    fn from(data: Vec<E>) -> Self {
        Self::from_vec(data)
    }
}

impl<E: Field> FromIterator<E> for Vector<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<E: Field> Index<usize> for Vector<E> {
    type Output = E;

    fn index(&self, index: usize) -> &E {
        &self.data[index]
    }
}

impl<E: Field> VectorLike for Vector<E> {
    type Value = E;

    fn len(&self) -> usize {
        self.dimension()
    }
}

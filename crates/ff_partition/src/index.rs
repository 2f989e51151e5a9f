//! Triangular addressing of the (i, j) matrices.
//!
//! Cells with 1 <= i <= j <= n are stored in one linear array. Rows are
//! laid out such that `offset(i, j) = offsets[i] - j`, so consecutive j
//! of one row are adjacent in memory (in descending order).

use std::ops::Index;
use std::ops::IndexMut;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriangularIndex {
    n: usize,
    offsets: Vec<usize>,
}

impl TriangularIndex {
    pub fn new(n: usize) -> Self {
        let mut offsets = vec![0; n + 1];
        for (i, o) in offsets.iter_mut().enumerate().skip(1) {
            *o = ((n + 1 - i) * (n - i)) / 2 + n + 1;
        }
        TriangularIndex { n, offsets }
    }

    /// Sequence length.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Number of linear cells (index 0 unused).
    pub fn size(&self) -> usize {
        self.n * (self.n + 1) / 2 + 1
    }

    #[inline]
    pub fn offset(&self, i: usize, j: usize) -> usize {
        debug_assert!(1 <= i && i <= j && j <= self.n, "({i},{j}) out of range");
        self.offsets[i] - j
    }
}

/// A triangular matrix indexed by `(i, j)`, 1 <= i <= j <= n.
#[derive(Debug, Clone, PartialEq)]
pub struct TriMatrix<T> {
    index: TriangularIndex,
    data: Vec<T>,
}

impl<T: Clone + Default> TriMatrix<T> {
    pub fn new(n: usize) -> Self {
        let index = TriangularIndex::new(n);
        let data = vec![T::default(); index.size()];
        TriMatrix { index, data }
    }

    /// Like indexing, but empty ranges (j < i) yield `T::default()`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        if j < i {
            T::default()
        } else {
            self.data[self.index.offset(i, j)].clone()
        }
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|x| *x = value.clone());
    }
}

impl<T> TriMatrix<T> {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T> Index<(usize, usize)> for TriMatrix<T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        &self.data[self.index.offset(i, j)]
    }
}

impl<T> IndexMut<(usize, usize)> for TriMatrix<T> {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        &mut self.data[self.index.offset(i, j)]
    }
}

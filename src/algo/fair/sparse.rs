//! Compressed sparse row matrix for fairing systems.
//!
//! Rows are assembled as `(row, col, value)` triplets. Stencil expansion
//! reaches the same `(row, col)` pair along many paths, so construction sums
//! duplicates instead of keeping the last one.

use nalgebra::{DMatrix, DVector};

/// Compressed Sparse Row (CSR) matrix.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    /// `row_ptr[i]..row_ptr[i + 1]` is the slice of row `i`; length `rows + 1`.
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Create a CSR matrix from triplets `(row, col, value)`.
    ///
    /// Duplicate entries at the same position are summed.
    ///
    /// # Panics
    /// Panics if a triplet lies outside `rows x cols`.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            assert!(row < rows && col < cols, "triplet ({}, {}) out of bounds", row, col);
            if last == Some((row, col)) {
                if let Some(acc) = values.last_mut() {
                    *acc += val;
                }
                continue;
            }
            col_idx.push(col);
            values.push(val);
            row_ptr[row + 1] += 1;
            last = Some((row, col));
        }

        // Per-row counts to offsets
        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Whether the matrix is square.
    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Stored `(col, value)` pairs of row `i`, in column order.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Entry at `(i, j)`, zero when not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        match self.col_idx[range.clone()].binary_search(&j) {
            Ok(k) => self.values[range.start + k],
            Err(_) => 0.0,
        }
    }

    /// Index of the first row whose entries are all zero, if any.
    pub fn first_zero_row(&self) -> Option<usize> {
        (0..self.rows).find(|&i| self.row(i).all(|(_, v)| v == 0.0))
    }

    /// Main diagonal, zero where not stored.
    pub fn diagonal(&self) -> DVector<f64> {
        DVector::from_fn(self.rows.min(self.cols), |i, _| self.get(i, i))
    }

    /// Largest absolute stored value.
    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    /// y = A * x.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.cols, "Vector dimension mismatch");

        DVector::from_iterator(
            self.rows,
            (0..self.rows).map(|i| self.row(i).map(|(j, v)| v * x[j]).sum::<f64>()),
        )
    }

    /// Expand into a dense matrix.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.rows, self.cols);
        for i in 0..self.rows {
            for (j, v) in self.row(i) {
                dense[(i, j)] = v;
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_triplets_sums_duplicates() {
        let triplets = vec![(0, 0, 2.0), (1, 1, 3.0), (0, 0, 2.0), (0, 1, 1.0), (1, 0, 1.0)];
        let a = SparseMatrix::from_triplets(2, 2, triplets);

        assert_eq!(a.nnz(), 4);
        assert_eq!(a.get(0, 0), 4.0);
        assert_eq!(a.get(0, 1), 1.0);
        assert_eq!(a.get(1, 1), 3.0);
    }

    #[test]
    fn test_skipped_rows() {
        // Row 1 has no entries
        let a = SparseMatrix::from_triplets(3, 3, vec![(0, 0, 1.0), (2, 2, 5.0)]);

        assert_eq!(a.row(1).count(), 0);
        assert_eq!(a.get(2, 2), 5.0);
        assert_eq!(a.first_zero_row(), Some(1));
    }

    #[test]
    fn test_cancelled_entry_counts_as_zero_row() {
        let a = SparseMatrix::from_triplets(1, 1, vec![(0, 0, 1.5), (0, 0, -1.5)]);
        assert_eq!(a.nnz(), 1);
        assert_eq!(a.first_zero_row(), Some(0));
    }

    #[test]
    fn test_mul_vec() {
        // [ 4  1 ]   [ 1 ]   [ 5 ]
        // [ 1  3 ] * [ 1 ] = [ 4 ]
        let a = SparseMatrix::from_triplets(2, 2, vec![(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)]);
        let y = a.mul_vec(&DVector::from_vec(vec![1.0, 1.0]));

        assert!((y[0] - 5.0).abs() < 1e-12);
        assert!((y[1] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_diagonal_and_scale() {
        // [ 2  0 ]
        // [-5  0 ]
        let a = SparseMatrix::from_triplets(2, 2, vec![(0, 0, 2.0), (1, 0, -5.0)]);

        assert_eq!(a.diagonal(), DVector::from_vec(vec![2.0, 0.0]));
        assert_eq!(a.max_abs(), 5.0);
    }

    #[test]
    fn test_to_dense() {
        let a = SparseMatrix::from_triplets(2, 3, vec![(0, 2, 7.0), (1, 0, -1.0)]);
        let d = a.to_dense();

        assert_eq!(d.shape(), (2, 3));
        assert_eq!(d[(0, 2)], 7.0);
        assert_eq!(d[(1, 0)], -1.0);
        assert_eq!(d[(0, 0)], 0.0);
        assert!(!a.is_square());
    }
}

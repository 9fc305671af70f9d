use faer::{Mat, MatRef};
use rayon::prelude::*;

use crate::utils::general::{cumsum, nested_vector_to_faer_mat};

///////////
// Enums //
///////////

/// Floating point width the stored weights were rounded to
///
/// Large weight structures are rounded through f32 to bound memory of any
/// serialized form; the in-memory representation stays f64 either way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightPrecision {
    /// Weights were rounded through f32
    Single,
    /// Weights carry full f64 precision
    Double,
}

////////////////
// Structures //
////////////////

/// Sparse spatial connectivity matrix in CSR layout
///
/// Entry (i, j) is the connectivity weight between sample i and sample j;
/// absent entries are structural zeros. Weights are non-negative and entries
/// at or below the builder's cutoff are pruned, so the stored density
/// reflects real connectivity.
///
/// ### Fields
///
/// * `data` - The stored weights
/// * `indices` - Column index per stored weight
/// * `indptr` - Row pointers into `data`/`indices`, length `nrows + 1`
/// * `shape` - `(nrows, ncols)`
/// * `precision` - Whether the weights were rounded through f32
#[derive(Clone, Debug)]
pub struct ProximityMatrix {
    pub data: Vec<f64>,
    pub indices: Vec<usize>,
    pub indptr: Vec<usize>,
    pub shape: (usize, usize),
    pub precision: WeightPrecision,
}

impl ProximityMatrix {
    /// Assemble from per-row (column, weight) pairs
    ///
    /// ### Params
    ///
    /// * `rows` - One vector per row with (column, weight) entries, columns
    ///   sorted ascending
    /// * `ncols` - Number of columns of the matrix
    ///
    /// ### Returns
    ///
    /// The assembled CSR matrix (full f64 precision).
    pub fn from_rows(rows: Vec<Vec<(usize, f64)>>, ncols: usize) -> Self {
        let nrows = rows.len();
        let lens: Vec<usize> = rows.iter().map(|r| r.len()).collect();

        let mut indptr = Vec::with_capacity(nrows + 1);
        indptr.push(0);
        indptr.extend(cumsum(&lens));

        let nnz = *indptr.last().unwrap_or(&0);
        let mut indices = Vec::with_capacity(nnz);
        let mut data = Vec::with_capacity(nnz);
        for row in rows {
            for (j, w) in row {
                indices.push(j);
                data.push(w);
            }
        }

        ProximityMatrix {
            data,
            indices,
            indptr,
            shape: (nrows, ncols),
            precision: WeightPrecision::Double,
        }
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Number of rows
    pub fn nrows(&self) -> usize {
        self.shape.0
    }

    /// Number of columns
    pub fn ncols(&self) -> usize {
        self.shape.1
    }

    /// Is the matrix square
    pub fn is_square(&self) -> bool {
        self.shape.0 == self.shape.1
    }

    /// Column indices and weights of row `i`
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let range = self.indptr[i]..self.indptr[i + 1];
        (&self.indices[range.clone()], &self.data[range])
    }

    /// Total weight mass
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Sum of squared weights
    pub fn sq_sum(&self) -> f64 {
        self.data.iter().map(|w| w * w).sum()
    }

    /// Per-row weight sums
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.nrows())
            .map(|i| self.row(i).1.iter().sum())
            .collect()
    }

    /// Per-row sums of squared weights
    pub fn row_sq_sums(&self) -> Vec<f64> {
        (0..self.nrows())
            .map(|i| self.row(i).1.iter().map(|w| w * w).sum())
            .collect()
    }

    /// Per-column weight sums
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.ncols()];
        for (j, w) in self.indices.iter().zip(self.data.iter()) {
            sums[*j] += w;
        }
        sums
    }

    /// Sparse matrix × vector product
    ///
    /// ### Params
    ///
    /// * `v` - Dense vector of length `ncols`
    ///
    /// ### Returns
    ///
    /// The product of length `nrows`.
    pub fn matvec(&self, v: &[f64]) -> Vec<f64> {
        (0..self.nrows())
            .map(|i| {
                let (cols, vals) = self.row(i);
                cols.iter()
                    .zip(vals.iter())
                    .fold(0.0, |acc, (&j, &w)| acc + w * v[j])
            })
            .collect()
    }

    /// Sparse matrix × dense matrix product
    ///
    /// Rows are computed in parallel; each output value is a sequential sum
    /// over one row's stored entries, keeping results bit-reproducible
    /// across thread schedules.
    ///
    /// ### Params
    ///
    /// * `rhs` - Dense matrix with `ncols` rows
    ///
    /// ### Returns
    ///
    /// The dense product with `nrows` rows and `rhs.ncols()` columns.
    pub fn matmat(&self, rhs: MatRef<f64>) -> Mat<f64> {
        let p = rhs.ncols();
        let rows: Vec<Vec<f64>> = (0..self.nrows())
            .into_par_iter()
            .map(|i| {
                let mut acc = vec![0.0; p];
                let (cols, vals) = self.row(i);
                for (&j, &w) in cols.iter().zip(vals.iter()) {
                    for k in 0..p {
                        acc[k] += w * rhs[(j, k)];
                    }
                }
                acc
            })
            .collect();

        nested_vector_to_faer_mat(rows, false)
    }

    /// L1-normalize every row in place
    ///
    /// Rows with zero mass are left untouched (no division by zero).
    pub fn l1_normalize_rows(&mut self) {
        for i in 0..self.nrows() {
            let range = self.indptr[i]..self.indptr[i + 1];
            let total: f64 = self.data[range.clone()].iter().sum();
            if total > 0.0 {
                for w in &mut self.data[range] {
                    *w /= total;
                }
            }
        }
    }

    /// Drop entries with weight at or below `cutoff`, along with exact zeros
    ///
    /// Keeps the postcondition that the structure holds no explicit zeros,
    /// whatever the sign of the cutoff.
    ///
    /// ### Params
    ///
    /// * `cutoff` - Weights `<= cutoff` are removed
    pub fn prune(&mut self, cutoff: f64) {
        let mut data = Vec::with_capacity(self.data.len());
        let mut indices = Vec::with_capacity(self.indices.len());
        let mut indptr = Vec::with_capacity(self.indptr.len());
        indptr.push(0);

        for i in 0..self.nrows() {
            let (cols, vals) = self.row(i);
            for (&j, &w) in cols.iter().zip(vals.iter()) {
                if w > cutoff && w != 0.0 {
                    indices.push(j);
                    data.push(w);
                }
            }
            indptr.push(data.len());
        }

        self.data = data;
        self.indices = indices;
        self.indptr = indptr;
    }

    /// Round every stored weight through f32 and tag the precision
    pub fn round_to_f32(&mut self) {
        for w in &mut self.data {
            *w = *w as f32 as f64;
        }
        self.precision = WeightPrecision::Single;
    }

    /// Transposed copy via counting sort
    ///
    /// ### Returns
    ///
    /// The transpose with rows and columns swapped, column indices sorted
    /// within each row.
    pub fn transpose(&self) -> ProximityMatrix {
        let (nrows, ncols) = self.shape;
        let nnz = self.nnz();

        let mut t_indptr = vec![0usize; ncols + 1];
        for &j in &self.indices {
            t_indptr[j + 1] += 1;
        }
        for j in 0..ncols {
            t_indptr[j + 1] += t_indptr[j];
        }

        let mut t_indices = vec![0usize; nnz];
        let mut t_data = vec![0.0; nnz];
        let mut next = t_indptr.clone();

        for i in 0..nrows {
            let (cols, vals) = self.row(i);
            for (&j, &w) in cols.iter().zip(vals.iter()) {
                let pos = next[j];
                next[j] += 1;
                t_indices[pos] = i;
                t_data[pos] = w;
            }
        }

        ProximityMatrix {
            data: t_data,
            indices: t_indices,
            indptr: t_indptr,
            shape: (ncols, nrows),
            precision: self.precision,
        }
    }

    /// Dense copy, mainly for tests and small-scale inspection
    pub fn to_dense(&self) -> Mat<f64> {
        let mut dense = Mat::zeros(self.nrows(), self.ncols());
        for i in 0..self.nrows() {
            let (cols, vals) = self.row(i);
            for (&j, &w) in cols.iter().zip(vals.iter()) {
                dense[(i, j)] = w;
            }
        }
        dense
    }
}

///////////
// Tests //
///////////

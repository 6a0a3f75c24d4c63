//! Dense matrices over GF(2^8) and the coding-matrix constructions
//!
//! A coding matrix is (k+m) × k with an identity top, so data shards pass
//! through unchanged and the bottom m rows define parity. The constructions
//! differ in which erasure patterns they can recover from:
//!
//! - `build_matrix` (systematic Vandermonde) and `build_matrix_cauchy`
//!   guarantee every k-row sub-matrix is invertible.
//! - `build_matrix_par1` reproduces the PAR1 file-format matrix, which is
//!   known to contain singular sub-matrices for some (k, m).
//! - `build_matrix_jerasure` is laid out bit-identically to the Jerasure
//!   reference library for interoperability with its archives.

use crate::error::{Error, Result};
use crate::galois::{gal_add, gal_div, gal_exp, gal_inv, gal_mul};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Row-major matrix of GF(2^8) elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Vec<u8>>,
}

impl Matrix {
    /// Create a zeroed `rows` × `cols` matrix
    pub fn new(rows: usize, cols: usize) -> Matrix {
        debug_assert!(rows > 0 && cols > 0);
        Matrix {
            rows,
            cols,
            data: vec![vec![0u8; cols]; rows],
        }
    }

    /// Identity matrix of size `n`
    pub fn identity(n: usize) -> Matrix {
        let mut m = Matrix::new(n, n);
        for i in 0..n {
            m.data[i][i] = 1;
        }
        m
    }

    /// Build from explicit rows; all rows must share a length
    pub fn from_rows(rows: Vec<Vec<u8>>) -> Result<Matrix> {
        if rows.is_empty() || rows[0].is_empty() {
            return Err(Error::InvalidInput("matrix must not be empty"));
        }
        let cols = rows[0].len();
        if rows.iter().any(|r| r.len() != cols) {
            return Err(Error::InvalidInput("matrix rows have unequal length"));
        }
        Ok(Matrix {
            rows: rows.len(),
            cols,
            data: rows,
        })
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn col_count(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Borrow a row as a byte slice (a parity row feeds the kernel directly)
    #[inline]
    pub fn row(&self, r: usize) -> &[u8] {
        &self.data[r]
    }

    pub fn swap_rows(&mut self, r1: usize, r2: usize) {
        self.data.swap(r1, r2);
    }

    /// Standard row × column product
    pub fn multiply(&self, right: &Matrix) -> Result<Matrix> {
        if self.cols != right.rows {
            return Err(Error::InvalidInput(
                "columns on left must equal rows on right",
            ));
        }
        let mut result = Matrix::new(self.rows, right.cols);
        for r in 0..self.rows {
            for c in 0..right.cols {
                let mut value = 0u8;
                for i in 0..self.cols {
                    value = gal_add(value, gal_mul(self.data[r][i], right.data[i][c]));
                }
                result.data[r][c] = value;
            }
        }
        Ok(result)
    }

    /// Horizontal concatenation `[self | right]`
    pub fn augment(&self, right: &Matrix) -> Result<Matrix> {
        if self.rows != right.rows {
            return Err(Error::InvalidInput("matrices must have the same row count"));
        }
        let mut result = Matrix::new(self.rows, self.cols + right.cols);
        for r in 0..self.rows {
            result.data[r][..self.cols].copy_from_slice(&self.data[r]);
            result.data[r][self.cols..].copy_from_slice(&right.data[r]);
        }
        Ok(result)
    }

    /// Rectangular slice `[rmin, rmax) × [cmin, cmax)`
    pub fn sub_matrix(&self, rmin: usize, cmin: usize, rmax: usize, cmax: usize) -> Matrix {
        let mut result = Matrix::new(rmax - rmin, cmax - cmin);
        for r in rmin..rmax {
            for c in cmin..cmax {
                result.data[r - rmin][c - cmin] = self.data[r][c];
            }
        }
        result
    }

    /// Select full rows by index; indices must be increasing
    pub fn sub_matrix_rows(&self, indices: &[usize]) -> Matrix {
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        let mut result = Matrix::new(indices.len(), self.cols);
        for (r, &idx) in indices.iter().enumerate() {
            result.data[r].copy_from_slice(&self.data[idx]);
        }
        result
    }

    /// Invert a square matrix by Gauss-Jordan elimination on `[self | I]`.
    ///
    /// Pivot selection takes the first nonzero element in the current column
    /// at or below the diagonal; a column without one means the matrix is
    /// singular.
    pub fn invert(&self) -> Result<Matrix> {
        if !self.is_square() {
            return Err(Error::InvalidInput("only square matrices can be inverted"));
        }
        let n = self.rows;
        let mut work = self.augment(&Matrix::identity(n))?;
        work.gaussian_elimination()?;
        Ok(work.sub_matrix(0, n, n, n * 2))
    }

    fn gaussian_elimination(&mut self) -> Result<()> {
        let rows = self.rows;
        let cols = self.cols;

        // Forward: clear everything below the diagonal
        for r in 0..rows {
            if self.data[r][r] == 0 {
                for below in r + 1..rows {
                    if self.data[below][r] != 0 {
                        self.swap_rows(r, below);
                        break;
                    }
                }
            }
            if self.data[r][r] == 0 {
                return Err(Error::SingularMatrix);
            }
            if self.data[r][r] != 1 {
                let scale = gal_div(1, self.data[r][r]);
                for c in 0..cols {
                    self.data[r][c] = gal_mul(self.data[r][c], scale);
                }
            }
            for below in r + 1..rows {
                if self.data[below][r] != 0 {
                    let scale = self.data[below][r];
                    for c in 0..cols {
                        self.data[below][c] ^= gal_mul(scale, self.data[r][c]);
                    }
                }
            }
        }

        // Backward: clear everything above the diagonal
        for d in 0..rows {
            for above in 0..d {
                if self.data[above][d] != 0 {
                    let scale = self.data[above][d];
                    for c in 0..cols {
                        self.data[above][c] ^= gal_mul(scale, self.data[d][c]);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Index<usize> for Matrix {
    type Output = Vec<u8>;
    fn index(&self, r: usize) -> &Vec<u8> {
        &self.data[r]
    }
}

impl IndexMut<usize> for Matrix {
    fn index_mut(&mut self, r: usize) -> &mut Vec<u8> {
        &mut self.data[r]
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, row) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", row)?;
        }
        write!(f, "]")
    }
}

/// Raw Vandermonde matrix: `m[r][c] = r^c` over the field.
///
/// Guaranteed to have invertible k-row sub-matrices, but not systematic on
/// its own; `build_matrix` applies the change of basis.
pub fn vandermonde(rows: usize, cols: usize) -> Matrix {
    let mut result = Matrix::new(rows, cols);
    for r in 0..rows {
        for c in 0..cols {
            result[r][c] = gal_exp(r as u8, c);
        }
    }
    result
}

/// Systematic coding matrix: Vandermonde normalized so the top k rows are
/// the identity
pub fn build_matrix(data_shards: usize, total_shards: usize) -> Result<Matrix> {
    let vm = vandermonde(total_shards, data_shards);
    let top = vm.sub_matrix(0, 0, data_shards, data_shards);
    // A Vandermonde top square is always invertible
    vm.multiply(&top.invert()?)
}

/// Cauchy coding matrix: parity element (r, c) is `1 / (r ^ c)`.
///
/// Row and column indices are disjoint sets of field elements, so every
/// denominator is nonzero and every k-row sub-matrix is invertible.
pub fn build_matrix_cauchy(data_shards: usize, total_shards: usize) -> Result<Matrix> {
    let mut result = Matrix::new(total_shards, data_shards);
    for r in 0..total_shards {
        if r < data_shards {
            result[r][r] = 1;
        } else {
            for c in 0..data_shards {
                result[r][c] = gal_inv((r ^ c) as u8);
            }
        }
    }
    Ok(result)
}

/// PAR1-compatible coding matrix: identity top, transposed Vandermonde
/// parity starting at base 1.
///
/// Compatibility trumps robustness here: some sub-matrices are singular, so
/// certain erasure patterns cannot be decoded.
pub fn build_matrix_par1(data_shards: usize, total_shards: usize) -> Result<Matrix> {
    let mut result = Matrix::new(total_shards, data_shards);
    for r in 0..total_shards {
        if r < data_shards {
            result[r][r] = 1;
        } else {
            for c in 0..data_shards {
                result[r][c] = gal_exp((c + 1) as u8, r - data_shards);
            }
        }
    }
    Ok(result)
}

/// Jerasure-compatible coding matrix.
///
/// Starts from the extended Vandermonde matrix (first row e₀, last row
/// e_{k-1}), makes the top square the identity with elementary column
/// operations, scales the parity part of each column so row k is all ones,
/// and finally scales the remaining parity rows so column 0 is all ones.
/// Matches the output of Jerasure's `reed_sol_vandermonde_coding_matrix`
/// element for element.
pub fn build_matrix_jerasure(data_shards: usize, total_shards: usize) -> Result<Matrix> {
    let mut vm = vandermonde(total_shards, data_shards);

    // Extended Vandermonde boundary rows
    vm[0][0] = 1;
    for c in 1..data_shards {
        vm[0][c] = 0;
    }
    for c in 0..data_shards - 1 {
        vm[total_shards - 1][c] = 0;
    }
    vm[total_shards - 1][data_shards - 1] = 1;

    // Systematize with column operations
    for i in 0..data_shards {
        let mut pivot = i;
        while pivot < total_shards && vm[pivot][i] == 0 {
            pivot += 1;
        }
        if pivot == total_shards {
            return Err(Error::SingularMatrix);
        }
        if pivot != i {
            vm.swap_rows(i, pivot);
        }
        if vm[i][i] != 1 {
            let scale = gal_div(1, vm[i][i]);
            for r in 0..total_shards {
                vm[r][i] = gal_mul(scale, vm[r][i]);
            }
        }
        for j in 0..data_shards {
            if j == i {
                continue;
            }
            let factor = vm[i][j];
            if factor != 0 {
                for r in 0..total_shards {
                    let delta = gal_mul(factor, vm[r][i]);
                    vm[r][j] ^= delta;
                }
            }
        }
    }

    // Scale parity columns so the first parity row is all ones
    if total_shards > data_shards {
        for j in 0..data_shards {
            let factor = vm[data_shards][j];
            if factor != 0 && factor != 1 {
                let scale = gal_div(1, factor);
                for r in data_shards..total_shards {
                    vm[r][j] = gal_mul(scale, vm[r][j]);
                }
            }
        }
        // Then scale the remaining parity rows so their first column is one
        for r in data_shards + 1..total_shards {
            let factor = vm[r][0];
            if factor != 0 && factor != 1 {
                let scale = gal_div(1, factor);
                for j in 0..data_shards {
                    vm[r][j] = gal_mul(scale, vm[r][j]);
                }
            }
        }
    }

    Ok(vm)
}

/// Identity top plus a single all-ones parity row, making that parity a
/// plain XOR of the data shards
pub fn build_xor_matrix(data_shards: usize, total_shards: usize) -> Result<Matrix> {
    if data_shards + 1 != total_shards {
        return Err(Error::InvalidInput("xor matrix requires exactly one parity"));
    }
    let mut result = Matrix::new(total_shards, data_shards);
    for r in 0..data_shards {
        result[r][r] = 1;
    }
    for c in 0..data_shards {
        result[data_shards][c] = 1;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let m = Matrix::identity(3);
        for r in 0..3 {
            for c in 0..3 {
                assert_eq!(m[r][c], u8::from(r == c));
            }
        }
    }

    #[test]
    fn test_multiply() {
        let a = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap();
        let b = Matrix::from_rows(vec![vec![5, 6], vec![7, 8]]).unwrap();
        let product = a.multiply(&b).unwrap();
        // Hand-checked in GF(2^8)/0x11D
        assert_eq!(product[0], vec![11, 22]);
        assert_eq!(product[1], vec![19, 42]);
    }

    #[test]
    fn test_invert_round_trip() {
        let m = Matrix::from_rows(vec![
            vec![56, 23, 98],
            vec![3, 100, 200],
            vec![45, 201, 123],
        ])
        .unwrap();
        let inv = m.invert().unwrap();
        assert_eq!(m.multiply(&inv).unwrap(), Matrix::identity(3));
        assert_eq!(inv.multiply(&m).unwrap(), Matrix::identity(3));
    }

    #[test]
    fn test_invert_pivot_search_below_diagonal() {
        // Leading zero forces a row swap
        let m = Matrix::from_rows(vec![
            vec![0, 23, 98],
            vec![3, 100, 200],
            vec![45, 201, 123],
        ])
        .unwrap();
        let inv = m.invert().unwrap();
        assert_eq!(m.multiply(&inv).unwrap(), Matrix::identity(3));
    }

    #[test]
    fn test_invert_singular() {
        let m = Matrix::from_rows(vec![
            vec![4, 2],
            vec![12, 6], // 3 × row 0
        ])
        .unwrap();
        assert!(matches!(m.invert(), Err(Error::SingularMatrix)));
    }

    #[test]
    fn test_invert_rejects_non_square() {
        let m = Matrix::new(2, 3);
        assert!(m.invert().is_err());
    }

    #[test]
    fn test_multiply_shape_mismatch() {
        let a = Matrix::new(2, 3);
        let b = Matrix::new(2, 3);
        assert!(a.multiply(&b).is_err());
    }

    #[test]
    fn test_build_matrix_systematic() {
        for (k, total) in [(1, 1), (1, 2), (5, 10), (8, 12), (10, 13), (128, 256)] {
            let m = build_matrix(k, total).unwrap();
            for r in 0..k {
                for c in 0..k {
                    assert_eq!(m[r][c], u8::from(r == c), "top is not identity at {k}x{total}");
                }
            }
        }
    }

    /// All increasing k-subsets of `0..total` that include a data row
    fn row_subsets(k: usize, total: usize) -> Vec<Vec<usize>> {
        let mut subsets = Vec::new();
        for mask in 0u32..1 << total {
            if mask.count_ones() as usize != k {
                continue;
            }
            let indices: Vec<usize> = (0..total).filter(|i| mask & (1 << i) != 0).collect();
            if indices[0] < k {
                subsets.push(indices);
            }
        }
        subsets
    }

    #[test]
    fn test_cauchy_all_submatrices_invertible() {
        // Exhaustive for a small code: every k-subset of rows must invert
        let (k, total) = (4, 8);
        let m = build_matrix_cauchy(k, total).unwrap();
        for indices in row_subsets(k, total) {
            let sub = m.sub_matrix_rows(&indices);
            assert!(
                sub.invert().is_ok(),
                "singular Cauchy sub-matrix for rows {:?}",
                indices
            );
        }
    }

    #[test]
    fn test_par1_has_singular_submatrix() {
        // The 4+4 PAR1 matrix is the canonical counterexample: at least one
        // erasure pattern is undecodable
        let (k, total) = (4, 8);
        let m = build_matrix_par1(k, total).unwrap();
        let found_singular = row_subsets(k, total).into_iter().any(|indices| {
            let sub = m.sub_matrix_rows(&indices);
            matches!(sub.invert(), Err(Error::SingularMatrix))
        });
        assert!(found_singular, "no singular PAR1 sub-matrix found");
    }

    #[test]
    fn test_jerasure_8_4_reference_rows() {
        // Canonical Jerasure 8+4 coding matrix; parity rows must match the
        // reference library verbatim
        let m = build_matrix_jerasure(8, 12).unwrap();
        let reference: [[u8; 8]; 4] = [
            [1, 1, 1, 1, 1, 1, 1, 1],
            [1, 55, 39, 73, 84, 181, 225, 217],
            [1, 39, 217, 161, 92, 60, 172, 90],
            [1, 172, 70, 235, 143, 34, 200, 101],
        ];
        for r in 0..8 {
            for c in 0..8 {
                assert_eq!(m[r][c], u8::from(r == c), "top is not identity");
            }
        }
        for r in 0..4 {
            assert_eq!(m[8 + r].as_slice(), &reference[r], "parity row {}", r);
        }
    }

    #[test]
    fn test_xor_matrix() {
        let m = build_xor_matrix(5, 6).unwrap();
        assert_eq!(m[5], vec![1, 1, 1, 1, 1]);
        assert!(build_xor_matrix(5, 7).is_err());
    }

    #[test]
    fn test_vandermonde_values() {
        let m = vandermonde(4, 3);
        assert_eq!(m[0], vec![1, 0, 0]);
        assert_eq!(m[1], vec![1, 1, 1]);
        assert_eq!(m[2], vec![1, 2, 4]);
        assert_eq!(m[3], vec![1, 3, 5]);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Eigen decompositions used by the constrained quadratic solver.
//!
//! The solver needs the real eigenpairs of a dense, non-symmetric action
//! matrix, and the eigenvalues of small symmetric matrices for its second
//! order check. Both go through the [`EigenSolver`] trait so that the
//! decomposition can be swapped and checked in isolation.

use nalgebra::{linalg::Schur, DMatrix, DVector};

/// Eigenvalues in ascending order with their unit eigenvectors stored as columns.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues, ascending.
    pub eigenvalues: DVector<f64>,
    /// Unit eigenvectors, column `i` pairs with `eigenvalues[i]`.
    pub eigenvectors: DMatrix<f64>,
}

/// Real eigenvalue of a general matrix with a unit right eigenvector.
#[derive(Debug, Clone)]
pub struct RealEigenpair {
    /// Eigenvalue.
    pub value: f64,
    /// Unit eigenvector, defined up to sign.
    pub vector: DVector<f64>,
}

/// Eigen decomposition of real matrices.
pub trait EigenSolver {
    /// Decompose a symmetric matrix.
    /// Return `None` if the decomposition did not converge
    /// or produced non-finite values.
    fn symmetric_eigen(&self, matrix: &DMatrix<f64>) -> Option<EigenDecomposition>;

    /// Real eigenpairs of a general square matrix, sorted by eigenvalue.
    /// Complex conjugate pairs are skipped.
    /// Return `None` if the decomposition did not converge.
    fn real_eigen(&self, matrix: &DMatrix<f64>) -> Option<Vec<RealEigenpair>>;
}

/// Symmetric QR iterations and real Schur decomposition from nalgebra.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NalgebraEigen {
    /// Convergence threshold on the off-diagonal entries.
    pub epsilon: f64,
    /// Maximum number of iterations, 0 meaning unbounded.
    pub max_iterations: usize,
    /// An eigenvalue $\lambda$ is taken as real when
    /// $|\Im \lambda| \le$ `imaginary_tolerance` $(1 + |\Re \lambda|)$.
    pub imaginary_tolerance: f64,
}

impl Default for NalgebraEigen {
    fn default() -> Self {
        Self {
            epsilon: 1e-14,
            max_iterations: 1000,
            imaginary_tolerance: 1e-4,
        }
    }
}

impl EigenSolver for NalgebraEigen {
    fn symmetric_eigen(&self, matrix: &DMatrix<f64>) -> Option<EigenDecomposition> {
        if !matrix.is_square() || matrix.iter().any(|x| !x.is_finite()) {
            return None;
        }
        let eigen = matrix
            .clone()
            .try_symmetric_eigen(self.epsilon, self.max_iterations)?;

        let n = eigen.eigenvalues.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| eigen.eigenvalues[i].total_cmp(&eigen.eigenvalues[j]));

        let eigenvalues = DVector::from_iterator(n, order.iter().map(|&i| eigen.eigenvalues[i]));
        let eigenvectors = DMatrix::from_columns(
            &order
                .iter()
                .map(|&i| eigen.eigenvectors.column(i).normalize())
                .collect::<Vec<_>>(),
        );
        if eigenvectors.iter().any(|x| !x.is_finite()) {
            return None;
        }
        Some(EigenDecomposition {
            eigenvalues,
            eigenvectors,
        })
    }

    fn real_eigen(&self, matrix: &DMatrix<f64>) -> Option<Vec<RealEigenpair>> {
        if !matrix.is_square() || matrix.iter().any(|x| !x.is_finite()) {
            return None;
        }
        let n = matrix.nrows();
        let schur = Schur::try_new(matrix.clone(), self.epsilon, self.max_iterations)?;

        let mut pairs = Vec::new();
        for value in schur.complex_eigenvalues().iter() {
            if value.im.abs() > self.imaginary_tolerance * (1.0 + value.re.abs()) {
                continue;
            }
            // Eigenvector: right singular vector of the smallest singular value.
            let shifted = matrix - DMatrix::identity(n, n) * value.re;
            let svd = shifted.try_svd(false, true, self.epsilon, self.max_iterations)?;
            let smallest = svd
                .singular_values
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)?;
            let v_t = svd.v_t?;
            let vector = v_t.row(smallest).transpose().normalize();
            if vector.iter().all(|x| x.is_finite()) {
                pairs.push(RealEigenpair {
                    value: value.re,
                    vector,
                });
            }
        }
        pairs.sort_by(|a, b| a.value.total_cmp(&b.value));
        Some(pairs)
    }
}

// Tests #######################################################################

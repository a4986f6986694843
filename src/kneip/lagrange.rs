// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Closed-form enumeration of the stationary points of the homogeneous cost
//! $F(q) = \bm{\hat{q}^T M \hat{q}}$ on the unit sphere.
//!
//! The Lagrange conditions $\nabla F(q) = 2 \mu q$ say that $q$ and $\nabla F(q)$
//! are parallel, i.e. that all the $2 \times 2$ minors
//! $q_i \ \partial_j F - q_j \ \partial_i F$ vanish. These are six quartic forms
//! whose common zeros are, for a generic cost, 40 points of the projective
//! space, each standing for a pair $\pm q$.
//!
//! From degree 7 on, the quotient by these forms has dimension 40, so the null
//! space of the Macaulay matrix of degree 8 is spanned by the monomial vectors
//! of degree 8 evaluated at the roots. Multiplying by the coordinates maps it
//! to degree 7. Dividing by a fixed linear form gives 40 x 40 multiplication
//! matrices sharing their eigenvectors, one per coordinate. The real
//! eigenvectors of the action matrix, a fixed combination of them, give the
//! real roots through their Rayleigh quotients.

use super::eigen::EigenSolver;
use super::Mat10;
use nalgebra::{DMatrix, Vector4};
use std::collections::HashMap;

type Vec4 = Vector4<f64>;
type Exponents = [u8; 4];
type Polynomial = HashMap<Exponents, f64>;

/// Number of stationary points of a generic quartic form on the 3-sphere,
/// counting $q$ and $-q$ once.
pub const ROOT_COUNT: usize = 40;

const MACAULAY_DEGREE: u8 = 8;

const SVD_ITERATIONS: usize = 10_000;

/// Linear form dividing the multiplication matrices. Must not vanish on a root.
const DIVISOR: [f64; 4] = [0.5377, 1.8339, -2.2588, 0.8622];

/// Combination of the multiplication matrices whose eigenvectors are computed.
const ACTION: [f64; 4] = [0.3188, -1.3077, -0.4336, 0.3426];

/// Exponents of the entries of the monomial vector.
const MONOMIAL_EXPONENTS: [Exponents; 10] = [
    [2, 0, 0, 0],
    [0, 2, 0, 0],
    [0, 0, 2, 0],
    [0, 0, 0, 2],
    [1, 1, 0, 0],
    [1, 0, 1, 0],
    [1, 0, 0, 1],
    [0, 1, 1, 0],
    [0, 1, 0, 1],
    [0, 0, 1, 1],
];

/// Monomials of a given degree in the four quaternion components.
struct Basis {
    monomials: Vec<Exponents>,
    index: HashMap<Exponents, usize>,
}

impl Basis {
    fn new(degree: u8) -> Self {
        let mut monomials = Vec::new();
        for a in (0..=degree).rev() {
            for b in (0..=degree - a).rev() {
                for c in (0..=degree - a - b).rev() {
                    monomials.push([a, b, c, degree - a - b - c]);
                }
            }
        }
        let index = monomials.iter().enumerate().map(|(i, &e)| (e, i)).collect();
        Self { monomials, index }
    }

    fn len(&self) -> usize {
        self.monomials.len()
    }

    fn position(&self, exponents: &Exponents) -> Option<usize> {
        self.index.get(exponents).copied()
    }
}

/// Return one unit quaternion, of arbitrary sign, per real stationary point of
/// $F$ on the unit sphere. The cost `m` should be scaled to unit norm.
///
/// The points are accurate to the conditioning of the action matrix and are
/// meant to be polished. Cost forms with infinitely many stationary points
/// give arbitrary directions.
pub fn stationary_directions<E: EigenSolver>(
    m: &Mat10,
    rank_tolerance: f64,
    eigen: &E,
) -> Vec<Vec4> {
    let columns = Basis::new(MACAULAY_DEGREE);
    let equations = lagrange_equations(m);
    let macaulay = macaulay_matrix(&equations, &columns);

    let null_space = match null_space(macaulay, rank_tolerance) {
        Some(null_space) => null_space,
        None => {
            log::debug!("SVD of the Macaulay matrix failed");
            return Vec::new();
        }
    };
    let multiplications = match multiplication_matrices(&null_space, &columns, rank_tolerance) {
        Some(multiplications) => multiplications,
        None => {
            log::debug!("shifted null space is rank deficient");
            return Vec::new();
        }
    };

    let action = multiplications
        .iter()
        .zip(ACTION)
        .fold(DMatrix::zeros(null_space.ncols(), null_space.ncols()), |sum, (x, c)| {
            sum + x * c
        });
    let pairs = match eigen.real_eigen(&action) {
        Some(pairs) => pairs,
        None => {
            log::debug!("eigen decomposition of the action matrix failed");
            return Vec::new();
        }
    };

    let directions: Vec<Vec4> = pairs
        .iter()
        .map(|pair| Vec4::from_fn(|i, _| pair.vector.dot(&(&multiplications[i] * &pair.vector))))
        .filter(|z| z.iter().all(|c| c.is_finite()) && z.norm() > 0.0)
        .map(|z| z.normalize())
        .collect();
    log::trace!(
        "{} real roots out of {} eigenvalues",
        directions.len(),
        null_space.ncols()
    );
    directions
}

// Private functions ###########################################################

fn multiply(a: &Exponents, b: &Exponents) -> Exponents {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]]
}

fn shift(exponents: &Exponents, variable: usize) -> Exponents {
    let mut shifted = *exponents;
    shifted[variable] += 1;
    shifted
}

fn quartic_form(m: &Mat10) -> Polynomial {
    let mut form = Polynomial::new();
    for (a, ea) in MONOMIAL_EXPONENTS.iter().enumerate() {
        for (b, eb) in MONOMIAL_EXPONENTS.iter().enumerate() {
            *form.entry(multiply(ea, eb)).or_insert(0.0) += m[(a, b)];
        }
    }
    form
}

fn derivative(polynomial: &Polynomial, variable: usize) -> Polynomial {
    let mut result = Polynomial::new();
    for (exponents, &coefficient) in polynomial {
        if exponents[variable] > 0 {
            let mut lowered = *exponents;
            lowered[variable] -= 1;
            *result.entry(lowered).or_insert(0.0) +=
                coefficient * f64::from(exponents[variable]);
        }
    }
    result
}

/// The minors $q_i \ \partial_j F - q_j \ \partial_i F$ for $i < j$.
fn lagrange_equations(m: &Mat10) -> Vec<Polynomial> {
    let form = quartic_form(m);
    let gradient: Vec<Polynomial> = (0..4).map(|i| derivative(&form, i)).collect();
    let mut equations = Vec::with_capacity(6);
    for i in 0..4 {
        for j in (i + 1)..4 {
            let mut minor = Polynomial::new();
            for (exponents, &coefficient) in &gradient[j] {
                *minor.entry(shift(exponents, i)).or_insert(0.0) += coefficient;
            }
            for (exponents, &coefficient) in &gradient[i] {
                *minor.entry(shift(exponents, j)).or_insert(0.0) -= coefficient;
            }
            equations.push(minor);
        }
    }
    equations
}

/// Every equation times every monomial of the complementary degree,
/// one row each, rows scaled to unit norm.
fn macaulay_matrix(equations: &[Polynomial], columns: &Basis) -> DMatrix<f64> {
    let multipliers = Basis::new(MACAULAY_DEGREE - 4);
    let mut matrix = DMatrix::zeros(equations.len() * multipliers.len(), columns.len());
    for (k, equation) in equations.iter().enumerate() {
        for (l, multiplier) in multipliers.monomials.iter().enumerate() {
            let row = k * multipliers.len() + l;
            for (exponents, &coefficient) in equation {
                if let Some(column) = columns.position(&multiply(exponents, multiplier)) {
                    matrix[(row, column)] += coefficient;
                }
            }
            let norm = matrix.row(row).norm();
            if norm > 0.0 {
                let scaled = matrix.row(row) / norm;
                matrix.set_row(row, &scaled);
            }
        }
    }
    matrix
}

/// Orthonormal basis of the numerical null space, at least `ROOT_COUNT` wide.
fn null_space(matrix: DMatrix<f64>, rank_tolerance: f64) -> Option<DMatrix<f64>> {
    let columns = matrix.ncols();
    let svd = matrix.try_svd(false, true, f64::EPSILON, SVD_ITERATIONS)?;
    let singular_values = svd.singular_values;
    let v_t = svd.v_t?;
    if v_t.nrows() != columns {
        return None;
    }

    let mut order: Vec<usize> = (0..columns).collect();
    order.sort_by(|&i, &j| singular_values[i].total_cmp(&singular_values[j]));
    let threshold = rank_tolerance * singular_values.max();
    let rank_deficiency = singular_values.iter().filter(|&&s| s <= threshold).count();
    let nullity = rank_deficiency.max(ROOT_COUNT).min(columns);

    Some(DMatrix::from_fn(columns, nullity, |r, c| v_t[(order[c], r)]))
}

/// Multiplication matrices $\bm{X_i}$ such that $\bm{X_i v} = q_i / h(q) \ \bm{v}$
/// for the eigenvector $\bm{v}$ of each root $q$, $h$ being the divisor.
fn multiplication_matrices(
    null_space: &DMatrix<f64>,
    columns: &Basis,
    rank_tolerance: f64,
) -> Option<Vec<DMatrix<f64>>> {
    let rows = Basis::new(MACAULAY_DEGREE - 1);
    let nullity = null_space.ncols();

    let mut shifted = DMatrix::zeros(rows.len(), 4 * nullity);
    let mut divisor = DMatrix::zeros(rows.len(), nullity);
    for (r, monomial) in rows.monomials.iter().enumerate() {
        for variable in 0..4 {
            let source = columns.position(&shift(monomial, variable))?;
            let row = null_space.row(source);
            shifted
                .view_mut((r, variable * nullity), (1, nullity))
                .copy_from(&row);
            let mut divisor_row = divisor.row_mut(r);
            divisor_row += row * DIVISOR[variable];
        }
    }

    let svd = divisor.try_svd(true, true, f64::EPSILON, SVD_ITERATIONS)?;
    let threshold = rank_tolerance * svd.singular_values.max();
    let solution = svd.solve(&shifted, threshold).ok()?;
    Some(
        (0..4)
            .map(|variable| solution.columns(variable * nullity, nullity).into_owned())
            .collect(),
    )
}

// Tests #######################################################################

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Minimisation of the quadratic cost under the unit quaternion constraint.
//!
//! On the unit sphere, $\bm{e^T \hat{q}} = \lVert q \rVert^2 = 1$
//! with $\bm{e} = (1, 1, 1, 1, 0, \dots, 0)$, so the cost is the homogeneous quartic
//! $F(q) = \bm{\hat{q}^T M \hat{q}}$ with
//! $\bm{M} = \bm{A} + \bm{b e^T} + \bm{e b^T} + \gamma \bm{e e^T}$.
//!
//! The Lagrange system of $\min F(q)$ subject to $\lVert q \rVert = 1$,
//! $\nabla F(q) = 2 \mu q$, is solved in closed form by the action matrix
//! eigen decomposition of [`lagrange`](super::lagrange). Every real root is
//! polished with Newton steps on the same system, and the constrained local
//! minima are the candidate rotations.

use super::cost::{monomials, CostMatrices};
use super::eigen::EigenSolver;
use super::lagrange::stationary_directions;
use super::{Mat10, UpnpParams, Vec10};
use nalgebra::{DMatrix, Matrix4, Matrix5, SMatrix, Vector4, Vector5};

type Mat4 = Matrix4<f64>;
type Vec4 = Vector4<f64>;
type Mat10x4 = SMatrix<f64, 10, 4>;

/// Quaternion indices of the cross monomials, in monomial vector order (offset by 4).
const PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Candidates closer than this (in `1 - |q1.q2|`) are the same rotation.
const DUPLICATE_TOLERANCE: f64 = 1e-9;

/// Return the unit quaternions `[w, x, y, z]` that are constrained local minima
/// of the cost, with `w >= 0`, sorted by increasing cost.
/// An empty vector means no admissible solution.
pub fn solve_quaternions<E: EigenSolver>(
    cost: &CostMatrices,
    params: &UpnpParams,
    eigen: &E,
) -> Vec<Vec4> {
    let m = homogenize(cost);
    let norm = m.norm();
    if !norm.is_finite() || norm == 0.0 {
        log::debug!("cost form is zero or not finite, no isolated minimum");
        return Vec::new();
    }
    let scale = 1.0 + norm;

    let roots = stationary_directions(&(m / norm), params.rank_tolerance, eigen);
    let mut quaternions: Vec<Vec4> = Vec::new();
    for (k, root) in roots.iter().enumerate() {
        let q = refine(&m, *root, params, scale);
        if q.iter().any(|c| !c.is_finite()) {
            log::trace!("root {} is not finite", k);
            continue;
        }
        if !is_stationary(&m, &q, params.stationarity_tolerance * scale) {
            log::trace!("root {} did not converge", k);
            continue;
        }
        if !is_local_minimum(&m, &q, params.curvature_tolerance * scale, eigen) {
            log::trace!("root {} is not a constrained minimum", k);
            continue;
        }

        let q = if q[0] < 0.0 { -q } else { q };
        let duplicate = quaternions
            .iter()
            .any(|other| other.dot(&q).abs() > 1.0 - DUPLICATE_TOLERANCE);
        if !duplicate {
            quaternions.push(q);
        }
    }
    quaternions.sort_by(|a, b| quartic(&m, a).total_cmp(&quartic(&m, b)));
    quaternions
}

/// Homogeneous quartic form $\bm{M}$ of the cost.
pub fn homogenize(cost: &CostMatrices) -> Mat10 {
    let e = Vec10::from_fn(|i, _| if i < 4 { 1.0 } else { 0.0 });
    cost.a + cost.b * e.transpose() + e * cost.b.transpose() + e * e.transpose() * cost.gamma
}

/// Fold a monomial vector into the symmetric 4x4 matrix it represents.
/// For exact monomials of $q$, this is $\bm{q q^T}$.
fn quaternion_outer(q_hat: &Vec10) -> Mat4 {
    let mut outer = Mat4::zeros();
    for i in 0..4 {
        outer[(i, i)] = q_hat[i];
    }
    for (k, &(i, j)) in PAIRS.iter().enumerate() {
        outer[(i, j)] = q_hat[4 + k];
        outer[(j, i)] = q_hat[4 + k];
    }
    outer
}

fn hat(q: &Vec4) -> Vec10 {
    monomials(&[q[0], q[1], q[2], q[3]])
}

/// Jacobian of the monomial vector with respect to the quaternion.
fn monomial_jacobian(q: &Vec4) -> Mat10x4 {
    let mut jacobian = Mat10x4::zeros();
    for i in 0..4 {
        jacobian[(i, i)] = 2.0 * q[i];
    }
    for (k, &(i, j)) in PAIRS.iter().enumerate() {
        jacobian[(4 + k, i)] = q[j];
        jacobian[(4 + k, j)] = q[i];
    }
    jacobian
}

fn quartic(m: &Mat10, q: &Vec4) -> f64 {
    let q_hat = hat(q);
    q_hat.dot(&(m * q_hat))
}

fn gradient(m: &Mat10, q: &Vec4) -> Vec4 {
    2.0 * monomial_jacobian(q).transpose() * (m * hat(q))
}

fn hessian(m: &Mat10, q: &Vec4) -> Mat4 {
    let jacobian = monomial_jacobian(q);
    // Second derivatives of the monomials weighted by M q_hat.
    let mut curvature = quaternion_outer(&(m * hat(q)));
    for i in 0..4 {
        curvature[(i, i)] *= 2.0;
    }
    2.0 * (jacobian.transpose() * m * jacobian + curvature)
}

/// Residual of the Lagrange system, the multiplier being `mu`.
fn lagrange_residual(m: &Mat10, q: &Vec4, mu: f64) -> Vector5<f64> {
    let g = gradient(m, q) - 2.0 * mu * q;
    Vector5::new(g[0], g[1], g[2], g[3], q.norm_squared() - 1.0)
}

/// Newton iterations on the Lagrange system.
/// A step is only taken if it reduces the residual.
fn refine(m: &Mat10, seed: Vec4, params: &UpnpParams, scale: f64) -> Vec4 {
    let mut q = seed.normalize();
    // Euler's identity for quartic forms: q.grad(F) = 4 F.
    let mut mu = 2.0 * quartic(m, &q);
    let mut res = lagrange_residual(m, &q, mu);
    for _ in 0..params.refine_iterations {
        if res.norm() <= params.refine_tolerance * scale {
            break;
        }

        let mut jacobian = Matrix5::zeros();
        jacobian
            .fixed_view_mut::<4, 4>(0, 0)
            .copy_from(&(hessian(m, &q) - Mat4::identity() * (2.0 * mu)));
        jacobian
            .fixed_view_mut::<4, 1>(0, 4)
            .copy_from(&(-2.0 * q));
        jacobian
            .fixed_view_mut::<1, 4>(4, 0)
            .copy_from(&(2.0 * q.transpose()));
        let step = match jacobian.lu().solve(&res) {
            Some(step) => step,
            None => break,
        };

        let q_new = q - step.fixed_rows::<4>(0);
        let mu_new = mu - step[4];
        let res_new = lagrange_residual(m, &q_new, mu_new);
        // Also stops on NaN.
        if !(res_new.norm() < res.norm()) {
            break;
        }
        q = q_new;
        mu = mu_new;
        res = res_new;
    }
    q.normalize()
}

/// First order condition: the gradient is parallel to `q` within `tolerance`.
fn is_stationary(m: &Mat10, q: &Vec4, tolerance: f64) -> bool {
    let g = gradient(m, q);
    (g - q * q.dot(&g)).norm() <= tolerance
}

/// Second order condition: the Hessian of the Lagrangian restricted to the
/// tangent space of the unit sphere is positive semi-definite.
fn is_local_minimum<E: EigenSolver>(m: &Mat10, q: &Vec4, tolerance: f64, eigen: &E) -> bool {
    let mu = 2.0 * quartic(m, q);
    let lagrangian = hessian(m, q) - Mat4::identity() * (2.0 * mu);
    let projector = Mat4::identity() - q * q.transpose();
    let tangent = projector * lagrangian * projector;
    let tangent = (tangent + tangent.transpose()) * 0.5;
    match eigen.symmetric_eigen(&to_dmatrix(&tangent)) {
        Some(decomposition) => decomposition.eigenvalues[0] >= -tolerance,
        None => false,
    }
}

fn to_dmatrix<const N: usize>(m: &SMatrix<f64, N, N>) -> DMatrix<f64> {
    DMatrix::from_column_slice(N, N, m.as_slice())
}

// Tests #######################################################################

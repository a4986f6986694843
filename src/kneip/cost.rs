// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Algebraic stages turning correspondences into the quadratic cost
//! $\bm{\hat{q}^T A \hat{q}} + 2 \bm{b^T \hat{q}} + \gamma$
//! over the quaternion monomial vector.
//!
//! The monomial vector is always
//! $\bm{\hat{q}} = (q_0^2, q_1^2, q_2^2, q_3^2, q_0 q_1, q_0 q_2, q_0 q_3, q_1 q_2, q_1 q_3, q_2 q_3)$
//! where $q_0$ is the real part of the quaternion.

use super::{Mat3, Mat3x10, Mat10, Vec10, Vec3};
use nalgebra::Point3;

/// Coefficients of the pose cost as a quadratic form in the monomial vector.
#[derive(Debug, Clone, PartialEq)]
pub struct CostMatrices {
    /// Symmetric positive semi-definite quadratic term.
    pub a: Mat10,
    /// Linear term.
    pub b: Vec10,
    /// Constant term, always non-negative.
    pub gamma: f64,
}

impl CostMatrices {
    /// Evaluate the cost for a monomial vector.
    pub fn evaluate(&self, monomials: &Vec10) -> f64 {
        monomials.dot(&(self.a * monomials)) + 2.0 * self.b.dot(monomials) + self.gamma
    }
}

/// Compute the H matrix and the outer products of the ray directions.
///
/// H is the inverse of $N \bm{I} - \sum_i \bm{d_i d_i^T}$.
/// Return `None` when that matrix is singular, which happens when all
/// directions are parallel or when there are fewer than two rays.
/// Singularity is judged on $\det(\bm{H^{-1}}) / N^3$ so that directions
/// which are only numerically parallel are also rejected.
pub fn aggregate_directions(directions: &[Vec3], tolerance: f64) -> Option<(Mat3, Vec<Mat3>)> {
    let mut outer_products = Vec::with_capacity(directions.len());
    let mut h_inverse = Mat3::identity() * directions.len() as f64;
    for d in directions {
        let outer = d * d.transpose();
        h_inverse -= outer;
        outer_products.push(outer);
    }

    let n = directions.len() as f64;
    let determinant = h_inverse.determinant();
    if directions.is_empty() || !determinant.is_finite() || determinant / (n * n * n) <= tolerance {
        return None;
    }
    h_inverse
        .try_inverse()
        .map(|h_matrix| (h_matrix, outer_products))
}

/// Left multiplication matrix $\bm{\Phi(p)}$ such that
/// $\bm{\Phi(p) \hat{q}} = \bm{R(q) \ p}$ for any unit quaternion $q$.
#[rustfmt::skip]
pub fn left_multiply(point: &Point3<f64>) -> Mat3x10 {
    let (x, y, z) = (point.x, point.y, point.z);
    Mat3x10::from_row_slice(&[
        x,  x, -x, -x,  0.0,       2.0 * z,  -2.0 * y, 2.0 * y, 2.0 * z, 0.0,
        y, -y,  y, -y, -2.0 * z,   0.0,       2.0 * x, 2.0 * x, 0.0,     2.0 * z,
        z, -z, -z,  z,  2.0 * y,  -2.0 * x,   0.0,     0.0,     2.0 * x, 2.0 * y,
    ])
}

/// Compute the helper matrices G and J.
///
/// With $\bm{V_i} = \bm{H (d_i d_i^T - I)}$, they are
/// $\bm{G} = \sum_i \bm{V_i \Phi(p_i)}$ and $\bm{J} = \sum_i \bm{V_i o_i}$.
/// The optimal translation for a rotation is then $\bm{t} = \bm{G \hat{q}} - \bm{J}$.
pub fn helper_matrices(
    world_points: &[Point3<f64>],
    ray_origins: &[Point3<f64>],
    outer_products: &[Mat3],
    h_matrix: &Mat3,
) -> (Mat3x10, Vec3) {
    let mut g_matrix = Mat3x10::zeros();
    let mut j_vector = Vec3::zeros();
    for ((point, origin), outer) in world_points.iter().zip(ray_origins).zip(outer_products) {
        let v_matrix = h_matrix * (outer - Mat3::identity());
        g_matrix += v_matrix * left_multiply(point);
        j_vector += v_matrix * origin.coords;
    }
    (g_matrix, j_vector)
}

/// Accumulate the per-correspondence blocks of the cost:
/// $\bm{A} = \sum_i \bm{A_i^T A_i}$, $\bm{b} = \sum_i \bm{A_i^T b_i}$
/// and $\gamma = \sum_i \bm{b_i^T b_i}$.
pub fn cost_matrices(
    world_points: &[Point3<f64>],
    ray_origins: &[Point3<f64>],
    outer_products: &[Mat3],
    g_matrix: &Mat3x10,
    j_vector: &Vec3,
) -> CostMatrices {
    let mut a = Mat10::zeros();
    let mut b = Vec10::zeros();
    let mut gamma = 0.0;
    for ((point, origin), outer) in world_points.iter().zip(ray_origins).zip(outer_products) {
        let outer_minus_identity = outer - Mat3::identity();
        let temp_a = outer_minus_identity * (left_multiply(point) + g_matrix);
        let temp_b = -outer_minus_identity * (origin.coords + j_vector);
        a += temp_a.transpose() * temp_a;
        b += temp_a.transpose() * temp_b;
        gamma += temp_b.norm_squared();
    }
    CostMatrices { a, b, gamma }
}

/// Monomial vector of a quaternion given as `[w, x, y, z]`.
#[rustfmt::skip]
pub fn monomials(q: &[f64; 4]) -> Vec10 {
    let [q0, q1, q2, q3] = *q;
    Vec10::from_column_slice(&[
        q0 * q0, q1 * q1, q2 * q2, q3 * q3,
        q0 * q1, q0 * q2, q0 * q3,
        q1 * q2, q1 * q3,
        q2 * q3,
    ])
}

// Tests #######################################################################

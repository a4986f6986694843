// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Implementation based on
//! "UPnP: An Optimal O(n) Solution to the Absolute Pose Problem with Universal Applicability"
//! Kneip, L., Li, H. and Seo, Y. ECCV 2014.
//!
//! The pose is found in five stages:
//!
//!  1. aggregate the ray directions into the matrix $\bm{H}$,
//!  2. build the helper matrices $\bm{G}$ and $\bm{J}$ expressing the translation
//!     as a linear function of the quaternion monomials,
//!  3. assemble the quadratic cost $(\bm{A}, \bm{b}, \gamma)$,
//!  4. minimise it under the unit quaternion constraint, enumerating the roots
//!     of its Lagrange system with an action matrix (see [`quadratic`] and [`lagrange`]),
//!  5. recover the translation of every candidate rotation.

pub mod cost;
pub mod eigen;
pub mod lagrange;
pub mod quadratic;

#[cfg(feature = "consensus")]
pub mod consensus;

use self::cost::{aggregate_directions, cost_matrices, helper_matrices, monomials};
use self::eigen::{EigenSolver, NalgebraEigen};
use nalgebra::{
    Isometry3, Matrix3, Point3, Quaternion, SMatrix, SVector, Translation, UnitQuaternion,
    Vector3, Vector4,
};
use thiserror::Error;

type Iso3 = Isometry3<f64>;
type Mat3 = Matrix3<f64>;
type Vec3 = Vector3<f64>;
type Mat3x10 = SMatrix<f64, 3, 10>;
type Mat10 = SMatrix<f64, 10, 10>;
type Vec10 = SVector<f64, 10>;

/// Ray of a generalized camera.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    /// Origin of the ray, in the camera (rig) frame.
    pub origin: Point3<f64>,
    /// Direction of the ray. It must have unit norm, it is never renormalized.
    pub direction: Vec3,
}

/// One 2D-3D correspondence: a ray and the world point it observes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sample {
    /// Observation ray.
    pub ray: Ray,
    /// Observed point in world coordinates.
    pub world: Point3<f64>,
}

/// Pose of a generalized camera, returned by the `upnp` function.
/// It is the rotation and translation pair satisfying the equation:
/// $$
/// \bm{o_i} + \lambda_i \ \bm{d_i} = \bm{R \ x_i} + \bm{t}
/// $$
///
/// - $\bm{x_i}$ are the 3D point world coordinates.
/// - $\bm{o_i}$ and $\bm{d_i}$ are the origin and unit direction of the observation rays,
///   expressed in the camera (rig) frame.
/// - $\lambda_i$ are the signed distances along the rays.
///
/// For a pinhole camera all origins are zero and this is the usual PnP pose.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pose {
    /// Rotation, with a non-negative real part.
    pub rotation: UnitQuaternion<f64>,
    /// Translation.
    pub translation: Vec3,
}

impl Pose {
    /// Convert from nalgebra Isometry3 type.
    pub fn from_iso3(iso3: Iso3) -> Self {
        Self {
            rotation: iso3.rotation,
            translation: iso3.translation.vector,
        }
    }

    /// Convert to nalgebra Isometry3 type.
    pub fn to_iso3(&self) -> Iso3 {
        Iso3::from_parts(Translation::from(self.translation), self.rotation)
    }

    /// Squared distance between the transformed world point and the observation ray.
    pub fn error(&self, sample: &Sample) -> f64 {
        let d = sample.ray.direction;
        let v = self.rotation * sample.world.coords + self.translation - sample.ray.origin.coords;
        (v - d * d.dot(&v)).norm_squared()
    }

    /// Sum of the squared ray-to-point distances, the cost minimised by the solver.
    pub fn cost(&self, samples: &[Sample]) -> f64 {
        samples.iter().map(|s| self.error(s)).sum()
    }
}

/// Error raised when the inputs of the solver break its contract.
#[derive(Debug, Error, PartialEq)]
pub enum UpnpError {
    /// Input sequences of different lengths.
    #[error("mismatched array lengths: {left_name} ({left_len}) != {right_name} ({right_len})")]
    MismatchedLengths {
        /// Label of the left-hand slice.
        left_name: &'static str,
        /// Length of the left-hand slice.
        left_len: usize,
        /// Label of the right-hand slice.
        right_name: &'static str,
        /// Length of the right-hand slice.
        right_len: usize,
    },
}

/// Parameters of the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct UpnpParams {
    /// Ray directions are considered degenerate when
    /// $\det(N \bm{I} - \sum_i \bm{d_i d_i^T}) / N^3$ is below this value.
    pub degeneracy_tolerance: f64,
    /// Singular values below this value, relative to the largest one, are zero
    /// when computing the null space of the Lagrange system.
    pub rank_tolerance: f64,
    /// Maximum number of Newton iterations per candidate.
    pub refine_iterations: usize,
    /// Newton iterations stop when the Lagrange residual is below this value,
    /// relative to the magnitude of the cost.
    pub refine_tolerance: f64,
    /// Tangent gradient tolerated when checking that a candidate is stationary,
    /// relative to the magnitude of the cost.
    pub stationarity_tolerance: f64,
    /// Negative curvature tolerated when checking that a candidate is a minimum,
    /// relative to the magnitude of the cost.
    pub curvature_tolerance: f64,
}

impl Default for UpnpParams {
    fn default() -> Self {
        Self {
            degeneracy_tolerance: 1e-10,
            rank_tolerance: 1e-10,
            refine_iterations: 10,
            refine_tolerance: 1e-14,
            stationarity_tolerance: 1e-8,
            curvature_tolerance: 1e-8,
        }
    }
}

/// UPnP solver with its parameters and eigen decomposition backend.
#[derive(Debug, Clone, Default)]
pub struct UpnpSolver<E = NalgebraEigen> {
    /// Solver parameters.
    pub params: UpnpParams,
    /// Eigen decomposition used by the constrained quadratic solver.
    pub eigen: E,
}

impl<E: EigenSolver> UpnpSolver<E> {
    /// Create a solver.
    pub fn new(params: UpnpParams, eigen: E) -> Self {
        Self { params, eigen }
    }

    /// Return the candidate poses for the given correspondences,
    /// see [`upnp`].
    pub fn solve(
        &self,
        ray_origins: &[Point3<f64>],
        ray_directions: &[Vec3],
        world_points: &[Point3<f64>],
    ) -> Result<Vec<Pose>, UpnpError> {
        check_lengths(
            "ray origins",
            ray_origins.len(),
            "ray directions",
            ray_directions.len(),
        )?;
        check_lengths(
            "ray origins",
            ray_origins.len(),
            "world points",
            world_points.len(),
        )?;
        Ok(self.compute_poses(ray_origins, ray_directions, world_points))
    }

    /// Same as [`UpnpSolver::solve`] with the correspondences given as samples.
    pub fn solve_samples(&self, samples: &[Sample]) -> Vec<Pose> {
        let ray_origins: Vec<Point3<f64>> = samples.iter().map(|s| s.ray.origin).collect();
        let ray_directions: Vec<Vec3> = samples.iter().map(|s| s.ray.direction).collect();
        let world_points: Vec<Point3<f64>> = samples.iter().map(|s| s.world).collect();
        self.compute_poses(&ray_origins, &ray_directions, &world_points)
    }

    fn compute_poses(
        &self,
        ray_origins: &[Point3<f64>],
        ray_directions: &[Vec3],
        world_points: &[Point3<f64>],
    ) -> Vec<Pose> {
        // 1. H matrix and outer products of the ray directions.
        let (h_matrix, outer_products) =
            match aggregate_directions(ray_directions, self.params.degeneracy_tolerance) {
                Some(aggregate) => aggregate,
                None => {
                    log::debug!(
                        "degenerate ray directions, no pose from {} correspondences",
                        ray_directions.len()
                    );
                    return Vec::new();
                }
            };

        // 2. Translation as a linear function of the quaternion monomials.
        let (g_matrix, j_vector) =
            helper_matrices(world_points, ray_origins, &outer_products, &h_matrix);

        // 3. Quadratic cost.
        let cost = cost_matrices(
            world_points,
            ray_origins,
            &outer_products,
            &g_matrix,
            &j_vector,
        );

        // 4. Candidate rotations.
        let quaternions = quadratic::solve_quaternions(&cost, &self.params, &self.eigen);

        // 5. Poses.
        let poses: Vec<Pose> = quaternions
            .iter()
            .filter_map(|q| reconstruct_pose(q, &g_matrix, &j_vector))
            .collect();
        log::trace!(
            "{} candidate poses from {} correspondences",
            poses.len(),
            world_points.len()
        );
        poses
    }
}

/// Return 0 or more potential $(\bm{R}, \bm{t})$ solutions to the equations:
/// $$
/// \bm{o_i} + \lambda_i \ \bm{d_i} = \bm{R \ x_i} + \bm{t},\quad i \in \\{1, \dots, N\\}
/// $$
///
/// - $\bm{x_i}$ are the 3D point world coordinates, `world_points[i]`.
/// - $\bm{o_i}$ are the ray origins, `ray_origins[i]`.
/// - $\bm{d_i}$ are the unit ray directions, `ray_directions[i]`.
///
/// The three slices must have the same length, otherwise an error is returned.
/// Degenerate inputs (fewer than two rays, all directions parallel) return
/// no solution. Candidates are sorted by increasing [`Pose::cost`].
pub fn upnp(
    ray_origins: &[Point3<f64>],
    ray_directions: &[Vec3],
    world_points: &[Point3<f64>],
) -> Result<Vec<Pose>, UpnpError> {
    let solver: UpnpSolver = Default::default();
    solver.solve(ray_origins, ray_directions, world_points)
}

// Private functions ###########################################################

fn check_lengths(
    left_name: &'static str,
    left_len: usize,
    right_name: &'static str,
    right_len: usize,
) -> Result<(), UpnpError> {
    if left_len == right_len {
        Ok(())
    } else {
        Err(UpnpError::MismatchedLengths {
            left_name,
            left_len,
            right_name,
            right_len,
        })
    }
}

/// Rotation of a unit quaternion `[w, x, y, z]` and its optimal translation
/// $\bm{t} = \bm{G \hat{q}} - \bm{J}$.
fn reconstruct_pose(q: &Vector4<f64>, g_matrix: &Mat3x10, j_vector: &Vec3) -> Option<Pose> {
    let rotation = UnitQuaternion::from_quaternion(Quaternion::new(q[0], q[1], q[2], q[3]));
    let translation = g_matrix * monomials(&[q[0], q[1], q[2], q[3]]) - j_vector;
    let finite = rotation.coords.iter().all(|c| c.is_finite())
        && translation.iter().all(|c| c.is_finite());
    if finite {
        Some(Pose {
            rotation,
            translation,
        })
    } else {
        None
    }
}

// Tests #######################################################################

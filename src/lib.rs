#![warn(missing_docs)]

//! This package provides functions to solve camera pose estimation
//! given a set of 3D points and the rays observing them.
//!
//! This problem is generally known as ["Perspective-n-Point" (PnP)][pnp].
//! We solve it for generalized cameras, where every observation is a ray
//! with its own origin. This covers pinhole cameras (all origins coincide)
//! as well as multi-camera rigs. The solver is closed-form and accepts
//! any number of correspondences. In this package, we have implemented:
//!
//!  - UPnP: An Optimal O(n) Solution to the Absolute Pose Problem with Universal Applicability.
//!    Laurent Kneip, Hongdong Li, Yongduek Seo. ECCV 2014. ([paper][upnp])
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//!
//! // A pinhole camera at the origin observing points in front of it.
//! let world: Vec<Point3<f64>> = (0..8)
//!     .map(|i| {
//!         let i = i as f64;
//!         Point3::new((1.3 * i).sin(), (0.7 * i).cos(), 4.0 + (2.1 * i).sin())
//!     })
//!     .collect();
//! let origins = vec![Point3::origin(); world.len()];
//! let directions: Vec<Vector3<f64>> = world.iter().map(|p| p.coords.normalize()).collect();
//!
//! let poses = upnp::kneip::upnp(&origins, &directions, &world).unwrap();
//! // Candidates come sorted by cost, the camera here has the identity pose.
//! assert!(poses[0].rotation.angle() < 1e-6);
//! assert!(poses[0].translation.norm() < 1e-6);
//! ```
//!
//! [pnp]: https://en.wikipedia.org/wiki/Perspective-n-Point
//! [upnp]: https://link.springer.com/chapter/10.1007/978-3-319-10593-2_9

pub mod kneip;

pub use crate::kneip::{upnp, Pose, Ray, Sample, UpnpError, UpnpParams, UpnpSolver};

#[cfg(feature = "consensus")]
pub use crate::kneip::consensus::UpnpEstimator;

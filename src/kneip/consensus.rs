use crate::kneip::{Pose, Sample, UpnpSolver};
use sample_consensus::{Estimator, Model};

impl Model<Sample> for Pose {
    fn residual(&self, data: &Sample) -> f64 {
        self.error(data)
    }
}

/// This implements the [`sample_consensus::Estimator`] trait.
///
/// This uses the algorithm from the paper
/// "UPnP: An Optimal O(n) Solution to the Absolute Pose Problem with Universal Applicability"
/// to estimate the potential poses of a generalized camera.
/// Three samples leave finitely many poses, all of them returned.
#[derive(Debug, Clone, Default)]
pub struct UpnpEstimator {
    /// Solver used on every sample set.
    pub solver: UpnpSolver,
}

impl Estimator<Sample> for UpnpEstimator {
    type Model = Pose;
    type ModelIter = Vec<Pose>;
    const MIN_SAMPLES: usize = 3;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = Sample> + Clone,
    {
        let samples: Vec<Sample> = data.collect();
        self.solver.solve_samples(&samples)
    }
}

use linfa::traits::Transformer;
use linfa::ParamGuard;
use linfa_clustering::Dbscan;
use linfa_nn::distance::L2Dist;
use linfa_nn::CommonNearestNeighbour;
use ndarray::{Array1, ArrayView2};
use tracing::debug;

use super::{FitPredict, NOISE};
use crate::config::{DbscanParams, NeighborAlgorithm};
use crate::error::{Error, Result};

/// Density-based clustering backed by `linfa-clustering`.
///
/// The backend has no notion of predicting unseen points: labels are only
/// produced for the data it is fitted on. Noise points are labeled
/// [`NOISE`].
#[derive(Debug)]
pub struct DbscanBackend {
    pub params: DbscanParams,
    labels: Option<Array1<i64>>,
}

impl Default for DbscanBackend {
    fn default() -> Self {
        Self::new(DbscanParams {
            eps: 0.5,
            min_samples: 5,
            algorithm: NeighborAlgorithm::Auto,
            leaf_size: 30,
        })
    }
}

impl DbscanBackend {
    pub fn new(params: DbscanParams) -> Self {
        Self {
            params,
            labels: None,
        }
    }

    /// Labels of the last fit.
    pub fn labels(&self) -> Option<&Array1<i64>> {
        self.labels.as_ref()
    }

    fn neighbor_index(&self) -> CommonNearestNeighbour {
        match self.params.algorithm {
            NeighborAlgorithm::Auto | NeighborAlgorithm::KdTree => CommonNearestNeighbour::KdTree,
            NeighborAlgorithm::BallTree => CommonNearestNeighbour::BallTree,
            NeighborAlgorithm::Brute => CommonNearestNeighbour::LinearSearch,
        }
    }
}

impl FitPredict for DbscanBackend {
    fn fit_predict(&mut self, input: ArrayView2<f64>) -> Result<Array1<i64>> {
        // linfa rejects a threshold of one; with two, the only points that
        // differ from a threshold of one are isolated ones, which are noise
        // there but singleton clusters here.
        let min_points = self.params.min_samples.max(2);
        debug!(
            eps = self.params.eps,
            min_samples = self.params.min_samples,
            algorithm = ?self.params.algorithm,
            leaf_size = self.params.leaf_size,
            "fitting dbscan"
        );

        let memberships: Array1<Option<usize>> =
            Dbscan::params_with(min_points, L2Dist, self.neighbor_index())
                .tolerance(self.params.eps)
                .check()
                .map_err(|e| Error::Backend(e.to_string()))?
                .transform(&input);

        let mut labels: Array1<i64> = memberships.mapv(|m| m.map_or(NOISE, |c| c as i64));
        if self.params.min_samples == 1 {
            let mut next = labels.iter().max().map_or(0, |&l| l + 1);
            for label in labels.iter_mut().filter(|l| **l == NOISE) {
                *label = next;
                next += 1;
            }
        }
        self.labels = Some(labels.clone());
        Ok(labels)
    }
}

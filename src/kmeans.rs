use linfa::traits::{Fit as _, Predict as _};
use linfa::{DatasetBase, ParamGuard};
use linfa_clustering::{KMeans, KMeansInit as LinfaInit};
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, ArrayView2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use tracing::debug;

use super::{Fit, Predict};
use crate::config::{KMeansInit, KMeansParams};
use crate::error::{Error, Result};

/// Centroid-based clustering backed by `linfa-clustering`.
///
/// Fitting and labeling are separate steps; the fitted centroids are kept
/// until the next call to [`Fit::fit`].
#[derive(Debug)]
pub struct KMeansBackend {
    pub params: KMeansParams,
    model: Option<KMeans<f64, L2Dist>>,
}

impl KMeansBackend {
    pub fn new(params: KMeansParams) -> Self {
        Self {
            params,
            model: None,
        }
    }

    /// Centroids of the last fit, one per row.
    pub fn centroids(&self) -> Option<ArrayView2<'_, f64>> {
        self.model.as_ref().map(|m| m.centroids().view())
    }
}

impl Fit for KMeansBackend {
    fn fit(&mut self, input: ArrayView2<f64>) -> Result<()> {
        if input.nrows() < self.params.n_clusters {
            return Err(Error::Backend(format!(
                "{} samples cannot form {} clusters",
                input.nrows(),
                self.params.n_clusters
            )));
        }
        // Negative seeds keep their bit pattern.
        let seed = self
            .params
            .random_state
            .map_or_else(rand::random, |state| state as u64);
        let init = match self.params.init {
            KMeansInit::Random => LinfaInit::Random,
            KMeansInit::KMeansPlusPlus => LinfaInit::KMeansPlusPlus,
        };
        debug!(
            n_clusters = self.params.n_clusters,
            max_iter = self.params.max_iter,
            seed,
            "fitting k-means"
        );

        let dataset = DatasetBase::from(input.to_owned());
        let rng = Xoshiro256Plus::seed_from_u64(seed);
        let model = KMeans::params_with_rng(self.params.n_clusters, rng)
            .max_n_iterations(self.params.max_iter as u64)
            .init_method(init)
            .check()
            .map_err(|e| Error::Backend(e.to_string()))?
            .fit(&dataset)
            .map_err(|e| Error::Backend(e.to_string()))?;
        self.model = Some(model);
        Ok(())
    }
}

impl Predict for KMeansBackend {
    fn predict(&self, input: ArrayView2<f64>) -> Result<Array1<i64>> {
        let model = self.model.as_ref().ok_or(Error::NotFitted)?;
        let labels: Array1<usize> = model.predict(&input);
        Ok(labels.mapv(|l| l as i64))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::aview2;

    fn params(n_clusters: usize) -> KMeansParams {
        KMeansParams {
            n_clusters,
            random_state: Some(0),
            max_iter: 300,
            init: KMeansInit::KMeansPlusPlus,
        }
    }

    #[test]
    fn kmeans() {
        let data = [
            [1.0, 2.0],
            [1.0, 4.0],
            [1.0, 0.0],
            [10.0, 2.0],
            [10.0, 4.0],
            [10.0, 0.0],
        ];
        let mut model = KMeansBackend::new(params(2));
        model.fit(aview2(&data)).unwrap();
        let labels = model.predict(aview2(&data)).unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[3], labels[5]);
        assert_ne!(labels[0], labels[3]);

        let centroids = model.centroids().unwrap();
        assert_eq!(centroids.dim(), (2, 2));
    }

    #[test]
    fn fewer_samples_than_clusters() {
        let data = [[0.0, 1.0], [2.0, 3.0]];
        for init in [KMeansInit::Random, KMeansInit::KMeansPlusPlus] {
            let mut model = KMeansBackend::new(KMeansParams {
                init,
                ..params(5)
            });
            assert!(
                matches!(model.fit(aview2(&data)), Err(Error::Backend(_))),
                "{init:?}"
            );
            assert!(model.centroids().is_none());
        }
    }

    #[test]
    fn negative_seed() {
        let data = [[0.0, 0.0], [0.0, 1.0], [9.0, 0.0], [9.0, 1.0]];
        let mut model = KMeansBackend::new(KMeansParams {
            random_state: Some(-1),
            ..params(2)
        });
        model.fit(aview2(&data)).unwrap();
        let labels = model.predict(aview2(&data)).unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn predict_unfitted() {
        let data = [[1.0, 2.0]];
        let model = KMeansBackend::new(params(1));
        assert!(matches!(
            model.predict(aview2(&data)),
            Err(Error::NotFitted)
        ));
    }
}

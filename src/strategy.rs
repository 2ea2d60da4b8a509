use ndarray::{concatenate, Array1, Axis};

use super::{Dataset, Fit, FitPredict, LabeledDataset, Predict};
use crate::config::{DbscanParams, KMeansParams, MeanShiftParams};
use crate::dbscan::DbscanBackend;
use crate::error::{Error, Result};
use crate::kmeans::KMeansBackend;
use crate::mean_shift::MeanShiftBackend;
use crate::selection::AlgorithmKind;

/// Anything that can label the rows of a [`Dataset`] with cluster ids.
///
/// `cluster_data` returns `data` unchanged when it holds no element at all,
/// without touching the backend. Otherwise the result has the rows of `data`
/// followed by one column with the label of each row.
pub trait ClusterAlgorithm {
    fn cluster_data(&mut self, data: Dataset) -> Result<LabeledDataset>;

    /// The clustering family of the backend this strategy is wired to.
    fn kind(&self) -> AlgorithmKind;
}

/// Adapts a backend with separate fit and predict steps.
#[derive(Debug)]
pub struct KMeans<B = KMeansBackend> {
    pub backend: B,
}

impl<B> KMeans<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl KMeans {
    pub fn with_params(params: KMeansParams) -> Self {
        Self::new(KMeansBackend::new(params))
    }
}

impl<B: Fit + Predict> ClusterAlgorithm for KMeans<B> {
    fn cluster_data(&mut self, data: Dataset) -> Result<LabeledDataset> {
        if data.is_empty() {
            return Ok(data);
        }
        self.backend.fit(data.view())?;
        let labels = self.backend.predict(data.view())?;
        append_labels(data, &labels)
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::KMeans
    }
}

/// Adapts a density-based backend, which only labels what it is fitted on.
#[derive(Debug)]
pub struct Dbscan<B = DbscanBackend> {
    pub backend: B,
}

impl<B> Dbscan<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl Dbscan {
    pub fn with_params(params: DbscanParams) -> Self {
        Self::new(DbscanBackend::new(params))
    }
}

impl<B: FitPredict> ClusterAlgorithm for Dbscan<B> {
    fn cluster_data(&mut self, data: Dataset) -> Result<LabeledDataset> {
        if data.is_empty() {
            return Ok(data);
        }
        let labels = self.backend.fit_predict(data.view())?;
        append_labels(data, &labels)
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Dbscan
    }
}

/// Adapts a mode-seeking backend. Labels come from the fit itself so that
/// points left outside every kernel can stay unassigned.
#[derive(Debug)]
pub struct MeanShift<B = MeanShiftBackend> {
    pub backend: B,
}

impl<B> MeanShift<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl MeanShift {
    pub fn with_params(params: MeanShiftParams) -> Self {
        Self::new(MeanShiftBackend::new(params))
    }
}

impl<B: FitPredict> ClusterAlgorithm for MeanShift<B> {
    fn cluster_data(&mut self, data: Dataset) -> Result<LabeledDataset> {
        if data.is_empty() {
            return Ok(data);
        }
        let labels = self.backend.fit_predict(data.view())?;
        append_labels(data, &labels)
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::MeanShift
    }
}

fn append_labels(data: Dataset, labels: &Array1<i64>) -> Result<LabeledDataset> {
    if labels.len() != data.nrows() {
        return Err(Error::Backend(format!(
            "{} labels for {} rows",
            labels.len(),
            data.nrows()
        )));
    }
    let column = labels.mapv(|l| l as f64).insert_axis(Axis(1));
    concatenate(Axis(1), &[data.view(), column.view()])
        .map_err(|e| Error::Backend(e.to_string()))
}

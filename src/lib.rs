//! Configuration-driven clustering of point-cloud data.
//!
//! A run loads a numeric table, labels every row with one of several
//! interchangeable clustering strategies, and writes the labeled table back
//! to disk. Which strategy, which parameter schema and which output encoder
//! are used is decided from validated configuration alone, in [`compose`].

mod config;
mod dbscan;
mod error;
mod io;
mod kmeans;
mod mean_shift;
mod selection;
mod strategy;

use ndarray::{Array1, Array2, ArrayView2};

pub use config::{
    AlgorithmConfig, ConfigSource, ConfigValidator, DbscanParams, KMeansInit, KMeansParams,
    MeanShiftParams, NeighborAlgorithm, PipelineConfig, Schema,
};
pub use dbscan::DbscanBackend;
pub use error::{Error, Result};
pub use io::{InputHandler, JsonOutput, NumpyOutput, OutputHandler};
pub use kmeans::KMeansBackend;
pub use mean_shift::MeanShiftBackend;
pub use selection::{
    build_algorithm, build_output, compose, AlgorithmKind, OutputFormat, Pipeline, SelectionGraph,
};
pub use strategy::{ClusterAlgorithm, Dbscan, KMeans, MeanShift};

/// Observations in rows, features in columns.
pub type Dataset = Array2<f64>;

/// A [`Dataset`] with one trailing column holding the cluster label of each row.
pub type LabeledDataset = Array2<f64>;

/// Label given to points that belong to no cluster.
pub const NOISE: i64 = -1;

pub trait Fit {
    fn fit(&mut self, input: ArrayView2<f64>) -> Result<()>;
}

pub trait Predict {
    fn predict(&self, input: ArrayView2<f64>) -> Result<Array1<i64>>;
}

/// Backends that label the data they are fitted on in one step and offer no
/// separate prediction.
pub trait FitPredict {
    fn fit_predict(&mut self, input: ArrayView2<f64>) -> Result<Array1<i64>>;
}

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{AlgorithmConfig, ConfigSource, ConfigValidator, PipelineConfig, Schema};
use crate::error::{Error, Result};
use crate::io::{InputHandler, JsonOutput, NumpyOutput, OutputHandler};
use crate::strategy::{ClusterAlgorithm, Dbscan, KMeans, MeanShift};

/// The clustering families a configuration can select with `algorithm_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum AlgorithmKind {
    #[serde(rename = "kmeans")]
    KMeans,
    #[serde(rename = "dbscan")]
    Dbscan,
    #[serde(rename = "mean_shift")]
    MeanShift,
}

impl AlgorithmKind {
    pub const ALL: [Self; 3] = [Self::KMeans, Self::Dbscan, Self::MeanShift];

    /// The `algorithm_type` value, which is also the key of the parameter
    /// block.
    pub fn tag(self) -> &'static str {
        match self {
            Self::KMeans => "kmeans",
            Self::Dbscan => "dbscan",
            Self::MeanShift => "mean_shift",
        }
    }

    pub fn schema(self) -> Schema {
        match self {
            Self::KMeans => Schema::KMeans,
            Self::Dbscan => Schema::Dbscan,
            Self::MeanShift => Schema::MeanShift,
        }
    }
}

impl FromStr for AlgorithmKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| Error::UnsupportedAlgorithm(s.to_string()))
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Encodings `output_data_format` may name. Not every one has an encoder;
/// see [`build_output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Numpy,
    Json,
    Csv,
}

impl OutputFormat {
    pub const ALL: [Self; 3] = [Self::Numpy, Self::Json, Self::Csv];

    pub fn tag(self) -> &'static str {
        match self {
            Self::Numpy => "numpy",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.tag() == s)
            .ok_or_else(|| Error::UnsupportedOutputFormat(s.to_string()))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Constructs the strategy, and the backend it owns, for `config`.
pub fn build_algorithm(config: &AlgorithmConfig) -> Box<dyn ClusterAlgorithm> {
    match config {
        AlgorithmConfig::KMeans(params) => Box::new(KMeans::with_params(params.clone())),
        AlgorithmConfig::Dbscan(params) => Box::new(Dbscan::with_params(params.clone())),
        AlgorithmConfig::MeanShift(params) => Box::new(MeanShift::with_params(params.clone())),
    }
}

/// Constructs the encoder registered for `format`.
///
/// # Errors
///
/// Fails with [`Error::UnsupportedOutputFormat`] for a format that passes
/// validation but has no encoder.
pub fn build_output(format: OutputFormat) -> Result<Box<dyn OutputHandler>> {
    match format {
        OutputFormat::Numpy => Ok(Box::new(NumpyOutput)),
        OutputFormat::Json => Ok(Box::new(JsonOutput)),
        OutputFormat::Csv => Err(Error::UnsupportedOutputFormat(format.to_string())),
    }
}

/// The objects one validated configuration resolves to.
///
/// The strategy is built on first use and the same instance is handed out
/// afterwards; another graph, even from an equal configuration, builds its
/// own.
pub struct SelectionGraph {
    config: PipelineConfig,
    algorithm: Option<Box<dyn ClusterAlgorithm>>,
}

impl SelectionGraph {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            algorithm: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The validator for the parameter block of the selected algorithm.
    pub fn validator(&self) -> ConfigValidator {
        ConfigValidator::new(self.config.algorithm.kind().schema())
    }

    pub fn algorithm(&mut self) -> &mut dyn ClusterAlgorithm {
        let config = &self.config.algorithm;
        self.algorithm
            .get_or_insert_with(|| {
                debug!(algorithm = %config.kind(), "building strategy");
                build_algorithm(config)
            })
            .as_mut()
    }

    pub fn input_handler(&self) -> InputHandler {
        InputHandler::new(&self.config.input_data_path)
    }

    pub fn output_handler(&self) -> Result<Box<dyn OutputHandler>> {
        build_output(self.config.output_data_format)
    }

    pub fn into_pipeline(mut self) -> Result<Pipeline> {
        let output = self.output_handler()?;
        let input = self.input_handler();
        let algorithm = match self.algorithm.take() {
            Some(algorithm) => algorithm,
            None => build_algorithm(&self.config.algorithm),
        };
        Ok(Pipeline {
            algorithm,
            input,
            output,
        })
    }
}

/// A fully wired run: where the data comes from, how it is clustered, and
/// where the result goes.
pub struct Pipeline {
    algorithm: Box<dyn ClusterAlgorithm>,
    input: InputHandler,
    output: Box<dyn OutputHandler>,
}

impl Pipeline {
    pub fn algorithm(&self) -> &dyn ClusterAlgorithm {
        self.algorithm.as_ref()
    }

    pub fn input(&self) -> &InputHandler {
        &self.input
    }

    pub fn output(&self) -> &dyn OutputHandler {
        self.output.as_ref()
    }

    /// Loads the input, clusters it, and writes the result into `out_dir`.
    pub fn run(&mut self, out_dir: &Path) -> Result<PathBuf> {
        info!(input = %self.input.path().display(), "loading data");
        let data = self.input.load_data()?;

        info!(
            rows = data.nrows(),
            features = data.ncols(),
            algorithm = %self.algorithm.kind(),
            "clustering"
        );
        let labeled = self.algorithm.cluster_data(data)?;

        let path = self.output.save_to_file(&labeled, out_dir)?;
        info!(output = %path.display(), "clustered data saved");
        Ok(path)
    }
}

/// Validates `source` and wires the pipeline it describes.
///
/// Nothing is loaded or clustered here, so an invalid configuration never
/// costs any clustering work.
pub fn compose(source: &ConfigSource) -> Result<Pipeline> {
    let config = PipelineConfig::from_source(source)?;
    SelectionGraph::new(config).into_pipeline()
}

use std::path::PathBuf;

use thiserror::Error;

/// Failures of a pipeline run. Every variant is terminal for the run.
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration does not match the general or the algorithm-specific
    /// schema. Which field failed is deliberately not reported.
    #[error("config file is not correct")]
    InvalidConfig,

    #[error("input file does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("unsupported file format: {0} (use .npy or .json)")]
    UnsupportedFormat(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unsupported output format: {0}")]
    UnsupportedOutputFormat(String),

    #[error("input data is not a rectangular numeric table: {0}")]
    InvalidData(String),

    #[error("backend has not been fitted")]
    NotFitted,

    #[error("clustering backend failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to read .npy file: {0}")]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),

    #[error("failed to write .npy file: {0}")]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis};
use ndarray_npy::{read_npy, write_npy, ReadNpyError};
use tracing::debug;

use super::{Dataset, LabeledDataset};
use crate::error::{Error, Result};

/// Loads the dataset to cluster from a `.npy` or `.json` file.
#[derive(Debug, Clone)]
pub struct InputHandler {
    path: PathBuf,
}

impl InputHandler {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    ///
    /// Fails if the file does not exist, if its suffix is neither `.npy` nor
    /// `.json`, or if its content is not a two-dimensional numeric table.
    pub fn load_data(&self) -> Result<Dataset> {
        if !self.path.exists() {
            return Err(Error::MissingInput(self.path.clone()));
        }
        match self.path.extension().and_then(|e| e.to_str()) {
            Some("npy") => load_npy(&self.path),
            Some("json") => load_json(&self.path),
            _ => Err(Error::UnsupportedFormat(self.path.display().to_string())),
        }
    }
}

fn load_npy(path: &Path) -> Result<Dataset> {
    match read_npy::<_, Array2<f64>>(path) {
        Err(ReadNpyError::WrongDescriptor(descr)) => {
            debug!(?descr, "not a float array; reading as integers");
            let ints: Array2<i64> = read_npy(path)?;
            Ok(ints.mapv(|x| x as f64))
        }
        other => Ok(other?),
    }
}

fn load_json(path: &Path) -> Result<Dataset> {
    let rows: Vec<Vec<f64>> = serde_json::from_slice(&fs::read(path)?)?;
    let ncols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(Error::InvalidData(format!(
            "rows of {} have different lengths",
            path.display()
        )));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), ncols), flat)
        .map_err(|e| Error::InvalidData(e.to_string()))
}

/// Persists a labeled dataset under a fixed file name.
pub trait OutputHandler {
    fn file_name(&self) -> &'static str;

    /// Writes `data` to [`file_name`](Self::file_name) inside `dir` and
    /// returns the path written.
    fn save_to_file(&self, data: &LabeledDataset, dir: &Path) -> Result<PathBuf>;
}

/// Binary NumPy array, `clustered_data.npy`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumpyOutput;

impl OutputHandler for NumpyOutput {
    fn file_name(&self) -> &'static str {
        "clustered_data.npy"
    }

    fn save_to_file(&self, data: &LabeledDataset, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        write_npy(&path, data)?;
        Ok(path)
    }
}

/// Nested JSON lists, one per row, `clustered_data.json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonOutput;

impl OutputHandler for JsonOutput {
    fn file_name(&self) -> &'static str {
        "clustered_data.json"
    }

    fn save_to_file(&self, data: &LabeledDataset, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        let rows: Vec<Vec<f64>> = data.axis_iter(Axis(0)).map(|r| r.to_vec()).collect();
        serde_json::to_writer(BufWriter::new(File::create(&path)?), &rows)?;
        Ok(path)
    }
}

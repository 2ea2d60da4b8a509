use std::cmp::Ordering;
use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use petal_neighbors::distance::Euclidean;
use petal_neighbors::BallTree;
use rayon::prelude::*;
use tracing::{debug, warn};

use super::{Fit, FitPredict, Predict, NOISE};
use crate::config::MeanShiftParams;
use crate::error::{Error, Result};

/// Mode-seeking clustering with a flat kernel of radius `bandwidth`.
///
/// Each seed is moved to the mean of the points within `bandwidth` of it
/// until it stops moving; the modes it converges to become cluster
/// centers, and every point is labeled with its nearest center.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use cluster_pipeline::{FitPredict, MeanShiftBackend, MeanShiftParams};
///
/// let points = array![[1., 2.], [1., 4.], [1., 0.], [10., 2.], [10., 4.], [10., 0.]];
/// let mut mean_shift = MeanShiftBackend::new(MeanShiftParams {
///     bandwidth: 3.,
///     seeds: None,
///     bin_seeding: false,
///     min_bin_freq: 1,
///     cluster_all: true,
///     max_iter: 300,
/// });
/// let labels = mean_shift.fit_predict(points.view()).unwrap();
/// assert_eq!(mean_shift.cluster_centers().unwrap().nrows(), 2);
/// assert_eq!(labels[0], labels[2]);
/// assert_ne!(labels[0], labels[3]);
/// ```
#[derive(Debug)]
pub struct MeanShiftBackend {
    pub params: MeanShiftParams,
    cluster_centers: Option<Array2<f64>>,
    labels: Option<Array1<i64>>,
}

impl MeanShiftBackend {
    pub fn new(params: MeanShiftParams) -> Self {
        Self {
            params,
            cluster_centers: None,
            labels: None,
        }
    }

    /// Centers found by the last fit, most populated first.
    pub fn cluster_centers(&self) -> Option<ArrayView2<'_, f64>> {
        self.cluster_centers.as_ref().map(|c| c.view())
    }

    /// Labels of the data of the last fit, honoring `cluster_all`.
    pub fn labels(&self) -> Option<&Array1<i64>> {
        self.labels.as_ref()
    }

    fn seeds(&self, input: &ArrayView2<f64>) -> Result<Array2<f64>> {
        if let Some(seeds) = &self.params.seeds {
            let dim = seeds.first().map_or(input.ncols(), Vec::len);
            if dim != input.ncols() {
                return Err(Error::Backend(format!(
                    "seeds have {} features but the data has {}",
                    dim,
                    input.ncols()
                )));
            }
            let flat: Vec<f64> = seeds.iter().flatten().copied().collect();
            return Array2::from_shape_vec((seeds.len(), dim), flat)
                .map_err(|e| Error::Backend(e.to_string()));
        }
        if self.params.bin_seeding {
            return Ok(bin_seeds(input, self.params.bandwidth, self.params.min_bin_freq));
        }
        Ok(input.to_owned())
    }
}

impl Fit for MeanShiftBackend {
    fn fit(&mut self, input: ArrayView2<f64>) -> Result<()> {
        let bandwidth = self.params.bandwidth;
        let max_iter = self.params.max_iter;
        let seeds = self.seeds(&input)?;
        debug!(
            bandwidth,
            seeds = seeds.nrows(),
            max_iter,
            "fitting mean shift"
        );

        let db = BallTree::euclidean(input).map_err(|e| Error::Backend(e.to_string()))?;
        let starts: Vec<_> = seeds.rows().into_iter().collect();
        let mut modes: Vec<(Array1<f64>, usize)> = starts
            .into_par_iter()
            .filter_map(|seed| shift(seed, &db, &input, bandwidth, max_iter))
            .collect();
        if modes.is_empty() {
            return Err(Error::Backend(format!(
                "no point was within bandwidth={bandwidth} of any seed"
            )));
        }

        modes.sort_unstable_by(|a, b| by_intensity(b, a));
        modes.dedup_by(|a, b| a.0 == b.0);
        let centers = collapse(&modes, bandwidth)?;
        debug!(clusters = centers.nrows(), "mean shift converged");

        let labels = nearest(&centers, &input, bandwidth, self.params.cluster_all)?;
        self.cluster_centers = Some(centers);
        self.labels = Some(labels);
        Ok(())
    }
}

impl Predict for MeanShiftBackend {
    /// Labels each point with its nearest center, however far it is.
    fn predict(&self, input: ArrayView2<f64>) -> Result<Array1<i64>> {
        let centers = self.cluster_centers.as_ref().ok_or(Error::NotFitted)?;
        nearest(centers, &input, self.params.bandwidth, true)
    }
}

impl FitPredict for MeanShiftBackend {
    fn fit_predict(&mut self, input: ArrayView2<f64>) -> Result<Array1<i64>> {
        self.fit(input)?;
        self.labels.clone().ok_or(Error::NotFitted)
    }
}

fn shift(
    seed: ArrayView1<f64>,
    db: &BallTree<f64, Euclidean>,
    input: &ArrayView2<f64>,
    bandwidth: f64,
    max_iter: usize,
) -> Option<(Array1<f64>, usize)> {
    let stop = 1e-3 * bandwidth;
    let mut mean = seed.to_owned();
    let mut iterations = 0;
    loop {
        let within = db.query_radius(&mean, bandwidth);
        if within.is_empty() {
            return None;
        }
        let old = mean;
        mean = input.select(Axis(0), &within).mean_axis(Axis(0))?;
        let moved = (&mean - &old).mapv(|d| d * d).sum().sqrt();
        if moved <= stop || iterations == max_iter {
            return Some((mean, within.len()));
        }
        iterations += 1;
    }
}

fn by_intensity(a: &(Array1<f64>, usize), b: &(Array1<f64>, usize)) -> Ordering {
    a.1.cmp(&b.1).then_with(|| {
        a.0.iter()
            .zip(b.0.iter())
            .map(|(x, y)| x.partial_cmp(y).unwrap_or(Ordering::Equal))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}

/// Drops every mode that lies within `bandwidth` of a more populated one.
fn collapse(modes: &[(Array1<f64>, usize)], bandwidth: f64) -> Result<Array2<f64>> {
    let dim = modes[0].0.len();
    let flat: Vec<f64> = modes.iter().flat_map(|(m, _)| m.iter().copied()).collect();
    let sorted = Array2::from_shape_vec((modes.len(), dim), flat)
        .map_err(|e| Error::Backend(e.to_string()))?;

    let db = BallTree::euclidean(sorted.view()).map_err(|e| Error::Backend(e.to_string()))?;
    let mut unique = vec![true; sorted.nrows()];
    for (i, center) in sorted.rows().into_iter().enumerate() {
        if !unique[i] {
            continue;
        }
        for neighbor in db.query_radius(&center, bandwidth) {
            unique[neighbor] = false;
        }
        unique[i] = true;
    }

    let keep: Vec<usize> = (0..sorted.nrows()).filter(|&i| unique[i]).collect();
    Ok(sorted.select(Axis(0), &keep))
}

fn nearest(
    centers: &Array2<f64>,
    input: &ArrayView2<f64>,
    bandwidth: f64,
    cluster_all: bool,
) -> Result<Array1<i64>> {
    let db = BallTree::euclidean(centers.view()).map_err(|e| Error::Backend(e.to_string()))?;
    Ok(input
        .rows()
        .into_iter()
        .map(|p| {
            let (idx, distance) = db.query_nearest(&p);
            if cluster_all || distance <= bandwidth {
                idx as i64
            } else {
                NOISE
            }
        })
        .collect())
}

/// Centers of the grid cells of size `bandwidth` holding at least
/// `min_bin_freq` points.
fn bin_seeds(input: &ArrayView2<f64>, bandwidth: f64, min_bin_freq: usize) -> Array2<f64> {
    let mut bins: HashMap<Vec<i64>, usize> = HashMap::new();
    for point in input.rows() {
        let bin = point.iter().map(|x| (x / bandwidth).round() as i64).collect();
        *bins.entry(bin).or_insert(0) += 1;
    }

    let mut kept: Vec<Vec<i64>> = bins
        .into_iter()
        .filter(|(_, freq)| *freq >= min_bin_freq)
        .map(|(bin, _)| bin)
        .collect();
    if kept.is_empty() {
        warn!(min_bin_freq, "no bin holds enough points; seeding with every point");
        return input.to_owned();
    }
    if kept.len() == input.nrows() {
        warn!("every point is its own bin; seeding with every point");
        return input.to_owned();
    }
    kept.sort_unstable();

    let dim = input.ncols();
    let mut seeds = Array2::zeros((kept.len(), dim));
    for (mut row, bin) in seeds.rows_mut().into_iter().zip(&kept) {
        for (x, &b) in row.iter_mut().zip(bin) {
            *x = b as f64 * bandwidth;
        }
    }
    seeds
}

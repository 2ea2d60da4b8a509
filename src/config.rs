use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::selection::{AlgorithmKind, OutputFormat};

/// A configuration document as read, before any schema has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSource(Value);

impl ConfigSource {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map(Self).map_err(|e| {
            debug!(reason = %e, "configuration is not valid YAML");
            Error::InvalidConfig
        })
    }

    fn section(&self, key: &str) -> std::result::Result<&Value, String> {
        self.0
            .get(key)
            .ok_or_else(|| format!("missing field `{key}`"))
    }
}

impl From<Value> for ConfigSource {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// The schemas a configuration document can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// The fields every configuration carries, whatever the algorithm.
    General,
    KMeans,
    Dbscan,
    MeanShift,
}

/// Checks a [`ConfigSource`] against one [`Schema`].
///
/// Rejections are reported as [`Error::InvalidConfig`] only; the offending
/// field is logged at debug level and otherwise dropped.
#[derive(Debug, Clone, Copy)]
pub struct ConfigValidator {
    schema: Schema,
}

impl ConfigValidator {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn validate_data(&self, source: &ConfigSource) -> Result<()> {
        let outcome = match self.schema {
            Schema::General => general(source).map(drop),
            Schema::KMeans => parameters(AlgorithmKind::KMeans, source).map(drop),
            Schema::Dbscan => parameters(AlgorithmKind::Dbscan, source).map(drop),
            Schema::MeanShift => parameters(AlgorithmKind::MeanShift, source).map(drop),
        };
        outcome.map_err(|reason| reject(self.schema, &reason))
    }
}

fn reject(schema: Schema, reason: &str) -> Error {
    debug!(?schema, reason, "configuration rejected");
    Error::InvalidConfig
}

#[derive(Debug, Deserialize)]
struct General {
    algorithm_type: AlgorithmKind,
    input_data_path: String,
    output_data_format: OutputFormat,
}

fn general(source: &ConfigSource) -> std::result::Result<General, String> {
    let general: General = decode(&source.0)?;
    if general.input_data_path.is_empty() {
        return Err("`input_data_path` is empty".to_string());
    }
    Ok(general)
}

fn parameters(
    kind: AlgorithmKind,
    source: &ConfigSource,
) -> std::result::Result<AlgorithmConfig, String> {
    let section = source.section(kind.tag())?;
    let config = match kind {
        AlgorithmKind::KMeans => {
            AlgorithmConfig::KMeans(decode::<KMeansParams>(section)?.check()?)
        }
        AlgorithmKind::Dbscan => {
            AlgorithmConfig::Dbscan(decode::<DbscanParams>(section)?.check()?)
        }
        AlgorithmKind::MeanShift => {
            AlgorithmConfig::MeanShift(decode::<MeanShiftParams>(section)?.check()?)
        }
    };
    Ok(config)
}

fn decode<T: DeserializeOwned>(value: &Value) -> std::result::Result<T, String> {
    serde_yaml::from_value(value.clone()).map_err(|e| e.to_string())
}

/// A fully validated run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub input_data_path: PathBuf,
    pub output_data_format: OutputFormat,
    pub algorithm: AlgorithmConfig,
}

impl PipelineConfig {
    /// Validates `source` against the general schema, then against the schema
    /// of the algorithm it names, and builds the typed configuration.
    ///
    /// Accepts exactly what [`ConfigValidator::validate_data`] accepts for
    /// those two schemas; each is decoded once.
    pub fn from_source(source: &ConfigSource) -> Result<Self> {
        let general = general(source).map_err(|reason| reject(Schema::General, &reason))?;

        let kind = general.algorithm_type;
        let algorithm =
            parameters(kind, source).map_err(|reason| reject(kind.schema(), &reason))?;

        Ok(Self {
            input_data_path: PathBuf::from(general.input_data_path),
            output_data_format: general.output_data_format,
            algorithm,
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_source(&ConfigSource::from_path(path)?)
    }
}

/// Parameters of exactly one clustering family, keyed by `algorithm_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum AlgorithmConfig {
    KMeans(KMeansParams),
    Dbscan(DbscanParams),
    MeanShift(MeanShiftParams),
}

impl AlgorithmConfig {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::KMeans(_) => AlgorithmKind::KMeans,
            Self::Dbscan(_) => AlgorithmKind::Dbscan,
            Self::MeanShift(_) => AlgorithmKind::MeanShift,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum KMeansInit {
    #[serde(rename = "random")]
    Random,
    #[serde(rename = "k-means++")]
    KMeansPlusPlus,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KMeansParams {
    /// The number of clusters to form.
    pub n_clusters: usize,
    /// Seed of the centroid initialization; a fresh seed is drawn when absent.
    #[serde(default)]
    pub random_state: Option<i64>,
    pub max_iter: usize,
    pub init: KMeansInit,
}

impl KMeansParams {
    fn check(self) -> std::result::Result<Self, String> {
        if self.n_clusters == 0 {
            return Err("`n_clusters` must be greater than 0".to_string());
        }
        if self.max_iter == 0 {
            return Err("`max_iter` must be greater than 0".to_string());
        }
        Ok(self)
    }
}

/// Index used by the density-based backend to find neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborAlgorithm {
    Auto,
    BallTree,
    KdTree,
    Brute,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DbscanParams {
    /// The radius of a neighborhood.
    pub eps: f64,
    /// The number of points, the point itself included, that make it a core
    /// point.
    pub min_samples: usize,
    pub algorithm: NeighborAlgorithm,
    pub leaf_size: usize,
}

impl DbscanParams {
    fn check(self) -> std::result::Result<Self, String> {
        if !(self.eps.is_finite() && self.eps > 0.) {
            return Err("`eps` must be a positive number".to_string());
        }
        if self.min_samples < 1 {
            return Err("`min_samples` must be at least 1".to_string());
        }
        if self.leaf_size <= 1 {
            return Err("`leaf_size` must be greater than 1".to_string());
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeanShiftParams {
    /// The radius of the flat kernel.
    pub bandwidth: f64,
    /// Starting points of the shifts. `None` lets the backend pick them.
    #[serde(default, deserialize_with = "seeds")]
    pub seeds: Option<Vec<Vec<f64>>>,
    pub bin_seeding: bool,
    pub min_bin_freq: usize,
    /// Whether points outside every kernel still get the nearest label.
    pub cluster_all: bool,
    pub max_iter: usize,
}

impl MeanShiftParams {
    fn check(self) -> std::result::Result<Self, String> {
        if !(self.bandwidth.is_finite() && self.bandwidth > 0.) {
            return Err("`bandwidth` must be a positive number".to_string());
        }
        if self.min_bin_freq < 1 {
            return Err("`min_bin_freq` must be at least 1".to_string());
        }
        if self.max_iter < 1 {
            return Err("`max_iter` must be at least 1".to_string());
        }
        if let Some(seeds) = &self.seeds {
            if let Some(first) = seeds.first() {
                if first.is_empty() || seeds.iter().any(|s| s.len() != first.len()) {
                    return Err("`seeds` must be points of one dimension".to_string());
                }
            }
        }
        Ok(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedsRepr {
    Points(Vec<Vec<f64>>),
    Keyword(SeedsKeyword),
}

#[derive(Deserialize)]
enum SeedsKeyword {
    #[serde(rename = "none")]
    None,
}

/// Accepts a list of points, the string `"none"`, or `null`.
fn seeds<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<Vec<f64>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<SeedsRepr>::deserialize(deserializer)?;
    Ok(match repr {
        Some(SeedsRepr::Points(points)) => Some(points),
        Some(SeedsRepr::Keyword(SeedsKeyword::None)) | None => None,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const KMEANS: &str = "
algorithm_type: kmeans
input_data_path: data.json
output_data_format: numpy
kmeans:
  n_clusters: 2
  random_state: 0
  max_iter: 300
  init: k-means++
";

    const DBSCAN: &str = "
algorithm_type: dbscan
input_data_path: data.npy
output_data_format: json
dbscan:
  eps: 0.5
  min_samples: 5
  algorithm: auto
  leaf_size: 30
";

    const MEAN_SHIFT: &str = "
algorithm_type: mean_shift
input_data_path: data.npy
output_data_format: json
mean_shift:
  bandwidth: 2
  seeds: none
  bin_seeding: false
  min_bin_freq: 1
  cluster_all: true
  max_iter: 300
";

    fn validate(schema: Schema, text: &str) -> Result<()> {
        ConfigValidator::new(schema).validate_data(&ConfigSource::from_yaml(text)?)
    }

    #[test]
    fn general_schema() {
        assert!(validate(Schema::General, KMEANS).is_ok());
        assert!(validate(Schema::General, DBSCAN).is_ok());
        assert!(validate(Schema::General, MEAN_SHIFT).is_ok());

        let unknown = KMEANS.replace("algorithm_type: kmeans", "algorithm_type: optics");
        assert!(matches!(
            validate(Schema::General, &unknown),
            Err(Error::InvalidConfig)
        ));
        let empty_path = KMEANS.replace("data.json", "''");
        assert!(validate(Schema::General, &empty_path).is_err());
        let bad_format = KMEANS.replace("format: numpy", "format: parquet");
        assert!(validate(Schema::General, &bad_format).is_err());
        let missing = KMEANS.replace("input_data_path: data.json", "");
        assert!(validate(Schema::General, &missing).is_err());
    }

    #[test]
    fn general_schema_ignores_parameters() {
        let broken = KMEANS.replace("n_clusters: 2", "n_clusters: -2");
        assert!(validate(Schema::General, &broken).is_ok());
    }

    #[test]
    fn kmeans_n_clusters() {
        assert!(validate(Schema::KMeans, KMEANS).is_ok());
        for bad in ["0", "-1", "2.5", "two"] {
            let text = KMEANS.replace("n_clusters: 2", &format!("n_clusters: {bad}"));
            assert!(
                matches!(validate(Schema::KMeans, &text), Err(Error::InvalidConfig)),
                "n_clusters: {bad}"
            );
        }
    }

    #[test]
    fn kmeans_optional_random_state() {
        let text = KMEANS.replace("  random_state: 0\n", "");
        assert!(validate(Schema::KMeans, &text).is_ok());
        let text = KMEANS.replace("random_state: 0", "random_state: null");
        assert!(validate(Schema::KMeans, &text).is_ok());
        let text = KMEANS.replace("random_state: 0", "random_state: -1");
        assert!(validate(Schema::KMeans, &text).is_ok());
    }

    #[test]
    fn kmeans_init() {
        let text = KMEANS.replace("init: k-means++", "init: random");
        assert!(validate(Schema::KMeans, &text).is_ok());
        let text = KMEANS.replace("init: k-means++", "init: kmeans||");
        assert!(validate(Schema::KMeans, &text).is_err());
        let text = KMEANS.replace("max_iter: 300", "max_iter: 0");
        assert!(validate(Schema::KMeans, &text).is_err());
    }

    #[test]
    fn kmeans_missing_section() {
        assert!(validate(Schema::KMeans, DBSCAN).is_err());
    }

    #[test]
    fn dbscan_ranges() {
        assert!(validate(Schema::Dbscan, DBSCAN).is_ok());
        for (field, bad) in [
            ("eps: 0.5", "eps: 0"),
            ("eps: 0.5", "eps: -0.5"),
            ("min_samples: 5", "min_samples: 0"),
            ("algorithm: auto", "algorithm: cover_tree"),
            ("leaf_size: 30", "leaf_size: 1"),
        ] {
            let text = DBSCAN.replace(field, bad);
            assert!(validate(Schema::Dbscan, &text).is_err(), "{bad}");
        }
        let text = DBSCAN.replace("algorithm: auto", "algorithm: kd_tree");
        assert!(validate(Schema::Dbscan, &text).is_ok());
    }

    #[test]
    fn mean_shift_seeds() {
        assert!(validate(Schema::MeanShift, MEAN_SHIFT).is_ok());
        let source = ConfigSource::from_yaml(MEAN_SHIFT).unwrap();
        let config = PipelineConfig::from_source(&source).unwrap();
        match config.algorithm {
            AlgorithmConfig::MeanShift(params) => assert_eq!(params.seeds, None),
            other => panic!("unexpected {other:?}"),
        }

        let text = MEAN_SHIFT.replace("seeds: none", "seeds: [[1, 2], [10, 2]]");
        let config = PipelineConfig::from_source(&ConfigSource::from_yaml(&text).unwrap()).unwrap();
        match config.algorithm {
            AlgorithmConfig::MeanShift(params) => {
                assert_eq!(params.seeds, Some(vec![vec![1., 2.], vec![10., 2.]]))
            }
            other => panic!("unexpected {other:?}"),
        }

        let text = MEAN_SHIFT.replace("  seeds: none\n", "");
        assert!(validate(Schema::MeanShift, &text).is_ok());
        let text = MEAN_SHIFT.replace("seeds: none", "seeds: some");
        assert!(validate(Schema::MeanShift, &text).is_err());
        let text = MEAN_SHIFT.replace("seeds: none", "seeds: [[1, 2], [3]]");
        assert!(validate(Schema::MeanShift, &text).is_err());
    }

    #[test]
    fn mean_shift_ranges() {
        for (field, bad) in [
            ("bandwidth: 2", "bandwidth: 0"),
            ("min_bin_freq: 1", "min_bin_freq: 0"),
            ("max_iter: 300", "max_iter: 0"),
            ("cluster_all: true", "cluster_all: maybe"),
        ] {
            let text = MEAN_SHIFT.replace(field, bad);
            assert!(validate(Schema::MeanShift, &text).is_err(), "{bad}");
        }
    }

    #[test]
    fn pipeline_config() {
        let config = PipelineConfig::from_source(&ConfigSource::from_yaml(KMEANS).unwrap()).unwrap();
        assert_eq!(config.input_data_path, PathBuf::from("data.json"));
        assert_eq!(config.output_data_format, OutputFormat::Numpy);
        assert_eq!(
            config.algorithm,
            AlgorithmConfig::KMeans(KMeansParams {
                n_clusters: 2,
                random_state: Some(0),
                max_iter: 300,
                init: KMeansInit::KMeansPlusPlus,
            })
        );
    }

    #[test]
    fn pipeline_config_checks_selected_family_only() {
        let text = format!("{DBSCAN}kmeans:\n  n_clusters: 0\n");
        let config = PipelineConfig::from_source(&ConfigSource::from_yaml(&text).unwrap()).unwrap();
        assert_eq!(config.algorithm.kind(), AlgorithmKind::Dbscan);

        let text = DBSCAN.replace("eps: 0.5", "eps: 0");
        assert!(matches!(
            PipelineConfig::from_source(&ConfigSource::from_yaml(&text).unwrap()),
            Err(Error::InvalidConfig)
        ));
    }

    #[test]
    fn pipeline_config_agrees_with_validators() {
        let cases = [
            (KMEANS.to_string(), Schema::KMeans, true),
            (DBSCAN.to_string(), Schema::Dbscan, true),
            (MEAN_SHIFT.to_string(), Schema::MeanShift, true),
            (KMEANS.replace("random_state: 0", "random_state: -1"), Schema::KMeans, true),
            (KMEANS.replace("format: numpy", "format: csv"), Schema::KMeans, true),
            (KMEANS.replace("n_clusters: 2", "n_clusters: 0"), Schema::KMeans, false),
            (KMEANS.replace("format: numpy", "format: parquet"), Schema::KMeans, false),
            (DBSCAN.replace("leaf_size: 30", "leaf_size: 1"), Schema::Dbscan, false),
            (
                MEAN_SHIFT.replace("algorithm_type: mean_shift", "algorithm_type: kmeans"),
                Schema::KMeans,
                false,
            ),
        ];
        for (text, schema, valid) in &cases {
            let source = ConfigSource::from_yaml(text).unwrap();
            let validated = ConfigValidator::new(Schema::General)
                .validate_data(&source)
                .and_then(|()| ConfigValidator::new(*schema).validate_data(&source));
            assert_eq!(validated.is_ok(), *valid, "{text}");
            assert_eq!(PipelineConfig::from_source(&source).is_ok(), *valid, "{text}");
        }
    }

    #[test]
    fn not_yaml() {
        assert!(matches!(
            ConfigSource::from_yaml("algorithm_type: [kmeans"),
            Err(Error::InvalidConfig)
        ));
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::*;
use super::error::ConfigError;

/// Definition of a single strip plane of a detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaneConfig {
    pub name: String,
    pub kind: String,
    /// Active size along the measured axis in mm
    pub size: f32,
    pub connectors: usize,
    /// Declared strip direction; APVs plugged the other way around are reversed
    pub orientation: i32,
}

/// Definition of a tracking detector and its two planes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub name: String,
    pub readout: String,
    #[serde(rename = "type")]
    pub det_type: String,
    /// Distance from the target along the beam in mm
    pub z: f32,
    #[serde(default)]
    pub x_offset: f32,
    #[serde(default)]
    pub y_offset: f32,
    pub planes: Vec<PlaneConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FecConfig {
    pub id: u32,
    pub ip: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApvFlag {
    /// Common mode is computed separately for the two halves of the channel range
    SplitReadout,
    /// The APV is installed but never contributes hits
    Masked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApvConfig {
    pub fec: u32,
    pub adc: u32,
    pub plane: String,
    pub orientation: i32,
    /// Plug position along the plane (connector index)
    pub index: usize,
    #[serde(default = "default_header_level")]
    pub header_level: f32,
    #[serde(default)]
    pub flags: Vec<ApvFlag>,
}

fn default_header_level() -> f32 {
    DEFAULT_HEADER_LEVEL
}

/// Parameters of the per-APV signal processing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApvProcessing {
    pub time_samples: usize,
    pub common_mode_threshold: f32,
    pub zero_suppression_threshold: f32,
    /// Run the per-FEC correction pass on the rayon thread pool
    pub parallel: bool,
}

impl Default for ApvProcessing {
    fn default() -> Self {
        Self {
            time_samples: DEFAULT_TIME_SAMPLES,
            common_mode_threshold: DEFAULT_COMMON_MODE_THRESHOLD,
            zero_suppression_threshold: DEFAULT_ZERO_SUPPRESSION_THRESHOLD,
            parallel: false,
        }
    }
}

/// Parameters of the 1-D strip clustering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub min_cluster_hits: usize,
    pub max_cluster_hits: usize,
    /// Charge swing required on both sides of a valley before a cluster is split
    pub split_threshold: f32,
    pub strip_pitch: f32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_cluster_hits: DEFAULT_MIN_CLUSTER_HITS,
            max_cluster_hits: DEFAULT_MAX_CLUSTER_HITS,
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            strip_pitch: DEFAULT_STRIP_PITCH,
        }
    }
}

/// How X and Y clusters are combined into 2-D clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum XYMatchMode {
    /// Pair the i-th strongest X cluster with the i-th strongest Y cluster
    #[default]
    Normal,
    /// Every X cluster with every Y cluster
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChargeKind {
    #[default]
    Peak,
    Integrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MatchPolicy {
    #[default]
    Closest,
    All,
}

/// Parameters of the 2-D combination and the calorimeter matching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub xy_mode: XYMatchMode,
    pub charge: ChargeKind,
    /// Project every 2-D cluster onto the depth of the second detector
    pub project_to_second: bool,
    pub cut_distance: f32,
    pub policy: MatchPolicy,
    pub resolution: f32,
    pub overlap_factor: f32,
    pub calorimeter_z: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            xy_mode: XYMatchMode::default(),
            charge: ChargeKind::default(),
            project_to_second: false,
            cut_distance: DEFAULT_MATCH_CUT,
            policy: MatchPolicy::default(),
            resolution: DEFAULT_GEM_RESOLUTION,
            overlap_factor: DEFAULT_OVERLAP_FACTOR,
            calorimeter_z: DEFAULT_CALORIMETER_Z,
        }
    }
}

/// Structure representing the full setup. Contains hardware definitions and reconstruction parameters.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub detectors: Vec<DetectorConfig>,
    #[serde(default)]
    pub fecs: Vec<FecConfig>,
    #[serde(default)]
    pub apvs: Vec<ApvConfig>,
    #[serde(default)]
    pub pedestal_path: Option<PathBuf>,
    #[serde(default)]
    pub apv: ApvProcessing,
    #[serde(default)]
    pub clustering: ClusterConfig,
    #[serde(default)]
    pub matching: MatchConfig,
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// A small two-detector setup used as the template for new configuration files
    pub fn template() -> Self {
        let detector = |name: &str, z: f32| DetectorConfig {
            name: name.to_string(),
            readout: String::from("Cartesian"),
            det_type: String::from("PRADGEM"),
            z,
            x_offset: 0.0,
            y_offset: 0.0,
            planes: vec![
                PlaneConfig {
                    name: format!("{name}X"),
                    kind: String::from("X"),
                    size: 550.4,
                    connectors: 12,
                    orientation: 0,
                },
                PlaneConfig {
                    name: format!("{name}Y"),
                    kind: String::from("Y"),
                    size: 1228.8,
                    connectors: 24,
                    orientation: 0,
                },
            ],
        };
        Self {
            detectors: vec![detector("PRadGEM1", 5304.0), detector("PRadGEM2", 5264.0)],
            fecs: vec![FecConfig {
                id: 0,
                ip: String::from("10.0.0.2"),
            }],
            apvs: vec![
                ApvConfig {
                    fec: 0,
                    adc: 0,
                    plane: String::from("PRadGEM1X"),
                    orientation: 0,
                    index: 0,
                    header_level: DEFAULT_HEADER_LEVEL,
                    flags: vec![],
                },
                ApvConfig {
                    fec: 0,
                    adc: 1,
                    plane: String::from("PRadGEM1Y"),
                    orientation: 0,
                    index: 0,
                    header_level: DEFAULT_HEADER_LEVEL,
                    flags: vec![],
                },
            ],
            ..Default::default()
        }
    }

    /// Check the numeric parameters. Hardware references are checked when the system is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.apv.time_samples == 0 {
            return Err(ConfigError::BadParameter(
                "apv.time_samples",
                String::from("must be at least 1"),
            ));
        }
        if self.clustering.min_cluster_hits == 0
            || self.clustering.min_cluster_hits > self.clustering.max_cluster_hits
        {
            return Err(ConfigError::BadParameter(
                "clustering.min_cluster_hits",
                format!(
                    "bounds [{}, {}] are not a valid range",
                    self.clustering.min_cluster_hits, self.clustering.max_cluster_hits
                ),
            ));
        }
        if self.clustering.strip_pitch <= 0.0 {
            return Err(ConfigError::BadParameter(
                "clustering.strip_pitch",
                String::from("must be positive"),
            ));
        }
        if self.matching.cut_distance <= 0.0 {
            return Err(ConfigError::BadParameter(
                "matching.cut_distance",
                String::from("must be positive"),
            ));
        }
        if let Some(det) = self.detectors.iter().find(|d| d.z <= 0.0) {
            return Err(ConfigError::BadParameter(
                "detectors.z",
                format!("detector {} must sit downstream of the target", det.name),
            ));
        }
        if self.matching.project_to_second && self.detectors.len() < 2 {
            return Err(ConfigError::BadParameter(
                "matching.project_to_second",
                String::from("requires at least two detectors"),
            ));
        }
        Ok(())
    }

    pub fn is_split_readout(apv: &ApvConfig) -> bool {
        apv.flags.contains(&ApvFlag::SplitReadout)
    }

    pub fn is_masked(apv: &ApvConfig) -> bool {
        apv.flags.contains(&ApvFlag::Masked)
    }
}

//! Configuration types for the data-preparation tools.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::dataset::DatasetOption;

/// Errors raised when a configuration value is out of range.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("split ratio {name}={value} must lie in [0, 1]")]
    RatioOutOfRange { name: &'static str, value: f64 },

    #[error("train ratio {train} + val ratio {val} exceeds 1")]
    RatiosExceedOne { train: f64, val: f64 },
}

/// Train/val fractions of each folder. Test receives the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    #[serde(default = "default_train_ratio")]
    pub train: f64,

    #[serde(default = "default_val_ratio")]
    pub val: f64,
}

fn default_train_ratio() -> f64 {
    0.6
}

fn default_val_ratio() -> f64 {
    0.2
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: default_train_ratio(),
            val: default_val_ratio(),
        }
    }
}

impl SplitRatios {
    /// Check that both fractions are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("train", self.train), ("val", self.val)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RatioOutOfRange { name, value });
            }
        }
        if self.train + self.val > 1.0 {
            return Err(ConfigError::RatiosExceedOne {
                train: self.train,
                val: self.val,
            });
        }
        Ok(())
    }
}

/// Configuration for the split manifest builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Dataset directory to scan
    #[serde(default = "default_split_root")]
    pub root: PathBuf,

    /// Manifest output path
    #[serde(default = "default_split_output")]
    pub output: PathBuf,

    /// File extension to collect (without the dot)
    #[serde(default = "default_split_extension")]
    pub extension: String,

    /// Shuffle seed; `None` draws from OS entropy
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub ratios: SplitRatios,
}

fn default_split_root() -> PathBuf {
    PathBuf::from("data_process/abc_parsed")
}

fn default_split_output() -> PathBuf {
    PathBuf::from("dataset_split.json")
}

fn default_split_extension() -> String {
    "json".to_string()
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            root: default_split_root(),
            output: default_split_output(),
            extension: default_split_extension(),
            seed: None,
            ratios: SplitRatios::default(),
        }
    }
}

/// Configuration for the shape deduplicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Quantization precision in bits
    #[serde(default = "default_bit")]
    pub bit: u32,

    #[serde(default)]
    pub option: DatasetOption,

    /// Lower bound of the coordinate range mapped to code 0
    #[serde(default = "default_min_range")]
    pub min_range: f64,

    /// Upper bound of the coordinate range mapped to the top code
    #[serde(default = "default_max_range")]
    pub max_range: f64,

    /// Log a progress line every N training IDs
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,

    /// Hash shape files on the rayon pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Directory receiving the output pickle
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Split manifest supplying ABC candidate IDs instead of a directory scan
    #[serde(default)]
    pub split_file: Option<PathBuf>,

    /// DeepCAD split JSON, relative paths resolve against the data root
    #[serde(default = "default_deepcad_split")]
    pub deepcad_split: PathBuf,

    /// Seed for candidate partitioning when IDs come from a directory scan
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub ratios: SplitRatios,
}

fn default_bit() -> u32 {
    6
}

fn default_min_range() -> f64 {
    -1.0
}

fn default_max_range() -> f64 {
    1.0
}

fn default_progress_every() -> usize {
    2000
}

fn default_parallel() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_deepcad_split() -> PathBuf {
    PathBuf::from("train_val_test_split.json")
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            bit: default_bit(),
            option: DatasetOption::default(),
            min_range: default_min_range(),
            max_range: default_max_range(),
            progress_every: default_progress_every(),
            parallel: default_parallel(),
            output_dir: default_output_dir(),
            split_file: None,
            deepcad_split: default_deepcad_split(),
            seed: None,
            ratios: SplitRatios::default(),
        }
    }
}

/// Configuration for the folder flattener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlattenConfig {
    #[serde(default)]
    pub dry_run: bool,
}

/// Top-level configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrepConfig {
    #[serde(default)]
    pub split: SplitConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub flatten: FlattenConfig,
}

impl PrepConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: PrepConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_split_config() {
        let config = SplitConfig::default();
        assert_eq!(config.root, PathBuf::from("data_process/abc_parsed"));
        assert_eq!(config.output, PathBuf::from("dataset_split.json"));
        assert_eq!(config.extension, "json");
        assert_eq!(config.seed, None);
        assert_eq!(config.ratios, SplitRatios { train: 0.6, val: 0.2 });
    }

    #[test]
    fn test_default_dedup_config() {
        let config = PrepConfig::default();
        assert_eq!(config.dedup.bit, 6);
        assert_eq!(config.dedup.option, DatasetOption::Abc);
        assert_eq!(config.dedup.progress_every, 2000);
        assert!(config.dedup.ratios.validate().is_ok());
    }

    #[test]
    fn test_ratio_validation() {
        assert!(SplitRatios { train: 0.8, val: 0.2 }.validate().is_ok());
        assert_eq!(
            SplitRatios { train: 1.5, val: 0.0 }.validate(),
            Err(ConfigError::RatioOutOfRange { name: "train", value: 1.5 })
        );
        assert!(matches!(
            SplitRatios { train: 0.7, val: 0.4 }.validate(),
            Err(ConfigError::RatiosExceedOne { .. })
        ));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "split:\n  seed: 7\ndedup:\n  option: furniture\n  bit: 4\n";
        let config: PrepConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.split.seed, Some(7));
        assert_eq!(config.split.extension, "json");
        assert_eq!(config.dedup.option, DatasetOption::Furniture);
        assert_eq!(config.dedup.bit, 4);
        assert_eq!(config.dedup.max_range, 1.0);
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prep.yaml");

        let mut config = PrepConfig::default();
        config.split.seed = Some(42);
        config.dedup.option = DatasetOption::DeepCad;
        config.to_yaml(&path).unwrap();

        let loaded = PrepConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.split.seed, Some(42));
        assert_eq!(loaded.dedup.option, DatasetOption::DeepCad);
    }
}

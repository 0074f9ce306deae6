//! Dataset variants and their on-disk layout.

use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Number of leading ID characters naming the shard folder of ABC/DeepCAD records.
pub const SHARD_PREFIX_LEN: usize = 4;

/// Dataset variant selected with `--option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatasetOption {
    #[default]
    #[value(name = "abc")]
    Abc,
    #[value(name = "deepcad")]
    DeepCad,
    #[value(name = "furniture")]
    Furniture,
}

impl DatasetOption {
    /// Lowercase name used in file names and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            DatasetOption::Abc => "abc",
            DatasetOption::DeepCad => "deepcad",
            DatasetOption::Furniture => "furniture",
        }
    }

    /// File name of the deduplicated split, e.g. `abc_data_split_6bit.pkl`.
    pub fn output_file_name(self, bit: u32) -> String {
        format!("{}_data_split_{}bit.pkl", self.name(), bit)
    }

    /// Map a record ID to its path under `root`.
    ///
    /// Furniture IDs are already relative paths. ABC and DeepCAD records are
    /// sharded into folders named after the first four characters of the ID.
    pub fn resolve_path(self, root: &Path, id: &str) -> PathBuf {
        match self {
            DatasetOption::Furniture => root.join(id),
            DatasetOption::Abc | DatasetOption::DeepCad => root.join(shard_folder(id)).join(id),
        }
    }

    /// Folder expected to contain `id`, used for diagnostics.
    pub fn expected_folder(self, root: &Path, id: &str) -> PathBuf {
        match self.resolve_path(root, id).parent() {
            Some(parent) => parent.to_path_buf(),
            None => root.to_path_buf(),
        }
    }
}

impl fmt::Display for DatasetOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shard folder of an ABC/DeepCAD ID: the first four characters of its stem.
pub fn shard_folder(id: &str) -> &str {
    let stem = id.split('.').next().unwrap_or(id);
    match stem.char_indices().nth(SHARD_PREFIX_LEN) {
        Some((end, _)) => &stem[..end],
        None => stem,
    }
}

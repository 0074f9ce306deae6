//! Train/val/test split manifest builder.
//!
//! Files are grouped by their grandparent folder, each group is shuffled and
//! cut into contiguous train/val/test slices, and the slices are concatenated
//! in folder order into one manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::{ConfigError, SplitConfig, SplitRatios};
use crate::core::writers::{write_json, WriteError};

/// Errors that can occur while building a split manifest.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("Failed to create dataset root {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk dataset directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid split ratios: {0}")]
    Ratios(#[from] ConfigError),

    #[error("Failed to write manifest: {0}")]
    Write(#[from] WriteError),
}

/// Counts recorded for one folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderCounts {
    pub total_files: usize,
    pub train_size: usize,
    pub val_size: usize,
    pub test_size: usize,
}

/// Manifest metadata: per-folder and aggregate counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub total_folders: usize,
    pub total_files: usize,
    pub folders: BTreeMap<String, FolderCounts>,
    pub train_size: usize,
    pub val_size: usize,
    pub test_size: usize,
}

/// The JSON split manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub train: Vec<String>,
    pub val: Vec<String>,
    pub test: Vec<String>,
    pub metadata: ManifestMetadata,
}

/// Items of one group cut into train/val/test.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<T> {
    pub train: Vec<T>,
    pub val: Vec<T>,
    pub test: Vec<T>,
}

impl<T> Partition<T> {
    pub fn counts(&self) -> FolderCounts {
        FolderCounts {
            total_files: self.train.len() + self.val.len() + self.test.len(),
            train_size: self.train.len(),
            val_size: self.val.len(),
            test_size: self.test.len(),
        }
    }
}

/// Truncated train/val sizes for `n` items; test takes the remainder.
pub fn split_sizes(n: usize, ratios: &SplitRatios) -> (usize, usize, usize) {
    let train = ((n as f64 * ratios.train) as usize).min(n);
    let val = ((n as f64 * ratios.val) as usize).min(n - train);
    (train, val, n - train - val)
}

/// Shuffle `items` and cut them into contiguous train/val/test slices.
pub fn partition<T, R: Rng + ?Sized>(
    mut items: Vec<T>,
    ratios: &SplitRatios,
    rng: &mut R,
) -> Partition<T> {
    items.shuffle(rng);

    let (train_size, val_size, _) = split_sizes(items.len(), ratios);
    let mut rest = items.split_off(train_size);
    let test = rest.split_off(val_size);

    Partition {
        train: items,
        val: rest,
        test,
    }
}

/// Seeded RNG when `seed` is set, OS entropy otherwise.
pub fn split_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Recursively find files with the given extension, sorted by path.
///
/// The extension is matched case-sensitively, so `.JSON` is not `.json`.
pub fn discover_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>, SplitError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .map(|ext| ext == extension)
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Folder id of a file: the name of its grandparent directory.
///
/// Returns an empty string when the path is too shallow to have one.
pub fn folder_id(file: &Path) -> String {
    file.parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Group files by folder id, keeping input order within each group.
pub fn group_by_folder(files: Vec<PathBuf>) -> BTreeMap<String, Vec<PathBuf>> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for file in files {
        groups.entry(folder_id(&file)).or_default().push(file);
    }
    groups
}

/// Partition every group and assemble the manifest.
///
/// Groups are visited in folder-id order and all shuffles draw from `rng`,
/// so a seeded RNG gives a reproducible manifest.
pub fn manifest_from_groups<R: Rng + ?Sized>(
    groups: BTreeMap<String, Vec<PathBuf>>,
    ratios: &SplitRatios,
    rng: &mut R,
) -> SplitManifest {
    let mut manifest = SplitManifest::default();
    manifest.metadata.total_folders = groups.len();
    manifest.metadata.total_files = groups.values().map(Vec::len).sum();

    let to_strings = |paths: Vec<PathBuf>| -> Vec<String> {
        paths.iter().map(|p| p.display().to_string()).collect()
    };

    for (folder, files) in groups {
        let split = partition(files, ratios, &mut *rng);
        manifest.metadata.folders.insert(folder, split.counts());

        manifest.train.extend(to_strings(split.train));
        manifest.val.extend(to_strings(split.val));
        manifest.test.extend(to_strings(split.test));
    }

    manifest.metadata.train_size = manifest.train.len();
    manifest.metadata.val_size = manifest.val.len();
    manifest.metadata.test_size = manifest.test.len();
    manifest
}

/// Build the split manifest for `root`.
///
/// Creates `root` if it does not exist, then discovers, groups and
/// partitions every matching file.
pub fn build_manifest(root: &Path, config: &SplitConfig) -> Result<SplitManifest, SplitError> {
    config.ratios.validate()?;

    fs::create_dir_all(root).map_err(|e| SplitError::CreateRoot {
        path: root.to_path_buf(),
        source: e,
    })?;

    let files = discover_files(root, &config.extension)?;
    log::info!("Found {} .{} files under {}", files.len(), config.extension, root.display());

    let groups = group_by_folder(files);
    let mut rng = split_rng(config.seed);
    Ok(manifest_from_groups(groups, &config.ratios, &mut rng))
}

/// Build the manifest for `root` and write it as JSON to `output`.
pub fn create_dataset_split(
    root: &Path,
    output: &Path,
    config: &SplitConfig,
) -> Result<SplitManifest, SplitError> {
    let manifest = build_manifest(root, config)?;
    write_json(output, &manifest)?;
    log::info!("Dataset split saved to {}", output.display());
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn create_files(root: &Path, folder: &str, count: usize) {
        for i in 0..count {
            let dir = root.join(folder).join(format!("{:08}", i));
            fs::create_dir_all(&dir).unwrap();
            File::create(dir.join(format!("{:08}.json", i))).unwrap();
        }
    }

    fn seeded_config(seed: u64) -> SplitConfig {
        SplitConfig {
            seed: Some(seed),
            ..SplitConfig::default()
        }
    }

    #[test]
    fn test_split_sizes_truncate() {
        let ratios = SplitRatios::default();
        assert_eq!(split_sizes(10, &ratios), (6, 2, 2));
        assert_eq!(split_sizes(7, &ratios), (4, 1, 2));
        assert_eq!(split_sizes(1, &ratios), (0, 0, 1));
        assert_eq!(split_sizes(0, &ratios), (0, 0, 0));
    }

    #[test]
    fn test_split_sizes_always_sum_to_total() {
        let ratios = SplitRatios::default();
        for n in 0..200 {
            let (train, val, test) = split_sizes(n, &ratios);
            assert_eq!(train + val + test, n);
        }
    }

    #[test]
    fn test_partition_keeps_every_item() {
        let mut rng = split_rng(Some(3));
        let items: Vec<u32> = (0..23).collect();
        let split = partition(items, &SplitRatios::default(), &mut rng);

        assert_eq!(split.counts().total_files, 23);
        let mut all: Vec<u32> = split
            .train
            .iter()
            .chain(&split.val)
            .chain(&split.test)
            .copied()
            .collect();
        all.sort();
        assert_eq!(all, (0..23).collect::<Vec<_>>());
    }

    #[test]
    fn test_folder_id_is_grandparent() {
        let path = Path::new("data_process/abc_parsed/9999/00000001/00000001.json");
        assert_eq!(folder_id(path), "9999");
        assert_eq!(folder_id(Path::new("a.json")), "");
    }

    #[test]
    fn test_folder_with_ten_files() {
        let dir = TempDir::new().unwrap();
        create_files(dir.path(), "9999", 10);

        let manifest = build_manifest(dir.path(), &seeded_config(1)).unwrap();
        let counts = manifest.metadata.folders["9999"];

        assert_eq!(counts.total_files, 10);
        assert_eq!(counts.train_size, 6);
        assert_eq!(counts.val_size, 2);
        assert_eq!(counts.test_size, 2);
        assert_eq!(manifest.metadata.total_folders, 1);
        assert_eq!(manifest.metadata.train_size, 6);
    }

    #[test]
    fn test_per_folder_counts_sum_to_total() {
        let dir = TempDir::new().unwrap();
        create_files(dir.path(), "0000", 1);
        create_files(dir.path(), "0001", 7);
        create_files(dir.path(), "0002", 13);

        let manifest = build_manifest(dir.path(), &seeded_config(5)).unwrap();

        assert_eq!(manifest.metadata.total_folders, 3);
        assert_eq!(manifest.metadata.total_files, 21);
        for counts in manifest.metadata.folders.values() {
            assert_eq!(
                counts.train_size + counts.val_size + counts.test_size,
                counts.total_files
            );
        }
        assert_eq!(
            manifest.train.len() + manifest.val.len() + manifest.test.len(),
            21
        );
    }

    #[test]
    fn test_seeded_manifest_is_reproducible() {
        let dir = TempDir::new().unwrap();
        create_files(dir.path(), "0000", 12);
        create_files(dir.path(), "0001", 9);

        let first = build_manifest(dir.path(), &seeded_config(42)).unwrap();
        let second = build_manifest(dir.path(), &seeded_config(42)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_ignores_other_extensions() {
        let dir = TempDir::new().unwrap();
        create_files(dir.path(), "0000", 3);
        File::create(dir.path().join("0000/00000000/notes.txt")).unwrap();

        let manifest = build_manifest(dir.path(), &seeded_config(0)).unwrap();
        assert_eq!(manifest.metadata.total_files, 3);
    }

    #[test]
    fn test_extension_match_is_case_sensitive() {
        let dir = TempDir::new().unwrap();
        create_files(dir.path(), "0000", 2);
        File::create(dir.path().join("0000/00000000/UPPER.JSON")).unwrap();

        let files = discover_files(dir.path(), "json").unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "json"));
    }

    #[test]
    fn test_missing_root_is_created() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("abc_parsed");

        let manifest = build_manifest(&root, &seeded_config(0)).unwrap();

        assert!(root.is_dir());
        assert_eq!(manifest.metadata.total_files, 0);
        assert!(manifest.metadata.folders.is_empty());
    }

    #[test]
    fn test_create_dataset_split_writes_json() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("abc_parsed");
        create_files(&root, "0003", 5);
        let output = dir.path().join("dataset_split.json");

        let manifest = create_dataset_split(&root, &output, &seeded_config(9)).unwrap();

        let content = fs::read_to_string(&output).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["metadata"]["total_files"], 5);
        assert_eq!(value["metadata"]["folders"]["0003"]["train_size"], 3);
        assert_eq!(value["train"].as_array().map(Vec::len), Some(3));

        let parsed: SplitManifest = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_invalid_ratios_rejected() {
        let dir = TempDir::new().unwrap();
        let config = SplitConfig {
            ratios: SplitRatios { train: 0.9, val: 0.5 },
            ..SplitConfig::default()
        };
        assert!(matches!(
            build_manifest(dir.path(), &config),
            Err(SplitError::Ratios(_))
        ));
    }
}

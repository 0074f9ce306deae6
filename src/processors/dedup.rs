//! Training-set deduplication by shape content hash.
//!
//! Only the training partition is deduplicated: the first ID carrying a given
//! composite hash is kept, later ones are dropped. Validation and test IDs
//! pass through untouched.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, DedupConfig};
use crate::core::dataset::{shard_folder, DatasetOption};
use crate::core::loaders::{
    list_relative_ids, list_sharded_ids, load_deepcad_split, load_manifest_ids, CandidateSplit,
    LoaderError,
};
use crate::core::transforms::{Quantizer, TransformError};
use crate::core::writers::{write_pickle, WriteError};
use crate::processors::hashing::{hash_shape_file, HashOutcome};
use crate::processors::splitting::{partition, split_rng};

/// Extension of the shape records enumerated by directory scans.
const RECORD_EXTENSION: &str = "pkl";

/// Errors that abort a deduplication run.
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("Invalid quantization settings: {0}")]
    Quantizer(#[from] TransformError),

    #[error("Invalid split ratios: {0}")]
    Ratios(#[from] ConfigError),

    #[error("Failed to load candidate IDs: {0}")]
    Candidates(#[from] LoaderError),

    #[error("Failed to write output: {0}")]
    Write(#[from] WriteError),
}

/// Deduplicated split written to the output pickle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupResult {
    pub train: Vec<String>,
    pub val: Vec<String>,
    pub test: Vec<String>,
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupSummary {
    /// Training IDs visited
    pub processed: usize,
    /// IDs kept as first occurrence of their hash
    pub kept: usize,
    /// IDs dropped because their hash was already seen
    pub duplicates: usize,
    pub not_found: usize,
    pub malformed: usize,
}

impl DedupSummary {
    /// Kept IDs over processed IDs, `0.0` when nothing was processed.
    pub fn unique_ratio(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.kept as f64 / self.processed as f64
        }
    }

    pub fn skipped(&self) -> usize {
        self.not_found + self.malformed
    }
}

/// Outcome of a full deduplication run.
#[derive(Debug, Clone)]
pub struct DedupReport {
    pub output: PathBuf,
    pub summary: DedupSummary,
    pub train_candidates: usize,
    pub val_size: usize,
    pub test_size: usize,
}

/// Keep the first ID of every distinct hash, in input order.
///
/// `outcomes` yields one hashing outcome per ID in `ids`. Missing and
/// malformed records are counted and skipped.
pub fn deduplicate<I>(ids: &[String], outcomes: I, progress_every: usize) -> (Vec<String>, DedupSummary)
where
    I: IntoIterator<Item = HashOutcome>,
{
    let mut seen = HashSet::with_capacity(ids.len());
    let mut kept = Vec::with_capacity(ids.len());
    let mut summary = DedupSummary::default();

    for (index, (id, outcome)) in ids.iter().zip(outcomes).enumerate() {
        summary.processed += 1;

        match outcome {
            HashOutcome::Hashed(hash) => {
                if seen.insert(hash) {
                    kept.push(id.clone());
                    summary.kept += 1;
                } else {
                    summary.duplicates += 1;
                }
            }
            HashOutcome::NotFound(path) => {
                summary.not_found += 1;
                debug!("File not found: {}", path.display());
            }
            HashOutcome::Malformed(reason) => {
                summary.malformed += 1;
                debug!("Error processing {}: {}", id, reason);
            }
        }

        if progress_every > 0 && index % progress_every == 0 {
            info!(
                "Progress: {}/{}, Unique: {}/{} ({:.2})",
                index,
                ids.len(),
                seen.len(),
                summary.processed,
                seen.len() as f64 / summary.processed as f64
            );
        }
    }

    (kept, summary)
}

/// Warnings worth surfacing at the default log level.
pub fn summary_warnings(summary: &DedupSummary) -> Vec<String> {
    let mut warnings = Vec::new();
    if summary.processed > 0 && summary.kept == 0 {
        warnings.push(format!(
            "No training samples kept out of {} processed; check the data folder and record format",
            summary.processed
        ));
    }
    if summary.malformed > 0 {
        warnings.push(format!(
            "{} of {} training records could not be decoded (rerun with --debug for reasons)",
            summary.malformed, summary.processed
        ));
    }
    if summary.not_found > 0 {
        warnings.push(format!(
            "{} of {} training records were not found on disk",
            summary.not_found, summary.processed
        ));
    }
    warnings
}

/// Resolve a split file path: used as given if it exists, else under `root`.
fn resolve_split_file(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || path.exists() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn partition_ids(ids: Vec<String>, config: &DedupConfig) -> CandidateSplit {
    let mut rng = split_rng(config.seed);
    let split = partition(ids, &config.ratios, &mut rng);
    CandidateSplit {
        train: split.train,
        val: split.val,
        test: split.test,
    }
}

fn load_abc_candidates(root: &Path, config: &DedupConfig) -> Result<CandidateSplit, DedupError> {
    if let Some(split_file) = &config.split_file {
        let path = resolve_split_file(root, split_file);
        info!("Loading ABC split from {}", path.display());
        return Ok(load_manifest_ids(path)?);
    }
    let ids = list_sharded_ids(root, RECORD_EXTENSION)?;
    Ok(partition_ids(ids, config))
}

fn load_deepcad_candidates(root: &Path, config: &DedupConfig) -> Result<CandidateSplit, DedupError> {
    let split_file = config.split_file.as_ref().unwrap_or(&config.deepcad_split);
    let path = resolve_split_file(root, split_file);
    info!("Loading DeepCAD split from {}", path.display());
    Ok(load_deepcad_split(path)?)
}

fn load_furniture_candidates(
    root: &Path,
    config: &DedupConfig,
) -> Result<CandidateSplit, DedupError> {
    if config.split_file.is_some() {
        warn!("Split files are not used for the furniture dataset; scanning {}", root.display());
    }
    let ids = list_relative_ids(root, RECORD_EXTENSION)?;
    Ok(partition_ids(ids, config))
}

/// Load the train/val/test candidate IDs for the configured dataset.
pub fn load_candidates(root: &Path, config: &DedupConfig) -> Result<CandidateSplit, DedupError> {
    match config.option {
        DatasetOption::Abc => load_abc_candidates(root, config),
        DatasetOption::DeepCad => load_deepcad_candidates(root, config),
        DatasetOption::Furniture => load_furniture_candidates(root, config),
    }
}

/// Files in the expected folder of `id` that share its four-character prefix.
pub fn similar_files(root: &Path, id: &str, option: DatasetOption) -> Vec<String> {
    let folder = option.expected_folder(root, id);
    let name = Path::new(id)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(id);
    let prefix = shard_folder(name);

    let mut names: Vec<String> = fs::read_dir(&folder)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(prefix))
        .collect();
    names.sort();
    names
}

/// Log how the first training ID resolves on disk.
pub fn log_layout_diagnostics(root: &Path, option: DatasetOption, train: &[String]) {
    debug!("First 5 training IDs: {:?}", &train[..train.len().min(5)]);

    let Some(example) = train.first() else {
        return;
    };
    let path = option.resolve_path(root, example);
    let folder = option.expected_folder(root, example);
    debug!(
        "Example path calculation: {} -> folder {} -> {}",
        example,
        folder.display(),
        path.display()
    );
    debug!("Does this path exist? {}", path.exists());
    debug!("Does folder {} exist? {}", folder.display(), folder.exists());

    if folder.is_dir() {
        let mut entries: Vec<String> = fs::read_dir(&folder)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        entries.truncate(10);
        debug!("Files in {}: {:?}", folder.display(), entries);
    }
}

/// Deduplicate the training split under `root` and write the output pickle.
///
/// # Arguments
///
/// * `root` - Data folder holding the shape records
/// * `config` - Dataset option, bit width, range and output settings
/// * `debug_mode` - Log path-resolution diagnostics and skip reasons
/// * `progress` - Bar advanced once per hashed training ID
///
/// # Errors
///
/// Returns an error if the settings are invalid, candidate IDs cannot be
/// loaded, or the output cannot be written. Per-ID failures are never fatal.
pub fn run_dedup(
    root: &Path,
    config: &DedupConfig,
    debug_mode: bool,
    progress: &ProgressBar,
) -> Result<DedupReport, DedupError> {
    let quantizer = Quantizer::new(config.bit, config.min_range, config.max_range)?;
    config.ratios.validate()?;

    let option = config.option;
    let candidates = load_candidates(root, config)?;
    info!(
        "Loaded {} candidates ({} train, {} val, {} test)",
        candidates.len(),
        candidates.train.len(),
        candidates.val.len(),
        candidates.test.len()
    );

    if debug_mode {
        log_layout_diagnostics(root, option, &candidates.train);
    }

    progress.set_length(candidates.train.len() as u64);

    let hash_one = |id: &String| -> HashOutcome {
        let outcome = hash_shape_file(root, id, option, &quantizer);
        if debug_mode {
            if let HashOutcome::NotFound(_) = &outcome {
                let similar = similar_files(root, id, option);
                if !similar.is_empty() {
                    debug!("Similar files found for {}: {:?}", id, similar);
                }
            }
        }
        progress.inc(1);
        outcome
    };

    let (kept, summary) = if config.parallel {
        let outcomes: Vec<HashOutcome> = candidates.train.par_iter().map(&hash_one).collect();
        deduplicate(&candidates.train, outcomes, config.progress_every)
    } else {
        deduplicate(
            &candidates.train,
            candidates.train.iter().map(&hash_one),
            config.progress_every,
        )
    };
    progress.finish_and_clear();

    info!(
        "Final statistics: {}/{} ({:.2}) training samples kept after deduplication",
        summary.kept,
        candidates.train.len(),
        summary.unique_ratio()
    );
    for warning in summary_warnings(&summary) {
        warn!("{}", warning);
    }

    let output = config.output_dir.join(option.output_file_name(config.bit));
    let train_candidates = candidates.train.len();
    let result = DedupResult {
        train: kept,
        val: candidates.val,
        test: candidates.test,
    };
    write_pickle(&output, &result)?;
    info!("Saved output to {}", output.display());

    Ok(DedupReport {
        output,
        summary,
        train_candidates,
        val_size: result.val.len(),
        test_size: result.test.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::hashing::ShapeHash;
    use tempfile::TempDir;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn hashed(key: &str) -> HashOutcome {
        HashOutcome::Hashed(ShapeHash::from_digests(vec![key.to_string()]))
    }

    fn write_record(root: &Path, folder: &str, name: &str, surfaces: &str) {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), format!(r#"{{"surf_wcs": {}}}"#, surfaces)).unwrap();
    }

    fn read_result(path: &Path) -> DedupResult {
        let bytes = fs::read(path).unwrap();
        serde_pickle::from_slice(&bytes, serde_pickle::DeOptions::new()).unwrap()
    }

    #[test]
    fn test_first_occurrence_wins() {
        let train = ids(&["0001.pkl", "0002.pkl", "0003.pkl"]);
        let outcomes = vec![hashed("a"), hashed("b"), hashed("a")];

        let (kept, summary) = deduplicate(&train, outcomes, 0);

        assert_eq!(kept, ids(&["0001.pkl", "0002.pkl"]));
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.kept, 2);
        assert_eq!(summary.duplicates, 1);
    }

    #[test]
    fn test_one_id_per_hash_group() {
        let train = ids(&["a1", "b1", "a2", "c1", "b2", "a3", "c2"]);
        let outcomes = vec![
            hashed("a"),
            hashed("b"),
            hashed("a"),
            hashed("c"),
            hashed("b"),
            hashed("a"),
            hashed("c"),
        ];

        let (kept, summary) = deduplicate(&train, outcomes, 2);

        assert_eq!(kept, ids(&["a1", "b1", "c1"]));
        assert_eq!(summary.duplicates, 4);
        assert!((summary.unique_ratio() - 3.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_skipped_ids_are_counted() {
        let train = ids(&["0001.pkl", "0002.pkl", "0003.pkl", "0004.pkl"]);
        let outcomes = vec![
            HashOutcome::NotFound(PathBuf::from("/data/0001/0001.pkl")),
            hashed("a"),
            HashOutcome::Malformed("bad record".to_string()),
            hashed("a"),
        ];

        let (kept, summary) = deduplicate(&train, outcomes, 0);

        assert_eq!(kept, ids(&["0002.pkl"]));
        assert_eq!(
            summary,
            DedupSummary {
                processed: 4,
                kept: 1,
                duplicates: 1,
                not_found: 1,
                malformed: 1,
            }
        );
        assert_eq!(summary.skipped(), 2);
    }

    #[test]
    fn test_empty_summary_ratio() {
        let (kept, summary) = deduplicate(&[], Vec::new(), 2000);
        assert!(kept.is_empty());
        assert_eq!(summary.unique_ratio(), 0.0);
    }

    #[test]
    fn test_similar_files() {
        let dir = TempDir::new().unwrap();
        write_record(dir.path(), "0001", "00010001.pkl", "[]");
        write_record(dir.path(), "0001", "00010002.pkl", "[]");
        write_record(dir.path(), "0001", "99990000.pkl", "[]");

        let similar = similar_files(dir.path(), "00019999.pkl", DatasetOption::Abc);
        assert_eq!(similar, ids(&["00010001.pkl", "00010002.pkl"]));
        assert!(similar_files(dir.path(), "00050000.pkl", DatasetOption::Abc).is_empty());
    }

    fn deepcad_fixture(parallel: bool) -> (TempDir, DedupConfig) {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");

        let surfaces_a = vec![vec![vec![0.1, 0.2, 0.3]], vec![vec![0.9, 0.9, 0.9]]];
        let surfaces_a_swapped = vec![vec![vec![0.9, 0.9, 0.9]], vec![vec![0.1, 0.2, 0.3]]];
        let surfaces_b = vec![vec![vec![-0.5, 0.5, 0.0]]];

        #[derive(Serialize)]
        struct Record {
            surf_wcs: Vec<Vec<Vec<f64>>>,
        }
        let write_pkl = |name: &str, surf_wcs: Vec<Vec<Vec<f64>>>| {
            let folder = data.join(shard_folder(name));
            fs::create_dir_all(&folder).unwrap();
            let bytes =
                serde_pickle::to_vec(&Record { surf_wcs }, serde_pickle::SerOptions::new()).unwrap();
            fs::write(folder.join(name), bytes).unwrap();
        };
        write_pkl("00000001.pkl", surfaces_a);
        write_pkl("00000002.pkl", surfaces_b);
        write_pkl("00010003.pkl", surfaces_a_swapped);
        fs::create_dir_all(data.join("0002")).unwrap();
        fs::write(data.join("0002/00020005.pkl"), b"garbage").unwrap();

        fs::write(
            data.join("train_val_test_split.json"),
            r#"{"train": ["0000/00000001", "0000/00000002", "0001/00010003", "0001/00010004", "0002/00020005"],
                "validation": ["0003/00030001"], "test": ["0004/00040001", "0004/00040002"]}"#,
        )
        .unwrap();

        let config = DedupConfig {
            option: DatasetOption::DeepCad,
            output_dir: dir.path().join("out"),
            parallel,
            ..DedupConfig::default()
        };
        (dir, config)
    }

    #[test]
    fn test_run_dedup_deepcad() {
        for parallel in [false, true] {
            let (dir, config) = deepcad_fixture(parallel);
            let report =
                run_dedup(&dir.path().join("data"), &config, true, &ProgressBar::hidden()).unwrap();

            assert_eq!(report.output, dir.path().join("out/deepcad_data_split_6bit.pkl"));
            assert_eq!(report.train_candidates, 5);
            assert_eq!(
                report.summary,
                DedupSummary {
                    processed: 5,
                    kept: 2,
                    duplicates: 1,
                    not_found: 1,
                    malformed: 1,
                }
            );

            let result = read_result(&report.output);
            assert_eq!(result.train, ids(&["00000001.pkl", "00000002.pkl"]));
            assert_eq!(result.val, ids(&["00030001.pkl"]));
            assert_eq!(result.test, ids(&["00040001.pkl", "00040002.pkl"]));
        }
    }

    #[test]
    fn test_run_dedup_numpy_records() {
        use crate::config::SplitRatios;
        use crate::core::ndarray::fixtures::{listed_record, stacked_record, Dtype};

        let dir = TempDir::new().unwrap();
        let data = dir.path().join("abc");
        fs::create_dir_all(data.join("0000")).unwrap();

        // Same two surfaces, stacked in one array and listed in reverse order
        let values = [0.5, 0.5, 0.5, -0.5, 0.25, 1.0];
        fs::write(
            data.join("0000/00000001.pkl"),
            stacked_record(&[2, 1, 3], &values, Dtype::F4),
        )
        .unwrap();
        fs::write(
            data.join("0000/00000002.pkl"),
            listed_record(&[vec![[-0.5, 0.25, 1.0]], vec![[0.5, 0.5, 0.5]]]),
        )
        .unwrap();
        fs::write(
            data.join("0000/00000003.pkl"),
            listed_record(&[vec![[0.0, 0.0, 0.0]]]),
        )
        .unwrap();

        let config = DedupConfig {
            output_dir: dir.path().to_path_buf(),
            ratios: SplitRatios { train: 1.0, val: 0.0 },
            seed: Some(5),
            ..DedupConfig::default()
        };
        let report = run_dedup(&data, &config, false, &ProgressBar::hidden()).unwrap();

        assert_eq!(report.summary.processed, 3);
        assert_eq!(report.summary.kept, 2);
        assert_eq!(report.summary.duplicates, 1);
        assert_eq!(report.summary.malformed, 0);
        assert!(summary_warnings(&report.summary).is_empty());

        let mut train = read_result(&report.output).train;
        assert!(train.contains(&"00000003.pkl".to_string()));
        train.sort();
        assert_eq!(train.len(), 2);
    }

    #[test]
    fn test_summary_warnings() {
        let all_malformed = DedupSummary {
            processed: 4,
            malformed: 4,
            ..DedupSummary::default()
        };
        let warnings = summary_warnings(&all_malformed);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("No training samples kept"));

        let clean = DedupSummary {
            processed: 2,
            kept: 2,
            ..DedupSummary::default()
        };
        assert!(summary_warnings(&clean).is_empty());
        assert!(summary_warnings(&DedupSummary::default()).is_empty());
    }

    #[test]
    fn test_run_dedup_furniture_scan() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("furniture");
        for (folder, name) in [("bed", "0001.json"), ("bed", "0002.pkl"), ("chair", "0003.pkl")] {
            fs::create_dir_all(data.join(folder)).unwrap();
            fs::write(data.join(folder).join(name), b"").unwrap();
        }

        let config = DedupConfig {
            option: DatasetOption::Furniture,
            output_dir: dir.path().to_path_buf(),
            seed: Some(11),
            ..DedupConfig::default()
        };
        let candidates = load_candidates(&data, &config).unwrap();
        assert_eq!(candidates.len(), 2);
        let mut all: Vec<String> = candidates
            .train
            .iter()
            .chain(&candidates.val)
            .chain(&candidates.test)
            .cloned()
            .collect();
        all.sort();
        assert_eq!(all, ids(&["bed/0002.pkl", "chair/0003.pkl"]));

        let report = run_dedup(&data, &config, false, &ProgressBar::hidden()).unwrap();
        assert_eq!(report.output, dir.path().join("furniture_data_split_6bit.pkl"));
        assert!(report.output.exists());
    }

    #[test]
    fn test_abc_candidates_from_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("dataset_split.json");
        fs::write(
            &manifest,
            r#"{"train": ["abc/0000/x/00000001.pkl"], "val": [], "test": ["abc/0000/y/00000002.pkl"]}"#,
        )
        .unwrap();

        let config = DedupConfig {
            split_file: Some(manifest),
            ..DedupConfig::default()
        };
        let candidates = load_candidates(dir.path(), &config).unwrap();
        assert_eq!(candidates.train, ids(&["00000001.pkl"]));
        assert_eq!(candidates.test, ids(&["00000002.pkl"]));
    }

    #[test]
    fn test_invalid_bit_width_fails_early() {
        let dir = TempDir::new().unwrap();
        let config = DedupConfig {
            bit: 0,
            ..DedupConfig::default()
        };
        let result = run_dedup(dir.path(), &config, false, &ProgressBar::hidden());
        assert!(matches!(result, Err(DedupError::Quantizer(_))));
    }

    #[test]
    fn test_missing_deepcad_split_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = DedupConfig {
            option: DatasetOption::DeepCad,
            ..DedupConfig::default()
        };
        let result = run_dedup(dir.path(), &config, false, &ProgressBar::hidden());
        assert!(matches!(result, Err(DedupError::Candidates(_))));
    }
}

//! Flattening of one-file-per-folder trees.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur during flattening.
#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("Source directory not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Expected exactly one file in {folder}, found {count} entries")]
    UnexpectedEntryCount { folder: PathBuf, count: usize },

    #[error("{second} would overwrite {first} in the destination")]
    DuplicateName { first: PathBuf, second: PathBuf },

    #[error("Expected a regular file, found {0}")]
    NotAFile(PathBuf),

    #[error("Failed to create destination {path}: {source}")]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {from} -> {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One planned copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenMove {
    pub source: PathBuf,
    pub destination: PathBuf,
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, FlattenError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| FlattenError::ReadDir {
            path: dir.to_path_buf(),
            source: e,
        })?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| FlattenError::ReadDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
    entries.sort();
    Ok(entries)
}

/// Plan the copies for every immediate subfolder of `source`.
///
/// Each subfolder must hold exactly one entry and it must be a regular
/// file, and no two of those files may share a name. Plain files at the top
/// of `source` are ignored.
///
/// # Errors
///
/// Fails on the first subfolder that breaks these rules, before any file
/// has been copied.
pub fn plan_flatten(source: &Path, destination: &Path) -> Result<Vec<FlattenMove>, FlattenError> {
    if !source.is_dir() {
        return Err(FlattenError::SourceNotFound(source.to_path_buf()));
    }

    let mut plan = Vec::new();
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    for folder in sorted_entries(source)? {
        if !folder.is_dir() {
            log::debug!("Skipping non-directory entry {}", folder.display());
            continue;
        }

        let entries = sorted_entries(&folder)?;
        let [file] = entries.as_slice() else {
            return Err(FlattenError::UnexpectedEntryCount {
                folder,
                count: entries.len(),
            });
        };
        if !file.is_file() {
            return Err(FlattenError::NotAFile(file.clone()));
        }

        if let Some(name) = file.file_name() {
            let target = destination.join(name);
            if let Some(first) = claimed.insert(target.clone(), file.clone()) {
                return Err(FlattenError::DuplicateName {
                    first,
                    second: file.clone(),
                });
            }
            plan.push(FlattenMove {
                source: file.clone(),
                destination: target,
            });
        }
    }
    Ok(plan)
}

/// Copy the single file of every subfolder of `source` into `destination`.
///
/// Creates `destination` if needed. When `dry_run` is set nothing is
/// created or copied and the planned destinations are returned.
///
/// # Returns
///
/// Destination paths in subfolder order.
pub fn flatten_folders(
    source: &Path,
    destination: &Path,
    dry_run: bool,
) -> Result<Vec<PathBuf>, FlattenError> {
    let plan = plan_flatten(source, destination)?;

    if dry_run {
        for step in &plan {
            println!(
                "Would copy {} -> {}",
                step.source.display(),
                step.destination.display()
            );
        }
        return Ok(plan.into_iter().map(|step| step.destination).collect());
    }

    fs::create_dir_all(destination).map_err(|e| FlattenError::CreateDestination {
        path: destination.to_path_buf(),
        source: e,
    })?;

    let mut copied = Vec::with_capacity(plan.len());
    for step in plan {
        fs::copy(&step.source, &step.destination).map_err(|e| FlattenError::Copy {
            from: step.source.clone(),
            to: step.destination.clone(),
            source: e,
        })?;
        log::debug!("Copied {} -> {}", step.source.display(), step.destination.display());
        copied.push(step.destination);
    }

    Ok(copied)
}

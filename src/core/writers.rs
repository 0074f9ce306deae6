//! Data writers for JSON manifests and pickle splits.
//!
//! This module provides functions for writing the two output artifacts:
//! - Pretty-printed JSON (the split manifest)
//! - Python pickle (the deduplicated `{train, val, test}` split)

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_pickle::SerOptions;
use thiserror::Error;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON write error for '{path}': {source}")]
    JsonError {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Pickle serialization error.
    #[error("pickle write error for '{path}': {source}")]
    PickleError {
        path: String,
        #[source]
        source: serde_pickle::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write a value as pretty-printed JSON (two-space indent).
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `value` - Any serializable value
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - File cannot be created or written to
/// - The value fails to serialize
///
/// # Example
///
/// ```no_run
/// use cad_dataprep::core::writers::write_json;
/// use std::path::Path;
///
/// write_json(Path::new("dataset_split.json"), &vec!["a", "b"]).unwrap();
/// ```
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| WriteError::JsonError {
        path: path_str.clone(),
        source: e,
    })?;
    writeln!(writer).map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write a value as a Python pickle.
///
/// Structs become dicts keyed by field name, so a `{train, val, test}`
/// struct loads in Python as `{'train': [...], 'val': [...], 'test': [...]}`.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written, or the value
/// fails to serialize.
pub fn write_pickle<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    serde_pickle::to_writer(&mut writer, value, SerOptions::new()).map_err(|e| {
        WriteError::PickleError {
            path: path_str.clone(),
            source: e,
        }
    })?;

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

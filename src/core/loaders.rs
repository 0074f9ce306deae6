//! Loaders for shape records and candidate ID lists.
//!
//! This module provides:
//! - Shape record decoding from pickle (`.pkl`) and JSON (`.json`) files
//! - Candidate split loading from a split manifest or a DeepCAD split file
//! - Directory listings used to enumerate record IDs

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_pickle::{DeOptions, HashableValue, Value};
use thiserror::Error;
use walkdir::WalkDir;

use super::ndarray::surfaces_from_value;

/// Key holding the per-surface samples in a shape record.
pub const SURFACE_KEY: &str = "surf_wcs";

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("pickle decode error in '{path}': {source}")]
    Pickle {
        path: PathBuf,
        #[source]
        source: serde_pickle::Error,
    },

    #[error("JSON decode error in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("record '{path}' has no '{key}' entry")]
    MissingKey { path: PathBuf, key: &'static str },

    #[error("invalid numpy array: {0}")]
    InvalidArray(String),

    #[error("unsupported record format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("surface {surface} has {len} coordinates, not a multiple of 3")]
    RaggedSurface { surface: usize, len: usize },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Candidate IDs of one dataset, already split into train/val/test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSplit {
    pub train: Vec<String>,
    pub val: Vec<String>,
    pub test: Vec<String>,
}

impl CandidateSplit {
    /// Total number of IDs across the three partitions.
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Surface samples of one CAD shape in world coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeRecord {
    /// One point list per surface.
    pub surfaces: Vec<Vec<[f64; 3]>>,
}

impl ShapeRecord {
    #[inline]
    pub fn num_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    /// Build a record from flattened per-surface coordinate lists.
    pub fn from_flat(flat_surfaces: Vec<Vec<f64>>) -> Result<Self> {
        let mut surfaces = Vec::with_capacity(flat_surfaces.len());
        for (surface, coords) in flat_surfaces.into_iter().enumerate() {
            if coords.len() % 3 != 0 {
                return Err(LoaderError::RaggedSurface {
                    surface,
                    len: coords.len(),
                });
            }
            let points = coords
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect();
            surfaces.push(points);
        }
        Ok(Self { surfaces })
    }
}

/// Arbitrarily nested numeric list, e.g. a `[u][v][3]` sample grid.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NestedCoords {
    Scalar(f64),
    List(Vec<NestedCoords>),
}

impl NestedCoords {
    fn flatten_into(&self, out: &mut Vec<f64>) {
        match self {
            NestedCoords::Scalar(v) => out.push(*v),
            NestedCoords::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

/// On-disk shape record; fields other than `surf_wcs` are ignored.
#[derive(Debug, Deserialize)]
struct RawShapeRecord {
    surf_wcs: Vec<NestedCoords>,
}

impl RawShapeRecord {
    fn into_record(self) -> Result<ShapeRecord> {
        let flat = self
            .surf_wcs
            .iter()
            .map(|surface| {
                let mut coords = Vec::new();
                surface.flatten_into(&mut coords);
                coords
            })
            .collect();
        ShapeRecord::from_flat(flat)
    }
}

fn open_reader(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| LoaderError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(BufReader::new(file))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Case-sensitive extension match used when enumerating IDs.
fn has_exact_extension(path: &Path, extension: &str) -> bool {
    path.extension().map(|ext| ext == extension).unwrap_or(false)
}

fn read_pickle(path: &Path) -> Result<Value> {
    let mut bytes = Vec::new();
    open_reader(path)?
        .read_to_end(&mut bytes)
        .map_err(|e| LoaderError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
    serde_pickle::value_from_slice(
        &bytes,
        DeOptions::new()
            .keep_restore_state()
            .replace_unresolved_globals(),
    )
    .map_err(|e| LoaderError::Pickle {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load a shape record, choosing the decoder from the file extension.
///
/// Pickled `surf_wcs` may hold numpy arrays (one stacked array or one per
/// surface) or plain nested lists. Objects elsewhere in the record are
/// decoded to their state or replaced with `None`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a pickle or JSON
/// file, lacks `surf_wcs`, or holds a surface that is not a list of 3-D points.
pub fn load_shape_record<P: AsRef<Path>>(path: P) -> Result<ShapeRecord> {
    let path = path.as_ref();

    if has_extension(path, "pkl") {
        let value = read_pickle(path)?;
        let surfaces = match &value {
            Value::Dict(map) => map.get(&HashableValue::String(SURFACE_KEY.to_string())),
            _ => None,
        }
        .ok_or_else(|| LoaderError::MissingKey {
            path: path.to_path_buf(),
            key: SURFACE_KEY,
        })?;
        ShapeRecord::from_flat(surfaces_from_value(surfaces)?)
    } else if has_extension(path, "json") {
        let raw: RawShapeRecord =
            serde_json::from_reader(open_reader(path)?).map_err(|e| LoaderError::Json {
                path: path.to_path_buf(),
                source: e,
            })?;
        raw.into_record()
    } else {
        Err(LoaderError::UnsupportedFormat(path.to_path_buf()))
    }
}

#[derive(Debug, Deserialize)]
struct ManifestLists {
    train: Vec<String>,
    val: Vec<String>,
    test: Vec<String>,
}

fn file_name_of(entry: &str) -> String {
    Path::new(entry)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| entry.to_string())
}

/// Read record IDs from a split manifest written by the split builder.
///
/// Each manifest entry is a path; its file name becomes the ID.
pub fn load_manifest_ids<P: AsRef<Path>>(path: P) -> Result<CandidateSplit> {
    let path = path.as_ref();
    let lists: ManifestLists =
        serde_json::from_reader(open_reader(path)?).map_err(|e| LoaderError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;

    let to_ids = |entries: Vec<String>| -> Vec<String> {
        entries.iter().map(|e| file_name_of(e)).collect()
    };
    Ok(CandidateSplit {
        train: to_ids(lists.train),
        val: to_ids(lists.val),
        test: to_ids(lists.test),
    })
}

#[derive(Debug, Deserialize)]
struct DeepCadSplit {
    train: Vec<String>,
    validation: Vec<String>,
    test: Vec<String>,
}

/// Read the DeepCAD train/validation/test split.
///
/// Entries look like `"0000/00000007"`; each becomes the ID `"00000007.pkl"`.
pub fn load_deepcad_split<P: AsRef<Path>>(path: P) -> Result<CandidateSplit> {
    let path = path.as_ref();
    let split: DeepCadSplit =
        serde_json::from_reader(open_reader(path)?).map_err(|e| LoaderError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;

    let to_ids = |entries: Vec<String>| -> Vec<String> {
        entries
            .iter()
            .map(|e| format!("{}.pkl", e.rsplit('/').next().unwrap_or(e)))
            .collect()
    };
    Ok(CandidateSplit {
        train: to_ids(split.train),
        val: to_ids(split.validation),
        test: to_ids(split.test),
    })
}

/// List file names inside the immediate subfolders of `root`.
///
/// Folders and files are visited in sorted order. Only files with the given
/// extension are returned.
pub fn list_sharded_ids(root: &Path, extension: &str) -> Result<Vec<String>> {
    let read_dir = |dir: &Path| -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| LoaderError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        paths.sort();
        Ok(paths)
    };

    let mut ids = Vec::new();
    for folder in read_dir(root)?.into_iter().filter(|p| p.is_dir()) {
        for file in read_dir(&folder)? {
            if file.is_file() && has_exact_extension(&file, extension) {
                if let Some(name) = file.file_name() {
                    ids.push(name.to_string_lossy().into_owned());
                }
            }
        }
    }
    Ok(ids)
}

/// Recursively list files under `root` as `/`-separated paths relative to it.
pub fn list_relative_ids(root: &Path, extension: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || !has_exact_extension(path, extension) {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(root) {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            ids.push(parts.join("/"));
        }
    }
    Ok(ids)
}

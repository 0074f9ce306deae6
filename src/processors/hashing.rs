//! Order-invariant content hashing of CAD shapes.
//!
//! Each surface is quantized, serialized as little-endian `i64` codes and
//! digested with SHA-256. The hex digests are sorted and joined with `_`, so
//! the composite key does not depend on surface enumeration order.

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::dataset::DatasetOption;
use crate::core::loaders::{load_shape_record, LoaderError, ShapeRecord};
use crate::core::transforms::{codes_to_bytes, Quantizer, TransformError};

/// Separator between per-surface digests in a composite key.
pub const DIGEST_SEPARATOR: &str = "_";

/// Errors that make a single shape unhashable.
#[derive(Debug, Error)]
pub enum HashError {
    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error("surface {surface}: {source}")]
    Quantize {
        surface: usize,
        #[source]
        source: TransformError,
    },
}

/// Composite content key of one shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeHash(String);

impl ShapeHash {
    /// Combine per-surface digests into a composite key.
    pub fn from_digests(mut digests: Vec<String>) -> Self {
        digests.sort_unstable();
        Self(digests.join(DIGEST_SEPARATOR))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ShapeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of hashing one candidate ID.
#[derive(Debug, Clone, PartialEq)]
pub enum HashOutcome {
    Hashed(ShapeHash),
    NotFound(PathBuf),
    Malformed(String),
}

/// Hex SHA-256 digest of one quantized surface.
pub fn surface_digest(points: &[[f64; 3]], quantizer: &Quantizer) -> Result<String, TransformError> {
    let codes = quantizer.quantize_points(points)?;
    Ok(hex::encode(Sha256::digest(codes_to_bytes(&codes))))
}

/// Composite hash of a shape. A shape without surfaces hashes to `""`.
pub fn shape_hash(record: &ShapeRecord, quantizer: &Quantizer) -> Result<ShapeHash, HashError> {
    let digests = record
        .surfaces
        .iter()
        .enumerate()
        .map(|(surface, points)| {
            surface_digest(points, quantizer).map_err(|source| HashError::Quantize { surface, source })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ShapeHash::from_digests(digests))
}

/// Resolve, load and hash the record behind `id`.
pub fn hash_shape_file(
    root: &Path,
    id: &str,
    option: DatasetOption,
    quantizer: &Quantizer,
) -> HashOutcome {
    let path = option.resolve_path(root, id);
    if !path.is_file() {
        return HashOutcome::NotFound(path);
    }

    let hashed = load_shape_record(&path)
        .map_err(HashError::from)
        .and_then(|record| shape_hash(&record, quantizer));

    match hashed {
        Ok(hash) => HashOutcome::Hashed(hash),
        Err(e) => HashOutcome::Malformed(e.to_string()),
    }
}

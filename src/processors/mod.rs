//! Data processing modules.

pub mod dedup;
pub mod flatten;
pub mod hashing;
pub mod splitting;

// Re-export key types for convenience
pub use dedup::{
    deduplicate, load_candidates, run_dedup, DedupError, DedupReport, DedupResult, DedupSummary,
};
pub use flatten::{flatten_folders, plan_flatten, FlattenError, FlattenMove};
pub use hashing::{hash_shape_file, shape_hash, surface_digest, HashError, HashOutcome, ShapeHash};
pub use splitting::{
    build_manifest, create_dataset_split, partition, split_sizes, SplitError, SplitManifest,
};

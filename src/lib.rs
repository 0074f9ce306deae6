//! Offline data-preparation tools for a CAD dataset pipeline.
//!
//! This crate provides tools for:
//! - Building train/val/test split manifests from a dataset directory tree
//! - Deduplicating CAD shapes by hashing their quantized surface samples
//! - Flattening one-file-per-folder trees into a single folder
//!
//! # Example
//!
//! ```no_run
//! use cad_dataprep::{core::loaders::load_shape_record, core::Quantizer, processors::shape_hash};
//!
//! let record = load_shape_record("data/0000/00000007.pkl").unwrap();
//! let hash = shape_hash(&record, &Quantizer::unit(6).unwrap()).unwrap();
//! println!("{}", hash);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{DedupConfig, FlattenConfig, PrepConfig, SplitConfig, SplitRatios};
pub use core::dataset::DatasetOption;
pub use core::loaders::{CandidateSplit, ShapeRecord};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

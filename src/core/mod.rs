//! Core data types and I/O operations.

pub mod dataset;
pub mod loaders;
pub mod ndarray;
pub mod transforms;
pub mod writers;

pub use dataset::DatasetOption;
pub use loaders::{load_shape_record, CandidateSplit, LoaderError, ShapeRecord};
pub use transforms::{Quantizer, TransformError};
pub use writers::{write_json, write_pickle, WriteError};

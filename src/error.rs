use std::io;

use mzdata::spectrum::bindata::ArrayRetrievalError;
use thiserror::Error;
use zarrs::array::{ArrayCreateError, ArrayError};
use zarrs::filesystem::FilesystemStoreCreateError;
use zarrs::storage::StorageError;

/// The reasons a conversion can fail. Nothing is caught or retried
/// internally, every failure surfaces to the caller immediately.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid resolution configuration: {0}")]
    Configuration(String),

    #[error("spectrum {index} has {n_intensities} intensity values for {n_mzs} m/z values")]
    ShapeMismatch {
        index: usize,
        n_mzs: usize,
        n_intensities: usize,
    },

    #[error("spectrum lengths are not uniform, found {lengths:?}")]
    NonUniformSpectrum { lengths: Vec<usize> },

    #[error("spectrum {index} does not share the reference m/z axis")]
    MzAxisMismatch { index: usize },

    #[error("the source contains no spectra")]
    EmptyDataset,

    #[error("the raster has a zero-length dimension and cannot be persisted")]
    EmptyRaster,

    #[error("spectrum {index} carries no pixel position parameters")]
    MissingCoordinate { index: usize },

    #[error("spectrum {index} carries no binary data arrays")]
    MissingArrays { index: usize },

    #[error("an I/O error occurred: {0}")]
    Io(#[from] io::Error),

    #[error("an error occurred while decoding binary data: {0}")]
    ArrayRetrieval(#[from] ArrayRetrievalError),

    #[error("an error occurred while writing the table: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to create the array store: {0}")]
    StoreCreate(#[from] FilesystemStoreCreateError),

    #[error("failed to define the stored array: {0}")]
    ArrayCreate(#[from] ArrayCreateError),

    #[error("failed to write the stored array: {0}")]
    Array(#[from] ArrayError),

    #[error("a storage error occurred: {0}")]
    Storage(#[from] StorageError),
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(e) => e,
            value => Self::new(io::ErrorKind::Other, Box::new(value)),
        }
    }
}

//! Convert imaging mass-spectrometry acquisitions stored in imzML into two
//! simpler representations: a flat columnar table with one intensity column
//! per m/z bin, and a dense, zero-padded raster persisted as a Zarr store.

pub mod columnar;
pub mod dataset;
pub mod error;
pub mod source;
pub mod zarr;

pub use columnar::{ColumnarTable, Dtype};
pub use dataset::{COORDINATE_FIELDS, GridExtent, ImsDataset, MicroGeometry};
pub use error::Error;
pub use source::{PixelCoordinate, PixelSpectrum};

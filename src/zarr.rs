use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::info;
use ndarray::Array3;
use num_traits::{Bounded, NumCast, Zero};
use zarrs::array::{Array, ArrayBuilder, DataType, Element, FillValue};
use zarrs::filesystem::FilesystemStore;
use zarrs::storage::{ReadableWritableListableStorage, ReadableWritableListableStorageTraits};

use crate::columnar::{Dtype, saturating_cast};
use crate::error::Error;

fn zarr_data_type(dtype: Dtype) -> DataType {
    match dtype {
        Dtype::U8 => DataType::UInt8,
        Dtype::U16 => DataType::UInt16,
        Dtype::U32 => DataType::UInt32,
        Dtype::U64 => DataType::UInt64,
        Dtype::F32 => DataType::Float32,
        Dtype::F64 => DataType::Float64,
    }
}

fn zarr_fill_value(dtype: Dtype) -> FillValue {
    match dtype {
        Dtype::U8 => FillValue::from(0u8),
        Dtype::U16 => FillValue::from(0u16),
        Dtype::U32 => FillValue::from(0u32),
        Dtype::U64 => FillValue::from(0u64),
        Dtype::F32 => FillValue::from(0f32),
        Dtype::F64 => FillValue::from(0f64),
    }
}

fn store_elements<T>(
    array: &Array<dyn ReadableWritableListableStorageTraits>,
    raster: &Array3<f32>,
) -> Result<(), Error>
where
    T: Element + Copy + Zero + Bounded + NumCast,
{
    let cast = raster.mapv(|v| saturating_cast::<T>(v as f64));
    array.store_array_subset_ndarray::<T, _>(&[0, 0, 0], cast)?;
    Ok(())
}

/// Persist a raster into a fresh Zarr store at `path`, replacing any store
/// already there. The array keeps the raster's shape and stores `dtype`
/// elements with a zero fill value, no compression codec, and one chunk per
/// x-plane. The whole raster is written in a single pass.
pub fn write_raster(raster: &Array3<f32>, path: &Path, dtype: Dtype) -> Result<(), Error> {
    if raster.is_empty() {
        return Err(Error::EmptyRaster);
    }
    let shape: Vec<u64> = raster.shape().iter().map(|&d| d as u64).collect();

    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    let store: ReadableWritableListableStorage = Arc::new(FilesystemStore::new(path)?);

    let array = ArrayBuilder::new(
        shape.clone(),
        zarr_data_type(dtype),
        vec![1, shape[1], shape[2]]
            .try_into()
            .map_err(|_| Error::EmptyRaster)?,
        zarr_fill_value(dtype),
    )
    .bytes_to_bytes_codecs(vec![])
    .dimension_names(["x", "y", "mz"].into())
    .build(store, "/")?;
    array.store_metadata()?;

    match dtype {
        Dtype::U8 => store_elements::<u8>(&array, raster),
        Dtype::U16 => store_elements::<u16>(&array, raster),
        Dtype::U32 => store_elements::<u32>(&array, raster),
        Dtype::U64 => store_elements::<u64>(&array, raster),
        Dtype::F32 => store_elements::<f32>(&array, raster),
        Dtype::F64 => store_elements::<f64>(&array, raster),
    }?;
    info!("Wrote a {} raster of shape {:?} to {}", dtype, raster.dim(), path.display());
    Ok(())
}

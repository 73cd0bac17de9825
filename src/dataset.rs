use std::fs;
use std::path::Path;

use itertools::Itertools;
use log::{debug, info};
use mzdata::io::imzml::ImzMLReaderType;
use mzdata::prelude::*;
use ndarray::{Array2, Array3, aview1, s};
use num_traits::{Bounded, NumCast, Zero};

use crate::columnar::{ColumnarTable, Dtype, mz_column_label, saturating_cast};
use crate::error::Error;
use crate::source::{PixelCoordinate, PixelSpectrum, read_pixels};
use crate::zarr::write_raster;

/// The fixed geometry columns leading every columnar row.
pub const COORDINATE_FIELDS: [&str; 5] = [
    "x",
    "y",
    "micro_x_topleft",
    "micro_y_topleft",
    "micro_px_width",
];

/// The footprint of one acquisition pixel in microscopy units: the top-left
/// corner offset and the square pixel's edge length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MicroGeometry {
    pub x_topleft: f64,
    pub y_topleft: f64,
    pub px_width: f64,
}

/// The inclusive bounding box of the acquisition grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridExtent {
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl GridExtent {
    pub fn x_range(&self) -> usize {
        (self.x_max - self.x_min + 1) as usize
    }

    pub fn y_range(&self) -> usize {
        (self.y_max - self.y_min + 1) as usize
    }
}

fn check_resolutions(micro_res: f64, ims_res: f64) -> Result<(), Error> {
    if !(micro_res.is_finite() && micro_res > 0.0) {
        return Err(Error::Configuration(format!(
            "microscopy resolution must be a positive number, got {micro_res}"
        )));
    }
    if !(ims_res.is_finite() && ims_res > 0.0) {
        return Err(Error::Configuration(format!(
            "IMS resolution must be a positive number, got {ims_res}"
        )));
    }
    Ok(())
}

/// An imaging mass-spectrometry acquisition held as a flat sequence of
/// coordinate-bound spectra, with the resolution parameters needed to place
/// each acquisition pixel on the registered microscopy grid.
///
/// The source file is parsed exactly once, at construction. [`ImsDataset::to_columnar`]
/// and [`ImsDataset::to_array`] are pure transformations over the cached
/// sequence and may be called in any order, any number of times.
#[derive(Debug, Clone)]
pub struct ImsDataset {
    pixels: Vec<PixelSpectrum>,
    micro_res: f64,
    ims_res: f64,
    pixel_ratio: f64,
}

impl ImsDataset {
    /// Open an imzML file (with its sibling ibd file) and ingest every
    /// spectrum. `micro_res` and `ims_res` are the microscopy and IMS grid
    /// resolutions in the same spatial unit, typically microns per pixel.
    pub fn from_imzml_path(
        path: impl AsRef<Path>,
        micro_res: f64,
        ims_res: f64,
    ) -> Result<Self, Error> {
        check_resolutions(micro_res, ims_res)?;
        let path = path.as_ref();
        info!("Opening {}", path.display());
        let mut reader = ImzMLReaderType::<fs::File, fs::File>::open_path(path)?;
        let pixels = read_pixels(&mut reader)?;
        Self::from_pixels(pixels, micro_res, ims_res)
    }

    /// Build a dataset from an already-materialized spectrum sequence.
    pub fn from_pixels(
        pixels: Vec<PixelSpectrum>,
        micro_res: f64,
        ims_res: f64,
    ) -> Result<Self, Error> {
        check_resolutions(micro_res, ims_res)?;
        Ok(Self {
            pixels,
            micro_res,
            ims_res,
            pixel_ratio: ims_res / micro_res,
        })
    }

    pub fn pixels(&self) -> &[PixelSpectrum] {
        &self.pixels
    }

    /// The number of acquisition coordinates.
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn micro_res(&self) -> f64 {
        self.micro_res
    }

    pub fn ims_res(&self) -> f64 {
        self.ims_res
    }

    /// The width of one IMS pixel in microscopy pixels.
    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    /// The per-coordinate spectrum lengths, in acquisition order.
    pub fn mz_lengths(&self) -> Vec<usize> {
        self.pixels.iter().map(|p| p.mzs.len()).collect()
    }

    /// The m/z axis every coordinate is expected to share, taken from the
    /// first acquired spectrum.
    pub fn reference_mzs(&self) -> Result<&[f64], Error> {
        self.pixels
            .first()
            .map(|p| p.mzs.as_slice())
            .ok_or(Error::EmptyDataset)
    }

    /// Place an acquisition coordinate on the microscopy grid. Coordinates
    /// are 1-based, so pixel (1, 1) has its top-left corner at the origin.
    pub fn micro_geometry(&self, coordinate: PixelCoordinate) -> MicroGeometry {
        MicroGeometry {
            x_topleft: (coordinate.x as f64 - 1.0) * self.pixel_ratio,
            y_topleft: (coordinate.y as f64 - 1.0) * self.pixel_ratio,
            px_width: self.pixel_ratio,
        }
    }

    /// The bounding box over all acquisition coordinates.
    pub fn extent(&self) -> Result<GridExtent, Error> {
        let (x_min, x_max) = self
            .pixels
            .iter()
            .map(|p| p.coordinate.x)
            .minmax()
            .into_option()
            .ok_or(Error::EmptyDataset)?;
        let (y_min, y_max) = self
            .pixels
            .iter()
            .map(|p| p.coordinate.y)
            .minmax()
            .into_option()
            .ok_or(Error::EmptyDataset)?;
        Ok(GridExtent {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    /// Build the flat columnar table: one row per coordinate, the geometry
    /// columns followed by one intensity column per reference m/z bin, with
    /// labels rounded to `precision` decimal places. Every cell, geometry
    /// included, is cast to `T` with [`saturating_cast`].
    ///
    /// Each coordinate's m/z axis must match the reference axis exactly.
    /// Intensities are written by position, so an unchecked divergent axis
    /// would misalign columns silently; it is rejected instead.
    pub fn to_columnar<T>(&self, precision: u32) -> Result<ColumnarTable<T>, Error>
    where
        T: Copy + Zero + Bounded + NumCast,
    {
        let reference_mzs = self.reference_mzs()?;
        let n_geometry = COORDINATE_FIELDS.len();
        let mut values = Array2::zeros((self.pixels.len(), n_geometry + reference_mzs.len()));

        for (index, pixel) in self.pixels.iter().enumerate() {
            if pixel.intensities.len() != pixel.mzs.len() {
                return Err(Error::ShapeMismatch {
                    index,
                    n_mzs: pixel.mzs.len(),
                    n_intensities: pixel.intensities.len(),
                });
            }
            if pixel.mzs.as_slice() != reference_mzs {
                return Err(Error::MzAxisMismatch { index });
            }

            let geometry = self.micro_geometry(pixel.coordinate);
            values[[index, 0]] = saturating_cast(pixel.coordinate.x as f64);
            values[[index, 1]] = saturating_cast(pixel.coordinate.y as f64);
            values[[index, 2]] = saturating_cast(geometry.x_topleft);
            values[[index, 3]] = saturating_cast(geometry.y_topleft);
            values[[index, 4]] = saturating_cast(geometry.px_width);
            for (k, &intensity) in pixel.intensities.iter().enumerate() {
                values[[index, n_geometry + k]] = saturating_cast(intensity as f64);
            }
        }

        let mut columns: Vec<String> = COORDINATE_FIELDS.iter().map(|c| c.to_string()).collect();
        columns.extend(
            reference_mzs
                .iter()
                .map(|&mz| mz_column_label(mz, precision)),
        );

        Ok(ColumnarTable { columns, values })
    }

    /// Rasterize into a dense `(x range, y range, m/z bin)` array. Every
    /// coordinate must report the same spectrum length; grid positions that
    /// were never acquired stay zero-filled.
    pub fn to_array(&self) -> Result<Array3<f32>, Error> {
        let extent = self.extent()?;
        let lengths = self.mz_lengths();
        if !lengths.iter().all_equal() {
            return Err(Error::NonUniformSpectrum {
                lengths: lengths.into_iter().unique().sorted().collect(),
            });
        }
        let n_mz = lengths.first().copied().unwrap_or(0);

        let mut raster = Array3::zeros((extent.x_range(), extent.y_range(), n_mz));
        for (index, pixel) in self.pixels.iter().enumerate() {
            if pixel.intensities.len() != n_mz {
                return Err(Error::ShapeMismatch {
                    index,
                    n_mzs: n_mz,
                    n_intensities: pixel.intensities.len(),
                });
            }
            let x = (pixel.coordinate.x - extent.x_min) as usize;
            let y = (pixel.coordinate.y - extent.y_min) as usize;
            raster
                .slice_mut(s![x, y, ..])
                .assign(&aview1(&pixel.intensities));
        }
        debug!(
            "Rasterized {} spectra into a {:?} array",
            self.pixels.len(),
            raster.dim()
        );
        Ok(raster)
    }

    /// Rasterize and persist into a chunked array store at `path`,
    /// replacing any store already there. See [`write_raster`].
    pub fn write_zarr(&self, path: impl AsRef<Path>, dtype: Dtype) -> Result<(), Error> {
        let raster = self.to_array()?;
        write_raster(&raster, path.as_ref(), dtype)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use ndarray::array;
    use zarrs::filesystem::FilesystemStore;
    use zarrs::storage::ReadableWritableListableStorage;

    use super::*;

    fn pixel(x: u32, y: u32, mzs: &[f64], intensities: &[f32]) -> PixelSpectrum {
        PixelSpectrum {
            coordinate: PixelCoordinate { x, y, z: 1 },
            mzs: mzs.to_vec(),
            intensities: intensities.to_vec(),
        }
    }

    /// Two coordinates on one grid column, sharing a two-bin m/z axis.
    fn demo_dataset() -> ImsDataset {
        let pixels = vec![
            pixel(1, 1, &[100.0, 200.0], &[5.0, 7.0]),
            pixel(1, 2, &[100.0, 200.0], &[1.0, 2.0]),
        ];
        ImsDataset::from_pixels(pixels, 0.5, 10.0).unwrap()
    }

    #[test]
    fn test_configuration_guard() {
        assert!(matches!(
            ImsDataset::from_pixels(Vec::new(), 0.0, 10.0),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            ImsDataset::from_pixels(Vec::new(), 0.5, -1.0),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            ImsDataset::from_pixels(Vec::new(), 0.5, f64::NAN),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_micro_geometry() {
        let dataset = demo_dataset();
        assert_eq!(dataset.pixel_ratio(), 20.0);
        let geometry = dataset.micro_geometry(PixelCoordinate { x: 5, y: 3, z: 1 });
        assert_eq!(geometry.x_topleft, 80.0);
        assert_eq!(geometry.y_topleft, 40.0);
        assert_eq!(geometry.px_width, 20.0);
    }

    #[test]
    fn test_to_columnar() {
        let dataset = demo_dataset();
        let table = dataset.to_columnar::<u32>(4).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(
            table.columns,
            vec![
                "x",
                "y",
                "micro_x_topleft",
                "micro_y_topleft",
                "micro_px_width",
                "100",
                "200"
            ]
        );
        assert_eq!(
            table.values.row(0).to_vec(),
            vec![1u32, 1, 0, 0, 20, 5, 7]
        );
        assert_eq!(
            table.values.row(1).to_vec(),
            vec![1u32, 2, 0, 20, 20, 1, 2]
        );
    }

    #[test]
    fn test_to_columnar_is_idempotent() {
        let dataset = demo_dataset();
        let first = dataset.to_columnar::<u32>(4).unwrap();
        let second = dataset.to_columnar::<u32>(4).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_to_columnar_rejects_shape_mismatch() {
        let pixels = vec![
            pixel(1, 1, &[100.0, 200.0], &[5.0, 7.0]),
            pixel(1, 2, &[100.0, 200.0], &[1.0, 2.0, 3.0]),
        ];
        let dataset = ImsDataset::from_pixels(pixels, 0.5, 10.0).unwrap();
        assert!(matches!(
            dataset.to_columnar::<u32>(4),
            Err(Error::ShapeMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_to_columnar_rejects_divergent_mz_axis() {
        let pixels = vec![
            pixel(1, 1, &[100.0, 200.0], &[5.0, 7.0]),
            pixel(1, 2, &[100.0, 201.0], &[1.0, 2.0]),
        ];
        let dataset = ImsDataset::from_pixels(pixels, 0.5, 10.0).unwrap();
        assert!(matches!(
            dataset.to_columnar::<u32>(4),
            Err(Error::MzAxisMismatch { index: 1 })
        ));
    }

    #[test]
    fn test_to_array() {
        let dataset = demo_dataset();
        let raster = dataset.to_array().unwrap();
        assert_eq!(raster.dim(), (1, 2, 2));
        assert_eq!(raster.slice(s![0, 0, ..]).to_vec(), vec![5.0, 7.0]);
        assert_eq!(raster.slice(s![0, 1, ..]).to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_to_array_zero_fills_gaps() {
        let pixels = vec![
            pixel(1, 1, &[100.0, 200.0], &[5.0, 7.0]),
            pixel(3, 1, &[100.0, 200.0], &[1.0, 2.0]),
        ];
        let dataset = ImsDataset::from_pixels(pixels, 0.5, 10.0).unwrap();
        let raster = dataset.to_array().unwrap();
        assert_eq!(raster.dim(), (3, 1, 2));
        assert_eq!(raster.slice(s![0, 0, ..]).to_vec(), vec![5.0, 7.0]);
        assert_eq!(raster.slice(s![1, 0, ..]).to_vec(), vec![0.0, 0.0]);
        assert_eq!(raster.slice(s![2, 0, ..]).to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_to_array_requires_uniform_lengths() {
        let pixels = vec![
            pixel(1, 1, &[100.0, 200.0, 300.0], &[5.0, 7.0, 9.0]),
            pixel(1, 2, &[100.0, 200.0, 300.0], &[1.0, 2.0, 3.0]),
            pixel(1, 3, &[100.0, 200.0, 300.0, 400.0], &[1.0, 2.0, 3.0, 4.0]),
        ];
        let dataset = ImsDataset::from_pixels(pixels, 0.5, 10.0).unwrap();
        let err = dataset.to_array().unwrap_err();
        assert!(matches!(
            &err,
            Error::NonUniformSpectrum { lengths } if lengths == &vec![3, 4]
        ));
        assert!(err.to_string().contains("not uniform"));

        let pixels = vec![
            pixel(1, 1, &[100.0, 200.0, 300.0], &[5.0, 7.0, 9.0]),
            pixel(1, 2, &[100.0, 200.0, 300.0], &[1.0, 2.0, 3.0]),
            pixel(1, 3, &[100.0, 200.0, 300.0], &[1.0, 2.0, 3.0]),
        ];
        let dataset = ImsDataset::from_pixels(pixels, 0.5, 10.0).unwrap();
        assert_eq!(dataset.to_array().unwrap().dim(), (1, 3, 3));
    }

    #[test]
    fn test_write_zarr_round_trip() {
        let dataset = demo_dataset();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.zarr");
        dataset.write_zarr(&path, Dtype::U32).unwrap();

        let store: ReadableWritableListableStorage =
            Arc::new(FilesystemStore::new(&path).unwrap());
        let zarr = zarrs::array::Array::open(store, "/").unwrap();
        assert_eq!(zarr.shape(), &[1, 2, 2]);
        let read = zarr
            .retrieve_array_subset_ndarray::<u32>(&zarr.subset_all())
            .unwrap();
        assert_eq!(read, array![[[5u32, 7], [1, 2]]].into_dyn());
    }

    #[test]
    fn test_empty_dataset() {
        let dataset = ImsDataset::from_pixels(Vec::new(), 0.5, 10.0).unwrap();
        assert!(dataset.is_empty());
        assert!(matches!(dataset.extent(), Err(Error::EmptyDataset)));
        assert!(matches!(
            dataset.to_columnar::<u32>(4),
            Err(Error::EmptyDataset)
        ));
        assert!(matches!(dataset.to_array(), Err(Error::EmptyDataset)));
    }
}

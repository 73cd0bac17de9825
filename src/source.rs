use std::io;

use log::{debug, info};
use mzdata::io::imzml::ImzMLReaderType;
use mzdata::params::{ControlledVocabulary, ParamValue};
use mzdata::prelude::*;
use mzdata::spectrum::{MultiLayerSpectrum, ScanEvent};

use crate::error::Error;

/// IMS:1000050 "position x"
const POSITION_X: u32 = 1000050;
/// IMS:1000051 "position y"
const POSITION_Y: u32 = 1000051;
/// IMS:1000052 "position z"
const POSITION_Z: u32 = 1000052;

/// A 1-based position on the acquisition grid, as recorded in the scan
/// metadata of an imzML spectrum. The z axis is carried through but never
/// interpreted, datasets are treated as planar.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelCoordinate {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// One decoded spectrum bound to its grid position.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PixelSpectrum {
    pub coordinate: PixelCoordinate,
    pub mzs: Vec<f64>,
    pub intensities: Vec<f32>,
}

impl PixelSpectrum {
    /// The number of m/z bins in this spectrum.
    pub fn len(&self) -> usize {
        self.mzs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mzs.is_empty()
    }
}

fn ims_position(event: &ScanEvent, accession: u32) -> Option<u32> {
    event
        .params()
        .iter()
        .find(|p| {
            p.is_controlled()
                && p.controlled_vocabulary == Some(ControlledVocabulary::IMS)
                && p.accession == Some(accession)
        })
        .and_then(|p| p.value.to_u64().ok())
        .map(|v| v as u32)
}

/// Extract the grid position and the decoded m/z and intensity arrays from
/// a single spectrum. A spectrum without position parameters or without
/// binary data is malformed for imaging purposes and is rejected.
pub fn pixel_from_spectrum<C: CentroidLike, D: DeconvolutedCentroidLike>(
    spectrum: &MultiLayerSpectrum<C, D>,
) -> Result<PixelSpectrum, Error> {
    let index = spectrum.index();
    let scan = spectrum
        .acquisition()
        .first_scan()
        .ok_or(Error::MissingCoordinate { index })?;
    let x = ims_position(scan, POSITION_X).ok_or(Error::MissingCoordinate { index })?;
    let y = ims_position(scan, POSITION_Y).ok_or(Error::MissingCoordinate { index })?;
    // z is optional in practice, most planar acquisitions omit it
    let z = ims_position(scan, POSITION_Z).unwrap_or(1);

    let arrays = spectrum.raw_arrays().ok_or(Error::MissingArrays { index })?;
    let mzs = arrays.mzs()?.into_owned();
    let intensities = arrays.intensities()?.into_owned();

    Ok(PixelSpectrum {
        coordinate: PixelCoordinate { x, y, z },
        mzs,
        intensities,
    })
}

/// Drain the reader once, in acquisition order, materializing every pixel
/// spectrum. Both table and raster construction run over this cached
/// sequence so the source is never re-parsed.
pub fn read_pixels<R: io::Read + io::Seek, S: io::Read + io::Seek>(
    reader: &mut ImzMLReaderType<R, S>,
) -> Result<Vec<PixelSpectrum>, Error> {
    let mut pixels = Vec::new();
    for spectrum in reader.iter() {
        let pixel = pixel_from_spectrum(&spectrum)?;
        pixels.push(pixel);
        if pixels.len() % 5000 == 0 {
            debug!("Read {} spectra", pixels.len());
        }
    }
    info!("Read {} spectra from the source", pixels.len());
    Ok(pixels)
}

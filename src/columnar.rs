use std::fmt::{self, Display};
use std::io;
use std::str::FromStr;

use ndarray::Array2;
use num_traits::{Bounded, NumCast, Zero};

use crate::error::Error;

/// Element type selector for persisted values, covering both the CSV table
/// cells and the Zarr raster elements.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    U8,
    U16,
    #[default]
    U32,
    U64,
    F32,
    F64,
}

impl Dtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = match s.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Self::U8,
            "u16" | "uint16" => Self::U16,
            "u32" | "uint32" => Self::U32,
            "u64" | "uint64" => Self::U64,
            "f32" | "float32" => Self::F32,
            "f64" | "float64" => Self::F64,
            _ => {
                return Err(format!(
                    "unrecognized dtype {s}, accepts u8, u16, u32, u64, f32, or f64"
                ));
            }
        };
        Ok(v)
    }
}

/// Cast a value into the target cell type. Fractional values truncate
/// toward zero and out-of-range values saturate at the type's bounds, so
/// negative intensities land on the floor of unsigned targets instead of
/// wrapping. NaN maps to zero.
pub fn saturating_cast<T>(value: f64) -> T
where
    T: NumCast + Bounded + Zero,
{
    if value.is_nan() {
        return T::zero();
    }
    match num_traits::cast(value) {
        Some(v) => v,
        None if value < 0.0 => T::min_value(),
        None => T::max_value(),
    }
}

/// Render an m/z value as a column label, rounded to `precision` decimal
/// places with no trailing zeros.
pub fn mz_column_label(mz: f64, precision: u32) -> String {
    let scale = 10f64.powi(precision as i32);
    let rounded = (mz * scale).round() / scale;
    format!("{rounded}")
}

/// A flat table with one row per acquisition coordinate: the fixed geometry
/// columns followed by one intensity column per m/z bin of the reference
/// axis. Every cell shares a single element type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnarTable<T> {
    pub columns: Vec<String>,
    pub values: Array2<T>,
}

impl<T> ColumnarTable<T> {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.values.ncols()
    }
}

impl<T: Display> ColumnarTable<T> {
    /// Serialize as delimited text: a header row naming every column, then
    /// one record per coordinate, no index column.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), Error> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in self.values.rows() {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

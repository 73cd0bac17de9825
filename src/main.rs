use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Instant,
};

use clap::Parser;
use imzgrid::{Dtype, ImsDataset};

/// Convert an imzML imaging run into a columnar CSV table and a dense Zarr
/// raster, written as `<stem>.csv` and `<stem>.zarr` next to each other.
#[derive(Parser, Debug, Clone)]
struct Cli {
    /// Input imzML file path, with its sibling ibd file alongside
    filename: PathBuf,

    #[arg(
        short,
        long,
        help = "Directory to write the outputs into, defaults to the working directory"
    )]
    outdir: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = 10.0,
        help = "Spatial resolution of the IMS acquisition grid, in microns per pixel"
    )]
    ims_res: f64,

    #[arg(
        long,
        default_value_t = 0.5,
        help = "Spatial resolution of the registered microscopy image, in microns per pixel"
    )]
    micro_res: f64,

    #[arg(
        short,
        long,
        default_value_t = 4,
        help = "Decimal places kept in the m/z column labels"
    )]
    precision: u32,

    #[arg(
        short,
        long,
        default_value = "u32",
        value_parser = dtype_parser,
        help = "Element type for stored values, one of u8, u16, u32, u64, f32, or f64"
    )]
    dtype: Dtype,
}

fn dtype_parser(s: &str) -> Result<Dtype, String> {
    s.parse()
}

fn write_table(
    dataset: &ImsDataset,
    dtype: Dtype,
    precision: u32,
    path: &Path,
) -> Result<(), imzgrid::Error> {
    let handle = fs::File::create(path)?;
    match dtype {
        Dtype::U8 => dataset.to_columnar::<u8>(precision)?.write_csv(handle),
        Dtype::U16 => dataset.to_columnar::<u16>(precision)?.write_csv(handle),
        Dtype::U32 => dataset.to_columnar::<u32>(precision)?.write_csv(handle),
        Dtype::U64 => dataset.to_columnar::<u64>(precision)?.write_csv(handle),
        Dtype::F32 => dataset.to_columnar::<f32>(precision)?.write_csv(handle),
        Dtype::F64 => dataset.to_columnar::<f64>(precision)?.write_csv(handle),
    }
}

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    let outdir = cli.outdir.unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&outdir)?;
    let stem = cli
        .filename
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());

    let dataset = ImsDataset::from_imzml_path(&cli.filename, cli.micro_res, cli.ims_res)
        .inspect_err(|e| eprintln!("Failed to open data file: {e}"))?;
    eprintln!("Read {} spectra from {}", dataset.len(), cli.filename.display());

    let csv_path = outdir.join(format!("{stem}.csv"));
    write_table(&dataset, cli.dtype, cli.precision, &csv_path)?;
    eprintln!("Wrote {}", csv_path.display());

    let zarr_path = outdir.join(format!("{stem}.zarr"));
    dataset.write_zarr(&zarr_path, cli.dtype)?;
    eprintln!("Wrote {}", zarr_path.display());

    eprintln!("{:0.2} seconds elapsed", start.elapsed().as_secs_f64());
    Ok(())
}

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Float64Builder, ListArray, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::Array2;
use parquet::arrow::ArrowWriter;

// ---------------------------------------------------------------------------
// Cleaned output
// ---------------------------------------------------------------------------

/// Write a cleaned batch: `wavelength` and `flux` list columns, one row per
/// spectrum. The wavelength grid (post restriction) is repeated per row.
///
/// The data lands in a `.tmp` sibling first and is renamed into place, so a
/// failure mid-write never leaves a partial output file behind.
pub fn write_clean_file(path: &Path, wavelengths: &[f64], flux: &Array2<f64>) -> Result<()> {
    if flux.ncols() != wavelengths.len() {
        bail!(
            "cleaned flux has {} columns but the wavelength grid has {} entries",
            flux.ncols(),
            wavelengths.len()
        );
    }

    let wavelength_array = build_f64_list(std::iter::repeat(wavelengths).take(flux.nrows()));

    let mut flux_builder = ListBuilder::new(Float64Builder::new());
    for row in flux.rows() {
        let values = flux_builder.values();
        for &v in row {
            values.append_value(v);
        }
        flux_builder.append(true);
    }
    let flux_array = flux_builder.finish();

    let schema = Arc::new(Schema::new(vec![
        list_field("wavelength"),
        list_field("flux"),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(wavelength_array), Arc::new(flux_array)],
    )
    .context("building output record batch")?;

    let tmp = path.with_extension("parquet.tmp");
    let result = (|| -> Result<()> {
        let file = std::fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        let mut writer =
            ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
        writer.write(&batch).context("writing cleaned spectra")?;
        writer.close().context("closing parquet writer")?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("moving output into place at {}", path.display()))
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

// ---------------------------------------------------------------------------
// Raw input files (sample generator, tests)
// ---------------------------------------------------------------------------

/// Write a raw spectra file with the input schema the loader expects:
/// `log_wavelength`, `flux` and `ivar` list columns, one row per spectrum.
pub fn write_raw_file(
    path: &Path,
    log_wavelengths: &[f64],
    flux: &[Vec<f64>],
    ivar: &[Vec<f64>],
) -> Result<()> {
    if flux.len() != ivar.len() {
        bail!(
            "flux has {} rows but ivar has {} rows",
            flux.len(),
            ivar.len()
        );
    }

    let log_array = build_f64_list(std::iter::repeat(log_wavelengths).take(flux.len()));
    let flux_array = build_f64_list(flux.iter().map(|r| r.as_slice()));
    let ivar_array = build_f64_list(ivar.iter().map(|r| r.as_slice()));

    let schema = Arc::new(Schema::new(vec![
        list_field("log_wavelength"),
        list_field("flux"),
        list_field("ivar"),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(log_array),
            Arc::new(flux_array),
            Arc::new(ivar_array),
        ],
    )
    .context("building raw record batch")?;

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing raw spectra")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

// -- Arrow helpers --

fn list_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        false,
    )
}

fn build_f64_list<'a>(rows: impl Iterator<Item = &'a [f64]>) -> ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    builder.finish()
}

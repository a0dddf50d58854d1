use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, Float32Array, Float64Array, LargeListArray, ListArray};
use arrow::datatypes::DataType;
use ndarray::Array2;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::SpectraBatch;
use crate::error::DataError;

// ---------------------------------------------------------------------------
// Load options
// ---------------------------------------------------------------------------

/// Parameters controlling how a raw spectra file is read and trimmed.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Lower wavelength bound (inclusive), physical units.
    pub min_wavelength: f64,
    /// Upper wavelength bound (inclusive), physical units.
    pub max_wavelength: f64,
    /// Read at most this many leading rows; `None` reads everything.
    pub max_rows: Option<usize>,
    /// Drop rows whose fraction of zero-weight pixels is at or above this
    /// threshold. The default of 1.0 disables row filtering entirely, so a
    /// fully-masked row is still retained.
    pub max_masked_fraction: f64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            min_wavelength: 3500.0,
            max_wavelength: 8300.0,
            max_rows: None,
            max_masked_fraction: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a raw spectra file into a wavelength-restricted [`SpectraBatch`].
///
/// Expected Parquet schema, one row per spectrum:
/// * `log_wavelength`: List<Float64> – log10 wavelength grid (identical per row)
/// * `flux`:           List<Float64> – flux values, same length as the grid
/// * `ivar`:           List<Float64> – inverse variances, same length as the grid
///
/// The grid is exponentiated, restricted to `[min_wavelength,
/// max_wavelength]`, and the same column selection is applied to flux and
/// ivar. Rows with too many masked pixels are dropped (see
/// [`LoadOptions::max_masked_fraction`]), and the surviving inverse
/// variances are converted to amplitude weights by a square root.
pub fn load_file(path: &Path, opts: &LoadOptions) -> Result<SpectraBatch> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening spectra file {}", path.display()))?;
    let mut builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    if let Some(n) = opts.max_rows {
        // Row bound applies before any masking logic; the reader stops
        // early instead of materialising the whole table.
        builder = builder.with_limit(n);
    }
    let reader = builder.build().context("building parquet reader")?;

    let mut grid: Option<GridSelection> = None;
    let mut flux_rows: Vec<Vec<f64>> = Vec::new();
    let mut ivar_rows: Vec<Vec<f64>> = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let log_idx = schema
            .index_of("log_wavelength")
            .map_err(|_| DataError::MissingColumn("log_wavelength"))?;
        let flux_idx = schema
            .index_of("flux")
            .map_err(|_| DataError::MissingColumn("flux"))?;
        let ivar_idx = schema
            .index_of("ivar")
            .map_err(|_| DataError::MissingColumn("ivar"))?;

        let log_col = batch.column(log_idx);
        let flux_col = batch.column(flux_idx);
        let ivar_col = batch.column(ivar_idx);

        for batch_row in 0..batch.num_rows() {
            let row = flux_rows.len();

            let log_grid = extract_f64_list(log_col, batch_row, "log_wavelength")?;
            match &grid {
                None => {
                    grid = Some(GridSelection::new(
                        &log_grid,
                        opts.min_wavelength,
                        opts.max_wavelength,
                    )?);
                }
                Some(sel) => sel.check_matches(&log_grid, row)?,
            }
            let sel = grid.as_ref().unwrap();

            let flux = extract_f64_list(flux_col, batch_row, "flux")?;
            let ivar = extract_f64_list(ivar_col, batch_row, "ivar")?;
            if flux.len() != sel.full_len {
                return Err(DataError::ShapeMismatch {
                    row,
                    column: "flux",
                    got: flux.len(),
                    expected: sel.full_len,
                }
                .into());
            }
            if ivar.len() != sel.full_len {
                return Err(DataError::ShapeMismatch {
                    row,
                    column: "ivar",
                    got: ivar.len(),
                    expected: sel.full_len,
                }
                .into());
            }

            let mut flux_kept = Vec::with_capacity(sel.keep.len());
            let mut ivar_kept = Vec::with_capacity(sel.keep.len());
            for &j in &sel.keep {
                let f = flux[j];
                if !f.is_finite() {
                    return Err(DataError::NonFiniteValue {
                        row,
                        pixel: j,
                        column: "flux",
                        value: f,
                    }
                    .into());
                }
                let w = ivar[j];
                if !w.is_finite() {
                    return Err(DataError::NonFiniteValue {
                        row,
                        pixel: j,
                        column: "ivar",
                        value: w,
                    }
                    .into());
                }
                if w < 0.0 {
                    return Err(DataError::NegativeWeight {
                        row,
                        pixel: j,
                        value: w,
                    }
                    .into());
                }
                flux_kept.push(f);
                ivar_kept.push(w);
            }
            flux_rows.push(flux_kept);
            ivar_rows.push(ivar_kept);
        }
    }

    let sel = match grid {
        Some(sel) => sel,
        None => return Err(DataError::EmptyBatch.into()),
    };
    let n_pixels = sel.keep.len();

    // Completeness filter. A threshold of 1.0 (the default) is a sentinel
    // meaning "keep everything", so even a fully-masked row survives it.
    let filtering = opts.max_masked_fraction < 1.0;
    let mut flux_flat = Vec::new();
    let mut weight_flat = Vec::new();
    let mut n_kept = 0usize;
    for (flux, ivar) in flux_rows.iter().zip(&ivar_rows) {
        if filtering {
            let masked = ivar.iter().filter(|&&w| w == 0.0).count();
            let fraction = masked as f64 / n_pixels as f64;
            if fraction >= opts.max_masked_fraction {
                continue;
            }
        }
        flux_flat.extend_from_slice(flux);
        weight_flat.extend(ivar.iter().map(|&w| w.sqrt()));
        n_kept += 1;
    }
    log::debug!(
        "loaded {} of {} spectra ({} pixels in [{}, {}])",
        n_kept,
        flux_rows.len(),
        n_pixels,
        opts.min_wavelength,
        opts.max_wavelength
    );

    let flux = Array2::from_shape_vec((n_kept, n_pixels), flux_flat)
        .context("assembling flux table")?;
    let weights = Array2::from_shape_vec((n_kept, n_pixels), weight_flat)
        .context("assembling weight table")?;
    Ok(SpectraBatch::new(sel.wavelengths, flux, weights)?)
}

// ---------------------------------------------------------------------------
// Wavelength grid selection
// ---------------------------------------------------------------------------

/// The exponentiated grid restricted to the wavelength bounds, plus the
/// column indices that survive the restriction.
struct GridSelection {
    wavelengths: Vec<f64>,
    keep: Vec<usize>,
    full_len: usize,
    log_grid: Vec<f64>,
}

impl GridSelection {
    fn new(log_grid: &[f64], min_wavelength: f64, max_wavelength: f64) -> Result<Self> {
        let full: Vec<f64> = log_grid.iter().map(|&lw| 10f64.powf(lw)).collect();
        if full.windows(2).any(|w| w[0] >= w[1]) {
            bail!("log_wavelength grid is not strictly increasing");
        }

        let keep: Vec<usize> = full
            .iter()
            .enumerate()
            .filter(|(_, &w)| w >= min_wavelength && w <= max_wavelength)
            .map(|(j, _)| j)
            .collect();
        if keep.is_empty() {
            bail!(
                "wavelength range [{min_wavelength}, {max_wavelength}] selects no pixels \
                 (grid spans [{:.1}, {:.1}])",
                full.first().copied().unwrap_or(f64::NAN),
                full.last().copied().unwrap_or(f64::NAN),
            );
        }
        let wavelengths = keep.iter().map(|&j| full[j]).collect();
        Ok(Self {
            wavelengths,
            keep,
            full_len: full.len(),
            log_grid: log_grid.to_vec(),
        })
    }

    /// Every row must carry the same grid as the first.
    fn check_matches(&self, log_grid: &[f64], row: usize) -> Result<()> {
        if log_grid.len() != self.full_len {
            return Err(DataError::ShapeMismatch {
                row,
                column: "log_wavelength",
                got: log_grid.len(),
                expected: self.full_len,
            }
            .into());
        }
        if log_grid != self.log_grid.as_slice() {
            bail!("row {row}: log_wavelength grid differs from the first row's");
        }
        Ok(())
    }
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize, name: &'static str) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("row {row}: null '{name}' list");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("'{name}' must be a List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        if f64_arr.null_count() > 0 {
            bail!("row {row}: null value inside '{name}' list");
        }
        Ok(f64_arr.values().to_vec())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        if f32_arr.null_count() > 0 {
            bail!("row {row}: null value inside '{name}' list");
        }
        Ok(f32_arr.values().iter().map(|&v| v as f64).collect())
    } else {
        bail!(
            "'{name}' inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

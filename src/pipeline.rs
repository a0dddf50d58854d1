use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};

use crate::basis::WeightedBasis;
use crate::blend::blend;
use crate::data::loader::{load_file, LoadOptions};
use crate::data::writer::write_clean_file;

// ---------------------------------------------------------------------------
// Pipeline options
// ---------------------------------------------------------------------------

/// Everything the per-file pipeline needs besides the paths.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub load: LoadOptions,
    /// Number of basis components for the weighted fit.
    pub n_components: usize,
    /// Blend exponent `p`; larger values trust sub-maximal pixels more.
    pub blend_exponent: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            load: LoadOptions::default(),
            n_components: 200,
            blend_exponent: 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-file pipeline
// ---------------------------------------------------------------------------

/// Clean one spectra file: load → fit → reconstruct → blend → write.
///
/// All per-file state (grid, tables, fitted model, cleaned batch) is local
/// to this function and dropped on every exit path, so peak memory stays
/// bounded to one file's working set however many files a run covers. The
/// output file is only created once the cleaned batch is fully computed.
pub fn process_file(
    input: &Path,
    output: &Path,
    opts: &PipelineOptions,
    basis: &dyn WeightedBasis,
) -> Result<()> {
    let start = Instant::now();
    let batch = load_file(input, &opts.load)
        .with_context(|| format!("loading {}", input.display()))?;
    log::info!(
        "loaded {} spectra x {} pixels from {} in {:.2?}",
        batch.n_spectra(),
        batch.n_pixels(),
        input.display(),
        start.elapsed()
    );

    let start = Instant::now();
    let model = basis
        .fit(&batch.flux, &batch.weights, opts.n_components)
        .with_context(|| format!("fitting weighted basis for {}", input.display()))?;
    log::info!(
        "fitted {} components in {:.2?}",
        opts.n_components,
        start.elapsed()
    );

    let start = Instant::now();
    let reconstruction = model
        .reconstruct(&batch.flux, &batch.weights)
        .with_context(|| format!("reconstructing {}", input.display()))?;
    log::info!(
        "reconstructed {} spectra in {:.2?}",
        batch.n_spectra(),
        start.elapsed()
    );

    let cleaned = blend(
        &batch.flux,
        &batch.weights,
        &reconstruction,
        opts.blend_exponent,
    )
    .with_context(|| format!("blending {}", input.display()))?;

    let start = Instant::now();
    write_clean_file(output, &batch.wavelengths, &cleaned)
        .with_context(|| format!("writing {}", output.display()))?;
    log::info!("wrote {} in {:.2?}", output.display(), start.elapsed());
    Ok(())
}

/// Process a list of (input, output) pairs strictly in order.
///
/// Files are independent; a data error in any file aborts the whole run
/// (no partial-skip recovery), leaving earlier outputs in place and never
/// leaving a partial file for the failed one.
pub fn run(
    files: &[(PathBuf, PathBuf)],
    opts: &PipelineOptions,
    basis: &dyn WeightedBasis,
) -> Result<()> {
    for (input, output) in files {
        process_file(input, output, opts, basis)?;
    }
    Ok(())
}

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::data::loader::LoadOptions;
use crate::error::InputError;
use crate::pipeline::PipelineOptions;

/// Suffix inserted before the extension of each output file.
const OUTPUT_SUFFIX: &str = "_clean";

// ---------------------------------------------------------------------------
// Argument surface
// ---------------------------------------------------------------------------

/// Denoise batches of 1-D spectra with a weighted low-rank basis fit.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Raw spectra files to clean (.parquet)
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Number of basis components for the weighted fit
    #[arg(short = 'n', long, default_value_t = 200)]
    pub components: usize,

    /// Blend exponent p; larger values keep more raw flux
    #[arg(short = 'p', long, default_value_t = 2.0)]
    pub exponent: f64,

    /// Only read the first N spectra of each file
    #[arg(long, value_name = "N")]
    pub max_rows: Option<usize>,

    /// Lower wavelength bound (inclusive)
    #[arg(long, default_value_t = 3500.0)]
    pub min_wavelength: f64,

    /// Upper wavelength bound (inclusive)
    #[arg(long, default_value_t = 8300.0)]
    pub max_wavelength: f64,

    /// Drop rows whose masked-pixel fraction reaches this value
    /// (1.0 keeps every row)
    #[arg(long, default_value_t = 1.0)]
    pub max_masked_fraction: f64,
}

impl Args {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            load: LoadOptions {
                min_wavelength: self.min_wavelength,
                max_wavelength: self.max_wavelength,
                max_rows: self.max_rows,
                max_masked_fraction: self.max_masked_fraction,
            },
            n_components: self.components,
            blend_exponent: self.exponent,
        }
    }
}

// ---------------------------------------------------------------------------
// Input validation + output path derivation
// ---------------------------------------------------------------------------

/// Validate every input up front and pair it with its output path.
///
/// All inputs are checked before any file is processed, so a batch job
/// with a typo in the last path fails immediately instead of after hours
/// of work.
pub fn plan_files(inputs: &[PathBuf]) -> Result<Vec<(PathBuf, PathBuf)>, InputError> {
    let mut planned = Vec::with_capacity(inputs.len());
    for input in inputs {
        let ext = input
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if ext != "parquet" && ext != "pq" {
            return Err(InputError::WrongExtension(input.clone()));
        }
        if !input.exists() {
            return Err(InputError::NotFound(input.clone()));
        }
        planned.push((input.clone(), derive_output_path(input)));
    }
    Ok(planned)
}

/// `spectra.parquet` → `spectra_clean.parquet`.
fn derive_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("spectra");
    let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("parquet");
    input.with_file_name(format!("{stem}{OUTPUT_SUFFIX}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_gets_suffix_before_extension() {
        let out = derive_output_path(Path::new("/data/spectra100000.parquet"));
        assert_eq!(out, PathBuf::from("/data/spectra100000_clean.parquet"));
    }

    #[test]
    fn wrong_extension_is_rejected_before_existence_check() {
        let err = plan_files(&[PathBuf::from("spectra.hdf5")]).unwrap_err();
        assert!(matches!(err, InputError::WrongExtension(_)));
    }

    #[test]
    fn missing_file_is_rejected() {
        let err = plan_files(&[PathBuf::from("/no/such/file.parquet")]).unwrap_err();
        assert!(matches!(err, InputError::NotFound(_)));
    }

    #[test]
    fn any_bad_input_fails_the_whole_plan() {
        let dir = tempfile::TempDir::new().unwrap();
        let good = dir.path().join("good.parquet");
        std::fs::write(&good, b"").unwrap();

        let err =
            plan_files(&[good, PathBuf::from("/no/such/file.parquet")]).unwrap_err();
        assert!(matches!(err, InputError::NotFound(_)));
    }

    #[test]
    fn defaults_match_documented_parameters() {
        let args = Args::parse_from(["spectra-clean", "in.parquet"]);
        let opts = args.pipeline_options();
        assert_eq!(opts.n_components, 200);
        assert_eq!(opts.blend_exponent, 2.0);
        assert_eq!(opts.load.min_wavelength, 3500.0);
        assert_eq!(opts.load.max_wavelength, 8300.0);
        assert_eq!(opts.load.max_masked_fraction, 1.0);
        assert_eq!(opts.load.max_rows, None);
    }
}

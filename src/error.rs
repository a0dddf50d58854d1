use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// InputError – pre-flight validation of command-line inputs
// ---------------------------------------------------------------------------

/// Problems with an input path, detected before any file is processed.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input file does not exist: {0}")]
    NotFound(PathBuf),

    #[error("input file {0} does not have a .parquet/.pq extension")]
    WrongExtension(PathBuf),
}

// ---------------------------------------------------------------------------
// DataError – malformed or inconsistent spectral data
// ---------------------------------------------------------------------------

/// Malformed or inconsistent array data encountered mid-pipeline.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("missing '{0}' column in spectra file")]
    MissingColumn(&'static str),

    #[error("row {row}: '{column}' has {got} values, expected {expected}")]
    ShapeMismatch {
        row: usize,
        column: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("row {row}, pixel {pixel}: negative inverse variance {value}")]
    NegativeWeight {
        row: usize,
        pixel: usize,
        value: f64,
    },

    #[error("row {row}, pixel {pixel}: non-finite '{column}' value {value}")]
    NonFiniteValue {
        row: usize,
        pixel: usize,
        column: &'static str,
        value: f64,
    },

    #[error("{requested} components requested but batch has only {pixels} pixels")]
    BadComponentCount { requested: usize, pixels: usize },

    #[error("blend exponent must be positive, got {0}")]
    BadExponent(f64),

    #[error("no spectra left after selection and filtering")]
    EmptyBatch,
}

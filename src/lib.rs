//! Weighted-PCA denoiser for batches of 1-D spectra.
//!
//! A batch of flux measurements over a shared wavelength grid is restricted
//! to a physical wavelength range, filtered for rows with too much missing
//! data, fitted with a weighted low-rank basis, and blended back with the
//! raw measurements in proportion to local signal quality. Batches live in
//! Parquet files with per-row list columns.

pub mod basis;
pub mod blend;
pub mod cli;
pub mod data;
pub mod error;
pub mod pipeline;

pub use basis::wpca::WpcaBasis;
pub use basis::{BasisModel, WeightedBasis};
pub use data::loader::LoadOptions;
pub use data::model::SpectraBatch;
pub use error::{DataError, InputError};
pub use pipeline::PipelineOptions;

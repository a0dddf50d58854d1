/// Data layer: batch types, loading, and persistence.
///
/// Architecture:
/// ```text
///  raw .parquet (log_wavelength / flux / ivar)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  restrict wavelengths, filter rows, sqrt weights
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ SpectraBatch  │  wavelength grid + flux/weight tables
///   └──────────────┘
///        │  (fit → reconstruct → blend)
///        ▼
///   ┌──────────┐
///   │  writer   │  cleaned .parquet (wavelength / flux)
///   └──────────┘
/// ```
pub mod loader;
pub mod model;
pub mod writer;

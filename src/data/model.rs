use ndarray::Array2;

use crate::error::DataError;

// ---------------------------------------------------------------------------
// SpectraBatch – one file's worth of wavelength-restricted spectra
// ---------------------------------------------------------------------------

/// A rectangular batch of spectra over a shared wavelength grid.
///
/// Rows are individual spectra, columns are wavelength pixels. `weights`
/// holds amplitude-like values (square root of inverse variance); a weight
/// of exactly 0 marks a masked pixel. The batch is immutable after loading
/// and lives only for one file's processing.
#[derive(Debug, Clone)]
pub struct SpectraBatch {
    /// Wavelength per pixel, strictly increasing, shared by all rows.
    pub wavelengths: Vec<f64>,
    /// Flux values, shape (n_spectra, n_pixels).
    pub flux: Array2<f64>,
    /// Amplitude weights, same shape as `flux`, all values >= 0.
    pub weights: Array2<f64>,
}

impl SpectraBatch {
    /// Assemble a batch, checking the shape invariants.
    ///
    /// `weights` must already be amplitude-like (the loader applies the
    /// square-root transform before constructing the batch).
    pub fn new(
        wavelengths: Vec<f64>,
        flux: Array2<f64>,
        weights: Array2<f64>,
    ) -> Result<Self, DataError> {
        if flux.dim() != weights.dim() {
            return Err(DataError::ShapeMismatch {
                row: 0,
                column: "ivar",
                got: weights.ncols(),
                expected: flux.ncols(),
            });
        }
        if flux.ncols() != wavelengths.len() {
            return Err(DataError::ShapeMismatch {
                row: 0,
                column: "flux",
                got: flux.ncols(),
                expected: wavelengths.len(),
            });
        }
        if flux.nrows() == 0 {
            return Err(DataError::EmptyBatch);
        }
        for ((row, pixel), &w) in weights.indexed_iter() {
            if !w.is_finite() {
                return Err(DataError::NonFiniteValue {
                    row,
                    pixel,
                    column: "weight",
                    value: w,
                });
            }
            if w < 0.0 {
                return Err(DataError::NegativeWeight {
                    row,
                    pixel,
                    value: w,
                });
            }
        }
        Ok(Self {
            wavelengths,
            flux,
            weights,
        })
    }

    /// Number of spectra (rows).
    pub fn n_spectra(&self) -> usize {
        self.flux.nrows()
    }

    /// Number of wavelength pixels (columns).
    pub fn n_pixels(&self) -> usize {
        self.flux.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    #[test]
    fn rejects_shape_mismatch() {
        let flux = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let weights = arr2(&[[1.0], [1.0]]);
        assert!(matches!(
            SpectraBatch::new(vec![4000.0, 5000.0], flux, weights),
            Err(DataError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_grid_length_mismatch() {
        let flux = arr2(&[[1.0, 2.0]]);
        let weights = arr2(&[[1.0, 1.0]]);
        assert!(matches!(
            SpectraBatch::new(vec![4000.0], flux, weights),
            Err(DataError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_empty_batch() {
        let flux = Array2::<f64>::zeros((0, 2));
        let weights = Array2::<f64>::zeros((0, 2));
        assert!(matches!(
            SpectraBatch::new(vec![4000.0, 5000.0], flux, weights),
            Err(DataError::EmptyBatch)
        ));
    }

    #[test]
    fn rejects_non_finite_weights() {
        let flux = arr2(&[[1.0, 2.0]]);
        let weights = arr2(&[[1.0, f64::NAN]]);
        assert!(matches!(
            SpectraBatch::new(vec![4000.0, 5000.0], flux, weights),
            Err(DataError::NonFiniteValue { row: 0, pixel: 1, .. })
        ));

        let flux = arr2(&[[1.0, 2.0]]);
        let weights = arr2(&[[f64::INFINITY, 1.0]]);
        assert!(matches!(
            SpectraBatch::new(vec![4000.0, 5000.0], flux, weights),
            Err(DataError::NonFiniteValue { row: 0, pixel: 0, .. })
        ));
    }

    #[test]
    fn rejects_negative_weights() {
        let flux = arr2(&[[1.0, 2.0]]);
        let weights = arr2(&[[1.0, -0.5]]);
        assert!(matches!(
            SpectraBatch::new(vec![4000.0, 5000.0], flux, weights),
            Err(DataError::NegativeWeight { row: 0, pixel: 1, .. })
        ));
    }

    #[test]
    fn accepts_consistent_batch() {
        let flux = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let weights = arr2(&[[1.0, 0.0], [0.5, 2.0]]);
        let batch = SpectraBatch::new(vec![4000.0, 5000.0], flux, weights).unwrap();
        assert_eq!(batch.n_spectra(), 2);
        assert_eq!(batch.n_pixels(), 2);
    }
}

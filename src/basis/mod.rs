/// Low-rank basis layer: the fit/reconstruct seam and its default backend.
///
/// The pipeline only speaks to the two traits below, so any weighted
/// decomposition (a LAPACK-backed PCA, a GPU factorisation, ...) can be
/// swapped in without touching the loader or the blender.
pub mod wpca;

use ndarray::Array2;

use crate::error::DataError;

/// A fitted low-rank representation of a spectra batch.
pub trait BasisModel {
    /// Best low-rank approximation of each row of `flux` under the given
    /// per-pixel weights. The batch may differ from the one used for
    /// fitting (held-out reconstruction), but must have the same pixel
    /// count.
    fn reconstruct(
        &self,
        flux: &Array2<f64>,
        weights: &Array2<f64>,
    ) -> Result<Array2<f64>, DataError>;
}

/// A weighted low-rank decomposition backend.
pub trait WeightedBasis {
    /// Fit `n_components` basis vectors to the batch. `n_components` must
    /// be at least 1 and at most the pixel count.
    fn fit(
        &self,
        flux: &Array2<f64>,
        weights: &Array2<f64>,
        n_components: usize,
    ) -> Result<Box<dyn BasisModel>, DataError>;
}

use ndarray::{Array1, Array2, Axis, Zip};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{BasisModel, WeightedBasis};
use crate::error::DataError;

// ---------------------------------------------------------------------------
// Weighted PCA (Delchambre 2014 style)
// ---------------------------------------------------------------------------

/// Weighted principal-component backend.
///
/// Builds the weighted covariance of the batch
/// (`C_jk = Σ_i (w x')_ij (w x')_ik / Σ_i w_ij w_ik` on mean-centred data)
/// and extracts its leading eigenvectors by block power iteration, all in
/// plain `ndarray`. Pixels with zero weight contribute nothing to either
/// the mean or the covariance, so masked data cannot steer the fit.
#[derive(Debug, Clone)]
pub struct WpcaBasis {
    /// Power-iteration sweep cap.
    pub max_iterations: usize,
    /// Relative convergence tolerance on the eigenvalue estimates.
    pub tolerance: f64,
    /// Seed for the random subspace start; fixed for reproducible fits.
    pub seed: u64,
}

impl Default for WpcaBasis {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-10,
            seed: 0x5bd1_e995,
        }
    }
}

impl WeightedBasis for WpcaBasis {
    fn fit(
        &self,
        flux: &Array2<f64>,
        weights: &Array2<f64>,
        n_components: usize,
    ) -> Result<Box<dyn BasisModel>, DataError> {
        let (_, n_pixels) = flux.dim();
        if weights.dim() != flux.dim() {
            return Err(DataError::ShapeMismatch {
                row: 0,
                column: "ivar",
                got: weights.ncols(),
                expected: n_pixels,
            });
        }
        if n_components == 0 || n_components > n_pixels {
            return Err(DataError::BadComponentCount {
                requested: n_components,
                pixels: n_pixels,
            });
        }

        // Weighted per-pixel mean; a pixel masked in every row gets 0.
        let weighted_flux = flux * weights;
        let numer = weighted_flux.sum_axis(Axis(0));
        let denom = weights.sum_axis(Axis(0));
        let mean = Zip::from(&numer)
            .and(&denom)
            .map_collect(|&n, &d| if d > 0.0 { n / d } else { 0.0 });

        // Weighted covariance of the centred batch.
        let centred = flux - &mean;
        let wx = &centred * weights;
        let cov_numer = wx.t().dot(&wx);
        let cov_denom = weights.t().dot(weights);
        let cov = Zip::from(&cov_numer)
            .and(&cov_denom)
            .map_collect(|&n, &d| if d > 0.0 { n / d } else { 0.0 });

        let components = top_eigenvectors(
            &cov,
            n_components,
            self.max_iterations,
            self.tolerance,
            self.seed,
        );

        log::debug!(
            "fitted {} weighted principal components over {} pixels",
            n_components,
            n_pixels
        );
        Ok(Box::new(WpcaModel { mean, components }))
    }
}

/// A fitted weighted-PCA model: per-pixel mean plus an orthonormal
/// component matrix of shape (n_pixels, n_components).
pub struct WpcaModel {
    mean: Array1<f64>,
    components: Array2<f64>,
}

impl BasisModel for WpcaModel {
    fn reconstruct(
        &self,
        flux: &Array2<f64>,
        weights: &Array2<f64>,
    ) -> Result<Array2<f64>, DataError> {
        let (n_rows, n_pixels) = flux.dim();
        if n_pixels != self.mean.len() {
            return Err(DataError::ShapeMismatch {
                row: 0,
                column: "flux",
                got: n_pixels,
                expected: self.mean.len(),
            });
        }
        if weights.dim() != flux.dim() {
            return Err(DataError::ShapeMismatch {
                row: 0,
                column: "ivar",
                got: weights.ncols(),
                expected: n_pixels,
            });
        }

        let mut out = Array2::zeros((n_rows, n_pixels));
        for i in 0..n_rows {
            let w2 = weights.row(i).mapv(|w| w * w);
            let centred = &flux.row(i) - &self.mean;

            // Weighted least squares for the row's coefficients:
            //   (Pᵀ diag(w²) P) c = Pᵀ diag(w²) (x − μ)
            let wp = &self.components * &w2.view().insert_axis(Axis(1));
            let normal = self.components.t().dot(&wp);
            let rhs = wp.t().dot(&centred);

            // A row with no usable pixels has a singular normal matrix and
            // falls back to the weighted mean (c = 0).
            let coeffs = cholesky_solve(&normal, &rhs)
                .unwrap_or_else(|| Array1::zeros(self.components.ncols()));

            let row = &self.mean + &self.components.dot(&coeffs);
            out.row_mut(i).assign(&row);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Block power iteration
// ---------------------------------------------------------------------------

/// Leading `k` eigenvectors of a symmetric matrix by subspace iteration
/// with Gram-Schmidt re-orthonormalisation.
fn top_eigenvectors(
    cov: &Array2<f64>,
    k: usize,
    max_iterations: usize,
    tolerance: f64,
    seed: u64,
) -> Array2<f64> {
    let p = cov.nrows();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut q = Array2::from_shape_fn((p, k), |_| rng.gen::<f64>() - 0.5);
    orthonormalize(&mut q, &mut rng);

    let mut prev = Array1::<f64>::zeros(k);
    for _ in 0..max_iterations {
        let z = cov.dot(&q);

        // Rayleigh-quotient eigenvalue estimates for the current subspace.
        let mut lambda = Array1::<f64>::zeros(k);
        for c in 0..k {
            lambda[c] = q.column(c).dot(&z.column(c));
        }

        q = z;
        orthonormalize(&mut q, &mut rng);

        let scale = lambda.iter().fold(1.0_f64, |m, &v| m.max(v.abs()));
        let delta = (&lambda - &prev).iter().fold(0.0_f64, |m, &v| m.max(v.abs()));
        if delta <= tolerance * scale {
            break;
        }
        prev = lambda;
    }
    q
}

/// In-place modified Gram-Schmidt. A column that collapses to (numerical)
/// zero, which happens when `k` exceeds the matrix rank, is replaced by a
/// fresh random direction orthogonal to its predecessors.
fn orthonormalize(q: &mut Array2<f64>, rng: &mut ChaCha8Rng) {
    let (p, k) = q.dim();
    for c in 0..k {
        loop {
            for b in 0..c {
                let proj = q.column(b).dot(&q.column(c));
                let prior = q.column(b).to_owned();
                q.column_mut(c).scaled_add(-proj, &prior);
            }
            let norm = q.column(c).dot(&q.column(c)).sqrt();
            if norm > 1e-12 {
                q.column_mut(c).mapv_inplace(|v| v / norm);
                break;
            }
            for r in 0..p {
                q[[r, c]] = rng.gen::<f64>() - 0.5;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Small dense Cholesky
// ---------------------------------------------------------------------------

/// Solve `m x = rhs` for a symmetric positive-definite `m`. Returns `None`
/// when the factorisation breaks down (singular or indefinite input).
fn cholesky_solve(m: &Array2<f64>, rhs: &Array1<f64>) -> Option<Array1<f64>> {
    let k = m.nrows();
    let diag_max = (0..k).fold(0.0_f64, |acc, i| acc.max(m[[i, i]].abs()));
    if diag_max <= 0.0 || !diag_max.is_finite() {
        return None;
    }
    let floor = 1e-12 * diag_max;

    let mut l = Array2::<f64>::zeros((k, k));
    for i in 0..k {
        for j in 0..=i {
            let mut sum = m[[i, j]];
            for t in 0..j {
                sum -= l[[i, t]] * l[[j, t]];
            }
            if i == j {
                if sum <= floor {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    // Forward then back substitution.
    let mut y = Array1::<f64>::zeros(k);
    for i in 0..k {
        let mut sum = rhs[i];
        for t in 0..i {
            sum -= l[[i, t]] * y[t];
        }
        y[i] = sum / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(k);
    for i in (0..k).rev() {
        let mut sum = y[i];
        for t in (i + 1)..k {
            sum -= l[[t, i]] * x[t];
        }
        x[i] = sum / l[[i, i]];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    /// Rank-1 synthetic batch: rows are multiples of one profile.
    fn rank1_batch(n_rows: usize) -> Array2<f64> {
        let profile = [1.0, 2.0, 3.0, 2.0, 1.0, 0.5];
        Array2::from_shape_fn((n_rows, profile.len()), |(i, j)| {
            (1.0 + i as f64 * 0.5) * profile[j]
        })
    }

    #[test]
    fn recovers_rank1_data_exactly() {
        let flux = rank1_batch(8);
        let weights = Array2::from_elem(flux.dim(), 1.0);
        let model = WpcaBasis::default().fit(&flux, &weights, 1).unwrap();
        let recon = model.reconstruct(&flux, &weights).unwrap();

        for (a, b) in flux.iter().zip(recon.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-8);
        }
    }

    #[test]
    fn masked_pixel_does_not_steer_fit() {
        let mut flux = rank1_batch(8);
        let mut weights = Array2::from_elem(flux.dim(), 1.0);
        let clean_value = flux[[3, 2]];
        flux[[3, 2]] = 1e6;
        weights[[3, 2]] = 0.0;

        let model = WpcaBasis::default().fit(&flux, &weights, 1).unwrap();
        let recon = model.reconstruct(&flux, &weights).unwrap();
        // The corrupted value must not leak into the fit; the model fills
        // the masked pixel in from the row's unmasked pixels.
        assert_abs_diff_eq!(recon[[3, 2]], clean_value, epsilon = 0.5);
    }

    #[test]
    fn rejects_bad_component_counts() {
        let flux = rank1_batch(4);
        let weights = Array2::from_elem(flux.dim(), 1.0);
        let basis = WpcaBasis::default();
        assert!(matches!(
            basis.fit(&flux, &weights, 0),
            Err(DataError::BadComponentCount { .. })
        ));
        assert!(matches!(
            basis.fit(&flux, &weights, flux.ncols() + 1),
            Err(DataError::BadComponentCount { .. })
        ));
    }

    #[test]
    fn all_zero_weight_row_reconstructs_to_mean() {
        let flux = rank1_batch(5);
        let mut weights = Array2::from_elem(flux.dim(), 1.0);
        weights.row_mut(2).fill(0.0);

        let model = WpcaBasis::default().fit(&flux, &weights, 2).unwrap();
        let recon = model.reconstruct(&flux, &weights).unwrap();

        // Weighted mean excludes the zeroed row.
        let active: Vec<usize> = vec![0, 1, 3, 4];
        for j in 0..flux.ncols() {
            let mean_j: f64 =
                active.iter().map(|&i| flux[[i, j]]).sum::<f64>() / active.len() as f64;
            assert_abs_diff_eq!(recon[[2, j]], mean_j, epsilon = 1e-8);
        }
    }

    #[test]
    fn held_out_reconstruction_matches_pixel_count() {
        let flux = rank1_batch(6);
        let weights = Array2::from_elem(flux.dim(), 1.0);
        let model = WpcaBasis::default().fit(&flux, &weights, 2).unwrap();

        let held_out = rank1_batch(2);
        let held_w = Array2::from_elem(held_out.dim(), 1.0);
        let recon = model.reconstruct(&held_out, &held_w).unwrap();
        assert_eq!(recon.dim(), held_out.dim());

        let narrow = arr2(&[[1.0, 2.0]]);
        let narrow_w = arr2(&[[1.0, 1.0]]);
        assert!(matches!(
            model.reconstruct(&narrow, &narrow_w),
            Err(DataError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn cholesky_solves_spd_system() {
        let m = arr2(&[[4.0, 2.0], [2.0, 3.0]]);
        let rhs = ndarray::arr1(&[2.0, 5.0]);
        let x = cholesky_solve(&m, &rhs).unwrap();
        // 4x + 2y = 2, 2x + 3y = 5 → x = -0.5, y = 2
        assert_abs_diff_eq!(x[0], -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn cholesky_rejects_singular_system() {
        let m = arr2(&[[1.0, 1.0], [1.0, 1.0]]);
        let rhs = ndarray::arr1(&[1.0, 1.0]);
        assert!(cholesky_solve(&m, &rhs).is_none());
    }
}

use ndarray::Array2;

use crate::error::DataError;

// ---------------------------------------------------------------------------
// Signal-weighted blend
// ---------------------------------------------------------------------------

/// Blend raw spectra with their low-rank reconstruction, pixel by pixel.
///
/// Per row, each pixel gets a quality score `q = |flux · weight|^(1/p)`
/// normalised by the row's maximum; the output is
/// `q_norm · flux + (1 − q_norm) · reconstruction`. High signal-to-noise
/// pixels pass through as measured, low ones lean on the smooth model.
/// The exponent `p` (default 2) controls the falloff: for a sub-maximal
/// pixel the normalised score is `r^(1/p)` with `r < 1`, which grows with
/// `p`, so larger exponents trust more of the raw flux while `p = 1`
/// leans hardest on the reconstruction for weak pixels.
///
/// A row whose maximum score is zero (every pixel has zero flux or zero
/// weight) carries no usable signal; it takes `q_norm = 0` everywhere and
/// is returned fully reconstructed, with a warning logged.
pub fn blend(
    flux: &Array2<f64>,
    weights: &Array2<f64>,
    reconstruction: &Array2<f64>,
    exponent: f64,
) -> Result<Array2<f64>, DataError> {
    if !(exponent > 0.0) {
        return Err(DataError::BadExponent(exponent));
    }
    if weights.dim() != flux.dim() {
        return Err(DataError::ShapeMismatch {
            row: 0,
            column: "ivar",
            got: weights.ncols(),
            expected: flux.ncols(),
        });
    }
    if reconstruction.dim() != flux.dim() {
        return Err(DataError::ShapeMismatch {
            row: 0,
            column: "flux",
            got: reconstruction.ncols(),
            expected: flux.ncols(),
        });
    }

    let inv_p = 1.0 / exponent;
    let mut out = Array2::zeros(flux.dim());
    let mut degenerate_rows = 0usize;

    for (i, ((flux_row, weight_row), recon_row)) in flux
        .rows()
        .into_iter()
        .zip(weights.rows())
        .zip(reconstruction.rows())
        .enumerate()
    {
        let scores: Vec<f64> = flux_row
            .iter()
            .zip(weight_row.iter())
            .map(|(&f, &w)| (f * w).abs().powf(inv_p))
            .collect();
        let max_score = scores.iter().cloned().fold(0.0_f64, f64::max);

        let mut out_row = out.row_mut(i);
        if max_score <= 0.0 {
            // No pixel carries signal; fall back to the reconstruction.
            degenerate_rows += 1;
            out_row.assign(&recon_row);
            continue;
        }
        for (j, &q) in scores.iter().enumerate() {
            let qn = q / max_score;
            out_row[j] = qn * flux_row[j] + (1.0 - qn) * recon_row[j];
        }
    }

    if degenerate_rows > 0 {
        log::warn!(
            "{degenerate_rows} row(s) had no usable signal and were fully replaced \
             by their reconstruction"
        );
    }
    Ok(out)
}

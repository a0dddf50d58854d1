use anyhow::Result;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use spectra_clean::data::writer::write_raw_file;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Box-Muller transform for normal deviates.
fn gauss(rng: &mut ChaCha8Rng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn main() -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    // Log10-spaced grid from 3000 Å to 9500 Å so the default wavelength
    // restriction [3500, 8300] trims both ends.
    let n_pixels = 800;
    let log_min = 3000.0_f64.log10();
    let log_max = 9500.0_f64.log10();
    let log_wavelengths: Vec<f64> = (0..n_pixels)
        .map(|i| log_min + (log_max - log_min) * i as f64 / (n_pixels - 1) as f64)
        .collect();
    let wavelengths: Vec<f64> = log_wavelengths.iter().map(|&lw| 10f64.powf(lw)).collect();

    // Shared emission lines: (centre Å, width Å, amplitude).
    let lines = [
        (4340.0, 20.0, 3.0),
        (4861.0, 25.0, 5.0),
        (6563.0, 30.0, 8.0),
        (5007.0, 15.0, 2.5),
    ];

    let n_spectra = 64;
    let mut flux_rows: Vec<Vec<f64>> = Vec::with_capacity(n_spectra);
    let mut ivar_rows: Vec<Vec<f64>> = Vec::with_capacity(n_spectra);

    for s in 0..n_spectra {
        let scale = 0.5 + 1.5 * (s as f64 / n_spectra as f64);
        let noise = 0.2 + 0.3 * rng.gen::<f64>();

        let mut flux = Vec::with_capacity(n_pixels);
        let mut ivar = Vec::with_capacity(n_pixels);
        for &w in &wavelengths {
            let signal: f64 = lines
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(w, mu, sigma, amp * scale))
                .sum::<f64>()
                + 1.0 * scale;
            flux.push(signal + gauss(&mut rng, 0.0, noise));
            // Roughly 3% of pixels are masked (sky lines, cosmic rays).
            if rng.gen::<f64>() < 0.03 {
                ivar.push(0.0);
            } else {
                ivar.push(1.0 / (noise * noise));
            }
        }
        flux_rows.push(flux);
        ivar_rows.push(ivar);
    }

    // One fully-masked spectrum, to exercise the completeness filter.
    ivar_rows[n_spectra / 2].iter_mut().for_each(|w| *w = 0.0);

    let output_path = "sample_spectra.parquet";
    write_raw_file(std::path::Path::new(output_path), &log_wavelengths, &flux_rows, &ivar_rows)?;

    println!(
        "Wrote {} spectra ({} pixels each) to {output_path}",
        n_spectra, n_pixels
    );
    Ok(())
}

//! Color statistics over decoded source samples.

use crate::source::PixelBuffer;

/// Per-band `(low, high)` quantiles of the sampled pixels.
///
/// `low_cut` and `high_cut` are fractions in `[0, 1)` cut from each end of
/// the histogram, e.g. `0.02` and `0.02` for a 2 % stretch. NaN samples are
/// skipped. Bands without any valid sample get `(0, 255)`. Returns an empty
/// list when there are no buffers.
pub fn auto_adjust(
    buffers: &[PixelBuffer],
    bands: usize,
    low_cut: f64,
    high_cut: f64,
) -> Vec<(f64, f64)> {
    if buffers.is_empty() || bands == 0 {
        return Vec::new();
    }

    let mut samples: Vec<Vec<f32>> = vec![Vec::new(); bands];
    for buffer in buffers {
        for pixel in buffer.pixels() {
            for (band, value) in pixel.iter().take(bands).enumerate() {
                if !value.is_nan() {
                    samples[band].push(*value);
                }
            }
        }
    }

    let low_cut = clamp_fraction(low_cut);
    let high_cut = clamp_fraction(high_cut);

    samples
        .into_iter()
        .map(|mut values| {
            if values.is_empty() {
                return (0.0, 255.0);
            }
            values.sort_unstable_by(f32::total_cmp);
            let low = quantile(&values, low_cut);
            let high = quantile(&values, 1.0 - high_cut);
            (f64::from(low), f64::from(high.max(low)))
        })
        .collect()
}

fn clamp_fraction(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 0.5)
    } else {
        0.0
    }
}

/// Nearest-rank quantile of sorted values.
fn quantile(sorted: &[f32], q: f64) -> f32 {
    let last = sorted.len() - 1;
    let index = (q * last as f64).round() as usize;
    sorted[index.min(last)]
}

//! LPC formant extraction.
//!
//! Pre-emphasised, Hann-windowed chunks are fitted with an all-pole model;
//! the pole angles of the prediction polynomial give the vocal tract
//! resonances. Root finding uses Durand-Kerner iteration on the complex
//! plane; when it fails to converge the frame simply reports no formants.

use num_complex::Complex64;

/// Pre-emphasis coefficient boosting high frequencies before the fit.
const PRE_EMPHASIS: f64 = 0.97;

/// Formants must fall inside the human range, in Hz.
const FORMANT_RANGE: (f64, f64) = (90.0, 5500.0);

/// At most this many formants are reported, ascending.
const MAX_FORMANTS: usize = 4;

const MAX_ROOT_ITERATIONS: usize = 120;
const ROOT_TOLERANCE: f64 = 1e-8;

/// Linear-prediction formant analyzer.
pub struct LpcFormantAnalyzer {
    sample_rate: f32,
    order: usize,
}

impl LpcFormantAnalyzer {
    pub fn new(sample_rate: f32) -> Self {
        // Rule of thumb: 2 + one pole pair per kHz of bandwidth
        let order = 2 + (sample_rate as usize) / 1000;
        Self { sample_rate, order }
    }

    /// Extract up to four formant frequencies from one chunk, ascending.
    /// Returns an empty list for silent or degenerate frames.
    pub fn analyze(&self, chunk: &[f32]) -> Vec<f32> {
        let order = self.order.min(chunk.len().saturating_sub(1));
        if order < 4 {
            return Vec::new();
        }

        // Pre-emphasis, then a symmetric Hann window
        let n = chunk.len();
        let mut windowed = vec![0.0f64; n];
        windowed[0] = chunk[0] as f64;
        for i in 1..n {
            windowed[i] = chunk[i] as f64 - PRE_EMPHASIS * chunk[i - 1] as f64;
        }
        for (i, w) in windowed.iter_mut().enumerate() {
            *w *= hann(i, n);
        }

        // Autocorrelation up to the model order
        let mut autocorr = vec![0.0f64; order + 1];
        for (lag, r) in autocorr.iter_mut().enumerate() {
            let mut sum = 0.0;
            for k in 0..n - lag {
                sum += windowed[k] * windowed[k + lag];
            }
            *r = sum;
        }
        if autocorr[0] <= 1e-12 {
            return Vec::new();
        }

        // Prediction polynomial a0 x^p + a1 x^(p-1) + ... with a0 = 1
        let mut coeffs = vec![0.0f64; order + 1];
        coeffs[0] = 1.0;
        for i in 1..=order {
            coeffs[i] = -autocorr[i] / (autocorr[0] + 1e-10);
        }

        let roots = match polynomial_roots(&coeffs) {
            Some(roots) => roots,
            None => return Vec::new(),
        };

        let mut formants: Vec<f32> = roots
            .iter()
            .filter(|root| root.im > 0.0)
            .map(|root| (root.im.atan2(root.re) * self.sample_rate as f64
                / (2.0 * std::f64::consts::PI)) as f32)
            .filter(|freq| (*freq as f64) > FORMANT_RANGE.0 && (*freq as f64) < FORMANT_RANGE.1)
            .collect();
        formants.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        formants.truncate(MAX_FORMANTS);
        formants
    }
}

fn hann(i: usize, n: usize) -> f64 {
    if n <= 1 {
        return 1.0;
    }
    0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos()
}

/// All complex roots of a polynomial given by descending-power coefficients
/// (leading coefficient first) via Durand-Kerner iteration.
/// None when the iteration does not converge.
pub(crate) fn polynomial_roots(coeffs: &[f64]) -> Option<Vec<Complex64>> {
    let degree = coeffs.len().saturating_sub(1);
    if degree == 0 {
        return Some(Vec::new());
    }
    let leading = coeffs[0];
    if leading == 0.0 {
        return None;
    }
    let monic: Vec<f64> = coeffs.iter().map(|c| c / leading).collect();

    // Standard starting points spread around the unit circle
    let seed = Complex64::new(0.4, 0.9);
    let mut roots: Vec<Complex64> = (0..degree).map(|i| seed.powu(i as u32 + 1)).collect();

    for _ in 0..MAX_ROOT_ITERATIONS {
        let mut max_delta = 0.0f64;
        for i in 0..degree {
            let mut denom = Complex64::new(1.0, 0.0);
            for j in 0..degree {
                if i != j {
                    denom *= roots[i] - roots[j];
                }
            }
            if denom.norm() < 1e-300 {
                // Coincident estimates: nudge apart and retry next sweep
                roots[i] += Complex64::new(1e-6, 1e-6);
                max_delta = f64::MAX;
                continue;
            }
            let delta = eval_poly(&monic, roots[i]) / denom;
            roots[i] -= delta;
            max_delta = max_delta.max(delta.norm());
        }
        if max_delta < ROOT_TOLERANCE {
            return Some(roots);
        }
    }
    None
}

fn eval_poly(coeffs: &[f64], x: Complex64) -> Complex64 {
    let mut value = Complex64::new(0.0, 0.0);
    for &c in coeffs {
        value = value * x + c;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;
    const CHUNK: usize = 512;

    #[test]
    fn test_roots_of_quadratic() {
        // x^2 + 1 = 0 -> +/- i
        let roots = polynomial_roots(&[1.0, 0.0, 1.0]).unwrap();
        assert_eq!(roots.len(), 2);
        for root in &roots {
            assert!((root.norm() - 1.0).abs() < 1e-6);
            assert!(root.re.abs() < 1e-6);
        }
    }

    #[test]
    fn test_roots_of_cubic_with_real_roots() {
        // (x - 1)(x - 2)(x + 3) = x^3 - 7x + 6
        let mut roots = polynomial_roots(&[1.0, 0.0, -7.0, 6.0]).unwrap();
        roots.sort_by(|a, b| a.re.partial_cmp(&b.re).unwrap());
        let expected = [-3.0, 1.0, 2.0];
        for (root, want) in roots.iter().zip(expected) {
            assert!((root.re - want).abs() < 1e-6, "{:?}", root);
            assert!(root.im.abs() < 1e-6);
        }
    }

    #[test]
    fn test_silence_has_no_formants() {
        let analyzer = LpcFormantAnalyzer::new(SAMPLE_RATE);
        assert!(analyzer.analyze(&vec![0.0; CHUNK]).is_empty());
    }

    #[test]
    fn test_short_frame_has_no_formants() {
        let analyzer = LpcFormantAnalyzer::new(SAMPLE_RATE);
        assert!(analyzer.analyze(&[0.1, -0.2, 0.3]).is_empty());
    }

    #[test]
    fn test_formants_sorted_in_range_and_capped() {
        let analyzer = LpcFormantAnalyzer::new(SAMPLE_RATE);
        // Vowel-ish mixture with resonant structure
        let samples: Vec<f32> = (0..CHUNK)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE;
                let two_pi = 2.0 * std::f32::consts::PI;
                0.5 * (two_pi * 700.0 * t).sin()
                    + 0.3 * (two_pi * 1200.0 * t).sin()
                    + 0.2 * (two_pi * 2600.0 * t).sin()
            })
            .collect();
        let formants = analyzer.analyze(&samples);

        assert!(formants.len() <= MAX_FORMANTS);
        for pair in formants.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        for f in &formants {
            assert!(*f > 90.0 && *f < 5500.0);
        }
    }
}

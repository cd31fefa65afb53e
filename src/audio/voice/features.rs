//! Voice quality features: harmonic-to-noise ratio and spectral shape.

/// Harmonics inspected by the HNR estimate.
const HNR_HARMONICS: usize = 10;

/// Bins around a harmonic peak counted as harmonic energy.
const HARMONIC_WINDOW: usize = 3;

/// Spectral shape and energy-distribution features of one chunk.
#[derive(Clone, Debug, Default)]
pub struct SpectralFeatures {
    /// Magnitude-weighted mean frequency (brightness), Hz.
    pub centroid: f32,
    /// Frequency below which 85% of the energy sits, Hz.
    pub rolloff: f32,
    /// Geometric / arithmetic magnitude mean (1 = noise-like, 0 = tonal).
    pub flatness: f32,
    /// Zero crossing rate of the time-domain chunk.
    pub zcr: f32,
    pub low_energy: f32,
    pub mid_energy: f32,
    pub high_energy: f32,
}

/// Harmonic-to-noise ratio in dB, clamped to [0, 40].
///
/// For each harmonic of `f0` the peak magnitude in a narrow window counts as
/// harmonic energy while the mean squared magnitude of the surrounding
/// neighbour bins counts as noise. 0.0 when unvoiced or when no neighbour
/// energy exists to compare against.
pub fn harmonic_noise_ratio(magnitude: &[f32], bin_hz: f32, f0: f32, nyquist: f32) -> f32 {
    if f0 <= 0.0 || bin_hz <= 0.0 {
        return 0.0;
    }

    let mut harmonic_energy = 0.0f32;
    let mut noise_energy = 0.0f32;

    for harmonic in 1..=HNR_HARMONICS {
        let target = f0 * harmonic as f32;
        if target > nyquist {
            break;
        }
        let idx = ((target / bin_hz).round() as usize).min(magnitude.len().saturating_sub(1));

        let start = idx.saturating_sub(HARMONIC_WINDOW);
        let end = (idx + HARMONIC_WINDOW + 1).min(magnitude.len());
        let peak = magnitude[start..end].iter().cloned().fold(0.0f32, f32::max);
        harmonic_energy += peak * peak;

        // Neighbour bins outside the peak window
        let noise_start = idx.saturating_sub(HARMONIC_WINDOW * 3);
        let noise_end = (idx + HARMONIC_WINDOW * 3 + 1).min(magnitude.len());
        let mut noise_sum = 0.0f32;
        let mut noise_count = 0usize;
        for m in &magnitude[noise_start..start] {
            noise_sum += m * m;
            noise_count += 1;
        }
        for m in &magnitude[end..noise_end] {
            noise_sum += m * m;
            noise_count += 1;
        }
        if noise_count > 0 {
            noise_energy += noise_sum / noise_count as f32;
        }
    }

    if noise_energy > 0.0 {
        let ratio = harmonic_energy / (noise_energy + 1e-10);
        (10.0 * (ratio + 1e-10).log10()).clamp(0.0, 40.0)
    } else {
        0.0
    }
}

/// Extract the spectral feature set from a chunk and its magnitude spectrum.
pub fn extract_spectral_features(
    samples: &[f32],
    magnitude: &[f32],
    bin_hz: f32,
) -> SpectralFeatures {
    let mut features = SpectralFeatures::default();

    let magnitude_sum: f32 = magnitude.iter().sum();
    if magnitude_sum > 0.0 {
        let weighted: f32 = magnitude
            .iter()
            .enumerate()
            .map(|(i, m)| i as f32 * bin_hz * m)
            .sum();
        features.centroid = weighted / magnitude_sum;
    }

    // Rolloff: smallest frequency with 85% of the squared-magnitude energy
    // at or below it
    let total_energy: f32 = magnitude.iter().map(|m| m * m).sum();
    let mut cumulative = 0.0f32;
    for (i, m) in magnitude.iter().enumerate() {
        cumulative += m * m;
        if cumulative >= 0.85 * total_energy {
            features.rolloff = i as f32 * bin_hz;
            break;
        }
    }

    if !magnitude.is_empty() {
        let log_mean =
            magnitude.iter().map(|m| (m + 1e-10).ln()).sum::<f32>() / magnitude.len() as f32;
        let arithmetic = magnitude_sum / magnitude.len() as f32;
        features.flatness = log_mean.exp() / (arithmetic + 1e-10);
    }

    features.zcr = zero_crossing_rate(samples);

    features.low_energy = band_energy(magnitude, bin_hz, 80.0, 500.0);
    features.mid_energy = band_energy(magnitude, bin_hz, 500.0, 2000.0);
    features.high_energy = band_energy(magnitude, bin_hz, 2000.0, 8000.0);

    features
}

fn band_energy(magnitude: &[f32], bin_hz: f32, low: f32, high: f32) -> f32 {
    magnitude
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            let freq = *i as f32 * bin_hz;
            freq >= low && freq <= high
        })
        .map(|(_, m)| m * m)
        .sum()
}

/// Sign-change count over the chunk, normalised by twice its length.
/// A zero sample counts as half a crossing on each side, matching the
/// sign-difference formulation.
fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let sign = |x: f32| -> f32 {
        if x > 0.0 {
            1.0
        } else if x < 0.0 {
            -1.0
        } else {
            0.0
        }
    };
    let changes: f32 = samples
        .windows(2)
        .map(|w| (sign(w[1]) - sign(w[0])).abs())
        .sum();
    changes / (2.0 * samples.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIN_HZ: f32 = 48_000.0 / 512.0;
    const NYQUIST: f32 = 24_000.0;

    #[test]
    fn test_hnr_strong_harmonics_hit_ceiling() {
        // Peaks exactly at the harmonics of 1875 Hz (bin 20) over a tiny
        // floor; spacing keeps neighbour windows clear of other harmonics
        let mut magnitude = vec![0.001f32; 257];
        for harmonic in 1..=10 {
            magnitude[20 * harmonic] = 1.0;
        }
        let hnr = harmonic_noise_ratio(&magnitude, BIN_HZ, 1875.0, NYQUIST);
        assert_eq!(hnr, 40.0);
    }

    #[test]
    fn test_hnr_flat_noise_is_low() {
        let magnitude = vec![0.1f32; 257];
        let hnr = harmonic_noise_ratio(&magnitude, BIN_HZ, 375.0, NYQUIST);
        // Peak equals neighbour mean: ratio 10 per harmonic-count scaling,
        // stays well below the ceiling
        assert!(hnr < 15.0);
    }

    #[test]
    fn test_hnr_unvoiced_is_zero() {
        let magnitude = vec![0.5f32; 257];
        assert_eq!(harmonic_noise_ratio(&magnitude, BIN_HZ, 0.0, NYQUIST), 0.0);
    }

    #[test]
    fn test_centroid_tracks_single_peak() {
        let mut magnitude = vec![0.0f32; 257];
        magnitude[10] = 1.0;
        let features = extract_spectral_features(&[0.0; 512], &magnitude, BIN_HZ);
        assert!((features.centroid - 10.0 * BIN_HZ).abs() < 1e-3);
        assert!((features.rolloff - 10.0 * BIN_HZ).abs() < 1e-3);
    }

    #[test]
    fn test_flatness_separates_tone_from_noise() {
        let mut peaky = vec![1e-6f32; 257];
        peaky[20] = 1.0;
        let flat = vec![0.5f32; 257];

        let tone = extract_spectral_features(&[0.0; 512], &peaky, BIN_HZ);
        let noise = extract_spectral_features(&[0.0; 512], &flat, BIN_HZ);
        assert!(tone.flatness < 0.1);
        assert!(noise.flatness > 0.9);
    }

    #[test]
    fn test_zcr_of_alternating_signal() {
        // Sign flips every sample: 511 full transitions of |delta sign| = 2
        let samples: Vec<f32> =
            (0..512).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let zcr = zero_crossing_rate(&samples);
        assert!((zcr - 511.0 / 512.0).abs() < 1e-3);
    }

    #[test]
    fn test_zcr_of_constant_signal_is_zero() {
        assert_eq!(zero_crossing_rate(&[0.5; 512]), 0.0);
    }

    #[test]
    fn test_band_energies_partition() {
        let mut magnitude = vec![0.0f32; 257];
        magnitude[3] = 1.0; // ~281 Hz -> low
        magnitude[10] = 1.0; // ~937 Hz -> mid
        magnitude[50] = 1.0; // ~4687 Hz -> high
        let features = extract_spectral_features(&[0.0; 512], &magnitude, BIN_HZ);
        assert_eq!(features.low_energy, 1.0);
        assert_eq!(features.mid_energy, 1.0);
        assert_eq!(features.high_energy, 1.0);
    }

    #[test]
    fn test_silence_is_all_zero() {
        let features = extract_spectral_features(&[0.0; 512], &vec![0.0; 257], BIN_HZ);
        assert_eq!(features.centroid, 0.0);
        assert_eq!(features.rolloff, 0.0);
        assert_eq!(features.zcr, 0.0);
        assert_eq!(features.low_energy, 0.0);
    }
}

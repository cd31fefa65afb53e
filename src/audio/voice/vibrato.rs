//! Vibrato detection over the recent pitch series.
//!
//! Singers modulate a sustained pitch at roughly 4-8 Hz. The voiced entries
//! of the pitch history are detrended, windowed and transformed; a dominant
//! component inside the vibrato band marks the frame as vibrato, with the
//! component's frequency as the rate.

use num_complex::Complex;
use rustfft::FftPlanner;

use crate::utils::History;

/// Vibrato rate band in Hz.
const VIBRATO_RANGE: (f32, f32) = (4.0, 8.0);

/// Minimum voiced pitch samples before analysis.
const MIN_HISTORY: usize = 20;

/// Assumed spacing of pitch history entries in seconds (~30 analysis
/// frames per second on the voice path).
const FRAME_PERIOD: f32 = 0.033;

/// Detected vibrato parameters.
#[derive(Clone, Debug, Default)]
pub struct Vibrato {
    pub detected: bool,
    /// Modulation rate in Hz.
    pub rate: f32,
    /// Vibrato energy relative to the whole modulation spectrum.
    pub strength: f32,
}

/// Spectral vibrato detector over pitch history.
pub struct VibratoDetector {
    planner: FftPlanner<f32>,
}

impl VibratoDetector {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Analyze the pitch history. None until enough voiced samples exist.
    pub fn detect(&mut self, pitch_history: &History) -> Option<Vibrato> {
        if pitch_history.len() < MIN_HISTORY {
            return None;
        }
        let pitches: Vec<f32> = pitch_history.iter().filter(|p| *p > 0.0).collect();
        if pitches.len() < MIN_HISTORY {
            return None;
        }

        // Remove the overall pitch movement, keep the modulation
        let detrended = detrend(&pitches);

        let n = detrended.len();
        let mut buffer: Vec<Complex<f32>> = detrended
            .iter()
            .enumerate()
            .map(|(i, &x)| Complex::new(x * hann(i, n), 0.0))
            .collect();
        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let bin_hz = 1.0 / (n as f32 * FRAME_PERIOD);
        let half = n / 2;

        let mut peak_magnitude = 0.0f32;
        let mut peak_freq = 0.0f32;
        let mut in_band = false;
        for k in 0..=half {
            let freq = k as f32 * bin_hz;
            if freq >= VIBRATO_RANGE.0 && freq <= VIBRATO_RANGE.1 {
                in_band = true;
                let magnitude = buffer[k].norm();
                if magnitude > peak_magnitude {
                    peak_magnitude = magnitude;
                    peak_freq = freq;
                }
            }
        }
        if !in_band {
            return Some(Vibrato::default());
        }

        let total_energy: f32 = buffer[..=half].iter().map(|c| c.norm_sqr()).sum();
        let normalised = peak_magnitude * peak_magnitude / (total_energy + 1e-10);

        Some(Vibrato {
            detected: normalised > 0.01 && peak_magnitude > 0.1,
            rate: peak_freq,
            strength: normalised,
        })
    }
}

impl Default for VibratoDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Subtract the least-squares line through the series.
fn detrend(values: &[f32]) -> Vec<f32> {
    let n = values.len() as f32;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f32>() / n;

    let mut covariance = 0.0f32;
    let mut variance = 0.0f32;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f32 - mean_x;
        covariance += dx * (y - mean_y);
        variance += dx * dx;
    }
    let slope = if variance > 0.0 { covariance / variance } else { 0.0 };

    values
        .iter()
        .enumerate()
        .map(|(i, &y)| y - (mean_y + slope * (i as f32 - mean_x)))
        .collect()
}

fn hann(i: usize, n: usize) -> f32 {
    if n <= 1 {
        return 1.0;
    }
    0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_from(values: impl Iterator<Item = f32>) -> History {
        let mut history = History::new(30);
        for v in values {
            history.push(v);
        }
        history
    }

    #[test]
    fn test_needs_enough_history() {
        let mut detector = VibratoDetector::new();
        let history = history_from((0..10).map(|_| 300.0));
        assert!(detector.detect(&history).is_none());
    }

    #[test]
    fn test_modulated_pitch_detected_near_rate() {
        let mut detector = VibratoDetector::new();
        // 300 Hz carrier with +/-6 Hz modulation at 6 Hz, sampled at ~30 fps
        let history = history_from((0..30).map(|i| {
            let t = i as f32 * FRAME_PERIOD;
            300.0 + 6.0 * (2.0 * std::f32::consts::PI * 6.0 * t).sin()
        }));

        let vibrato = detector.detect(&history).unwrap();
        assert!(vibrato.detected);
        assert!(
            vibrato.rate >= 5.0 && vibrato.rate <= 7.0,
            "rate {}",
            vibrato.rate
        );
        assert!(vibrato.strength > 0.01);
    }

    #[test]
    fn test_steady_pitch_not_vibrato() {
        let mut detector = VibratoDetector::new();
        let history = history_from((0..30).map(|_| 300.0));
        let vibrato = detector.detect(&history).unwrap();
        assert!(!vibrato.detected);
    }

    #[test]
    fn test_slow_drift_not_vibrato() {
        let mut detector = VibratoDetector::new();
        // Slow glide: removed by detrending, nothing in the 4-8 Hz band
        let history = history_from((0..30).map(|i| 280.0 + i as f32 * 1.5));
        let vibrato = detector.detect(&history).unwrap();
        assert!(!vibrato.detected);
    }
}

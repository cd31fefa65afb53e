//! Voice activity detection for mixed-music content.
//!
//! Scores the chunk spectrum by how much energy sits in the vocal core
//! (200-3500 Hz) versus the drum/bass floor (20-150 Hz), requires a tonal
//! (non-flat) vocal band, and keeps the decision asserted through short gaps
//! with a hangover counter so sustained vocals do not flicker.

use crate::utils::History;

/// Minimum RMS for the energy criterion.
const RMS_THRESHOLD: f32 = 0.005;

/// Frames the decision stays asserted after the last positive detection.
const HANGOVER_FRAMES: u32 = 12;

/// Vocal-core energies kept for the adaptive activity trend.
const ENERGY_HISTORY: usize = 10;

const VOCAL_CORE_HZ: (f32, f32) = (200.0, 3500.0);
const DRUM_BASS_HZ: (f32, f32) = (20.0, 150.0);
const HIGH_HZ: (f32, f32) = (3500.0, 8000.0);

/// Per-frame VAD decision with diagnostics.
#[derive(Clone, Debug, Default)]
pub struct VadFrame {
    pub active: bool,
    /// Vocal presence score after drum suppression, in [0, 1]-ish range.
    pub vocal_probability: f32,
    /// Vocal-core energy above 1.5x its recent median (trend diagnostic;
    /// not part of the detection disjunction).
    pub energy_active: bool,
    /// Spectral flatness of the vocal-core band.
    pub flatness: f32,
}

/// Energy/spectral-shape voice gate with hangover.
pub struct VoiceActivity {
    bin_hz: f32,
    core_energy_history: History,
    hangover: u32,
}

impl VoiceActivity {
    pub fn new(sample_rate: f32, chunk_size: usize) -> Self {
        Self {
            bin_hz: sample_rate / chunk_size as f32,
            core_energy_history: History::new(ENERGY_HISTORY),
            hangover: 0,
        }
    }

    /// Assess one chunk given its raw magnitude spectrum and RMS.
    pub fn assess(&mut self, magnitude: &[f32], rms: f32) -> VadFrame {
        let vocal_core = self.band_energy(magnitude, VOCAL_CORE_HZ);
        let drum_bass = self.band_energy(magnitude, DRUM_BASS_HZ);
        let high = self.band_energy(magnitude, HIGH_HZ);
        let total: f32 = magnitude.iter().map(|m| m * m).sum();

        let (vocal_probability, vocal_core_ratio) = if total > 1e-10 {
            let vocal_core_ratio = vocal_core / total;
            let drum_bass_ratio = drum_bass / total;
            let high_ratio = high / total;

            let vocal_score = vocal_core_ratio + high_ratio * 0.5;
            let drum_suppression = (1.0 - drum_bass_ratio * 2.0).max(0.1);
            (vocal_score * drum_suppression, vocal_core_ratio)
        } else {
            (0.0, 0.0)
        };

        self.core_energy_history.push(vocal_core);
        let energy_active = if self.core_energy_history.len() >= 5 {
            vocal_core > self.core_energy_history.median() * 1.5
        } else {
            true
        };

        let flatness = self.core_flatness(magnitude);
        let tonal = flatness < 0.8;

        let mut active = (rms > RMS_THRESHOLD && vocal_probability > 0.05 && tonal)
            || vocal_core > total * 0.02
            || vocal_core_ratio > 0.08;

        if active {
            self.hangover = HANGOVER_FRAMES;
        } else if self.hangover > 0 {
            self.hangover -= 1;
            active = true;
        }

        VadFrame {
            active,
            vocal_probability,
            energy_active,
            flatness,
        }
    }

    /// Sum of squared magnitudes over a frequency band (bounds inclusive).
    fn band_energy(&self, magnitude: &[f32], band: (f32, f32)) -> f32 {
        magnitude
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let freq = *i as f32 * self.bin_hz;
                freq >= band.0 && freq <= band.1
            })
            .map(|(_, m)| m * m)
            .sum()
    }

    /// Spectral flatness (geometric / arithmetic mean) over the vocal core.
    fn core_flatness(&self, magnitude: &[f32]) -> f32 {
        let slice: Vec<f32> = magnitude
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let freq = *i as f32 * self.bin_hz;
                freq >= VOCAL_CORE_HZ.0 && freq <= VOCAL_CORE_HZ.1
            })
            .map(|(_, m)| *m)
            .collect();
        if slice.is_empty() {
            return 1.0;
        }

        let log_mean =
            slice.iter().map(|m| (m + 1e-10).ln()).sum::<f32>() / slice.len() as f32;
        let geometric = log_mean.exp();
        let arithmetic =
            slice.iter().map(|m| m + 1e-10).sum::<f32>() / slice.len() as f32;
        geometric / (arithmetic + 1e-10)
    }

    pub fn reset(&mut self) {
        self.core_energy_history.clear();
        self.hangover = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;
    use rustfft::FftPlanner;

    const SAMPLE_RATE: f32 = 48_000.0;
    const CHUNK: usize = 512;

    fn magnitude_of(samples: &[f32]) -> Vec<f32> {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(samples.len());
        let mut buf: Vec<Complex<f32>> =
            samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
        fft.process(&mut buf);
        buf[..samples.len() / 2 + 1].iter().map(|c| c.norm()).collect()
    }

    fn sine(freq: f32, amplitude: f32) -> Vec<f32> {
        (0..CHUNK)
            .map(|i| {
                amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE).sin()
            })
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_tone_in_vocal_band_is_active() {
        let mut vad = VoiceActivity::new(SAMPLE_RATE, CHUNK);
        let samples = sine(440.0, 0.4);
        let frame = vad.assess(&magnitude_of(&samples), rms(&samples));
        assert!(frame.active);
        assert!(frame.flatness < 0.8);
    }

    #[test]
    fn test_silence_goes_inactive_after_hangover() {
        let mut vad = VoiceActivity::new(SAMPLE_RATE, CHUNK);
        let voiced = sine(440.0, 0.4);
        vad.assess(&magnitude_of(&voiced), rms(&voiced));

        let silent = vec![0.0; CHUNK];
        let magnitude = magnitude_of(&silent);
        let mut frames_asserted = 0;
        for _ in 0..HANGOVER_FRAMES + 5 {
            let frame = vad.assess(&magnitude, 0.0);
            if frame.active {
                frames_asserted += 1;
            } else {
                break;
            }
        }
        assert_eq!(frames_asserted, HANGOVER_FRAMES as usize);

        let frame = vad.assess(&magnitude, 0.0);
        assert!(!frame.active);
    }

    #[test]
    fn test_bass_heavy_frame_is_suppressed() {
        let mut vad = VoiceActivity::new(SAMPLE_RATE, CHUNK);
        // 100 Hz sits in the drum/bass band and outside the vocal core
        let samples = sine(100.0, 0.4);
        let frame = vad.assess(&magnitude_of(&samples), rms(&samples));
        assert!(frame.vocal_probability < 0.3);
    }

    #[test]
    fn test_silence_probability_is_zero() {
        let mut vad = VoiceActivity::new(SAMPLE_RATE, CHUNK);
        let frame = vad.assess(&vec![0.0; CHUNK / 2 + 1], 0.0);
        assert_eq!(frame.vocal_probability, 0.0);
        assert!(!frame.active);
    }
}

//! Drum onset detection stack.
//!
//! `DrumPipeline` runs the kick and snare detectors over each magnitude
//! spectrum, feeds their decisions into the groove analyzer and publishes a
//! unified per-frame result.

mod groove;
mod kick;
mod snare;

pub use groove::{GrooveAnalyzer, GrooveResult};
pub use kick::{KickDetector, KickResult};
pub use snare::{SnareDetector, SnareResult};

use std::collections::VecDeque;

/// Kick timestamps kept for the legacy BPM estimate.
const LEGACY_KICK_TIMES: usize = 8;

/// Unified drum detection result for one frame.
#[derive(Clone, Debug, Default)]
pub struct DrumResult {
    pub kick: KickResult,
    pub snare: SnareResult,
    pub groove: GrooveResult,
    /// max(legacy kick-interval BPM, groove stable BPM), kept for backwards
    /// compatibility with reporters that predate the groove analyzer.
    pub bpm: f32,
    pub beat_detected: bool,
    pub simultaneous_hit: bool,
    pub beat_strength: f32,
}

/// Composes kick/snare detection and groove analysis.
pub struct DrumPipeline {
    kick: KickDetector,
    snare: SnareDetector,
    groove: GrooveAnalyzer,
    kick_times: VecDeque<f64>,
    legacy_bpm: f32,
}

impl DrumPipeline {
    pub fn new(sample_rate: f32, fft_size: usize, sensitivity: f32) -> Self {
        Self {
            kick: KickDetector::new(sample_rate, fft_size, sensitivity),
            snare: SnareDetector::new(sample_rate, fft_size, sensitivity),
            groove: GrooveAnalyzer::new(),
            kick_times: VecDeque::with_capacity(LEGACY_KICK_TIMES),
            legacy_bpm: 0.0,
        }
    }

    /// Run both detectors and the groove analyzer over one magnitude frame.
    pub fn process(&mut self, magnitude: &[f32], now: f64) -> DrumResult {
        let kick = self.kick.process(magnitude, now);
        let snare = self.snare.process(magnitude, now);
        let groove = self.groove.analyze(&kick, &snare, now);

        if kick.detected {
            self.update_legacy_bpm(now);
        }

        DrumResult {
            bpm: self.legacy_bpm.max(groove.stable_bpm),
            beat_detected: kick.detected || snare.detected,
            simultaneous_hit: kick.detected && snare.detected,
            beat_strength: kick.strength.max(snare.strength),
            kick,
            snare,
            groove,
        }
    }

    /// Plain averaged kick-interval BPM, predating the groove analyzer.
    fn update_legacy_bpm(&mut self, now: f64) {
        if self.kick_times.len() == LEGACY_KICK_TIMES {
            self.kick_times.pop_front();
        }
        self.kick_times.push_back(now);

        if self.kick_times.len() < 2 {
            return;
        }
        let mut intervals = Vec::new();
        for i in 1..self.kick_times.len() {
            let interval = (self.kick_times[i] - self.kick_times[i - 1]) as f32;
            if interval > 0.3 && interval < 2.0 {
                intervals.push(interval);
            }
        }
        if !intervals.is_empty() {
            let avg = intervals.iter().sum::<f32>() / intervals.len() as f32;
            self.legacy_bpm = 60.0 / avg;
        }
    }

    /// Update onset sensitivity for both detectors (1.0 normal, 2.0
    /// aggressive).
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.kick.set_sensitivity(sensitivity);
        self.snare.set_sensitivity(sensitivity);
    }

    pub fn reset(&mut self) {
        self.kick.reset();
        self.snare.reset();
        self.groove.reset();
        self.kick_times.clear();
        self.legacy_bpm = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;
    const FFT_SIZE: usize = 2048;
    const FRAME: f64 = 512.0 / 48_000.0;

    fn quiet_spectrum() -> Vec<f32> {
        vec![0.0; FFT_SIZE / 2 + 1]
    }

    fn kick_spectrum() -> Vec<f32> {
        let mut magnitude = quiet_spectrum();
        for m in magnitude.iter_mut().take(6) {
            *m = 0.8;
        }
        magnitude
    }

    #[test]
    fn test_silence_produces_inactive_result() {
        let mut pipeline = DrumPipeline::new(SAMPLE_RATE, FFT_SIZE, 1.0);
        let mut result = DrumResult::default();
        for i in 0..60 {
            result = pipeline.process(&quiet_spectrum(), i as f64 * FRAME);
        }
        assert!(!result.beat_detected);
        assert!(!result.simultaneous_hit);
        assert_eq!(result.bpm, 0.0);
        assert_eq!(result.beat_strength, 0.0);
    }

    #[test]
    fn test_kick_train_drives_both_bpm_estimates() {
        let mut pipeline = DrumPipeline::new(SAMPLE_RATE, FFT_SIZE, 1.0);
        let mut now = 0.0;
        // Warm the flux histories
        for _ in 0..20 {
            pipeline.process(&quiet_spectrum(), now);
            now += FRAME;
        }

        // Kicks every 500 ms for 8 seconds
        let mut detections = 0;
        let mut last = DrumResult::default();
        let mut next_kick = now;
        for _ in 0..750 {
            let frame = if now >= next_kick {
                next_kick += 0.5;
                kick_spectrum()
            } else {
                quiet_spectrum()
            };
            last = pipeline.process(&frame, now);
            if last.kick.detected {
                detections += 1;
            }
            now += FRAME;
        }

        assert!(detections >= 12, "only {} kicks detected", detections);
        assert!((last.bpm - 120.0).abs() < 5.0, "bpm {}", last.bpm);
        assert!((last.groove.stable_bpm - 120.0).abs() < 5.0);
        assert!(last.groove.groove_stability > 0.8);
    }

    #[test]
    fn test_beat_flags_follow_detections() {
        let mut pipeline = DrumPipeline::new(SAMPLE_RATE, FFT_SIZE, 1.0);
        let mut now = 0.0;
        for _ in 0..30 {
            pipeline.process(&quiet_spectrum(), now);
            now += FRAME;
        }
        let result = pipeline.process(&kick_spectrum(), now);
        assert!(result.kick.detected);
        assert!(result.beat_detected);
        assert!(!result.simultaneous_hit);
        assert_eq!(result.beat_strength, result.kick.strength);
    }
}

//! Per-frame orchestration of the full analysis stack.
//!
//! `AnalyzerCore` owns every component and advances them once per incoming
//! chunk: spectrum frame, bar mapping, drum detection, voice analysis, then
//! detection-conditioned bar smoothing. Results are produced fresh each
//! frame and never mutated afterwards.

use super::drums::{DrumPipeline, DrumResult, GrooveResult, KickResult, SnareResult};
use super::spectrum::{BandMapper, BarSmoother, FrameWindower, SmoothingCues};
use super::voice::{VoiceFrameResult, VoicePipeline};
use crate::error::AnalyzerError;
use crate::utils::Config;

/// Complete analysis result for one chunk.
#[derive(Clone, Debug)]
pub struct FrameResult {
    /// Smoothed display bars, each in [0, 1].
    pub spectrum: Vec<f32>,
    pub kick: KickResult,
    pub snare: SnareResult,
    pub groove: GrooveResult,
    pub voice: VoiceFrameResult,
    /// max(legacy kick BPM, groove stable BPM).
    pub bpm: f32,
    pub beat_detected: bool,
    pub simultaneous_hit: bool,
    pub beat_strength: f32,
}

/// The real-time analysis core.
///
/// One call to [`process`](Self::process) per arriving chunk; the host's
/// monotonic clock is passed in explicitly so every per-detector timing
/// comparison uses the same reading and tests stay reproducible.
pub struct AnalyzerCore {
    chunk_size: usize,
    windower: FrameWindower,
    mapper: BandMapper,
    smoother: BarSmoother,
    drums: DrumPipeline,
    voice: VoicePipeline,
}

impl AnalyzerCore {
    pub fn new(config: &Config) -> Result<Self, AnalyzerError> {
        config.validate()?;

        let sample_rate = config.sample_rate() as f32;
        let fft_size = config.fft_size();
        let mapper = BandMapper::new(config.bars(), sample_rate, fft_size, config.max_freq());
        let smoother = BarSmoother::new(mapper.centres());

        Ok(Self {
            chunk_size: config.chunk_size(),
            windower: FrameWindower::new(fft_size),
            mapper,
            smoother,
            drums: DrumPipeline::new(sample_rate, fft_size, config.drum_sensitivity()),
            voice: VoicePipeline::new(sample_rate, config.chunk_size()),
        })
    }

    /// Analyze one chunk. `now` is a monotonic timestamp in seconds sampled
    /// once at frame entry.
    ///
    /// A chunk of the wrong length is refused: state is left untouched and a
    /// fully-populated inactive result is returned.
    pub fn process(&mut self, chunk: &[f32], now: f64) -> FrameResult {
        if chunk.len() != self.chunk_size {
            log::warn!(
                "refused chunk of {} samples (expected {})",
                chunk.len(),
                self.chunk_size
            );
            return self.inactive_frame();
        }

        let magnitude = self.windower.push_chunk(chunk);
        let bars = self.mapper.map(magnitude);

        let drums: DrumResult = self.drums.process(magnitude, now);
        let voice = self.voice.process(chunk);

        let cues = SmoothingCues {
            kick: drums.kick.detected,
            snare: drums.snare.detected,
            voice: voice.has_voice,
            singing: voice.is_singing,
        };
        let spectrum = self.smoother.smooth(bars, cues).to_vec();

        FrameResult {
            spectrum,
            kick: drums.kick,
            snare: drums.snare,
            groove: drums.groove,
            voice,
            bpm: drums.bpm,
            beat_detected: drums.beat_detected,
            simultaneous_hit: drums.simultaneous_hit,
            beat_strength: drums.beat_strength,
        }
    }

    fn inactive_frame(&self) -> FrameResult {
        FrameResult {
            spectrum: self.smoother.heights().to_vec(),
            kick: KickResult::default(),
            snare: SnareResult::default(),
            groove: GrooveResult::default(),
            voice: VoiceFrameResult::default(),
            bpm: 0.0,
            beat_detected: false,
            simultaneous_hit: false,
            beat_strength: 0.0,
        }
    }

    /// Update drum onset sensitivity (1.0 normal, 2.0 aggressive).
    pub fn set_drum_sensitivity(&mut self, sensitivity: f32) {
        self.drums.set_sensitivity(sensitivity);
    }

    /// Clear all detector state, e.g. when the audio source changes.
    pub fn reset(&mut self) {
        self.windower.reset();
        self.smoother.reset();
        self.drums.reset();
        self.voice.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SAMPLE_RATE: f32 = 48_000.0;
    const CHUNK: usize = 512;
    const FRAME: f64 = CHUNK as f64 / 48_000.0;

    fn core() -> AnalyzerCore {
        AnalyzerCore::new(&Config::default()).unwrap()
    }

    fn sine_chunk(freq: f32, amplitude: f32, offset: usize) -> Vec<f32> {
        (0..CHUNK)
            .map(|i| {
                let n = (offset + i) as f32;
                amplitude * (2.0 * std::f32::consts::PI * freq * n / SAMPLE_RATE).sin()
            })
            .collect()
    }

    #[test]
    fn test_silence_scenario() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut core = core();
        let silence = vec![0.0f32; CHUNK];
        let mut last = None;
        for i in 0..200 {
            last = Some(core.process(&silence, i as f64 * FRAME));
        }
        let result = last.unwrap();
        assert!(result.spectrum.iter().all(|&b| b == 0.0));
        assert!(!result.kick.detected);
        assert!(!result.snare.detected);
        assert!(!result.beat_detected);
        assert!(!result.voice.has_voice);
        assert_eq!(result.groove.stable_bpm, 0.0);
        assert_eq!(result.groove.groove_pattern, "insufficient_data");
        assert_eq!(result.bpm, 0.0);
    }

    #[test]
    fn test_sustained_tone_drives_voice_and_bars() {
        let mut core = core();
        let mut result = None;
        for frame in 0..300 {
            let chunk = sine_chunk(281.25, 0.5, frame * CHUNK);
            result = Some(core.process(&chunk, frame as f64 * FRAME));
        }
        let result = result.unwrap();

        // Bars bounded and the tone region lit
        assert!(result.spectrum.iter().all(|&b| (0.0..=1.0).contains(&b)));
        assert!(result.spectrum.iter().cloned().fold(0.0f32, f32::max) > 0.5);

        assert!(result.voice.has_voice);
        assert!(result.voice.pitch > 0.0);
        assert!((result.voice.pitch - 281.25).abs() < 50.0);
        assert!((0.0..=1.0).contains(&result.voice.voice_confidence));
        assert!((0.0..=40.0).contains(&result.voice.hnr));
        assert_ne!(result.voice.voice_type, "unknown");
        // A steady tone is no beat
        assert!(!result.simultaneous_hit);
    }

    #[test]
    fn test_kick_train_scenario() {
        let mut core = core();
        let mut rng = StdRng::seed_from_u64(7);

        let mut now = 0.0f64;
        let mut kicks = 0;
        let mut last = None;

        // 10 seconds: 60 Hz decaying bursts every 500 ms over a tiny noise
        // floor
        let total_frames = (10.0 / FRAME) as usize;
        for _ in 0..total_frames {
            let chunk: Vec<f32> = (0..CHUNK)
                .map(|i| {
                    let t = now + i as f64 / SAMPLE_RATE as f64;
                    let since_burst = t % 0.5;
                    let burst = if since_burst < 0.25 {
                        let envelope = (-since_burst / 0.08).exp() as f32;
                        0.6 * envelope
                            * (2.0 * std::f32::consts::PI * 60.0 * t as f32).sin()
                    } else {
                        0.0
                    };
                    burst + rng.random_range(-1e-4f32..1e-4f32)
                })
                .collect();
            let result = core.process(&chunk, now);
            if result.kick.detected {
                kicks += 1;
            }
            last = Some(result);
            now += FRAME;
        }

        let result = last.unwrap();
        assert!(kicks >= 12, "only {} kicks detected", kicks);
        assert!(
            (result.groove.stable_bpm - 120.0).abs() < 5.0,
            "stable bpm {}",
            result.groove.stable_bpm
        );
        assert!((result.bpm - 120.0).abs() < 5.0);
    }

    #[test]
    fn test_wrong_chunk_length_is_refused() {
        let mut core = core();
        let result = core.process(&vec![0.1; 100], 0.0);
        assert!(!result.beat_detected);
        assert!(!result.voice.has_voice);
        assert_eq!(result.spectrum.len(), 512);
    }

    #[test]
    fn test_zero_input_drains_all_state() {
        let mut core = core();

        // Drive activity first
        for frame in 0..60 {
            let chunk = sine_chunk(281.25, 0.5, frame * CHUNK);
            core.process(&chunk, frame as f64 * FRAME);
        }

        // Then silence until everything decays
        let silence = vec![0.0f32; CHUNK];
        let mut result = None;
        for i in 0..300 {
            result = Some(core.process(&silence, (60 + i) as f64 * FRAME));
        }
        let result = result.unwrap();
        assert!(result.spectrum.iter().all(|&b| b < 1e-3));
        assert_eq!(result.kick.display_strength, 0.0);
        assert_eq!(result.snare.display_strength, 0.0);
        assert!(!result.voice.has_voice);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut core = core();
        for frame in 0..30 {
            let chunk = sine_chunk(281.25, 0.5, frame * CHUNK);
            core.process(&chunk, frame as f64 * FRAME);
        }
        core.reset();
        let result = core.process(&vec![0.0; CHUNK], 1000.0);
        assert!(result.spectrum.iter().all(|&b| b == 0.0));
        assert!(!result.voice.has_voice);
        assert_eq!(result.groove.active_beats, 0);
    }
}

//! Voice analysis stack.
//!
//! `VoicePipeline` gates each chunk through an RMS guard and the voice
//! activity detector, then runs the full feature stack (pitch, formants,
//! HNR, spectral shape, classification, vibrato, singing score) on every
//! second active frame. Skipped frames reuse the latest pitch from history
//! with a history-depth confidence so the output never flickers.

mod classify;
mod features;
mod formants;
mod pitch;
mod vad;
mod vibrato;

pub use classify::classify_voice_type;
pub use features::{extract_spectral_features, harmonic_noise_ratio, SpectralFeatures};
pub use formants::LpcFormantAnalyzer;
pub use pitch::{frequency_to_note, PitchEstimate, YinPitchDetector};
pub use vad::{VadFrame, VoiceActivity};
pub use vibrato::{Vibrato, VibratoDetector};

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::utils::History;

/// Chunks below this RMS are dismissed without any analysis.
const RMS_FLOOR: f32 = 0.001;

/// The full stack runs every Nth active frame.
const ANALYSIS_FRAME_SKIP: u64 = 2;

/// Voiced pitch estimates kept (about one second of full-stack frames).
const PITCH_HISTORY: usize = 30;

/// HNR values kept for trend diagnostics.
const HNR_HISTORY: usize = 15;

/// Pitch history depth required before vibrato/singing analysis.
const SINGING_MIN_HISTORY: usize = 15;

/// Complete voice analysis for one frame.
#[derive(Clone, Debug)]
pub struct VoiceFrameResult {
    pub has_voice: bool,
    pub voice_confidence: f32,
    /// Fundamental in Hz; 0 when unvoiced.
    pub pitch: f32,
    pub pitch_note: Option<String>,
    pub pitch_confidence: f32,
    /// Up to four formant frequencies, ascending.
    pub formants: Vec<f32>,
    pub voice_type: &'static str,
    /// Harmonic-to-noise ratio in dB, [0, 40].
    pub hnr: f32,
    pub spectral: SpectralFeatures,
    pub is_singing: bool,
    pub vibrato: Option<Vibrato>,
    /// RMS of the chunk.
    pub vocal_energy: f32,
    pub fundamental_clarity: f32,
}

impl Default for VoiceFrameResult {
    fn default() -> Self {
        Self {
            has_voice: false,
            voice_confidence: 0.0,
            pitch: 0.0,
            pitch_note: None,
            pitch_confidence: 0.0,
            formants: Vec::new(),
            voice_type: "unknown",
            hnr: 0.0,
            spectral: SpectralFeatures::default(),
            is_singing: false,
            vibrato: None,
            vocal_energy: 0.0,
            fundamental_clarity: 0.0,
        }
    }
}

/// Composes VAD, pitch, formant, HNR, spectral, vibrato and classification
/// into one per-frame voice result.
pub struct VoicePipeline {
    sample_rate: f32,
    chunk_size: usize,
    chunk_fft: Arc<dyn Fft<f32>>,
    fft_buffer: Vec<Complex<f32>>,
    magnitude: Vec<f32>,
    vad: VoiceActivity,
    yin: YinPitchDetector,
    lpc: LpcFormantAnalyzer,
    vibrato: VibratoDetector,
    pitch_history: History,
    hnr_history: History,
    frame_counter: u64,
}

impl VoicePipeline {
    pub fn new(sample_rate: f32, chunk_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            sample_rate,
            chunk_size,
            chunk_fft: planner.plan_fft_forward(chunk_size),
            fft_buffer: vec![Complex::new(0.0, 0.0); chunk_size],
            magnitude: vec![0.0; chunk_size / 2 + 1],
            vad: VoiceActivity::new(sample_rate, chunk_size),
            yin: YinPitchDetector::new(sample_rate, chunk_size),
            lpc: LpcFormantAnalyzer::new(sample_rate),
            vibrato: VibratoDetector::new(),
            pitch_history: History::new(PITCH_HISTORY),
            hnr_history: History::new(HNR_HISTORY),
            frame_counter: 0,
        }
    }

    /// Analyze one chunk. Always returns a fully-populated result; inactive
    /// frames carry the defaults plus the measured RMS.
    pub fn process(&mut self, chunk: &[f32]) -> VoiceFrameResult {
        self.frame_counter += 1;

        let rms = (chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len().max(1) as f32).sqrt();
        let mut result = VoiceFrameResult {
            vocal_energy: rms,
            ..Default::default()
        };
        if rms < RMS_FLOOR {
            return result;
        }

        self.compute_magnitude(chunk);
        let vad_frame = self.vad.assess(&self.magnitude, rms);
        if !vad_frame.active {
            return result;
        }

        if self.frame_counter % ANALYSIS_FRAME_SKIP == 0 {
            self.detailed_analysis(chunk, rms, &mut result);
        } else {
            // Cheap frame: reuse the latest voiced pitch
            result.has_voice = true;
            if let Some(pitch) = self.pitch_history.last() {
                result.pitch = pitch;
                result.voice_confidence =
                    (self.pitch_history.len() as f32 / PITCH_HISTORY as f32).clamp(0.3, 0.7);
                result.voice_type = classify_voice_type(pitch, &[]);
            }
        }
        result
    }

    fn detailed_analysis(&mut self, chunk: &[f32], rms: f32, result: &mut VoiceFrameResult) {
        result.has_voice = true;

        let estimate = self.yin.detect(chunk, &self.pitch_history);
        result.pitch = estimate.frequency;
        result.pitch_confidence = estimate.confidence;
        result.pitch_note = estimate.note.clone();
        result.fundamental_clarity = estimate.clarity;
        if estimate.frequency > 0.0 {
            self.pitch_history.push(estimate.frequency);
        }

        result.formants = self.lpc.analyze(chunk);

        let bin_hz = self.sample_rate / self.chunk_size as f32;
        result.hnr = harmonic_noise_ratio(
            &self.magnitude,
            bin_hz,
            estimate.frequency,
            self.sample_rate / 2.0,
        );
        self.hnr_history.push(result.hnr);

        result.spectral = extract_spectral_features(chunk, &self.magnitude, bin_hz);

        result.voice_type = classify_voice_type(result.pitch, &result.formants);

        if self.pitch_history.len() >= SINGING_MIN_HISTORY {
            result.vibrato = self.vibrato.detect(&self.pitch_history);
            result.is_singing = singing_score(result) >= 4;
        }

        result.voice_confidence = overall_confidence(result, rms);

        // Safety net: a detected pitch always carries usable confidence
        if result.pitch > 0.0 && result.voice_confidence < 0.3 {
            result.voice_confidence = 0.5;
        }
    }

    fn compute_magnitude(&mut self, chunk: &[f32]) {
        for (i, slot) in self.fft_buffer.iter_mut().enumerate() {
            *slot = Complex::new(chunk.get(i).copied().unwrap_or(0.0), 0.0);
        }
        self.chunk_fft.process(&mut self.fft_buffer);
        for (i, m) in self.magnitude.iter_mut().enumerate() {
            *m = self.fft_buffer[i].norm();
        }
    }

    pub fn reset(&mut self) {
        self.vad.reset();
        self.pitch_history.clear();
        self.hnr_history.clear();
        self.frame_counter = 0;
    }
}

/// Score how much the frame looks like singing rather than speech.
fn singing_score(result: &VoiceFrameResult) -> u32 {
    let vibrato_detected = result.vibrato.as_ref().map_or(false, |v| v.detected);
    let mut score = 0;
    if result.pitch_confidence > 0.8 {
        score += 2; // Sustained, stable pitch
    }
    if result.pitch > 200.0 {
        score += 1;
    }
    if vibrato_detected {
        score += 3; // Strongest indicator
    }
    if result.hnr > 15.0 {
        score += 2; // Clear tone
    }
    if result.spectral.centroid > 1000.0 {
        score += 1;
    }
    if result.spectral.flatness < 0.5 {
        score += 1;
    }
    score
}

/// Weighted blend of every indicator that fired this frame.
fn overall_confidence(result: &VoiceFrameResult, rms: f32) -> f32 {
    let mut factors: Vec<(f32, f32)> = Vec::new();

    if result.pitch > 0.0 {
        factors.push((result.pitch_confidence.max(0.5), 3.0));
    } else if result.pitch_confidence > 0.0 {
        factors.push((result.pitch_confidence * 0.7, 2.0));
    }

    if result.hnr > 0.0 {
        factors.push(((result.hnr / 15.0).min(1.0), 2.0));
    }

    if !result.formants.is_empty() {
        factors.push(((result.formants.len() as f32 / 2.5).min(1.0), 2.5));
    }

    let tonality = (1.0 - result.spectral.flatness).max(0.0);
    if tonality > 0.1 {
        factors.push((tonality, 1.5));
    }

    let voice_energy = result.spectral.mid_energy + result.spectral.high_energy;
    let total_energy = voice_energy + result.spectral.low_energy;
    if total_energy > 0.0 {
        let voice_ratio = voice_energy / total_energy;
        if voice_ratio > 0.3 {
            factors.push((voice_ratio, 1.0));
        }
    }

    if rms > 0.002 {
        factors.push(((rms / 0.01).min(1.0), 1.0));
    }

    if factors.is_empty() {
        return if result.pitch > 0.0 { 0.5 } else { 0.0 };
    }

    let weighted: f32 = factors.iter().map(|(f, w)| f * w).sum();
    let total_weight: f32 = factors.iter().map(|(_, w)| w).sum();
    let mut confidence = weighted / total_weight;

    if factors.len() >= 3 {
        confidence *= 1.2; // Agreement bonus
    }
    if result.pitch > 0.0 && result.formants.len() >= 2 {
        confidence = confidence.max(0.4);
    }
    if result.pitch > 0.0 {
        confidence = confidence.max(0.3);
    }
    confidence.min(1.0)
}

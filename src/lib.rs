//! Real-time audio analysis core for a live spectrum/voice/beat analyzer.
//!
//! Consumes a mono 48 kHz floating-point PCM stream one 512-sample chunk at a
//! time and emits, per chunk, a [`FrameResult`] with the smoothed display
//! spectrum, kick/snare onset decisions, a tempo/groove estimate, and a voice
//! analysis (activity, pitch, formants, vibrato, voice type).
//!
//! Audio capture and rendering are external collaborators; this crate is the
//! pure DSP and detection stack. All state lives inside [`AnalyzerCore`] and
//! is advanced synchronously by [`AnalyzerCore::process`], with the caller's
//! monotonic clock threaded in explicitly so state machines stay reproducible.

pub mod audio;
pub mod error;
pub mod utils;

pub use audio::drums::{DrumPipeline, DrumResult, GrooveResult, KickResult, SnareResult};
pub use audio::voice::{frequency_to_note, VoiceFrameResult, VoicePipeline};
pub use audio::{AnalyzerCore, FrameResult};
pub use error::AnalyzerError;
pub use utils::Config;

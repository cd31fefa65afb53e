//! Analyzer error types.

use thiserror::Error;

/// Errors raised while validating an analyzer configuration.
///
/// The per-frame path never errors: components degrade to their inactive
/// defaults instead (all-zero bars, `detected: false`, empty formants).
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("bar count {0} out of range (must be 1-1024)")]
    InvalidBarCount(usize),

    #[error("chunk size must be non-zero")]
    InvalidChunkSize,

    #[error("FFT size {fft_size} must be a power of two and >= chunk size {chunk_size}")]
    InvalidFftSize { fft_size: usize, chunk_size: usize },

    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("max frequency must be positive, got {0}")]
    InvalidMaxFreq(f32),
}

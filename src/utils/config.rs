//! Configuration file management.
//!
//! Handles loading and saving analyzer settings from `~/.vox-beat.toml`.
//! Every field is optional in the file; accessors apply the defaults, so a
//! missing or partial config behaves identically to the built-in setup.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::AnalyzerError;

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const BARS_DEFAULT: usize = 512;
pub const BARS_MAX: usize = 1024;
pub const DEFAULT_MAX_FREQ: f32 = 20_000.0;

const CONFIG_TEMPLATE: &str = r#"# vox-beat configuration file

# Sample rate of the incoming mono PCM stream (only 48000 is fully validated)
# sample_rate = 48000

# Samples per analysis chunk (~94 analysis frames per second at 48 kHz)
# chunk_size = 512

# FFT window length for the spectrum frame (power of two, >= chunk_size)
# fft_size = 2048

# =============================================================================
# Display
# =============================================================================

# Number of spectrum bars (max 1024)
# bars = 512

# Highest displayed frequency in Hz (capped at Nyquist)
# max_freq = 20000

# =============================================================================
# Detection
# =============================================================================

# Drum onset sensitivity multiplier (1.0 = normal, 2.0 = aggressive)
# drum_sensitivity = 1.0
"#;

#[derive(Serialize, Deserialize, Default, Clone)]
pub struct Config {
    pub sample_rate: Option<u32>,
    pub chunk_size: Option<usize>,
    pub fft_size: Option<usize>,
    pub bars: Option<usize>,
    pub max_freq: Option<f32>,
    pub drum_sensitivity: Option<f32>,
}

impl Config {
    fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".vox-beat.toml"))
    }

    pub fn load() -> Self {
        let path = match Self::path() {
            Some(p) => p,
            None => return Self::default(),
        };

        // Create template file if it doesn't exist
        if !path.exists() {
            let _ = fs::write(&path, CONFIG_TEMPLATE);
            log::info!("Created config template at {:?}", path);
        }

        fs::read_to_string(&path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) {
        if let Some(path) = Self::path() {
            if let Ok(content) = toml::to_string(self) {
                let _ = fs::write(&path, &content);
                log::info!("Config saved to {:?}", path);
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size.unwrap_or(DEFAULT_FFT_SIZE)
    }

    pub fn bars(&self) -> usize {
        self.bars.unwrap_or(BARS_DEFAULT)
    }

    pub fn max_freq(&self) -> f32 {
        self.max_freq.unwrap_or(DEFAULT_MAX_FREQ)
    }

    pub fn drum_sensitivity(&self) -> f32 {
        self.drum_sensitivity.unwrap_or(1.0)
    }

    /// Check the configuration before the analyzer allocates its buffers.
    pub fn validate(&self) -> Result<(), AnalyzerError> {
        if self.sample_rate() == 0 {
            return Err(AnalyzerError::InvalidSampleRate(self.sample_rate()));
        }
        if self.chunk_size() == 0 {
            return Err(AnalyzerError::InvalidChunkSize);
        }
        let fft_size = self.fft_size();
        if !fft_size.is_power_of_two() || fft_size < self.chunk_size() {
            return Err(AnalyzerError::InvalidFftSize {
                fft_size,
                chunk_size: self.chunk_size(),
            });
        }
        if self.bars() == 0 || self.bars() > BARS_MAX {
            return Err(AnalyzerError::InvalidBarCount(self.bars()));
        }
        if self.max_freq() <= 0.0 {
            return Err(AnalyzerError::InvalidMaxFreq(self.max_freq()));
        }
        Ok(())
    }
}

//! Snare detection with four-band spectral flux and centroid gating.
//!
//! The bands follow the anatomy of a snare hit: shell fundamental
//! (150-400 Hz), body resonance (400-1000 Hz), wire snap (2-8 kHz) and
//! rattle (8-15 kHz, tracked for diagnostics but not gated). A detection
//! needs all three primary bands above their adaptive thresholds plus a
//! spectral centroid inside the snare's characteristic 800-6000 Hz window.

use super::kick::{band_bins, positive_flux};
use crate::utils::History;

const FLUX_HISTORY: usize = 21;
const MIN_HISTORY: usize = 10;

/// MAD scale factors for fundamental / body / snap.
const FUNDAMENTAL_SCALE: f32 = 2.5;
const BODY_SCALE: f32 = 2.3;
const SNAP_SCALE: f32 = 2.0;

/// Spectral centroid window that characterises a snare, in Hz.
const CENTROID_RANGE: (f32, f32) = (800.0, 6000.0);

/// Minimum interval between snare detections in seconds.
const MIN_SNARE_INTERVAL: f64 = 0.08;

const HOLD_TIME: f64 = 0.15;
const DECAY_RATE: f32 = 0.90;
const DISPLAY_FLOOR: f32 = 0.05;

/// Result of one snare detection pass, including diagnostics.
#[derive(Clone, Debug, Default)]
pub struct SnareResult {
    pub detected: bool,
    pub strength: f32,
    pub velocity: u8,
    pub display_strength: f32,
    pub display_velocity: u8,
    pub fundamental_flux: f32,
    pub body_flux: f32,
    pub snap_flux: f32,
    pub rattle_flux: f32,
    /// Centroid over the 150 Hz - 15 kHz region, in Hz.
    pub spectral_centroid: f32,
}

/// Four-band spectral-flux snare detector with value persistence.
pub struct SnareDetector {
    sensitivity: f32,
    bin_hz: f32,
    fundamental_bins: (usize, usize),
    body_bins: (usize, usize),
    snap_bins: (usize, usize),
    rattle_bins: (usize, usize),
    prev_magnitude: Option<Vec<f32>>,
    fundamental_flux: History,
    body_flux: History,
    snap_flux: History,
    rattle_flux: History,
    last_snare_time: f64,
    last_detection_time: f64,
    display_strength: f32,
    display_velocity: u8,
}

impl SnareDetector {
    pub fn new(sample_rate: f32, fft_size: usize, sensitivity: f32) -> Self {
        Self {
            sensitivity,
            bin_hz: sample_rate / fft_size as f32,
            fundamental_bins: band_bins(150.0, 400.0, sample_rate, fft_size),
            body_bins: band_bins(400.0, 1000.0, sample_rate, fft_size),
            snap_bins: band_bins(2000.0, 8000.0, sample_rate, fft_size),
            rattle_bins: band_bins(8000.0, 15_000.0, sample_rate, fft_size),
            prev_magnitude: None,
            fundamental_flux: History::new(FLUX_HISTORY),
            body_flux: History::new(FLUX_HISTORY),
            snap_flux: History::new(FLUX_HISTORY),
            rattle_flux: History::new(FLUX_HISTORY),
            last_snare_time: 0.0,
            last_detection_time: 0.0,
            display_strength: 0.0,
            display_velocity: 0,
        }
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity;
    }

    pub fn process(&mut self, magnitude: &[f32], now: f64) -> SnareResult {
        let (fundamental, body, snap, rattle) = match &self.prev_magnitude {
            Some(prev) => {
                let fundamental = positive_flux(magnitude, prev, self.fundamental_bins);
                let body = positive_flux(magnitude, prev, self.body_bins);
                let snap = positive_flux(magnitude, prev, self.snap_bins);
                let rattle = positive_flux(magnitude, prev, self.rattle_bins);
                self.fundamental_flux.push(fundamental);
                self.body_flux.push(body);
                self.snap_flux.push(snap);
                self.rattle_flux.push(rattle);
                (fundamental, body, snap, rattle)
            }
            None => (0.0, 0.0, 0.0, 0.0),
        };
        self.prev_magnitude = Some(magnitude.to_vec());

        let centroid = self.spectral_centroid(magnitude);

        let mut detected = false;
        let mut strength = 0.0;
        let mut velocity = 0u8;

        if self.fundamental_flux.len() >= MIN_HISTORY {
            let fundamental_threshold = self.fundamental_flux.median()
                + self.sensitivity * FUNDAMENTAL_SCALE * self.fundamental_flux.mad();
            let body_threshold =
                self.body_flux.median() + self.sensitivity * BODY_SCALE * self.body_flux.mad();
            let snap_threshold =
                self.snap_flux.median() + self.sensitivity * SNAP_SCALE * self.snap_flux.mad();

            let centroid_in_range =
                (CENTROID_RANGE.0..=CENTROID_RANGE.1).contains(&centroid);

            if fundamental > fundamental_threshold
                && body > body_threshold
                && snap > snap_threshold
                && now - self.last_snare_time > MIN_SNARE_INTERVAL
                && centroid_in_range
            {
                detected = true;

                let fundamental_strength = fundamental / (fundamental_threshold + 1e-6);
                let body_strength = body / (body_threshold + 1e-6);
                let snap_strength = snap / (snap_threshold + 1e-6);

                // Snap is the most characteristic component of a snare
                strength = (fundamental_strength * 0.2 + body_strength * 0.3
                    + snap_strength * 0.5)
                    .min(1.0);
                velocity = (strength * 127.0).round().clamp(0.0, 127.0) as u8;

                self.last_snare_time = now;
                self.last_detection_time = now;
                log::debug!(
                    "snare onset: strength {:.2} centroid {:.0} Hz",
                    strength,
                    centroid
                );
            }
        }

        if detected && strength > 0.0 {
            self.display_strength = strength;
            self.display_velocity = velocity;
        } else {
            if now - self.last_detection_time > HOLD_TIME {
                self.display_strength *= DECAY_RATE;
                self.display_velocity = (self.display_velocity as f32 * DECAY_RATE) as u8;
            }
            if self.display_strength < DISPLAY_FLOOR {
                self.display_strength = 0.0;
                self.display_velocity = 0;
            }
        }

        SnareResult {
            detected,
            strength,
            velocity,
            display_strength: self.display_strength,
            display_velocity: self.display_velocity,
            fundamental_flux: fundamental,
            body_flux: body,
            snap_flux: snap,
            rattle_flux: rattle,
            spectral_centroid: centroid,
        }
    }

    /// Magnitude-weighted mean frequency over the snare-relevant region
    /// (fundamental low edge up to the rattle high edge).
    fn spectral_centroid(&self, magnitude: &[f32]) -> f32 {
        let start = self.fundamental_bins.0;
        let end = self.rattle_bins.1.min(magnitude.len());
        if start >= end {
            return 0.0;
        }

        let mut weighted = 0.0f32;
        let mut total = 0.0f32;
        for (i, &m) in magnitude[start..end].iter().enumerate() {
            weighted += (start + i) as f32 * self.bin_hz * m;
            total += m;
        }
        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.prev_magnitude = None;
        self.fundamental_flux.clear();
        self.body_flux.clear();
        self.snap_flux.clear();
        self.rattle_flux.clear();
        self.last_snare_time = 0.0;
        self.last_detection_time = 0.0;
        self.display_strength = 0.0;
        self.display_velocity = 0;
    }
}

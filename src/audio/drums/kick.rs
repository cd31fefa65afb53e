//! Kick drum detection with multi-band spectral flux.
//!
//! Three bands cover the anatomy of a kick:
//! 1. Sub-bass punch (20-60 Hz) - the "thump"
//! 2. Kick body (60-120 Hz) - the "punch"
//! 3. Beater click (2-5 kHz) - the attack transient
//!
//! Each band tracks its positive spectral flux in a short history; a robust
//! median + MAD threshold per band gates the onset decision. Detections must
//! clear both sub and body thresholds and a 100 ms refractory interval.
//! Display values persist after a hit: held briefly, then decayed per frame.

use crate::utils::History;

/// Length of the per-band flux history used for the adaptive threshold.
const FLUX_HISTORY: usize = 21;

/// Minimum flux history before detections are allowed.
const MIN_HISTORY: usize = 10;

/// MAD scale factor shared by all three bands.
const THRESHOLD_SCALE: f32 = 2.8;

/// Minimum interval between kick detections in seconds.
const MIN_KICK_INTERVAL: f64 = 0.1;

/// Seconds the display values hold before decaying.
const HOLD_TIME: f64 = 0.2;

/// Per-frame decay applied to display values after the hold period.
const DECAY_RATE: f32 = 0.92;

/// Display strength below this is snapped to zero.
const DISPLAY_FLOOR: f32 = 0.05;

/// Result of one kick detection pass, including diagnostics.
#[derive(Clone, Debug, Default)]
pub struct KickResult {
    pub detected: bool,
    /// Instantaneous onset strength in [0, 1]; 0 when not detected.
    pub strength: f32,
    /// MIDI-style velocity in [0, 127]; 0 when not detected.
    pub velocity: u8,
    /// Held + decayed strength for display.
    pub display_strength: f32,
    pub display_velocity: u8,
    pub sub_flux: f32,
    pub body_flux: f32,
    pub click_flux: f32,
    pub sub_threshold: f32,
    pub body_threshold: f32,
}

/// Multi-band spectral-flux kick detector with value persistence.
pub struct KickDetector {
    sensitivity: f32,
    sub_bins: (usize, usize),
    body_bins: (usize, usize),
    click_bins: (usize, usize),
    prev_magnitude: Option<Vec<f32>>,
    sub_flux: History,
    body_flux: History,
    click_flux: History,
    last_kick_time: f64,
    last_detection_time: f64,
    display_strength: f32,
    display_velocity: u8,
}

impl KickDetector {
    pub fn new(sample_rate: f32, fft_size: usize, sensitivity: f32) -> Self {
        Self {
            sensitivity,
            sub_bins: band_bins(20.0, 60.0, sample_rate, fft_size),
            body_bins: band_bins(60.0, 120.0, sample_rate, fft_size),
            click_bins: band_bins(2000.0, 5000.0, sample_rate, fft_size),
            prev_magnitude: None,
            sub_flux: History::new(FLUX_HISTORY),
            body_flux: History::new(FLUX_HISTORY),
            click_flux: History::new(FLUX_HISTORY),
            last_kick_time: 0.0,
            last_detection_time: 0.0,
            display_strength: 0.0,
            display_velocity: 0,
        }
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity;
    }

    /// Process one magnitude spectrum and decide whether a kick onset starts
    /// at this frame. `now` is the monotonic frame timestamp in seconds.
    pub fn process(&mut self, magnitude: &[f32], now: f64) -> KickResult {
        let (sub_flux, body_flux, click_flux) = match &self.prev_magnitude {
            Some(prev) => {
                let sub = positive_flux(magnitude, prev, self.sub_bins);
                let body = positive_flux(magnitude, prev, self.body_bins);
                let click = positive_flux(magnitude, prev, self.click_bins);
                self.sub_flux.push(sub);
                self.body_flux.push(body);
                self.click_flux.push(click);
                (sub, body, click)
            }
            // First frame: nothing to difference against
            None => (0.0, 0.0, 0.0),
        };
        self.prev_magnitude = Some(magnitude.to_vec());

        let sub_threshold = self.adaptive_threshold(&self.sub_flux);
        let body_threshold = self.adaptive_threshold(&self.body_flux);
        let click_threshold = self.adaptive_threshold(&self.click_flux);

        let mut detected = false;
        let mut strength = 0.0;
        let mut velocity = 0u8;

        let warmed_up = self.sub_flux.len() >= MIN_HISTORY && self.body_flux.len() >= MIN_HISTORY;
        if warmed_up
            && now - self.last_kick_time > MIN_KICK_INTERVAL
            && sub_flux > sub_threshold
            && body_flux > body_threshold
        {
            detected = true;

            let sub_strength = sub_flux / (sub_threshold + 1e-6);
            let body_strength = body_flux / (body_threshold + 1e-6);
            let click_strength = if click_threshold > 0.0 {
                click_flux / (click_threshold + 1e-6)
            } else {
                0.0
            };
            strength =
                (sub_strength * 0.4 + body_strength * 0.5 + click_strength * 0.1).min(1.0);
            velocity = (strength * 127.0).round().clamp(0.0, 127.0) as u8;

            self.last_kick_time = now;
            self.last_detection_time = now;
            log::debug!("kick onset: strength {:.2} velocity {}", strength, velocity);
        }

        // Value persistence: hold, then decay, then snap to zero
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

        KickResult {
            detected,
            strength,
            velocity,
            display_strength: self.display_strength,
            display_velocity: self.display_velocity,
            sub_flux,
            body_flux,
            click_flux,
            sub_threshold,
            body_threshold,
        }
    }

    fn adaptive_threshold(&self, history: &History) -> f32 {
        if history.len() < MIN_HISTORY {
            return 0.0;
        }
        history.median() + self.sensitivity * THRESHOLD_SCALE * history.mad()
    }

    /// Clear all detection state (e.g. when the audio source changes).
    pub fn reset(&mut self) {
        self.prev_magnitude = None;
        self.sub_flux.clear();
        self.body_flux.clear();
        self.click_flux.clear();
        self.last_kick_time = 0.0;
        self.last_detection_time = 0.0;
        self.display_strength = 0.0;
        self.display_velocity = 0;
    }
}

/// FFT bin range [start, end) covering a frequency band.
pub(crate) fn band_bins(
    low_hz: f32,
    high_hz: f32,
    sample_rate: f32,
    fft_size: usize,
) -> (usize, usize) {
    let bin_count = fft_size / 2 + 1;
    let start = (low_hz * fft_size as f32 / sample_rate) as usize;
    let end = ((high_hz * fft_size as f32 / sample_rate) as usize).min(bin_count);
    (start.min(bin_count), end)
}

/// Sum of positive magnitude differences over a bin range.
pub(crate) fn positive_flux(magnitude: &[f32], prev: &[f32], bins: (usize, usize)) -> f32 {
    let (start, end) = bins;
    let end = end.min(magnitude.len()).min(prev.len());
    if start >= end {
        return 0.0;
    }
    magnitude[start..end]
        .iter()
        .zip(&prev[start..end])
        .map(|(m, p)| (m - p).max(0.0))
        .sum()
}

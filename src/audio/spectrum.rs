//! Spectrum frame production and display-bar mapping.
//!
//! `FrameWindower` maintains a rolling window over the incoming chunks and
//! produces the Hann-windowed FFT magnitude spectrum. `BandMapper` projects
//! that spectrum onto display bars with a piecewise frequency allocation that
//! spends most bars on the low end. `BarSmoother` applies per-bar
//! attack/release smoothing conditioned on the current detection results.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Lowest displayed frequency in Hz.
const FREQ_MIN: f32 = 20.0;

/// Rolling FFT frame over fixed-size input chunks.
///
/// Keeps a ring of 2x the FFT size; each call appends one chunk and
/// transforms the newest `fft_size` samples.
pub struct FrameWindower {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    ring: Vec<f32>,
    write_pos: usize,
    fft_buffer: Vec<Complex<f32>>,
    magnitude: Vec<f32>,
}

impl FrameWindower {
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Pre-compute Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / fft_size as f32).cos()))
            .collect();

        Self {
            fft,
            fft_size,
            window,
            ring: vec![0.0; fft_size * 2],
            write_pos: 0,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            magnitude: vec![0.0; fft_size / 2 + 1],
        }
    }

    /// Append one chunk and return the magnitude spectrum of the newest
    /// `fft_size` samples (`fft_size / 2 + 1` bins).
    pub fn push_chunk(&mut self, chunk: &[f32]) -> &[f32] {
        let ring_len = self.ring.len();
        for &sample in chunk {
            self.ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % ring_len;
        }

        // Compose the newest fft_size samples in natural order, windowed
        let start = (self.write_pos + ring_len - self.fft_size) % ring_len;
        for i in 0..self.fft_size {
            let sample = self.ring[(start + i) % ring_len];
            self.fft_buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        for (i, value) in self.magnitude.iter_mut().enumerate() {
            *value = self.fft_buffer[i].norm();
        }
        &self.magnitude
    }

    pub fn reset(&mut self) {
        self.ring.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
        self.magnitude.iter_mut().for_each(|m| *m = 0.0);
    }
}

/// Immutable mapping from display bars to FFT bin ranges.
///
/// Allocation: 60% of bars cover 20-500 Hz (40% of those linearly spaced over
/// 20-80 Hz, the rest over 80-500 Hz), 30% cover 500-5000 Hz log-spaced, and
/// the remaining 10% cover 5000 Hz up to `max_freq` log-spaced. Bars whose
/// band is narrower than one bin fall back to the single nearest bin.
pub struct BandMapper {
    bins: Vec<(usize, usize)>,
    ranges_hz: Vec<(f32, f32)>,
    values: Vec<f32>,
}

impl BandMapper {
    pub fn new(bars: usize, sample_rate: f32, fft_size: usize, max_freq: f32) -> Self {
        let nyquist = sample_rate / 2.0;
        let freq_max = max_freq.min(nyquist);

        let low_end_bars = (bars as f32 * 0.6) as usize;
        let mid_bars = (bars as f32 * 0.3) as usize;
        let high_bars = bars - low_end_bars - mid_bars;
        let sub_bass_bars = (low_end_bars as f32 * 0.4) as usize;
        let bass_bars = low_end_bars - sub_bass_bars;

        let sub_edges = linspace(FREQ_MIN, 80.0, sub_bass_bars + 1);
        let bass_edges = linspace(80.0, 500.0, bass_bars + 1);
        let mid_edges = logspace(500.0, 5000.0, mid_bars + 1);
        let high_edges = logspace(5000.0, freq_max, high_bars + 1);

        let mut edges = Vec::with_capacity(bars + 1);
        edges.extend_from_slice(&sub_edges[..sub_edges.len() - 1]);
        edges.extend_from_slice(&bass_edges[..bass_edges.len() - 1]);
        edges.extend_from_slice(&mid_edges[..mid_edges.len() - 1]);
        edges.extend_from_slice(&high_edges);

        let bin_hz = sample_rate / fft_size as f32;
        let bin_count = fft_size / 2 + 1;

        let mut bins = Vec::with_capacity(bars);
        let mut ranges_hz = Vec::with_capacity(bars);
        for i in 0..bars {
            let lo = edges[i];
            let hi = edges[i + 1];

            // Bins whose centre frequency falls in [lo, hi)
            let start = (lo / bin_hz).ceil() as usize;
            let end = ((hi / bin_hz).ceil() as usize).min(bin_count);

            if start < end {
                bins.push((start, end));
            } else {
                // Narrower than one bin: nearest bin to the band midpoint
                let mid = (lo + hi) / 2.0;
                let nearest = ((mid / bin_hz).round() as usize).min(bin_count - 1);
                bins.push((nearest, nearest + 1));
            }
            ranges_hz.push((lo, hi));
        }

        Self {
            bins,
            ranges_hz,
            values: vec![0.0; bars],
        }
    }

    /// Average the magnitude bins of every bar, then normalise the bank so
    /// the per-frame maximum equals 1 (all zeros stay all zeros).
    pub fn map(&mut self, magnitude: &[f32]) -> &[f32] {
        for (i, &(start, end)) in self.bins.iter().enumerate() {
            let end = end.min(magnitude.len());
            self.values[i] = if start < end {
                magnitude[start..end].iter().sum::<f32>() / (end - start) as f32
            } else {
                0.0
            };
        }

        let max = self.values.iter().cloned().fold(0.0f32, f32::max);
        if max > 0.0 {
            for value in &mut self.values {
                *value /= max;
            }
        }
        &self.values
    }

    pub fn bars(&self) -> usize {
        self.bins.len()
    }

    /// Nominal frequency range of a bar.
    pub fn bar_range_hz(&self, bar: usize) -> (f32, f32) {
        self.ranges_hz[bar]
    }

    /// Centre frequencies of every bar, used by the smoother.
    pub fn centres(&self) -> Vec<f32> {
        self.ranges_hz.iter().map(|(lo, hi)| (lo + hi) / 2.0).collect()
    }
}

/// Detection flags that condition the smoothing response.
#[derive(Clone, Copy, Default)]
pub struct SmoothingCues {
    pub kick: bool,
    pub snare: bool,
    pub voice: bool,
    pub singing: bool,
}

/// Per-bar attack/release smoothing of the normalised bar bank.
///
/// Attack and release depend on the bar's centre frequency; active kick,
/// snare, voice and singing detections sharpen the attack of their regions.
pub struct BarSmoother {
    heights: Vec<f32>,
    centres: Vec<f32>,
}

impl BarSmoother {
    pub fn new(centres: Vec<f32>) -> Self {
        Self {
            heights: vec![0.0; centres.len()],
            centres,
        }
    }

    pub fn smooth(&mut self, targets: &[f32], cues: SmoothingCues) -> &[f32] {
        for (i, height) in self.heights.iter_mut().enumerate() {
            let freq = self.centres[i];
            let target = targets[i];

            let (attack, release) = if freq <= 150.0 {
                (if cues.kick { 0.95 } else { 0.7 }, 0.08)
            } else if freq <= 500.0 {
                (if cues.snare { 0.90 } else { 0.75 }, 0.12)
            } else if freq <= 2000.0 {
                (0.85 * if cues.voice { 1.2 } else { 1.0 }, 0.15)
            } else if freq <= 5000.0 {
                let voice_boost = if cues.voice { 1.3 } else { 1.0 };
                let singing_boost = if cues.singing { 1.1 } else { 1.0 };
                (0.8 * voice_boost * singing_boost, 0.18)
            } else {
                (0.75, 0.25)
            };

            let rate = if target >= *height { attack } else { release };
            *height = (*height + (target - *height) * rate).clamp(0.0, 1.0);
        }
        &self.heights
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn reset(&mut self) {
        self.heights.iter_mut().for_each(|h| *h = 0.0);
    }
}

fn linspace(start: f32, end: f32, points: usize) -> Vec<f32> {
    if points <= 1 {
        return vec![start];
    }
    let step = (end - start) / (points - 1) as f32;
    (0..points).map(|i| start + step * i as f32).collect()
}

fn logspace(start: f32, end: f32, points: usize) -> Vec<f32> {
    linspace(start.log10(), end.log10(), points)
        .into_iter()
        .map(|e| 10.0f32.powf(e))
        .collect()
}

//! Groove pattern recognition and tempo analysis.
//!
//! Kick and snare onsets feed inter-onset interval rings; the combined
//! intervals drive a median tempo estimate snapped to common BPM values, and
//! an exponentially weighted average of recent estimates gives the stable
//! BPM. Recent hits are quantised onto a 16-step grid and correlated against
//! a fixed pattern library; a confident match locks for eight seconds.

use std::collections::VecDeque;

use super::kick::KickResult;
use super::snare::SnareResult;
use crate::utils::History;

/// Hits kept for pattern quantisation.
const BEAT_GRID_CAPACITY: usize = 64;

/// Inter-onset intervals kept per drum kind.
const INTERVAL_CAPACITY: usize = 8;

/// Tempo estimates kept for the stable BPM average.
const TEMPO_CANDIDATES: usize = 16;

/// Plausible inter-onset interval range in seconds (30-300 BPM).
const INTERVAL_RANGE: (f32, f32) = (0.2, 2.0);

/// Snap targets for the tempo estimate.
const COMMON_BPMS: [f32; 13] = [
    60.0, 70.0, 80.0, 90.0, 100.0, 110.0, 120.0, 130.0, 140.0, 150.0, 160.0, 170.0, 180.0,
];

/// Maximum distance to a common BPM for snapping.
const BPM_SNAP_DISTANCE: f32 = 8.0;

/// Seconds a confidently matched pattern stays locked.
const PATTERN_LOCK_DURATION: f64 = 8.0;

/// Minimum score for a pattern to be reported at all.
const PATTERN_MATCH_FLOOR: f32 = 0.6;

/// Score at which the matched pattern locks.
const PATTERN_LOCK_SCORE: f32 = 0.8;

/// 16-step binary templates for common grooves.
const GROOVE_PATTERNS: [(&str, [u8; 16]); 8] = [
    (
        "four_four_basic",
        [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0],
    ),
    (
        "backbeat",
        [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0],
    ),
    (
        "shuffle",
        [1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 0],
    ),
    (
        "latin_clave",
        [1, 0, 0, 1, 0, 0, 1, 0, 0, 0, 1, 0, 0, 1, 0, 0],
    ),
    (
        "breakbeat",
        [1, 0, 0, 0, 1, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 1],
    ),
    (
        "drum_and_bass",
        [1, 0, 0, 0, 0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 1, 0],
    ),
    (
        "reggae",
        [0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0],
    ),
    (
        "rock_basic",
        [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0],
    ),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HitKind {
    Kick,
    Snare,
}

#[derive(Clone, Copy, Debug)]
struct Hit {
    time: f64,
    #[allow(dead_code)]
    kind: HitKind,
    #[allow(dead_code)]
    strength: f32,
}

/// Per-frame groove/tempo estimate.
#[derive(Clone, Debug)]
pub struct GrooveResult {
    pub stable_bpm: f32,
    /// Matched pattern name, or one of "unknown" / "insufficient_data" /
    /// "no_tempo".
    pub groove_pattern: &'static str,
    pub pattern_confidence: f32,
    pub beat_confidence: f32,
    pub groove_stability: f32,
    pub tempo_std: f32,
    pub active_beats: usize,
}

impl Default for GrooveResult {
    fn default() -> Self {
        Self {
            stable_bpm: 0.0,
            groove_pattern: "unknown",
            pattern_confidence: 0.0,
            beat_confidence: 0.0,
            groove_stability: 0.0,
            tempo_std: 0.0,
            active_beats: 0,
        }
    }
}

/// Tempo tracker and 16-step pattern matcher over recent drum hits.
pub struct GrooveAnalyzer {
    beat_grid: VecDeque<Hit>,
    kick_intervals: History,
    snare_intervals: History,
    tempo_candidates: History,
    last_kick_time: f64,
    last_snare_time: f64,
    stable_bpm: f32,
    groove_stability: f32,
    current_pattern: &'static str,
    pattern_confidence: f32,
    pattern_lock_time: f64,
}

impl GrooveAnalyzer {
    pub fn new() -> Self {
        Self {
            beat_grid: VecDeque::with_capacity(BEAT_GRID_CAPACITY),
            kick_intervals: History::new(INTERVAL_CAPACITY),
            snare_intervals: History::new(INTERVAL_CAPACITY),
            tempo_candidates: History::new(TEMPO_CANDIDATES),
            last_kick_time: 0.0,
            last_snare_time: 0.0,
            stable_bpm: 0.0,
            groove_stability: 0.0,
            current_pattern: "unknown",
            pattern_confidence: 0.0,
            pattern_lock_time: 0.0,
        }
    }

    /// Integrate this frame's detections and refresh the tempo and pattern
    /// estimates.
    pub fn analyze(&mut self, kick: &KickResult, snare: &SnareResult, now: f64) -> GrooveResult {
        if kick.detected {
            if self.last_kick_time > 0.0 {
                self.kick_intervals.push((now - self.last_kick_time) as f32);
            }
            self.last_kick_time = now;
            self.push_hit(Hit {
                time: now,
                kind: HitKind::Kick,
                strength: kick.strength,
            });
        }

        if snare.detected {
            if self.last_snare_time > 0.0 {
                self.snare_intervals
                    .push((now - self.last_snare_time) as f32);
            }
            self.last_snare_time = now;
            self.push_hit(Hit {
                time: now,
                kind: HitKind::Snare,
                strength: snare.strength,
            });
        }

        // Tempo estimation from the combined interval history
        let intervals: Vec<f32> = self
            .kick_intervals
            .iter()
            .chain(self.snare_intervals.iter())
            .collect();
        if intervals.len() >= 3 {
            let estimate = estimate_tempo(&intervals);
            if estimate > 0.0 {
                self.tempo_candidates.push(estimate);
            }
            if self.tempo_candidates.len() >= 4 {
                self.stable_bpm = weighted_tempo_average(&self.tempo_candidates);
                self.groove_stability = (1.0 - self.tempo_candidates.std() / 20.0).max(0.0);
            }
        }

        let pattern = self.match_pattern(now);
        let beat_confidence = self.groove_stability * 0.6 + self.pattern_confidence * 0.4;

        GrooveResult {
            stable_bpm: self.stable_bpm,
            groove_pattern: pattern,
            pattern_confidence: self.pattern_confidence,
            beat_confidence,
            groove_stability: self.groove_stability,
            tempo_std: if self.tempo_candidates.len() > 1 {
                self.tempo_candidates.std()
            } else {
                0.0
            },
            active_beats: self.beat_grid.len(),
        }
    }

    fn push_hit(&mut self, hit: Hit) {
        if self.beat_grid.len() == BEAT_GRID_CAPACITY {
            self.beat_grid.pop_front();
        }
        self.beat_grid.push_back(hit);
    }

    /// Quantise the most recent hits onto a 16-step grid and correlate
    /// against the pattern library.
    fn match_pattern(&mut self, now: f64) -> &'static str {
        let recent: Vec<&Hit> = self
            .beat_grid
            .iter()
            .rev()
            .take(16)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        if recent.len() < 8 {
            return "insufficient_data";
        }

        // A confidently matched pattern holds for the lock window
        if now - self.pattern_lock_time < PATTERN_LOCK_DURATION && self.pattern_lock_time > 0.0 {
            return self.current_pattern;
        }

        if self.stable_bpm <= 60.0 {
            return "no_tempo";
        }

        let beat_interval = 60.0 / self.stable_bpm as f64;
        let start_time = recent[0].time;

        let mut grid = [0u8; 16];
        for hit in &recent {
            let relative = hit.time - start_time;
            let slot = ((relative / beat_interval) % 16.0) as usize;
            if slot < 16 {
                grid[slot] = 1;
            }
        }

        let mut best_match = "unknown";
        let mut best_score = 0.0f32;
        for (name, pattern) in &GROOVE_PATTERNS {
            let matches = grid
                .iter()
                .zip(pattern.iter())
                .filter(|(a, b)| a == b)
                .count();
            let score = matches as f32 / 16.0;
            if score > best_score && score >= PATTERN_MATCH_FLOOR {
                best_score = score;
                best_match = name;
            }
        }

        self.pattern_confidence = best_score;
        if best_score >= PATTERN_LOCK_SCORE {
            self.current_pattern = best_match;
            self.pattern_lock_time = now;
            log::debug!(
                "groove pattern locked: {} (score {:.2})",
                best_match,
                best_score
            );
        }

        best_match
    }

    pub fn reset(&mut self) {
        self.beat_grid.clear();
        self.kick_intervals.clear();
        self.snare_intervals.clear();
        self.tempo_candidates.clear();
        self.last_kick_time = 0.0;
        self.last_snare_time = 0.0;
        self.stable_bpm = 0.0;
        self.groove_stability = 0.0;
        self.current_pattern = "unknown";
        self.pattern_confidence = 0.0;
        self.pattern_lock_time = 0.0;
    }
}

impl Default for GrooveAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Median of the plausible intervals, converted to BPM and snapped to the
/// nearest common tempo when close enough. 0.0 when the evidence is thin.
fn estimate_tempo(intervals: &[f32]) -> f32 {
    if intervals.len() < 3 {
        return 0.0;
    }
    let mut valid: Vec<f32> = intervals
        .iter()
        .copied()
        .filter(|i| (INTERVAL_RANGE.0..=INTERVAL_RANGE.1).contains(i))
        .collect();
    if valid.len() < 2 {
        return 0.0;
    }

    valid.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = valid.len() / 2;
    let median = if valid.len() % 2 == 0 {
        (valid[mid - 1] + valid[mid]) / 2.0
    } else {
        valid[mid]
    };

    let bpm = 60.0 / median;
    let closest = COMMON_BPMS
        .iter()
        .copied()
        .min_by(|a, b| {
            (a - bpm)
                .abs()
                .partial_cmp(&(b - bpm).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(bpm);
    if (bpm - closest).abs() < BPM_SNAP_DISTANCE {
        closest
    } else {
        bpm
    }
}

/// Exponentially weighted average favouring the newest candidates.
fn weighted_tempo_average(candidates: &History) -> f32 {
    let n = candidates.len();
    let mut weighted_sum = 0.0f32;
    let mut weight_sum = 0.0f32;
    for (i, value) in candidates.iter().enumerate() {
        // weights exp(linspace(-1, 0, n)), oldest first
        let exponent = if n > 1 {
            -1.0 + i as f32 / (n - 1) as f32
        } else {
            0.0
        };
        let weight = exponent.exp();
        weighted_sum += value * weight;
        weight_sum += weight;
    }
    if weight_sum > 0.0 {
        weighted_sum / weight_sum
    } else {
        0.0
    }
}

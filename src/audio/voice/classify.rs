//! Voice type classification from pitch and formants.
//!
//! Primary classification walks the standard vocal pitch ranges in order
//! (first match wins); when the pitch falls outside every range, the first
//! two formants vote on gender and the pitch refines within it, with a plain
//! pitch-band fallback as the last resort.

/// Standard vocal ranges in Hz, checked in order.
const VOICE_RANGES: [(&str, f32, f32); 7] = [
    ("bass", 75.0, 165.0),
    ("baritone", 96.0, 192.0),
    ("tenor", 123.0, 246.0),
    ("alto", 155.0, 330.0),
    ("mezzo-soprano", 185.0, 370.0),
    ("soprano", 220.0, 440.0),
    ("child", 300.0, 600.0),
];

/// Classify a voice from its fundamental and (optionally) formants.
/// Returns "unknown" when there is no pitch to classify.
pub fn classify_voice_type(pitch: f32, formants: &[f32]) -> &'static str {
    if pitch <= 0.0 {
        return "unknown";
    }

    for (name, low, high) in VOICE_RANGES {
        if pitch >= low && pitch <= high {
            return name;
        }
    }

    // Outside every range: let the first two formants pick a gender
    if formants.len() >= 2 {
        let (f1, f2) = (formants[0], formants[1]);
        if f1 < 600.0 && f2 < 1800.0 {
            // Male formant pattern
            return if pitch < 130.0 {
                "bass"
            } else if pitch < 200.0 {
                "baritone"
            } else {
                "tenor"
            };
        } else if f1 > 800.0 || f2 > 2000.0 {
            // Female formant pattern
            return if pitch < 250.0 {
                "alto"
            } else if pitch < 350.0 {
                "mezzo-soprano"
            } else {
                "soprano"
            };
        }
    }

    // Pitch-band fallback
    if pitch > 400.0 {
        "child"
    } else if pitch > 250.0 {
        "soprano"
    } else if pitch > 180.0 {
        "alto"
    } else if pitch > 140.0 {
        "tenor"
    } else if pitch > 110.0 {
        "baritone"
    } else {
        "bass"
    }
}

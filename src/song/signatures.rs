//! Key and time signature events and the per-window lookups over them.

/// Pitch class names, index = pitch mod 12.
pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A key signature change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeySignature {
    /// Seconds from the start of the song.
    pub time: f64,
    /// 0–11 major keys by tonic pitch class, 12–23 minor keys.
    pub key_number: u8,
}

/// A time signature change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSignature {
    pub time: f64,
    pub numerator: u8,
    pub denominator: u32,
}

impl TimeSignature {
    pub fn ratio(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

/// Convert a MIDI key signature meta event (sharps if positive, flats if negative) to a
/// key number.
pub fn key_number(sharps_flats: i8, minor: bool) -> u8 {
    let major_tonic = (sharps_flats as i32 * 7).rem_euclid(12) as u8;
    if minor {
        12 + (major_tonic + 9) % 12
    } else {
        major_tonic
    }
}

/// Key number active at `time`, or 0 when no event qualifies.
///
/// Events are scanned in stored order and the first one at or before `time` wins. For a
/// time-ordered list this is the earliest event, not the most recent one.
pub fn key_signature_at(changes: &[KeySignature], time: f64) -> u8 {
    changes
        .iter()
        .find(|ks| time >= ks.time)
        .map(|ks| ks.key_number)
        .unwrap_or(0)
}

/// Time signature ratio active at `time`, or 0.0 when no event qualifies.
///
/// Same first-match scan as [`key_signature_at`].
pub fn time_signature_at(changes: &[TimeSignature], time: f64) -> f64 {
    changes
        .iter()
        .find(|ts| time >= ts.time)
        .map(TimeSignature::ratio)
        .unwrap_or(0.0)
}

//! OPL frequency words to MIDI keys, bends and velocities

use crate::midi::PITCH_BEND_CENTER;

/// Frequency words of C through G' at a fixed block, one per semitone
///
/// Word `FREQUENCY_TABLE[i]` at block `b` plays MIDI key `12 * (b + 1) + i`,
/// so 0x159 at block 4 is middle C.
pub const FREQUENCY_TABLE: [u16; 20] = [
    0x159, 0x16B, 0x181, 0x198, 0x1B0, 0x1CA, 0x1E5, 0x202, 0x220, 0x241, 0x263, 0x287, 0x2AE,
    0x2DB, 0x306, 0x334, 0x365, 0x399, 0x3CF, 0x3FE,
];

/// Highest MIDI key
pub const MAX_KEY: u8 = 127;

/// Continuous MIDI key for a frequency word at a block; 0.0 for a silent word
pub fn key_fraction(frequency: u16, octave: u8) -> f64 {
    if frequency == 0 {
        return 0.0;
    }
    let f = frequency as f64;
    let first = FREQUENCY_TABLE[0] as f64;
    let last = FREQUENCY_TABLE[FREQUENCY_TABLE.len() - 1] as f64;

    let semitone = if f < first {
        12.0 * (f / first).log2()
    } else if f >= last {
        (FREQUENCY_TABLE.len() - 1) as f64 + 12.0 * (f / last).log2()
    } else {
        let i = FREQUENCY_TABLE
            .windows(2)
            .position(|w| f < w[1] as f64)
            .unwrap_or(0);
        let lo = FREQUENCY_TABLE[i] as f64;
        let hi = FREQUENCY_TABLE[i + 1] as f64;
        i as f64 + (f / lo).ln() / (hi / lo).ln()
    };

    12.0 * (octave as f64 + 1.0) + semitone
}

/// Nearest whole key, or `None` when the pitch has no playable MIDI key
pub fn nearest_key(key_fraction: f64) -> Option<u8> {
    let key = key_fraction.round();
    if key > 0.0 && key <= MAX_KEY as f64 {
        Some(key as u8)
    } else {
        None
    }
}

/// Pitch-bend value for an offset of `semitones` under a +/-`range` sensitivity
pub fn bend_value(semitones: f64, range: u8) -> u16 {
    let per_semitone = PITCH_BEND_CENTER as f64 / range.max(1) as f64;
    let bend = (PITCH_BEND_CENTER as f64 + per_semitone * semitones) as i32;
    bend.clamp(0, 0x3FFF) as u16
}

/// Note velocity for an operator attenuation (0 = loudest)
pub fn velocity(level: u8) -> u8 {
    (0x3F - (level & 0x3F)) << 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_entries_are_exact_semitones() {
        for (i, &word) in FREQUENCY_TABLE.iter().enumerate() {
            for octave in 0..8u8 {
                let expected = 12.0 * (octave as f64 + 1.0) + i as f64;
                let key = key_fraction(word, octave);
                assert!((key - expected).abs() < 1e-9, "word {:03X} block {}", word, octave);
            }
        }
        assert_eq!(key_fraction(0x159, 4), 60.0);
        assert_eq!(key_fraction(0x241, 4), 69.0);
    }

    #[test]
    fn test_between_entries_is_fractional() {
        let key = key_fraction(0x165, 4);
        assert!(key > 60.0 && key < 61.0);
        assert_eq!(nearest_key(key), Some(61));
    }

    #[test]
    fn test_outside_table_extends_by_octaves() {
        // Half of C is the C an octave below
        let key = key_fraction(0x159 / 2, 4);
        assert!((key - 48.0).abs() < 0.1);
        assert_eq!(key_fraction(0, 4), 0.0);
        assert_eq!(nearest_key(0.0), None);
        assert!((key_fraction(0x3FE, 7) - 115.0).abs() < 1e-9);
        assert_eq!(nearest_key(128.4), None);
    }

    #[test]
    fn test_bend_values() {
        assert_eq!(bend_value(0.0, 24), 8192);
        assert_eq!(bend_value(1.0, 24), 8192 + 341);
        assert_eq!(bend_value(-2.0, 2), 0);
        assert_eq!(bend_value(5.0, 2), 0x3FFF);
        assert_eq!(bend_value(0.5, 12), 8192 + 341);
    }

    #[test]
    fn test_velocity() {
        assert_eq!(velocity(0), 126);
        assert_eq!(velocity(0x3F), 0);
        assert_eq!(velocity(0x10), 94);
    }
}

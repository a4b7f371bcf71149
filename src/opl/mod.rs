//! YM3812 (OPL2) register layout
//!
//! ```text
//!    Channel        0   1   2   3   4   5   6   7   8
//!    Operator 0    00  01  02  08  09  0A  10  11  12
//!    Operator 1    03  04  05  0B  0C  0D  13  14  15
//! ```
//!
//! The per-operator register groups (0x20, 0x40, 0x60, 0x80, 0xE0) are
//! addressed by the slot offsets above.

pub mod bank;

pub use bank::{BankUpdate, ChannelRegisterBank, ChannelState};

/// Number of melodic channels
pub const NUM_CHANNELS: usize = 9;

/// Register group bases
pub mod reg {
    /// AM / vibrato / EG type / KSR / multiplier
    pub const MULT: u8 = 0x20;
    /// Key scale level / total level
    pub const LEVEL: u8 = 0x40;
    /// Attack / decay
    pub const ATTACK: u8 = 0x60;
    /// Sustain / release
    pub const SUSTAIN: u8 = 0x80;
    /// Frequency number low 8 bits
    pub const FNUM_LOW: u8 = 0xA0;
    /// Key on / block / frequency number high 2 bits
    pub const KEY_BLOCK: u8 = 0xB0;
    /// Tremolo depth / vibrato depth / rhythm mode
    pub const RHYTHM: u8 = 0xBD;
    /// Feedback / connection
    pub const FEEDBACK: u8 = 0xC0;
    /// Waveform select
    pub const WAVEFORM: u8 = 0xE0;
}

/// Slot offset -> (channel, operator); holes at 0x06, 0x07, 0x0E, 0x0F
const SLOTS: [Option<(u8, u8)>; 22] = [
    Some((0, 0)),
    Some((1, 0)),
    Some((2, 0)),
    Some((0, 1)),
    Some((1, 1)),
    Some((2, 1)),
    None,
    None,
    Some((3, 0)),
    Some((4, 0)),
    Some((5, 0)),
    Some((3, 1)),
    Some((4, 1)),
    Some((5, 1)),
    None,
    None,
    Some((6, 0)),
    Some((7, 0)),
    Some((8, 0)),
    Some((6, 1)),
    Some((7, 1)),
    Some((8, 1)),
];

/// Channel owning the operator slot
pub fn slot_channel(slot: u8) -> Option<usize> {
    SLOTS.get(slot as usize).copied().flatten().map(|(c, _)| c as usize)
}

/// Operator (0 = modulator, 1 = carrier) within the channel
pub fn slot_operator(slot: u8) -> Option<usize> {
    SLOTS.get(slot as usize).copied().flatten().map(|(_, o)| o as usize)
}

/// Attenuation (total level) in the low six bits of a 0x40 register
pub fn total_level(reg40: u8) -> u8 {
    reg40 & 0x3F
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_table() {
        assert_eq!(slot_channel(0x00), Some(0));
        assert_eq!(slot_operator(0x00), Some(0));
        assert_eq!(slot_channel(0x03), Some(0));
        assert_eq!(slot_operator(0x03), Some(1));
        assert_eq!(slot_channel(0x0A), Some(5));
        assert_eq!(slot_channel(0x13), Some(6));
        assert_eq!(slot_operator(0x15), Some(1));
        assert_eq!(slot_channel(0x15), Some(8));
    }

    #[test]
    fn test_slot_holes() {
        for slot in [0x06, 0x07, 0x0E, 0x0F, 0x16, 0x1F] {
            assert_eq!(slot_channel(slot), None, "slot {:02X}", slot);
            assert_eq!(slot_operator(slot), None, "slot {:02X}", slot);
        }
    }
}

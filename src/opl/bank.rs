//! Per-channel OPL register state

use super::{reg, slot_channel, slot_operator, total_level, NUM_CHANNELS};
use crate::instrument::{Fingerprint, Voice};
use crate::midi::PITCH_BEND_CENTER;

/// State of one OPL channel during conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    /// Accumulated timbre registers
    pub timbre: Fingerprint,
    /// Block (0-7)
    pub octave: u8,
    /// 10-bit frequency number
    pub frequency: u16,
    /// A MIDI note is currently sounding for this channel
    pub key_on: bool,
    /// Key of the sounding MIDI note
    pub last_key: Option<u8>,
    /// Voice last assigned to the MIDI channel
    pub voice: Option<Voice>,
    /// Last pitch bend sent to the MIDI channel
    pub last_bend: u16,
    /// MIDI channel currently playing this channel's notes
    pub midi_channel: u8,
    /// Percussion note while mapped to the drum channel
    pub drum_note: Option<u8>,
}

impl ChannelState {
    pub fn new(index: usize) -> Self {
        Self {
            timbre: Fingerprint::default(),
            octave: 0,
            frequency: 0,
            key_on: false,
            last_key: None,
            voice: None,
            last_bend: PITCH_BEND_CENTER,
            midi_channel: index as u8,
            drum_note: None,
        }
    }

    /// Lowest attenuation of the two operators
    pub fn level(&self) -> u8 {
        total_level(self.timbre.reg40[0]).min(total_level(self.timbre.reg40[1]))
    }
}

/// What a register write changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankUpdate {
    /// Timbre byte stored; no immediate MIDI effect
    Timbre { channel: usize },
    /// Low frequency bits changed
    FrequencyLow { channel: usize },
    /// High frequency bits, block and key bit changed
    KeyBlock { channel: usize, key_on: bool },
    /// Rhythm control register written
    Rhythm { value: u8 },
    /// Operator register group with no operator at this slot
    Unmapped,
    /// Register with no bearing on conversion (timers, test, CSM)
    Ignored,
}

/// Register state of all nine OPL channels
#[derive(Debug, Clone)]
pub struct ChannelRegisterBank {
    channels: [ChannelState; NUM_CHANNELS],
}

impl ChannelRegisterBank {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(ChannelState::new),
        }
    }

    pub fn channel(&self, channel: usize) -> &ChannelState {
        &self.channels[channel]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut ChannelState {
        &mut self.channels[channel]
    }

    /// Store a register write and report what it affected
    pub fn write(&mut self, register: u8, value: u8) -> BankUpdate {
        match register {
            0x20..=0x35 | 0x40..=0x55 | 0x60..=0x75 | 0x80..=0x95 | 0xE0..=0xF5 => {
                let base = register & 0xE0;
                let slot = register - base;
                let (Some(channel), Some(op)) = (slot_channel(slot), slot_operator(slot)) else {
                    return BankUpdate::Unmapped;
                };
                let timbre = &mut self.channels[channel].timbre;
                match base {
                    reg::MULT => timbre.reg20[op] = value,
                    reg::LEVEL => timbre.reg40[op] = value,
                    reg::ATTACK => timbre.reg60[op] = value,
                    reg::SUSTAIN => timbre.reg80[op] = value,
                    reg::WAVEFORM => timbre.reg_e0[op] = value,
                    _ => return BankUpdate::Unmapped,
                }
                BankUpdate::Timbre { channel }
            }
            0xA0..=0xA8 => {
                let channel = (register - reg::FNUM_LOW) as usize;
                let state = &mut self.channels[channel];
                state.frequency = (state.frequency & 0x300) | value as u16;
                BankUpdate::FrequencyLow { channel }
            }
            0xB0..=0xB8 => {
                let channel = (register - reg::KEY_BLOCK) as usize;
                let state = &mut self.channels[channel];
                state.frequency = (state.frequency & 0x0FF) | (((value & 0x03) as u16) << 8);
                state.octave = (value >> 2) & 0x07;
                BankUpdate::KeyBlock {
                    channel,
                    key_on: value & 0x20 != 0,
                }
            }
            reg::RHYTHM => BankUpdate::Rhythm { value },
            0xC0..=0xC8 => {
                let channel = (register - reg::FEEDBACK) as usize;
                self.channels[channel].timbre.reg_c0 = value;
                BankUpdate::Timbre { channel }
            }
            _ => BankUpdate::Ignored,
        }
    }
}

impl Default for ChannelRegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

//! MIDI event sinks
//!
//! The converter emits everything through [`MidiSink`] in chronological
//! order. [`SmfWriter`] builds a Standard MIDI File; [`MidiLog`] records the
//! calls for inspection and JSON dumps.

pub mod smf;

pub use smf::SmfWriter;

use serde::Serialize;

/// Centre (no bend) of the 14-bit pitch wheel
pub const PITCH_BEND_CENTER: u16 = 0x2000;

/// General MIDI percussion channel (channel 10, zero-based)
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Controller numbers used by the converter
pub mod controller {
    pub const DATA_ENTRY: u8 = 6;
    pub const VOLUME: u8 = 7;
    pub const RPN_LSB: u8 = 100;
    pub const RPN_MSB: u8 = 101;
}

/// Receiver of converted MIDI events
///
/// Channel events take effect at the current time; [`MidiSink::advance_time`]
/// moves the clock forward.
pub trait MidiSink {
    /// Ticks per quarter note
    fn set_resolution(&mut self, ticks_per_quarter: u16);

    fn begin_track(&mut self);

    fn set_tempo(&mut self, microseconds_per_quarter: u32);

    /// `denominator` is the plain note value (4 for quarter notes)
    fn set_time_signature(
        &mut self,
        numerator: u8,
        denominator: u8,
        clocks_per_click: u8,
        thirty_seconds_per_quarter: u8,
    );

    fn advance_time(&mut self, ticks: u32);

    fn program_change(&mut self, channel: u8, program: u8);

    fn note_on(&mut self, channel: u8, key: u8, velocity: u8);

    fn note_off(&mut self, channel: u8, key: u8);

    /// 14-bit bend, [`PITCH_BEND_CENTER`] is no bend
    fn pitch_bend(&mut self, channel: u8, value: u16);

    fn control_change(&mut self, channel: u8, controller: u8, value: u8);

    fn set_channel_volume(&mut self, channel: u8, volume: u8) {
        self.control_change(channel, controller::VOLUME, volume);
    }

    /// Set pitch-bend sensitivity through RPN 0, then deselect the RPN
    fn set_pitch_bend_range(&mut self, channel: u8, semitones: u8) {
        self.control_change(channel, controller::RPN_MSB, 0);
        self.control_change(channel, controller::RPN_LSB, 0);
        self.control_change(channel, controller::DATA_ENTRY, semitones);
        self.control_change(channel, controller::RPN_MSB, 127);
        self.control_change(channel, controller::RPN_LSB, 127);
    }
}

/// One recorded sink call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MidiEvent {
    Resolution { ticks_per_quarter: u16 },
    BeginTrack,
    Tempo { microseconds_per_quarter: u32 },
    TimeSignature {
        numerator: u8,
        denominator: u8,
        clocks_per_click: u8,
        thirty_seconds_per_quarter: u8,
    },
    Advance { ticks: u32 },
    ProgramChange { channel: u8, program: u8 },
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8 },
    PitchBend { channel: u8, value: u16 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

/// Sink that records every call in order
#[derive(Debug, Clone, Default, Serialize)]
pub struct MidiLog {
    pub events: Vec<MidiEvent>,
}

impl MidiLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total ticks advanced
    pub fn elapsed(&self) -> u64 {
        self.events
            .iter()
            .map(|e| match e {
                MidiEvent::Advance { ticks } => *ticks as u64,
                _ => 0,
            })
            .sum()
    }

    /// Channel events only, without timing or header events
    pub fn channel_events(&self) -> impl Iterator<Item = &MidiEvent> {
        self.events.iter().filter(|e| {
            matches!(
                e,
                MidiEvent::ProgramChange { .. }
                    | MidiEvent::NoteOn { .. }
                    | MidiEvent::NoteOff { .. }
                    | MidiEvent::PitchBend { .. }
                    | MidiEvent::ControlChange { .. }
            )
        })
    }

    /// Events with consecutive advances folded into one and empty advances
    /// dropped, so the timing reads like delta times
    pub fn merged_advances(&self) -> Vec<MidiEvent> {
        let mut merged: Vec<MidiEvent> = Vec::with_capacity(self.events.len());
        for &event in &self.events {
            match (event, merged.last_mut()) {
                (MidiEvent::Advance { ticks: 0 }, _) => {}
                (MidiEvent::Advance { ticks }, Some(MidiEvent::Advance { ticks: last })) => {
                    *last = last.saturating_add(ticks);
                }
                _ => merged.push(event),
            }
        }
        merged
    }

    pub fn note_ons(&self) -> Vec<(u8, u8)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                MidiEvent::NoteOn { channel, key, .. } => Some((channel, key)),
                _ => None,
            })
            .collect()
    }

    pub fn note_offs(&self) -> Vec<(u8, u8)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                MidiEvent::NoteOff { channel, key } => Some((channel, key)),
                _ => None,
            })
            .collect()
    }
}

impl MidiSink for MidiLog {
    fn set_resolution(&mut self, ticks_per_quarter: u16) {
        self.events.push(MidiEvent::Resolution { ticks_per_quarter });
    }

    fn begin_track(&mut self) {
        self.events.push(MidiEvent::BeginTrack);
    }

    fn set_tempo(&mut self, microseconds_per_quarter: u32) {
        self.events.push(MidiEvent::Tempo {
            microseconds_per_quarter,
        });
    }

    fn set_time_signature(
        &mut self,
        numerator: u8,
        denominator: u8,
        clocks_per_click: u8,
        thirty_seconds_per_quarter: u8,
    ) {
        self.events.push(MidiEvent::TimeSignature {
            numerator,
            denominator,
            clocks_per_click,
            thirty_seconds_per_quarter,
        });
    }

    fn advance_time(&mut self, ticks: u32) {
        self.events.push(MidiEvent::Advance { ticks });
    }

    fn program_change(&mut self, channel: u8, program: u8) {
        self.events.push(MidiEvent::ProgramChange { channel, program });
    }

    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) {
        self.events.push(MidiEvent::NoteOn {
            channel,
            key,
            velocity,
        });
    }

    fn note_off(&mut self, channel: u8, key: u8) {
        self.events.push(MidiEvent::NoteOff { channel, key });
    }

    fn pitch_bend(&mut self, channel: u8, value: u16) {
        self.events.push(MidiEvent::PitchBend { channel, value });
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        self.events.push(MidiEvent::ControlChange {
            channel,
            controller,
            value,
        });
    }
}

//! OPL rhythm mode (register 0xBD)
//!
//! Bit 5 enables rhythm mode; bits 4..0 key the bass drum, snare, tom-tom,
//! top cymbal and hi-hat. The bass drum and tom-tom take their pitch from
//! OPL channels 6 and 8 and play melodic drum programs on those MIDI
//! channels; the other three are fixed percussion notes.

use super::Converter;
use crate::instrument::Voice;
use crate::midi::{MidiSink, PERCUSSION_CHANNEL};
use crate::note::{bend_value, key_fraction, nearest_key, velocity};
use crate::opl::total_level;

/// Rhythm mode enable bit
pub const RHYTHM_ENABLE: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RhythmVoice {
    BassDrum,
    SnareDrum,
    TomTom,
    TopCymbal,
    HiHat,
}

/// How a rhythm voice is rendered in MIDI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rendering {
    /// Melodic program on the OPL channel's own MIDI channel
    Pitched { program: u8, fallback_key: u8 },
    /// Fixed note on the percussion channel
    Fixed { note: u8 },
}

impl RhythmVoice {
    /// Processing order, highest bit first
    pub const ALL: [RhythmVoice; 5] = [
        RhythmVoice::BassDrum,
        RhythmVoice::SnareDrum,
        RhythmVoice::TomTom,
        RhythmVoice::TopCymbal,
        RhythmVoice::HiHat,
    ];

    pub fn bit(self) -> u8 {
        match self {
            RhythmVoice::BassDrum => 0x10,
            RhythmVoice::SnareDrum => 0x08,
            RhythmVoice::TomTom => 0x04,
            RhythmVoice::TopCymbal => 0x02,
            RhythmVoice::HiHat => 0x01,
        }
    }

    /// OPL channel and operator whose level sets the velocity; `None` means
    /// both operators of the channel
    fn level_source(self) -> (usize, Option<usize>) {
        match self {
            RhythmVoice::BassDrum => (6, None),
            RhythmVoice::HiHat => (7, Some(0)),
            RhythmVoice::SnareDrum => (7, Some(1)),
            RhythmVoice::TomTom => (8, Some(0)),
            RhythmVoice::TopCymbal => (8, Some(1)),
        }
    }

    fn rendering(self) -> Rendering {
        match self {
            // Taiko drum
            RhythmVoice::BassDrum => Rendering::Pitched {
                program: 116,
                fallback_key: 36,
            },
            // Synth drum
            RhythmVoice::TomTom => Rendering::Pitched {
                program: 118,
                fallback_key: 41,
            },
            RhythmVoice::SnareDrum => Rendering::Fixed { note: 38 },
            RhythmVoice::TopCymbal => Rendering::Fixed { note: 57 },
            RhythmVoice::HiHat => Rendering::Fixed { note: 42 },
        }
    }

    fn index(self) -> usize {
        self.bit().trailing_zeros() as usize
    }

    fn name(self) -> &'static str {
        match self {
            RhythmVoice::BassDrum => "bass drum",
            RhythmVoice::SnareDrum => "snare drum",
            RhythmVoice::TomTom => "tom tom",
            RhythmVoice::TopCymbal => "top cymbal",
            RhythmVoice::HiHat => "hi-hat",
        }
    }
}

/// Which rhythm voices are sounding, and as which (channel, key)
#[derive(Debug, Clone, Default)]
pub struct RhythmOverlay {
    held: [Option<(u8, u8)>; 5],
}

impl RhythmOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, voice: RhythmVoice) -> bool {
        self.held[voice.index()].is_some()
    }
}

impl Converter {
    /// Apply a write to the rhythm control register
    pub(super) fn rhythm_update<S: MidiSink + ?Sized>(&mut self, value: u8, sink: &mut S) {
        if value & RHYTHM_ENABLE == 0 {
            self.release_rhythm(sink);
            return;
        }
        for voice in RhythmVoice::ALL {
            let held = self.rhythm.is_held(voice);
            if value & voice.bit() != 0 {
                if !held {
                    self.strike(voice, sink);
                }
            } else if held {
                self.damp(voice, sink);
            }
        }
    }

    /// Note-off for every held rhythm voice
    pub(super) fn release_rhythm<S: MidiSink + ?Sized>(&mut self, sink: &mut S) {
        for voice in RhythmVoice::ALL {
            self.damp(voice, sink);
        }
    }

    fn strike<S: MidiSink + ?Sized>(&mut self, voice: RhythmVoice, sink: &mut S) {
        let (level_channel, operator) = voice.level_source();
        let levels = self.bank.channel(level_channel);
        let level = match operator {
            Some(op) => total_level(levels.timbre.reg40[op]),
            None => levels.level(),
        };
        let velocity = velocity(level);

        let (channel, key) = match voice.rendering() {
            Rendering::Fixed { note } => (PERCUSSION_CHANNEL, note),
            Rendering::Pitched {
                program,
                fallback_key,
            } => {
                let pitch_bends = self.options.pitch_bends;
                let range = self.options.bend_range;
                let state = self.bank.channel_mut(level_channel);
                let midi_channel = level_channel as u8;

                let program_voice = Voice::Melodic { program };
                if state.voice != Some(program_voice) {
                    tracing::info!("channel {}: rhythm-mode {}", level_channel, voice.name());
                    sink.program_change(midi_channel, program);
                    state.voice = Some(program_voice);
                    if !state.key_on {
                        state.midi_channel = midi_channel;
                        state.drum_note = None;
                    }
                }

                let fraction = key_fraction(state.frequency, state.octave);
                let key = match nearest_key(fraction) {
                    Some(key) => {
                        if pitch_bends {
                            let bend = bend_value(fraction - key as f64, range);
                            if bend != state.last_bend && state.midi_channel == midi_channel {
                                sink.pitch_bend(midi_channel, bend);
                                state.last_bend = bend;
                            }
                        }
                        key
                    }
                    None => fallback_key,
                };
                (midi_channel, key)
            }
        };

        sink.note_on(channel, key, velocity);
        self.rhythm.held[voice.index()] = Some((channel, key));
        self.stats.notes += 1;
    }

    fn damp<S: MidiSink + ?Sized>(&mut self, voice: RhythmVoice, sink: &mut S) {
        if let Some((channel, key)) = self.rhythm.held[voice.index()].take() {
            sink.note_off(channel, key);
        }
    }
}

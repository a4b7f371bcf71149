//! Key-on, key-off and pitch tracking for melodic channels

use super::Converter;
use crate::error::Result;
use crate::instrument::Voice;
use crate::midi::{MidiSink, PERCUSSION_CHANNEL};
use crate::note::{bend_value, key_fraction, nearest_key, velocity};

/// What prompted a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTrigger {
    /// Write to the key-on/block register
    KeyRegister { key_on: bool },
    /// Low frequency bits changed while the key is held
    FrequencyUpdate,
}

impl KeyTrigger {
    fn key_on(self) -> bool {
        match self {
            KeyTrigger::KeyRegister { key_on } => key_on,
            KeyTrigger::FrequencyUpdate => true,
        }
    }
}

impl Converter {
    /// Bring the MIDI side of `channel` in line with its OPL key state
    pub(super) fn key_transition<S: MidiSink + ?Sized>(
        &mut self,
        channel: usize,
        trigger: KeyTrigger,
        sink: &mut S,
    ) -> Result<()> {
        let state = self.bank.channel(channel);
        let sounding = state.key_on;
        let fraction = key_fraction(state.frequency, state.octave);
        let key = match nearest_key(fraction) {
            Some(key) if trigger.key_on() => key,
            _ => {
                self.release(channel, sink);
                return Ok(());
            }
        };

        if sounding && !self.follow_sounding_note(channel, fraction, key, sink) {
            return Ok(());
        }
        self.start_note(channel, fraction, key, sink)
    }

    /// Handle a new pitch on a channel that is already sounding
    ///
    /// Returns true when the note was released and must be started again.
    fn follow_sounding_note<S: MidiSink + ?Sized>(
        &mut self,
        channel: usize,
        fraction: f64,
        key: u8,
        sink: &mut S,
    ) -> bool {
        let range = self.options.bend_range;
        let pitch_bends = self.options.pitch_bends;
        let approximate = self.options.approximate_bends;

        let state = self.bank.channel_mut(channel);
        if state.midi_channel == PERCUSSION_CHANNEL {
            return false;
        }
        let Some(last_key) = state.last_key else {
            return true;
        };

        if pitch_bends {
            let diff = fraction - last_key as f64;
            if diff.abs() > range as f64 {
                tracing::warn!(
                    "Channel {} wanted to bend by {:.2} semitones but the range is {}, retriggering",
                    channel,
                    diff,
                    range
                );
                self.release(channel, sink);
                return true;
            }
            let bend = bend_value(diff, range);
            if bend != state.last_bend {
                sink.pitch_bend(state.midi_channel, bend);
                state.last_bend = bend;
            }
            false
        } else if approximate && key != last_key {
            self.release(channel, sink);
            true
        } else {
            false
        }
    }

    /// Pick the instrument for `channel` and sound `key`
    fn start_note<S: MidiSink + ?Sized>(
        &mut self,
        channel: usize,
        fraction: f64,
        key: u8,
        sink: &mut S,
    ) -> Result<()> {
        let timbre = self.bank.channel(channel).timbre;
        let found = self.catalog.find(&timbre, self.options.perfect_matches_only)?;
        let (voice, name) = match self.catalog.get(found.index) {
            Some(instrument) => (instrument.voice, instrument.name.clone()),
            None => (Voice::Melodic { program: 0 }, String::new()),
        };
        if let Some(learned) = found.learned {
            tracing::info!(
                "Unknown instrument on channel {} (distance {}), using {}. Add it to the mapping file as #{}:\n{}: patch=?",
                channel,
                found.distance,
                name,
                learned,
                timbre
            );
        }

        let state = self.bank.channel_mut(channel);
        if state.voice != Some(voice) {
            tracing::info!("channel {} set to: {}", channel, name);
            match voice {
                Voice::Melodic { program } => {
                    if state.midi_channel == PERCUSSION_CHANNEL {
                        state.midi_channel = channel as u8;
                        state.drum_note = None;
                    }
                    sink.program_change(state.midi_channel, program);
                }
                Voice::Drum { note } => {
                    state.midi_channel = PERCUSSION_CHANNEL;
                    state.drum_note = Some(note);
                }
            }
            state.voice = Some(voice);
        }

        let velocity = velocity(state.level());
        let sounded = match state.drum_note {
            Some(note) if state.midi_channel == PERCUSSION_CHANNEL => note,
            _ => {
                if self.options.pitch_bends {
                    let bend = bend_value(fraction - key as f64, self.options.bend_range);
                    if bend != state.last_bend {
                        sink.pitch_bend(state.midi_channel, bend);
                        state.last_bend = bend;
                    }
                }
                key
            }
        };

        sink.note_on(state.midi_channel, sounded, velocity);
        state.last_key = Some(sounded);
        state.key_on = true;
        self.stats.notes += 1;
        Ok(())
    }

    /// Note-off for whatever `channel` is sounding
    pub(super) fn release<S: MidiSink + ?Sized>(&mut self, channel: usize, sink: &mut S) {
        let state = self.bank.channel_mut(channel);
        if state.key_on {
            if let Some(key) = state.last_key {
                sink.note_off(state.midi_channel, key);
            }
        }
        state.key_on = false;
        state.last_key = None;
    }
}

//! Standard MIDI File output through `midly`

use super::MidiSink;
use crate::error::{Error, Result};
use midly::num::{u14, u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use std::path::Path;

/// Largest delta time a track event can carry
const MAX_DELTA: u32 = (1 << 28) - 1;

/// Sink that assembles an in-memory SMF
#[derive(Debug, Clone)]
pub struct SmfWriter {
    ticks_per_quarter: u16,
    tracks: Vec<Track<'static>>,
    /// Ticks since the previous event on the current track
    pending_delta: u32,
}

impl SmfWriter {
    pub fn new() -> Self {
        Self {
            ticks_per_quarter: 480,
            tracks: Vec::new(),
            pending_delta: 0,
        }
    }

    fn push(&mut self, kind: TrackEventKind<'static>) {
        if self.tracks.is_empty() {
            self.tracks.push(Vec::new());
        }
        let delta = std::mem::take(&mut self.pending_delta);
        if let Some(track) = self.tracks.last_mut() {
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind,
            });
        }
    }

    fn channel_message(&mut self, channel: u8, message: MidiMessage) {
        self.push(TrackEventKind::Midi {
            channel: u4::new(channel),
            message,
        });
    }

    /// Close every track and return the file
    pub fn finish(mut self) -> Smf<'static> {
        if self.tracks.is_empty() {
            self.tracks.push(Vec::new());
        }
        let pending = self.pending_delta;
        let last = self.tracks.len() - 1;
        for (i, track) in self.tracks.iter_mut().enumerate() {
            track.push(TrackEvent {
                delta: u28::new(if i == last { pending } else { 0 }),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
        }

        let format = if self.tracks.len() == 1 {
            Format::SingleTrack
        } else {
            Format::Parallel
        };
        let mut smf = Smf::new(Header::new(
            format,
            Timing::Metrical(u15::new(self.ticks_per_quarter)),
        ));
        smf.tracks = self.tracks;
        smf
    }

    /// Close every track and write the file to `path`
    pub fn save(self, path: &Path) -> Result<()> {
        let smf = self.finish();
        let mut buf = Vec::new();
        smf.write_std(&mut buf)
            .map_err(|e| Error::Midi(format!("Failed to encode MIDI data: {}", e)))?;
        std::fs::write(path, &buf)?;
        Ok(())
    }
}

impl Default for SmfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiSink for SmfWriter {
    fn set_resolution(&mut self, ticks_per_quarter: u16) {
        self.ticks_per_quarter = ticks_per_quarter.clamp(1, 0x7FFF);
    }

    fn begin_track(&mut self) {
        self.tracks.push(Vec::new());
        self.pending_delta = 0;
    }

    fn set_tempo(&mut self, microseconds_per_quarter: u32) {
        self.push(TrackEventKind::Meta(MetaMessage::Tempo(u24::new(
            microseconds_per_quarter,
        ))));
    }

    fn set_time_signature(
        &mut self,
        numerator: u8,
        denominator: u8,
        clocks_per_click: u8,
        thirty_seconds_per_quarter: u8,
    ) {
        // Stored as a power of two
        let denominator = denominator.max(1).trailing_zeros() as u8;
        self.push(TrackEventKind::Meta(MetaMessage::TimeSignature(
            numerator,
            denominator,
            clocks_per_click,
            thirty_seconds_per_quarter,
        )));
    }

    fn advance_time(&mut self, ticks: u32) {
        let mut total = self.pending_delta as u64 + ticks as u64;
        // Longer gaps are split across empty text events
        while total > MAX_DELTA as u64 {
            tracing::debug!("Splitting a delay of {} ticks", total);
            self.pending_delta = MAX_DELTA;
            self.push(TrackEventKind::Meta(MetaMessage::Text(b"")));
            total -= MAX_DELTA as u64;
        }
        self.pending_delta = total as u32;
    }

    fn program_change(&mut self, channel: u8, program: u8) {
        self.channel_message(
            channel,
            MidiMessage::ProgramChange {
                program: u7::new(program),
            },
        );
    }

    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) {
        self.channel_message(
            channel,
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(velocity),
            },
        );
    }

    fn note_off(&mut self, channel: u8, key: u8) {
        self.channel_message(
            channel,
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            },
        );
    }

    fn pitch_bend(&mut self, channel: u8, value: u16) {
        self.channel_message(
            channel,
            MidiMessage::PitchBend {
                bend: midly::PitchBend(u14::new(value)),
            },
        );
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        self.channel_message(
            channel,
            MidiMessage::Controller {
                controller: u7::new(controller),
                value: u7::new(value),
            },
        );
    }
}

//! Capture to MIDI conversion
//!
//! [`Converter`] pulls events from a capture decoder, keeps the OPL register
//! state up to date and emits the equivalent MIDI events to a [`MidiSink`].

pub mod keying;
pub mod rhythm;

use crate::capture::{self, CaptureEvent, EventSource, RegisterWrite};
use crate::error::{Error, Result};
use crate::instrument::InstrumentCatalog;
use crate::midi::{MidiSink, SmfWriter};
use crate::opl::{BankUpdate, ChannelRegisterBank, NUM_CHANNELS};
use keying::KeyTrigger;
use rhythm::RhythmOverlay;
use serde::Serialize;
use std::path::Path;

/// Largest pitch-bend sensitivity the converter will program
pub const MAX_BEND_RANGE: u8 = 24;

/// Conversion settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Convert rhythm-mode percussion
    pub rhythm: bool,
    /// Follow pitch changes of sounding notes with pitch bends
    pub pitch_bends: bool,
    /// Without pitch bends, retrigger notes whose nearest key changed
    pub approximate_bends: bool,
    /// Only accept exact instrument matches, else use the first instrument
    pub perfect_matches_only: bool,
    /// Pitch-bend sensitivity in semitones
    pub bend_range: u8,
    /// Nominal tempo written to the MIDI file
    pub tempo_bpm: u16,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            rhythm: true,
            pitch_bends: true,
            approximate_bends: false,
            perfect_matches_only: false,
            bend_range: MAX_BEND_RANGE,
            tempo_bpm: 120,
        }
    }
}

impl ConvertOptions {
    pub fn validate(&self) -> Result<()> {
        if self.approximate_bends && self.pitch_bends {
            return Err(Error::InvalidOptions(
                "pitch bend approximation requires pitch bends to be disabled".into(),
            ));
        }
        if !(1..=MAX_BEND_RANGE).contains(&self.bend_range) {
            return Err(Error::InvalidOptions(format!(
                "pitch bend range must be between 1 and {} semitones, not {}",
                MAX_BEND_RANGE, self.bend_range
            )));
        }
        if !(30..=300).contains(&self.tempo_bpm) {
            return Err(Error::InvalidOptions(format!(
                "tempo must be between 30 and 300 bpm, not {}",
                self.tempo_bpm
            )));
        }
        Ok(())
    }
}

/// Counters reported after a conversion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    /// Register writes processed
    pub writes: u64,
    /// Reference ticks elapsed
    pub ticks: u64,
    /// Note-on events emitted
    pub notes: u64,
    /// Instruments added to the catalog during the run
    pub learned_instruments: usize,
}

/// Drives one conversion
pub struct Converter {
    options: ConvertOptions,
    bank: ChannelRegisterBank,
    catalog: InstrumentCatalog,
    rhythm: RhythmOverlay,
    stats: ConversionStats,
}

impl Converter {
    pub fn new(options: ConvertOptions, catalog: InstrumentCatalog) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            bank: ChannelRegisterBank::new(),
            catalog,
            rhythm: RhythmOverlay::new(),
            stats: ConversionStats::default(),
        })
    }

    pub fn catalog(&self) -> &InstrumentCatalog {
        &self.catalog
    }

    pub fn bank(&self) -> &ChannelRegisterBank {
        &self.bank
    }

    /// Emit the file header: timing, tempo, meter and channel setup
    ///
    /// The resolution makes one capture reference tick one MIDI tick.
    pub fn write_header<S: MidiSink + ?Sized>(&self, reference_hz: u32, sink: &mut S) {
        let bpm = self.options.tempo_bpm as u32;
        let ticks_per_quarter = (reference_hz * 60 / bpm).clamp(1, 0x7FFF) as u16;

        sink.set_resolution(ticks_per_quarter);
        sink.begin_track();
        sink.set_tempo(60_000_000 / bpm);
        sink.set_time_signature(4, 4, 24, 8);
        for channel in 0..NUM_CHANNELS as u8 {
            sink.set_channel_volume(channel, 127);
        }
        if self.options.pitch_bends {
            for channel in 0..NUM_CHANNELS as u8 {
                sink.set_pitch_bend_range(channel, self.options.bend_range);
            }
        }
    }

    /// Convert a whole capture, header included
    pub fn run<S: MidiSink + ?Sized>(
        &mut self,
        source: &mut dyn EventSource,
        sink: &mut S,
    ) -> Result<ConversionStats> {
        let catalog_size = self.catalog.len();
        self.write_header(source.info().reference_hz, sink);

        loop {
            match source.next_event() {
                CaptureEvent::Delay { ticks } => {
                    self.stats.ticks += ticks as u64;
                    sink.advance_time(ticks);
                }
                CaptureEvent::Write(write) => {
                    self.stats.writes += 1;
                    self.dispatch(write, sink)?;
                }
                CaptureEvent::ClockChange { divisor, hz } => {
                    tracing::info!("Tempo change: clock divisor {:04X} ({} Hz)", divisor, hz);
                }
                CaptureEvent::ChipSelect { chip } => {
                    tracing::warn!(
                        "Capture selects OPL chip {}, multiple chips are not supported and notes may be wrong",
                        chip
                    );
                }
                CaptureEvent::End => break,
            }
        }

        self.release_all(sink);
        self.stats.learned_instruments = self.catalog.len() - catalog_size;
        Ok(self.stats)
    }

    /// Apply one register write
    pub fn dispatch<S: MidiSink + ?Sized>(&mut self, write: RegisterWrite, sink: &mut S) -> Result<()> {
        match self.bank.write(write.register, write.value) {
            BankUpdate::Timbre { .. } => {}
            BankUpdate::FrequencyLow { channel } => {
                if self.bank.channel(channel).key_on {
                    self.key_transition(channel, KeyTrigger::FrequencyUpdate, sink)?;
                }
            }
            BankUpdate::KeyBlock { channel, key_on } => {
                self.key_transition(channel, KeyTrigger::KeyRegister { key_on }, sink)?;
            }
            BankUpdate::Rhythm { value } => {
                if self.options.rhythm {
                    self.rhythm_update(value, sink);
                }
            }
            BankUpdate::Unmapped => {
                tracing::warn!(
                    "Register {:02X} addresses no operator, write of {:02X} ignored",
                    write.register,
                    write.value
                );
            }
            BankUpdate::Ignored => {
                tracing::debug!("Ignoring write {:02X} <- {:02X}", write.register, write.value);
            }
        }
        Ok(())
    }

    /// Stop every sounding note
    pub fn release_all<S: MidiSink + ?Sized>(&mut self, sink: &mut S) {
        for channel in 0..NUM_CHANNELS {
            self.release(channel, sink);
        }
        self.release_rhythm(sink);
    }
}

/// Convert a capture file to a MIDI file
pub fn convert_file(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    catalog: InstrumentCatalog,
) -> Result<ConversionStats> {
    let data = capture::read_capture_file(input)?;
    let name = capture::capture_name(input);
    let mut source = capture::open(&data, &name)?;

    let mut converter = Converter::new(options.clone(), catalog)?;
    let mut writer = SmfWriter::new();
    let stats = converter.run(source.as_mut(), &mut writer)?;
    writer.save(output)?;

    tracing::info!(
        "Wrote {}: {} writes, {} notes, {} ticks",
        output.display(),
        stats.writes,
        stats.notes,
        stats.ticks
    );
    Ok(stats)
}

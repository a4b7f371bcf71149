//! id Software Music Format (IMF/WLF) decoder
//!
//! Records are four bytes: register, value, and a 16-bit little-endian delay
//! that applies *after* the write. The decoder therefore lags one record:
//! each write is preceded by the delay declared on the previous record.

use super::event::{CaptureEvent, CaptureFormat, CaptureInfo};
use super::reader::{peek_u16_at, ByteReader};
use super::EventSource;
use crate::error::Result;
use std::collections::VecDeque;

/// IMF rate for files with the `.imf` extension
pub const IMF_HZ: u32 = 560;

/// IMF rate for files with the `.wlf` extension (Wolfenstein 3-D)
pub const WLF_HZ: u32 = 700;

const RECORD_SIZE: u64 = 4;

pub struct ImfDecoder<'a> {
    reader: ByteReader<'a>,
    info: CaptureInfo,
    queued: VecDeque<CaptureEvent>,
    last_delay: u32,
    finished: bool,
}

impl<'a> ImfDecoder<'a> {
    /// Open an IMF capture at the given reference rate
    ///
    /// Two leading zero bytes mark a type-0 file (the whole file is data);
    /// anything else is a type-1 length header followed by the data.
    pub fn new(data: &'a [u8], reference_hz: u32) -> Result<Self> {
        let type0 = data.len() < 2 || (data[0] == 0 && data[1] == 0);
        let (format, start, length) = if type0 {
            (CaptureFormat::ImfType0, 0usize, data.len() as u64)
        } else {
            (CaptureFormat::ImfType1, 2usize, peek_u16_at(data, 0)? as u64)
        };

        Ok(Self {
            reader: ByteReader::new(data, start, length),
            info: CaptureInfo {
                format,
                reference_hz,
                data_length: length,
            },
            queued: VecDeque::new(),
            last_delay: 0,
            finished: false,
        })
    }
}

impl EventSource for ImfDecoder<'_> {
    fn info(&self) -> &CaptureInfo {
        &self.info
    }

    fn next_event(&mut self) -> CaptureEvent {
        if let Some(event) = self.queued.pop_front() {
            return event;
        }
        if self.finished {
            return CaptureEvent::End;
        }

        if self.reader.remaining() >= RECORD_SIZE {
            if let Some([register, value, lo, hi]) = self.reader.read_array::<4>() {
                let delay = std::mem::replace(&mut self.last_delay, u16::from_le_bytes([lo, hi]) as u32);
                self.queued.push_back(CaptureEvent::write(register, value));
                return CaptureEvent::Delay { ticks: delay };
            }
        }

        // Out of whole records: the final record's delay still counts
        self.finished = true;
        match std::mem::take(&mut self.last_delay) {
            0 => CaptureEvent::End,
            ticks => CaptureEvent::Delay { ticks },
        }
    }
}

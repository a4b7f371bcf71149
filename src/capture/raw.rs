//! Rdos RAW OPL capture decoder
//!
//! Data is a stream of byte pairs, parameter first, then code. Delays are in
//! ticks of a programmable clock that may change mid-stream; every delay is
//! rescaled to [`RAW_REFERENCE_HZ`] before it leaves the decoder.

use super::event::{CaptureEvent, CaptureFormat, CaptureInfo, PIT_HZ};
use super::reader::{peek_u16_at, ByteReader};
use super::EventSource;
use crate::error::Result;
use std::collections::VecDeque;

/// RAW signature
pub const RAW_MAGIC: &[u8; 8] = b"RAWADATA";

/// Rate that RAW delays are normalized to
pub const RAW_REFERENCE_HZ: u32 = 1000;

/// Divisor equivalent to the 18.2 Hz power-on timer rate
pub const DEFAULT_DIVISOR: u32 = 0x10000;

const CLOCK_OFFSET: usize = 0x08;
const DATA_OFFSET: usize = 0x0A;

/// RAW codes
pub mod code {
    pub const DELAY: u8 = 0x00;
    pub const CONTROL: u8 = 0x02;
    pub const END: u8 = 0xFF;
}

/// Parameters of the control code
pub mod control {
    pub const CLOCK_CHANGE: u8 = 0x00;
    pub const LOW_CHIP: u8 = 0x01;
    pub const HIGH_CHIP: u8 = 0x02;
}

/// Map a header or control divisor to the divisor actually in effect
fn effective_divisor(divisor: u16) -> Option<u32> {
    match divisor {
        0 | 0xFFFF => None,
        d => Some(d as u32),
    }
}

pub struct RawDecoder<'a> {
    reader: ByteReader<'a>,
    info: CaptureInfo,
    queued: VecDeque<CaptureEvent>,
    divisor: u32,
    /// Native ticks not yet emitted
    pending: u64,
    /// Sub-tick remainder carried between rescales, in units of 1/PIT_HZ ticks
    remainder: u64,
    finished: bool,
}

impl<'a> RawDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let divisor = effective_divisor(peek_u16_at(data, CLOCK_OFFSET)?).unwrap_or(DEFAULT_DIVISOR);
        let length = data.len().saturating_sub(DATA_OFFSET) as u64;

        Ok(Self {
            reader: ByteReader::new(data, DATA_OFFSET, length),
            info: CaptureInfo {
                format: CaptureFormat::Raw,
                reference_hz: RAW_REFERENCE_HZ,
                data_length: length,
            },
            queued: VecDeque::new(),
            divisor,
            pending: 0,
            remainder: 0,
            finished: false,
        })
    }

    /// Current native clock rate in Hz
    pub fn clock_hz(&self) -> f64 {
        PIT_HZ as f64 / self.divisor as f64
    }

    /// Convert pending native ticks to reference ticks at the current speed
    fn take_pending(&mut self) -> Option<CaptureEvent> {
        if self.pending == 0 {
            return None;
        }
        let scaled = std::mem::take(&mut self.pending) * self.divisor as u64 * RAW_REFERENCE_HZ as u64
            + self.remainder;
        self.remainder = scaled % PIT_HZ as u64;
        let ticks = (scaled / PIT_HZ as u64).min(u32::MAX as u64) as u32;
        Some(CaptureEvent::Delay { ticks })
    }

    fn finish(&mut self) -> CaptureEvent {
        self.finished = true;
        self.take_pending().unwrap_or(CaptureEvent::End)
    }
}

impl EventSource for RawDecoder<'_> {
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

        loop {
            let Some([param, opcode]) = self.reader.read_array::<2>() else {
                return self.finish();
            };
            match (opcode, param) {
                (code::DELAY, ticks) => {
                    self.pending += ticks as u64;
                }
                (code::CONTROL, control::CLOCK_CHANGE) => {
                    let Some(raw) = self.reader.read_u16_le() else {
                        return self.finish();
                    };
                    let Some(divisor) = effective_divisor(raw) else {
                        tracing::warn!("Speed set to invalid value {:04X}, ignoring speed change", raw);
                        continue;
                    };
                    // Time already elapsed belongs to the old speed
                    let flushed = self.take_pending();
                    self.divisor = divisor;
                    let change = CaptureEvent::ClockChange {
                        divisor: raw,
                        hz: self.clock_hz().round() as u32,
                    };
                    return match flushed {
                        Some(delay) => {
                            self.queued.push_back(change);
                            delay
                        }
                        None => change,
                    };
                }
                (code::CONTROL, control::LOW_CHIP | control::HIGH_CHIP) => {
                    return CaptureEvent::ChipSelect {
                        chip: param - control::LOW_CHIP,
                    };
                }
                (code::CONTROL, other) => {
                    tracing::debug!("Ignoring RAW control parameter {:02X}", other);
                }
                (code::END, 0xFF) => {
                    return self.finish();
                }
                (register, value) => {
                    let write = CaptureEvent::write(register, value);
                    return match self.take_pending() {
                        Some(delay) => {
                            self.queued.push_back(write);
                            delay
                        }
                        None => write,
                    };
                }
            }
        }
    }
}

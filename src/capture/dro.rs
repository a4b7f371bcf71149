//! DOSBox Raw OPL (DRO) decoder
//!
//! Version 0.1 layout:
//!
//! | Offset | Size | Field                                  |
//! |--------|------|----------------------------------------|
//! | 0x00   | 8    | "DBRAWOPL"                             |
//! | 0x08   | 4    | version (0x00010000)                   |
//! | 0x0C   | 4    | length in milliseconds                 |
//! | 0x10   | 4    | length in bytes                        |
//! | 0x14   | 1/4  | hardware type (1 byte in early files)  |
//!
//! Version 2.0 replaces the opcode stream with (code, value) pairs and a
//! codemap translating codes into register numbers.

use super::event::{CaptureEvent, CaptureFormat, CaptureInfo};
use super::reader::{peek_u32_at, peek_u8_at, ByteReader};
use super::EventSource;
use crate::error::{Error, Result};
use std::collections::VecDeque;

/// DRO signature
pub const DRO_MAGIC: &[u8; 8] = b"DBRAWOPL";

/// DRO delays are in milliseconds
pub const DRO_HZ: u32 = 1000;

/// Header offsets (in bytes)
pub mod offset {
    pub const VERSION: usize = 0x08;
    pub const LENGTH_BYTES: usize = 0x10;
    pub const HARDWARE_TYPE: usize = 0x14;
    pub const V2_LENGTH_PAIRS: usize = 0x0C;
    pub const V2_SHORT_DELAY: usize = 0x17;
    pub const V2_LONG_DELAY: usize = 0x18;
    pub const V2_CODEMAP_LENGTH: usize = 0x19;
    pub const V2_CODEMAP: usize = 0x1A;
}

/// Version 0.1 opcodes
pub mod opcode {
    pub const DELAY_BYTE: u8 = 0x00;
    pub const DELAY_WORD: u8 = 0x01;
    pub const SELECT_LOW_CHIP: u8 = 0x02;
    pub const SELECT_HIGH_CHIP: u8 = 0x03;
    pub const ESCAPE: u8 = 0x04;
}

const VERSION_2: u32 = 2;

/// Check whether the version field selects the 2.0 layout
pub fn is_version2(data: &[u8]) -> bool {
    matches!(peek_u32_at(data, offset::VERSION), Ok(VERSION_2))
}

/// DRO version 0.1 decoder
pub struct DroDecoder<'a> {
    reader: ByteReader<'a>,
    info: CaptureInfo,
    queued: VecDeque<CaptureEvent>,
    delay: u32,
    finished: bool,
}

impl<'a> DroDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let length = peek_u32_at(data, offset::LENGTH_BYTES)? as u64;

        // Early captures stored the hardware type in one byte, later ones in
        // four, without bumping the version. Three zero bytes after the type
        // mean the wide field.
        let start = match data.get(offset::HARDWARE_TYPE + 1..offset::HARDWARE_TYPE + 4) {
            Some([0, 0, 0]) => offset::HARDWARE_TYPE + 4,
            _ => offset::HARDWARE_TYPE + 1,
        };

        Ok(Self {
            reader: ByteReader::new(data, start, length),
            info: CaptureInfo {
                format: CaptureFormat::Dro,
                reference_hz: DRO_HZ,
                data_length: length,
            },
            queued: VecDeque::new(),
            delay: 0,
            finished: false,
        })
    }

    fn finish(&mut self) -> CaptureEvent {
        self.finished = true;
        match std::mem::take(&mut self.delay) {
            0 => CaptureEvent::End,
            ticks => CaptureEvent::Delay { ticks },
        }
    }
}

impl EventSource for DroDecoder<'_> {
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
            let Some(code) = self.reader.read_u8() else {
                return self.finish();
            };
            let register = match code {
                opcode::DELAY_BYTE => {
                    let Some(n) = self.reader.read_u8() else {
                        return self.finish();
                    };
                    self.delay = self.delay.saturating_add(1 + n as u32);
                    continue;
                }
                opcode::DELAY_WORD => {
                    let Some(n) = self.reader.read_u16_le() else {
                        return self.finish();
                    };
                    self.delay = self.delay.saturating_add(1 + n as u32);
                    continue;
                }
                opcode::SELECT_LOW_CHIP | opcode::SELECT_HIGH_CHIP => {
                    return CaptureEvent::ChipSelect {
                        chip: code - opcode::SELECT_LOW_CHIP,
                    };
                }
                opcode::ESCAPE => match self.reader.read_u8() {
                    Some(register) => register,
                    None => return self.finish(),
                },
                register => register,
            };
            let Some(value) = self.reader.read_u8() else {
                return self.finish();
            };

            self.queued.push_back(CaptureEvent::write(register, value));
            return CaptureEvent::Delay {
                ticks: std::mem::take(&mut self.delay),
            };
        }
    }
}

/// DRO version 2.0 decoder
pub struct DroV2Decoder<'a> {
    reader: ByteReader<'a>,
    info: CaptureInfo,
    short_delay: u8,
    long_delay: u8,
    codemap: Vec<u8>,
    queued: VecDeque<CaptureEvent>,
    delay: u32,
    finished: bool,
}

impl<'a> DroV2Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let pairs = peek_u32_at(data, offset::V2_LENGTH_PAIRS)? as u64;
        let short_delay = peek_u8_at(data, offset::V2_SHORT_DELAY)?;
        let long_delay = peek_u8_at(data, offset::V2_LONG_DELAY)?;
        let codemap_len = peek_u8_at(data, offset::V2_CODEMAP_LENGTH)? as usize;
        if codemap_len > 128 {
            return Err(Error::Capture(format!(
                "Invalid DRO codemap length {}",
                codemap_len
            )));
        }
        let codemap = data
            .get(offset::V2_CODEMAP..offset::V2_CODEMAP + codemap_len)
            .ok_or_else(|| Error::Capture("DRO codemap is past the end of the file".into()))?
            .to_vec();
        let start = offset::V2_CODEMAP + codemap_len;
        let length = pairs.saturating_mul(2);

        Ok(Self {
            reader: ByteReader::new(data, start, length),
            info: CaptureInfo {
                format: CaptureFormat::DroV2,
                reference_hz: DRO_HZ,
                data_length: length,
            },
            short_delay,
            long_delay,
            codemap,
            queued: VecDeque::new(),
            delay: 0,
            finished: false,
        })
    }

    fn finish(&mut self) -> CaptureEvent {
        self.finished = true;
        match std::mem::take(&mut self.delay) {
            0 => CaptureEvent::End,
            ticks => CaptureEvent::Delay { ticks },
        }
    }
}

impl EventSource for DroV2Decoder<'_> {
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
            let Some([code, value]) = self.reader.read_array::<2>() else {
                return self.finish();
            };
            if code == self.short_delay {
                self.delay = self.delay.saturating_add(1 + value as u32);
                continue;
            }
            if code == self.long_delay {
                self.delay = self.delay.saturating_add((1 + value as u32) << 8);
                continue;
            }
            if code & 0x80 != 0 {
                return CaptureEvent::ChipSelect { chip: 1 };
            }
            let Some(&register) = self.codemap.get(code as usize) else {
                tracing::warn!("DRO code {:02X} is outside the codemap, skipping", code);
                continue;
            };

            self.queued.push_back(CaptureEvent::write(register, value));
            return CaptureEvent::Delay {
                ticks: std::mem::take(&mut self.delay),
            };
        }
    }
}

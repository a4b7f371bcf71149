//! Canonical events produced by every capture decoder

use serde::Serialize;
use std::fmt;

/// Programmable interval timer frequency used by RAW clock divisors
pub const PIT_HZ: u32 = 1_193_180;

/// A single OPL register write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterWrite {
    pub register: u8,
    pub value: u8,
}

/// A decoded capture event
///
/// Delays are always expressed in ticks of the capture's reference rate
/// (see [`CaptureInfo::reference_hz`]) and precede the writes they delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CaptureEvent {
    /// Advance time
    Delay { ticks: u32 },
    /// Register write
    Write(RegisterWrite),
    /// Native clock speed changed (RAW only)
    ClockChange { divisor: u16, hz: u32 },
    /// Second OPL chip or port selected; not supported
    ChipSelect { chip: u8 },
    /// End of sound data
    End,
}

impl CaptureEvent {
    pub fn write(register: u8, value: u8) -> Self {
        CaptureEvent::Write(RegisterWrite { register, value })
    }

    /// Get delay ticks if this is a delay event
    pub fn delay_ticks(&self) -> Option<u32> {
        match self {
            CaptureEvent::Delay { ticks } => Some(*ticks),
            _ => None,
        }
    }
}

/// Capture file variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureFormat {
    /// id Software music format without length header
    ImfType0,
    /// id Software music format with 16-bit length header
    ImfType1,
    /// DOSBox raw OPL capture, version 0.1
    Dro,
    /// DOSBox raw OPL capture, version 2.0
    DroV2,
    /// Rdos RAW OPL capture
    Raw,
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureFormat::ImfType0 => "IMF type-0",
            CaptureFormat::ImfType1 => "IMF type-1",
            CaptureFormat::Dro => "DOSBox DRO v0.1",
            CaptureFormat::DroV2 => "DOSBox DRO v2.0",
            CaptureFormat::Raw => "Rdos RAW",
        };
        f.write_str(name)
    }
}

/// Header-level facts about an opened capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureInfo {
    pub format: CaptureFormat,
    /// Rate of the ticks carried by [`CaptureEvent::Delay`]
    pub reference_hz: u32,
    /// Size of the data region in bytes, as declared by the header
    pub data_length: u64,
}

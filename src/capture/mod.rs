//! OPL capture file decoding
//!
//! Every supported capture format is decoded into the same timeline of
//! [`CaptureEvent`]s through the [`EventSource`] trait.

pub mod dro;
pub mod event;
pub mod imf;
pub mod raw;
pub mod reader;

pub use event::{CaptureEvent, CaptureFormat, CaptureInfo, RegisterWrite};

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A decoded, non-restartable stream of capture events
pub trait EventSource {
    /// Header facts about the capture
    fn info(&self) -> &CaptureInfo;

    /// Produce the next event; returns [`CaptureEvent::End`] forever once the
    /// data is exhausted
    fn next_event(&mut self) -> CaptureEvent;
}

/// Broad capture family, decided from the leading bytes alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Dro,
    Raw,
    Imf,
}

/// Classify a capture by its signature
pub fn detect_family(data: &[u8]) -> Family {
    if data.starts_with(dro::DRO_MAGIC) {
        Family::Dro
    } else if data.starts_with(raw::RAW_MAGIC) {
        Family::Raw
    } else {
        Family::Imf
    }
}

/// Pick the IMF playback rate from the file name's extension
pub fn imf_rate_for(name: &str) -> Result<u32> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    if ext.eq_ignore_ascii_case("imf") {
        Ok(imf::IMF_HZ)
    } else if ext.eq_ignore_ascii_case("wlf") {
        Ok(imf::WLF_HZ)
    } else {
        Err(Error::UnknownExtension(name.to_string()))
    }
}

/// Open a decoder for capture data
///
/// `name` is the capture's file name; it is only consulted for IMF data,
/// whose playback rate depends on the extension.
pub fn open<'a>(data: &'a [u8], name: &str) -> Result<Box<dyn EventSource + 'a>> {
    let source: Box<dyn EventSource + 'a> = match detect_family(data) {
        Family::Dro if dro::is_version2(data) => Box::new(dro::DroV2Decoder::new(data)?),
        Family::Dro => Box::new(dro::DroDecoder::new(data)?),
        Family::Raw => Box::new(raw::RawDecoder::new(data)?),
        Family::Imf => Box::new(imf::ImfDecoder::new(data, imf_rate_for(name)?)?),
    };

    let info = source.info();
    tracing::info!(
        "Input file is in {} format ({} Hz, {} data bytes)",
        info.format,
        info.reference_hz,
        info.data_length
    );
    Ok(source)
}

/// Drain a source into a vector, excluding the final [`CaptureEvent::End`]
pub fn collect_events(source: &mut dyn EventSource) -> Vec<CaptureEvent> {
    std::iter::from_fn(|| match source.next_event() {
        CaptureEvent::End => None,
        event => Some(event),
    })
    .collect()
}

/// Name used for format detection, with any `.gz` suffix removed
pub fn capture_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.len().checked_sub(3) {
        Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".gz") => {
            name[..cut].to_string()
        }
        _ => name,
    }
}

/// Read a capture file, decompressing it if it is gzipped
pub fn read_capture_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open '{}': {}", path.display(), e),
        ))
    })?;

    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    // Check for gzip magic (0x1f 0x8b) regardless of extension
    if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
        let mut decoder = GzDecoder::new(data.as_slice());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    } else {
        Ok(data)
    }
}

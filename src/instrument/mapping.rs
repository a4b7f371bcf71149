//! Instrument mapping file (`inst.txt`) parser
//!
//! ```text
//! # 20    40    60    80    C0 E0
//! 01-11/4F-00/F1-D2/53-74/06/00-00: patch=1
//! 00-01/00-00/F8-F8/FF-FF/00/00-00: drum=36
//! ```

use super::{Fingerprint, Instrument, InstrumentCatalog, NameTables, Voice, DEFAULT_CAPACITY};
use crate::error::{Error, Result};

fn mapping_error(line: usize, message: impl Into<String>) -> Error {
    Error::Mapping {
        line,
        message: message.into(),
    }
}

/// Parse the right-hand side of a mapping line
pub fn parse_voice(value: &str) -> std::result::Result<Voice, String> {
    let value = value.trim();
    if let Some(n) = value.strip_prefix("patch=") {
        let patch: i64 = n.trim().parse().map_err(|_| format!("invalid patch number '{}'", n))?;
        if !(1..=128).contains(&patch) {
            return Err(format!("patch={} must be between 1 and 128 inclusive", patch));
        }
        Ok(Voice::Melodic {
            program: (patch - 1) as u8,
        })
    } else if let Some(n) = value.strip_prefix("drum=") {
        let note: i64 = n.trim().parse().map_err(|_| format!("invalid drum note '{}'", n))?;
        if !(0..=127).contains(&note) {
            return Err(format!("drum={} must be between 0 and 127 inclusive", note));
        }
        Ok(Voice::Drum { note: note as u8 })
    } else {
        Err(format!("unknown option '{}'", value))
    }
}

/// Display name of the `index`th catalog entry
pub fn display_name(index: usize, voice: Voice, names: &NameTables) -> String {
    match voice {
        Voice::Melodic { program } => format!("Instrument #{}: {}", index, names.patch(program)),
        Voice::Drum { note } => format!("Instrument #{} (perc): {}", index, names.drum(note)),
    }
}

/// Parse a whole mapping file into a catalog
pub fn parse_mapping(text: &str, names: &NameTables) -> Result<InstrumentCatalog> {
    let mut instruments = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        let (registers, value) = line
            .split_once(':')
            .ok_or_else(|| mapping_error(line_no, format!("unable to parse '{}'", line)))?;
        let fingerprint: Fingerprint = registers.parse().map_err(|e| mapping_error(line_no, e))?;
        let voice = parse_voice(value).map_err(|e| mapping_error(line_no, e))?;

        if instruments.len() >= DEFAULT_CAPACITY {
            return Err(Error::CatalogFull(DEFAULT_CAPACITY));
        }
        instruments.push(Instrument {
            fingerprint,
            voice,
            name: display_name(instruments.len(), voice, names),
            redirect: None,
        });
    }

    InstrumentCatalog::from_instruments(instruments)
}

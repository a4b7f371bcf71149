//! Instrument fingerprints and the nearest-match catalog
//!
//! An OPL instrument is identified by its eleven timbre registers. The
//! catalog maps known fingerprints to General MIDI programs or percussion
//! notes and learns every unknown fingerprint it is asked about, so repeated
//! appearances of the same unknown timbre resolve without another search.

pub mod mapping;
pub mod names;

pub use names::NameTables;

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default upper bound on catalog entries (loaded plus learned)
pub const DEFAULT_CAPACITY: usize = 4096;

/// Registers that identify an OPL instrument, in mapping-file order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Fingerprint {
    pub reg20: [u8; 2],
    pub reg40: [u8; 2],
    pub reg60: [u8; 2],
    pub reg80: [u8; 2],
    pub reg_c0: u8,
    pub reg_e0: [u8; 2],
}

/// Per-register weights of the distance metric, in [`Fingerprint::to_bytes`] order
const WEIGHTS: [u32; 11] = [2, 2, 1, 1, 2, 2, 2, 2, 3, 1, 1];

impl Fingerprint {
    pub fn from_bytes(b: [u8; 11]) -> Self {
        Self {
            reg20: [b[0], b[1]],
            reg40: [b[2], b[3]],
            reg60: [b[4], b[5]],
            reg80: [b[6], b[7]],
            reg_c0: b[8],
            reg_e0: [b[9], b[10]],
        }
    }

    pub fn to_bytes(&self) -> [u8; 11] {
        [
            self.reg20[0],
            self.reg20[1],
            self.reg40[0],
            self.reg40[1],
            self.reg60[0],
            self.reg60[1],
            self.reg80[0],
            self.reg80[1],
            self.reg_c0,
            self.reg_e0[0],
            self.reg_e0[1],
        ]
    }

    /// Weighted sum of absolute register differences
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        self.to_bytes()
            .iter()
            .zip(other.to_bytes())
            .zip(WEIGHTS)
            .map(|((&a, b), w)| (a as i32 - b as i32).unsigned_abs() * w)
            .sum()
    }
}

/// Mapping-file syntax: `20-20/40-40/60-60/80-80/C0/E0-E0`
impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}-{:02X}/{:02X}-{:02X}/{:02X}-{:02X}/{:02X}-{:02X}/{:02X}/{:02X}-{:02X}",
            self.reg20[0],
            self.reg20[1],
            self.reg40[0],
            self.reg40[1],
            self.reg60[0],
            self.reg60[1],
            self.reg80[0],
            self.reg80[1],
            self.reg_c0,
            self.reg_e0[0],
            self.reg_e0[1]
        )
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        const GROUP_SIZES: [usize; 6] = [2, 2, 2, 2, 1, 2];

        let groups: Vec<&str> = s.trim().split('/').collect();
        if groups.len() != GROUP_SIZES.len() {
            return Err(format!("expected 6 register groups, found {}", groups.len()));
        }

        let mut bytes = Vec::with_capacity(11);
        for (group, &size) in groups.iter().zip(GROUP_SIZES.iter()) {
            let fields: Vec<&str> = group.split('-').collect();
            if fields.len() != size {
                return Err(format!("register group '{}' should have {} values", group, size));
            }
            for field in fields {
                if field.is_empty() || field.len() > 2 {
                    return Err(format!("'{}' is not a two-digit hex register value", field));
                }
                let value = u8::from_str_radix(field, 16)
                    .map_err(|_| format!("'{}' is not a two-digit hex register value", field))?;
                bytes.push(value);
            }
        }

        let mut b = [0u8; 11];
        b.copy_from_slice(&bytes);
        Ok(Self::from_bytes(b))
    }
}

/// What an instrument plays as in General MIDI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Voice {
    /// Melodic program (0-based)
    Melodic { program: u8 },
    /// Note on the percussion channel
    Drum { note: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instrument {
    pub fingerprint: Fingerprint,
    pub voice: Voice,
    pub name: String,
    /// Learned entries point at the instrument they were judged closest to
    pub redirect: Option<usize>,
}

/// Outcome of a catalog lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Canonical instrument to play (redirects already followed)
    pub index: usize,
    /// Distance to the closest entry
    pub distance: u32,
    /// Index of the entry appended for an unknown fingerprint
    pub learned: Option<usize>,
}

/// Append-only table of known instruments
#[derive(Debug, Clone)]
pub struct InstrumentCatalog {
    entries: Vec<Instrument>,
    capacity: usize,
}

impl InstrumentCatalog {
    /// Catalog holding only the default grand piano
    pub fn new() -> Self {
        let mut catalog = Self {
            entries: Vec::new(),
            capacity: DEFAULT_CAPACITY,
        };
        catalog.entries.push(Instrument {
            fingerprint: Fingerprint::default(),
            voice: Voice::Melodic { program: 0 },
            name: "Default: Acoustic Grand Piano".into(),
            redirect: None,
        });
        catalog
    }

    /// Build a catalog from loaded instruments, falling back to the default
    /// piano when there are none
    pub fn from_instruments(instruments: Vec<Instrument>) -> Result<Self> {
        if instruments.is_empty() {
            return Ok(Self::new());
        }
        if instruments.len() > DEFAULT_CAPACITY {
            return Err(Error::CatalogFull(DEFAULT_CAPACITY));
        }
        Ok(Self {
            entries: instruments,
            capacity: DEFAULT_CAPACITY,
        })
    }

    /// Limit the number of entries learning may grow the catalog to
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(self.entries.len());
        self
    }

    /// Load the mapping file and name tables
    ///
    /// Missing files are not errors: names fall back to numbers and a missing
    /// mapping yields the default piano catalog. Malformed content is fatal.
    pub fn load(mapping: &Path, patch_names: &Path, drum_names: &Path) -> Result<Self> {
        let names = NameTables::load(patch_names, drum_names)?;
        match std::fs::read_to_string(mapping) {
            Ok(text) => {
                let catalog = mapping::parse_mapping(&text, &names)?;
                tracing::info!(
                    "Loaded {} instrument definitions from {}",
                    catalog.len(),
                    mapping.display()
                );
                Ok(catalog)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Unable to open instrument mapping file {}, defaulting to a Grand Piano for all instruments",
                    mapping.display()
                );
                Ok(Self::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instrument> {
        self.entries.get(index)
    }

    /// Follow redirects from `index` to the canonical entry
    ///
    /// Bounded by the catalog size so a malformed chain cannot loop forever.
    pub fn resolve(&self, mut index: usize) -> usize {
        for _ in 0..self.entries.len() {
            match self.entries[index].redirect {
                Some(next) if next < self.entries.len() && next != index => index = next,
                _ => break,
            }
        }
        index
    }

    /// Find the instrument closest to `fingerprint`, learning it if unknown
    ///
    /// With `perfect_only`, any inexact match falls back to entry 0.
    pub fn find(&mut self, fingerprint: &Fingerprint, perfect_only: bool) -> Result<Match> {
        let mut best = 0usize;
        let mut best_distance = u32::MAX;
        for (i, entry) in self.entries.iter().enumerate() {
            let d = entry.fingerprint.distance(fingerprint);
            if d < best_distance {
                best = i;
                best_distance = d;
                if d == 0 {
                    break;
                }
            }
        }

        if best_distance != 0 && perfect_only {
            best = 0;
        }
        let index = self.resolve(best);

        let learned = if best_distance != 0 {
            if self.entries.len() >= self.capacity {
                return Err(Error::CatalogFull(self.capacity));
            }
            let target = &self.entries[index];
            let entry = Instrument {
                fingerprint: *fingerprint,
                voice: target.voice,
                name: format!("Learned #{} (as {})", self.entries.len(), target.name),
                redirect: Some(index),
            };
            self.entries.push(entry);
            Some(self.entries.len() - 1)
        } else {
            None
        };

        Ok(Match {
            index,
            distance: best_distance,
            learned,
        })
    }
}

impl Default for InstrumentCatalog {
    fn default() -> Self {
        Self::new()
    }
}

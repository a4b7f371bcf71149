use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Unknown file extension for '{0}' - must be .imf or .wlf")]
    UnknownExtension(String),

    #[error("Instrument mapping error at line {line}: {message}")]
    Mapping { line: usize, message: String },

    #[error("Name table error at line {line}: {message}")]
    NameTable { line: usize, message: String },

    #[error("Instrument catalog is full ({0} entries)")]
    CatalogFull(usize),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

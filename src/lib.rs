pub mod capture;
pub mod convert;
pub mod error;
pub mod instrument;
pub mod midi;
pub mod note;
pub mod opl;

pub use convert::{convert_file, ConversionStats, ConvertOptions, Converter};
pub use error::Error;
pub use instrument::InstrumentCatalog;

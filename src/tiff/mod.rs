//! TIFF file format module
//!
//! IFD model, tag constants, a parser that reconstructs arbitrary regions
//! of a plane from tiles or strips, and a saver that appends blocks and
//! links IFDs for the TIFF writer.

pub mod constants;
pub mod ifd;
pub mod parser;
pub mod saver;
pub mod types;
pub(crate) mod validation;
#[cfg(test)]
mod tests;

pub use crate::io::byte_order::{BigEndianHandler, ByteOrder, ByteOrderHandler, LittleEndianHandler};
pub use ifd::{IFDEntry, TagValue, IFD};
pub use parser::{is_tiff_header, TiffParser};
pub use saver::TiffSaver;
pub use types::TIFF;

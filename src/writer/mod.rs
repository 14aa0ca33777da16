//! Image writers

pub mod format_writer;
pub mod tiff_writer;

pub use format_writer::{series_from_retrieve, FormatWriter, SeriesInfo};
pub use tiff_writer::TiffWriter;
